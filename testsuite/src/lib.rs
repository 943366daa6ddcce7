//! On-device testsuite definitions.
//!
//! This is meant to run on an STM32F105/F107 and will probably break on other chips. CAN1 runs in
//! silent loopback mode, so no transceiver or bus is needed.
//!
//! We deliberately avoid depending on any STM32 HAL here, since that can cause weird cyclic
//! dependencies once this driver is used by them.

#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use can_controller::{
    Can, ControlFlags, Fifo, FilterOwner, Frame, Instance, InterruptController, InterruptHandler,
    IrqLine, Mailbox, Mmio, RxQueue, TxError, TxState,
};
use cortex_m::peripheral::NVIC;

pub use stm32f1::stm32f107 as pac;

pub mod interrupt;

/// APB1 clock after reset (HSI, no prescaling).
pub const PCLK1: u32 = 8_000_000;

pub const BIT_RATE: u32 = 1_000_000;

/// Storage size of the receive queue, which holds one frame less.
pub const QUEUE_SIZE: usize = 8;

pub struct CAN1 {
    _private: (),
}

unsafe impl Instance for CAN1 {
    const REGISTERS: *mut can_controller::RegisterBlock = 0x4000_6400 as *mut _;
}

unsafe impl FilterOwner for CAN1 {
    /// F105 is a connectivity-line device, which have 28 total filter banks.
    const NUM_FILTER_BANKS: u8 = 28;
}

/// Masks and unmasks the CAN1 interrupt lines in the NVIC.
pub struct Nvic;

impl Nvic {
    fn interrupt(line: IrqLine) -> pac::Interrupt {
        match line {
            IrqLine::Transmit => pac::Interrupt::USB_HP_CAN_TX,
            IrqLine::Fifo0 => pac::Interrupt::USB_LP_CAN_RX0,
            IrqLine::Fifo1 => pac::Interrupt::CAN_RX1,
        }
    }
}

impl InterruptController for Nvic {
    fn enable(&self, line: IrqLine) {
        unsafe { NVIC::unmask(Self::interrupt(line)) }
    }

    fn disable(&self, line: IrqLine) {
        NVIC::mask(Self::interrupt(line));
    }
}

pub type Can1 = Can<'static, Mmio<CAN1>, Nvic, u32, QUEUE_SIZE>;
pub type Can1Handler = InterruptHandler<'static, Mmio<CAN1>, QUEUE_SIZE>;

pub struct State {
    pub can1: Can1,
    pub handler: Can1Handler,
}

impl State {
    pub fn init() -> Self {
        let periph = defmt::unwrap!(pac::Peripherals::take());
        let mut rcc = periph.RCC;
        let can1 = init(periph.CAN1, &mut rcc);

        let queue = defmt::unwrap!(cortex_m::singleton!(: RxQueue<QUEUE_SIZE> = RxQueue::new()));
        let (can1, handler) = Can::new(Mmio::new(can1), Nvic, PCLK1, queue);

        let mut state = Self { can1, handler };
        state.go_fast();
        state
    }

    /// (Re)initializes CAN1 for fast loopback transfers.
    ///
    /// Pending frames are discarded and the interrupt lines masked again afterwards: tests drive
    /// the interrupt handler by hand unless they install handlers of their own.
    pub fn go_fast(&mut self) {
        self.reinit(BIT_RATE);
    }

    /// (Re)initializes CAN1 with a bit rate low enough to observe all mailboxes busy.
    pub fn go_slow(&mut self) {
        self.reinit(10_000);
    }

    fn reinit(&mut self, bit_rate: u32) {
        defmt::unwrap!(self
            .can1
            .init(bit_rate, ControlFlags::LOOPBACK | ControlFlags::SILENT));

        // Leftovers of the previous test.
        self.handler.on_transmit_interrupt();
        self.poll_receive();
        self.can1.clear();
        for &line in IrqLine::ALL.iter() {
            Nvic.disable(line);
        }
    }

    /// Retries until a mailbox is free.
    pub fn transmit_blocking(&mut self, frame: &Frame) -> Mailbox {
        loop {
            match self.can1.transmit(frame) {
                Ok(mailbox) => return mailbox,
                Err(TxError::NoMailboxAvailable) => {}
                Err(e) => defmt::panic!("transmit failed: {}", e),
            }
        }
    }

    /// Waits for the transmission in `mailbox` to complete and acknowledges it.
    pub fn wait_transmitted(&mut self, mailbox: Mailbox) -> TxState {
        let state = loop {
            match self.can1.tx_status(mailbox) {
                TxState::Pending => {}
                state => break state,
            }
        };
        self.handler.on_transmit_interrupt();
        state
    }

    /// Moves everything the hardware received into the receive queue.
    pub fn poll_receive(&mut self) -> usize {
        self.handler.on_receive_interrupt(Fifo::Fifo0) + self.handler.on_receive_interrupt(Fifo::Fifo1)
    }

    /// Sends `frame` through the loopback and returns whether it was received back.
    ///
    /// A received frame must be equal to `frame`.
    pub fn roundtrip_frame(&mut self, frame: &Frame) -> bool {
        let mailbox = self.transmit_blocking(frame);
        defmt::assert_eq!(self.wait_transmitted(mailbox), TxState::Success);

        self.poll_receive();
        match self.can1.receive() {
            Ok(received) => {
                defmt::assert_eq!(&received, frame);
                true
            }
            Err(nb::Error::WouldBlock) => false,
            Err(nb::Error::Other(e)) => match e {},
        }
    }
}

pub fn init(can1: pac::CAN1, rcc: &mut pac::RCC) -> CAN1 {
    // Turn on RCC clocks.
    rcc.apb1enr.modify(|_, w| w.can1en().enabled());
    rcc.apb1rstr.modify(|_, w| w.can1rst().reset());
    rcc.apb1rstr.modify(|_, w| w.can1rst().clear_bit());

    let _ = can1;

    CAN1 { _private: () }
}
