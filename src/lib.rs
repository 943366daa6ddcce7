//! Interrupt-driven driver for the STM32 bxCAN peripheral.
//!
//! The driver is split in two halves created together by [`Can::new`]:
//!
//! * [`Can`] is owned by the foreground. It initializes the peripheral, configures filters,
//!   submits frames to the three transmit mailboxes and hands out received frames.
//! * [`InterruptHandler`] is owned by the interrupt handlers of the `CANn_TX`, `CANn_RX0` and
//!   `CANn_RX1` lines. It moves frames from the hardware receive FIFOs into a software
//!   [`RxQueue`] and acknowledges completed transmissions.
//!
//! All register accesses go through the [`Registers`] trait. [`Mmio`] implements it for a real
//! peripheral described by an [`Instance`].
//!
//! # Example
//!
//! ```ignore
//! static mut QUEUE: RxQueue<16> = RxQueue::new();
//!
//! let (mut can, handler) = Can::new(Mmio::new(can1), Nvic, 36_000_000, unsafe { &mut QUEUE });
//! can.init(500_000, ControlFlags::AUTO_BUS_OFF)?;
//! can.enable_bank(0, Fifo::Fifo0, filter::Mask32::accept_all())?;
//!
//! let mailbox = can.transmit(&Frame::new_data(StandardId::new(0x100).unwrap(), [1, 2, 3]))?;
//! ```

#![doc(html_root_url = "https://docs.rs/can-controller/0.1.0")]
// Deny a few warnings in doctests, since rustdoc `allow`s many warnings by default
#![doc(test(attr(deny(unused_imports, unused_must_use))))]
#![no_std]

#[cfg(test)]
extern crate std;

// This mod MUST go first, so that the others see its macros.
mod fmt;

mod diag;
#[cfg(feature = "embedded-can")]
mod embedded_hal;
pub mod filter;
mod frame;
mod id;
mod interrupt;
mod pac;
mod rx;
mod timing;
mod tx;

#[cfg(test)]
mod sim;

#[cfg(feature = "unstable-defmt")]
pub use crate::diag::DefmtDiagnostics;
pub use crate::diag::{Diagnostics, ErrorStatus, LastError};
pub use crate::filter::{BankConfig, FilterBank, FilterMode, FilterScale};
pub use crate::frame::{Data, Frame};
pub use crate::id::{ExtendedId, Id, StandardId};
pub use crate::interrupt::{Interrupt, InterruptController, Interrupts, IrqLine};
pub use crate::pac::{Mmio, Reg, RegisterBlock, Registers};
pub use crate::rx::RxQueue;
pub use crate::timing::{BitTiming, Clock};
pub use crate::tx::{Mailbox, TxError, TxState};

use core::convert::Infallible;

use crate::interrupt::RxCriticalSection;
use crate::pac::{btr, mcr, msr};
use crate::rx::{RxConsumer, RxProducer};

/// A bxCAN peripheral instance.
///
/// This trait is meant to be implemented for a HAL-specific type that represent ownership of
/// the CAN peripheral (and any pins required by it, although that is entirely up to the HAL).
///
/// # Safety
///
/// It is only safe to implement this trait, when:
///
/// * The implementing type has ownership of the peripheral, preventing any other accesses to the
///   register block.
/// * `REGISTERS` is a pointer to that peripheral's register block and can be safely accessed for as
///   long as ownership or a borrow of the implementing type is present.
pub unsafe trait Instance {
    /// Pointer to the instance's register block.
    const REGISTERS: *mut RegisterBlock;
}

/// A bxCAN instance that owns filter banks.
///
/// # Safety
///
/// This trait must only be implemented when there is actually an associated filter bank.
pub unsafe trait FilterOwner: Instance {
    /// The total number of filter banks available to the instance.
    ///
    /// This is usually either 14 or 28, and should be specified in the chip's reference manual or
    /// datasheet.
    const NUM_FILTER_BANKS: u8;
}

/// Identifies one of the two receive FIFOs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum Fifo {
    Fifo0 = 0,
    Fifo1 = 1,
}

bitflags::bitflags! {
    /// Operating mode flags accepted by [`Can::init`] and [`Can::set_mode`].
    ///
    /// The values are the bit positions in the `MCR` and `BTR` registers. Use
    /// `ControlFlags::from_bits_truncate` to turn a raw value into flags, dropping any bit that is
    /// not a control bit.
    pub struct ControlFlags: u32 {
        /// Transmit mailboxes are served in request order instead of identifier priority (`TXFP`).
        const TX_FIFO_PRIORITY = 1 << 2;
        /// A full receive FIFO keeps its old frames and discards new ones (`RFLM`).
        const RX_FIFO_LOCKED = 1 << 3;
        /// Frames are transmitted once, regardless of the outcome (`NART`).
        const NO_AUTO_RETRANSMIT = 1 << 4;
        /// Leave sleep mode automatically on bus activity (`AWUM`).
        const AUTO_WAKEUP = 1 << 5;
        /// Leave bus-off automatically after 128 × 11 recessive bits (`ABOM`).
        const AUTO_BUS_OFF = 1 << 6;
        /// Time-triggered communication mode (`TTCM`).
        const TIME_TRIGGERED = 1 << 7;
        /// Internally connect TX to RX (`LBKM`).
        const LOOPBACK = 1 << 30;
        /// Disconnect the TX signal from the pin (`SILM`).
        const SILENT = 1 << 31;
    }
}

impl ControlFlags {
    const MCR_MASK: u32 = mcr::TXFP | mcr::RFLM | mcr::NART | mcr::AWUM | mcr::ABOM | mcr::TTCM;
    const BTR_MASK: u32 = btr::LBKM | btr::SILM;
}

/// Normal operation with automatic bus-off recovery.
impl Default for ControlFlags {
    fn default() -> Self {
        ControlFlags::AUTO_BUS_OFF
    }
}

/// Lifecycle state of the controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum State {
    /// `init` was never called.
    Uninitialized,
    /// The peripheral is (being put) in initialization mode for a configuration change.
    InitializationRequested,
    /// Configured and participating on the bus.
    Ready,
    /// The last `init` or `set_mode` failed.
    Faulted(InitError),
}

/// Error returned by [`Can::init`] and [`Can::set_mode`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum InitError {
    /// The peripheral did not acknowledge the initialization request.
    InitAckTimeout,
    /// The peripheral did not leave initialization mode.
    InitLeaveTimeout,
    /// The transmit mailboxes did not all become empty after initialization.
    MailboxTimeout,
    /// The bit rate is zero or cannot be derived exactly from the peripheral clock.
    InvalidBitRate,
    /// `set_mode` was called before a successful `init`.
    NotReady,
}

/// Error returned by the filter configuration methods.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum FilterError {
    /// The bank index is not below `num_filter_banks()`.
    BankOutOfRange,
    /// The controller has not been initialized.
    NotReady,
}

/// Upper bound on the status register polls of a mode handshake.
const HANDSHAKE_POLLS: u32 = 0x4_0000;

/// Calls `done` until it returns `true`, at most `limit` times.
fn poll(limit: u32, mut done: impl FnMut() -> bool) -> bool {
    (0..limit).any(|_| done())
}

/// Foreground interface to the CAN peripheral.
///
/// Configuration methods take `&mut self`; the driver does not serialize them internally.
pub struct Can<'q, R, C, K, const N: usize> {
    regs: R,
    irq: C,
    clock: K,
    state: State,
    rx: RxConsumer<'q, N>,
}

/// Interrupt-side interface to the CAN peripheral.
///
/// Call [`on_transmit_interrupt`](Self::on_transmit_interrupt) from the `CANn_TX` handler and
/// [`on_receive_interrupt`](Self::on_receive_interrupt) from the `CANn_RX0` / `CANn_RX1` handlers.
/// The handlers must not preempt each other.
pub struct InterruptHandler<'q, R, const N: usize> {
    regs: R,
    rx: RxProducer<'q, N>,
}

impl<'q, R, C, K, const N: usize> Can<'q, R, C, K, N>
where
    R: Registers + Clone,
    C: InterruptController,
    K: Clock,
{
    /// Creates the controller and its interrupt handler.
    ///
    /// Received frames are stored in `queue`. Nothing is written to the peripheral until
    /// [`init`](Self::init) is called.
    pub fn new(
        regs: R,
        irq: C,
        clock: K,
        queue: &'q mut RxQueue<N>,
    ) -> (Self, InterruptHandler<'q, R, N>) {
        let (producer, consumer) = queue.split();
        let handler = InterruptHandler {
            regs: regs.clone(),
            rx: producer,
        };
        let can = Can {
            regs,
            irq,
            clock,
            state: State::Uninitialized,
            rx: consumer,
        };
        (can, handler)
    }
}

impl<'q, R, C, K, const N: usize> Can<'q, R, C, K, N>
where
    R: Registers,
    C: InterruptController,
    K: Clock,
{
    /// Returns the lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Initializes the peripheral for `bit_rate` and starts bus participation.
    ///
    /// The bit timing is derived from the peripheral clock with a sample point between 75% and
    /// 87.5%. Mailbox-empty and message-pending interrupts are enabled, and the three interrupt
    /// lines are unmasked once everything else succeeded. On failure the controller is left
    /// `Faulted` with all its interrupts disabled; `init` may simply be called again.
    pub fn init(&mut self, bit_rate: u32, flags: ControlFlags) -> Result<(), InitError> {
        let clock = self.clock.peripheral_frequency();
        match BitTiming::new(clock, bit_rate) {
            Some(timing) => {
                debug!(
                    "{} bit/s from {} Hz: prescaler {}, {} quanta",
                    bit_rate,
                    clock,
                    timing.prescaler,
                    timing.quanta()
                );
                self.init_with_timing(timing, flags)
            }
            None => {
                warn!("no exact bit timing for {} bit/s from {} Hz", bit_rate, clock);
                self.state = State::Faulted(InitError::InvalidBitRate);
                Err(InitError::InvalidBitRate)
            }
        }
    }

    /// Like [`init`](Self::init), but with an explicit bit timing.
    pub fn init_with_timing(
        &mut self,
        timing: BitTiming,
        flags: ControlFlags,
    ) -> Result<(), InitError> {
        for &line in IrqLine::ALL.iter() {
            self.irq.disable(line);
        }

        self.state = State::InitializationRequested;
        match self.configure(timing, flags) {
            Ok(()) => {
                for &line in IrqLine::ALL.iter() {
                    self.irq.enable(line);
                }
                self.state = State::Ready;
                Ok(())
            }
            Err(e) => {
                self.fault(e);
                Err(e)
            }
        }
    }

    /// Stops the interrupt-driven paths after a failed configuration change.
    ///
    /// A `Faulted` controller has all its interrupts disabled and its lines masked.
    fn fault(&mut self, e: InitError) {
        for &line in IrqLine::ALL.iter() {
            self.irq.disable(line);
        }
        self.regs.write(Reg::Ier, 0);
        self.state = State::Faulted(e);
    }

    fn configure(&self, timing: BitTiming, flags: ControlFlags) -> Result<(), InitError> {
        self.regs.clear_bits(Reg::Mcr, mcr::SLEEP);
        self.enter_init_mode()?;

        self.write_control_flags(flags);
        self.regs.modify(Reg::Btr, |bits| {
            (bits & !btr::TIMING_MASK) | timing.to_btr()
        });
        let interrupts = Interrupts::FIFO0_MESSAGE_PENDING
            | Interrupts::FIFO1_MESSAGE_PENDING
            | Interrupts::TRANSMIT_MAILBOX_EMPTY;
        self.regs.write(Reg::Ier, interrupts.bits());

        self.leave_init_mode()?;

        if poll(HANDSHAKE_POLLS, || tx::is_idle(&self.regs)) {
            Ok(())
        } else {
            warn!("transmit mailboxes still busy after initialization");
            Err(InitError::MailboxTimeout)
        }
    }

    /// Changes the operating mode flags without touching the bit timing.
    ///
    /// On failure the controller is left `Faulted` with all its interrupts disabled, like after a
    /// failed [`init`](Self::init).
    pub fn set_mode(&mut self, flags: ControlFlags) -> Result<(), InitError> {
        if self.state != State::Ready {
            return Err(InitError::NotReady);
        }

        self.state = State::InitializationRequested;
        match self.reconfigure_mode(flags) {
            Ok(()) => {
                self.state = State::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("mode change failed: {}", e);
                self.fault(e);
                Err(e)
            }
        }
    }

    fn reconfigure_mode(&self, flags: ControlFlags) -> Result<(), InitError> {
        self.enter_init_mode()?;
        self.write_control_flags(flags);
        self.leave_init_mode()
    }

    /// Requests initialization mode and waits for the acknowledgement.
    ///
    /// Returns immediately, without any register write, if the peripheral already is in
    /// initialization mode.
    fn enter_init_mode(&self) -> Result<(), InitError> {
        if self.regs.is_set(Reg::Msr, msr::INAK) {
            return Ok(());
        }

        self.regs.set_bits(Reg::Mcr, mcr::INRQ);
        if poll(HANDSHAKE_POLLS, || self.regs.is_set(Reg::Msr, msr::INAK)) {
            Ok(())
        } else {
            warn!("initialization request not acknowledged");
            Err(InitError::InitAckTimeout)
        }
    }

    /// Releases initialization mode and waits for the acknowledgement to clear.
    ///
    /// Returns immediately, without any register write, if the peripheral is not in
    /// initialization mode.
    fn leave_init_mode(&self) -> Result<(), InitError> {
        if !self.regs.is_set(Reg::Msr, msr::INAK) {
            return Ok(());
        }

        self.regs.clear_bits(Reg::Mcr, mcr::INRQ);
        if poll(HANDSHAKE_POLLS, || !self.regs.is_set(Reg::Msr, msr::INAK)) {
            Ok(())
        } else {
            warn!("initialization mode not left");
            Err(InitError::InitLeaveTimeout)
        }
    }

    fn write_control_flags(&self, flags: ControlFlags) {
        let bits = flags.bits();
        self.regs.modify(Reg::Mcr, |mcr| {
            (mcr & !ControlFlags::MCR_MASK) | (bits & ControlFlags::MCR_MASK)
        });
        self.regs.modify(Reg::Btr, |btr| {
            (btr & !ControlFlags::BTR_MASK) | (bits & ControlFlags::BTR_MASK)
        });
    }

    /// Returns the number of filter banks of this peripheral.
    pub fn num_filter_banks(&self) -> u8 {
        R::NUM_FILTER_BANKS
    }

    /// Programs filter bank `bank` and activates it.
    ///
    /// The meaning of `fr1` and `fr2` depends on `scale` and `mode`; [`BankConfig::registers`]
    /// computes them. The bank is inactive while it is rewritten. Other banks are not touched.
    pub fn filter(
        &mut self,
        bank: u8,
        fifo: Fifo,
        scale: FilterScale,
        mode: FilterMode,
        fr1: u32,
        fr2: u32,
    ) -> Result<(), FilterError> {
        self.check_bank(bank)?;
        filter::configure(&self.regs, bank, fifo, scale, mode, fr1, fr2);
        trace!("filter bank {} -> {}", bank, fifo);
        Ok(())
    }

    /// Configures filter bank `bank` according to `config` and activates it.
    pub fn enable_bank(
        &mut self,
        bank: u8,
        fifo: Fifo,
        config: impl Into<BankConfig>,
    ) -> Result<(), FilterError> {
        let config = config.into();
        let (fr1, fr2) = config.registers();
        self.filter(bank, fifo, config.scale(), config.mode(), fr1, fr2)
    }

    /// Deactivates filter bank `bank`.
    pub fn disable_bank(&mut self, bank: u8) -> Result<(), FilterError> {
        self.check_bank(bank)?;
        filter::disable(&self.regs, bank);
        Ok(())
    }

    /// Deactivates all filter banks.
    ///
    /// This causes all incoming frames to be disposed.
    pub fn clear_filters(&mut self) -> Result<(), FilterError> {
        if self.state != State::Ready {
            return Err(FilterError::NotReady);
        }
        filter::clear(&self.regs);
        Ok(())
    }

    /// Reads back the configuration of filter bank `bank`.
    pub fn filter_bank(&self, bank: u8) -> Option<FilterBank> {
        if bank < R::NUM_FILTER_BANKS {
            Some(filter::read(&self.regs, bank))
        } else {
            None
        }
    }

    fn check_bank(&self, bank: u8) -> Result<(), FilterError> {
        if self.state != State::Ready {
            Err(FilterError::NotReady)
        } else if bank >= R::NUM_FILTER_BANKS {
            Err(FilterError::BankOutOfRange)
        } else {
            Ok(())
        }
    }

    /// Puts `frame` into the first empty transmit mailbox and requests its transmission.
    ///
    /// Mailboxes are considered in the order 0, 1, 2. Does not wait for the transmission; use
    /// [`tx_status`](Self::tx_status) with the returned mailbox to observe the outcome.
    pub fn transmit(&mut self, frame: &Frame) -> Result<Mailbox, TxError> {
        if self.state != State::Ready {
            return Err(TxError::NotReady);
        }

        let mailbox = tx::free_mailbox(&self.regs).ok_or(TxError::NoMailboxAvailable)?;
        tx::write_mailbox(&self.regs, mailbox, frame);
        trace!("{} <- {}", mailbox, frame);
        Ok(mailbox)
    }

    /// Returns the state of `mailbox`.
    ///
    /// Bit patterns that do not describe a known state are reported as
    /// [`TxState::TransmitError`]. So is a mailbox whose completion was already acknowledged by
    /// [`InterruptHandler::on_transmit_interrupt`].
    pub fn tx_status(&self, mailbox: Mailbox) -> TxState {
        tx::status(&self.regs, mailbox)
    }

    /// Requests the abort of the transmission pending in `mailbox`.
    ///
    /// Does not wait: a later [`tx_status`](Self::tx_status) reports the outcome. A frame that is
    /// already on the bus is not aborted.
    pub fn cancel(&mut self, mailbox: Mailbox) {
        trace!("cancel {}", mailbox);
        tx::abort(&self.regs, mailbox);
    }

    /// Returns `true` if no frame is pending for transmission.
    pub fn is_transmitter_idle(&self) -> bool {
        tx::is_idle(&self.regs)
    }

    /// Returns the number of frames in the receive queue.
    pub fn available(&self) -> usize {
        self.rx.available()
    }

    /// Returns the oldest frame in the receive queue without removing it.
    pub fn peek(&self) -> Option<Frame> {
        self.rx.peek().cloned()
    }

    /// Removes the oldest frame from the receive queue. Does nothing if it is empty.
    pub fn pop(&mut self) {
        let _ = self.rx.pop();
    }

    /// Removes and returns the oldest frame from the receive queue.
    pub fn receive(&mut self) -> nb::Result<Frame, Infallible> {
        self.rx.pop().ok_or(nb::Error::WouldBlock)
    }

    /// Discards all queued frames and resets the `lost` and `overruns` counters.
    pub fn clear(&mut self) {
        let _cs = if self.state == State::Ready {
            Some(RxCriticalSection::enter(&self.irq))
        } else {
            None
        };
        self.rx.clear();
    }

    /// Number of received frames dropped because the receive queue was full.
    pub fn lost(&self) -> u32 {
        self.rx.lost()
    }

    /// Number of frames the hardware dropped because a receive FIFO was full.
    pub fn overruns(&self) -> u32 {
        self.rx.overruns()
    }

    /// Reads the error counters and the last bus error.
    pub fn error_status(&self) -> ErrorStatus {
        ErrorStatus::from_esr(self.regs.read(Reg::Esr))
    }

    /// Reports the control, status and filter registers to `sink`.
    pub fn print_registers<D: Diagnostics>(&self, sink: &mut D) {
        diag::dump(&self.regs, sink);
    }

    /// Disables the peripheral's interrupts and returns the parts the controller was built from.
    pub fn free(self) -> (R, C, K) {
        for &line in IrqLine::ALL.iter() {
            self.irq.disable(line);
        }
        self.regs.write(Reg::Ier, 0);
        (self.regs, self.irq, self.clock)
    }
}

impl<'q, R, const N: usize> InterruptHandler<'q, R, N>
where
    R: Registers,
{
    /// Moves pending frames from `fifo` into the receive queue.
    ///
    /// Frames that do not fit are dropped and counted by [`Can::lost`]. Returns the number of
    /// hardware FIFO slots released.
    pub fn on_receive_interrupt(&mut self, fifo: Fifo) -> usize {
        rx::drain(&self.regs, fifo, &mut self.rx)
    }

    /// Acknowledges completed transmissions.
    ///
    /// Returns the outcome of every mailbox that completed since the last acknowledgement, indexed
    /// by mailbox number.
    pub fn on_transmit_interrupt(&mut self) -> [Option<TxState>; 3] {
        tx::acknowledge(&self.regs)
    }
}
