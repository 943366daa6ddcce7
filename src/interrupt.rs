//! Interrupt types.

use core::ops;

/// bxCAN interrupt sources.
///
/// These are the enable bits of the `IER` register. Which of them end up on which interrupt line is
/// described by [`IrqLine`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Interrupt {
    Sleep = 1 << 17,
    Wakeup = 1 << 16,
    Error = 1 << 15,
    Fifo1Overrun = 1 << 6,
    Fifo1Full = 1 << 5,
    Fifo1MessagePending = 1 << 4,
    Fifo0Overrun = 1 << 3,
    Fifo0Full = 1 << 2,
    Fifo0MessagePending = 1 << 1,
    TransmitMailboxEmpty = 1 << 0,
}

bitflags::bitflags! {
    /// A set of bxCAN interrupts.
    pub struct Interrupts: u32 {
        const SLEEP = 1 << 17;
        const WAKEUP = 1 << 16;
        const ERROR = 1 << 15;
        const FIFO1_OVERRUN = 1 << 6;
        const FIFO1_FULL = 1 << 5;
        const FIFO1_MESSAGE_PENDING = 1 << 4;
        const FIFO0_OVERRUN = 1 << 3;
        const FIFO0_FULL = 1 << 2;
        const FIFO0_MESSAGE_PENDING = 1 << 1;
        const TRANSMIT_MAILBOX_EMPTY = 1 << 0;
    }
}

impl From<Interrupt> for Interrupts {
    fn from(i: Interrupt) -> Self {
        Self::from_bits_truncate(i as u32)
    }
}

/// Adds an interrupts to the interrupt set.
impl ops::BitOrAssign<Interrupt> for Interrupts {
    fn bitor_assign(&mut self, rhs: Interrupt) {
        *self |= Self::from(rhs);
    }
}

/// Interrupt lines of the peripheral, as seen by the interrupt controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum IrqLine {
    /// `CANn_TX`: transmit mailbox empty.
    Transmit,
    /// `CANn_RX0`: FIFO 0 message pending, full or overrun.
    Fifo0,
    /// `CANn_RX1`: FIFO 1 message pending, full or overrun.
    Fifo1,
}

impl IrqLine {
    /// All lines the driver installs handlers for.
    pub const ALL: [IrqLine; 3] = [IrqLine::Transmit, IrqLine::Fifo0, IrqLine::Fifo1];
}

/// The interrupt controller the peripheral's lines are routed through (the NVIC on Cortex-M).
///
/// Implementations are expected to take effect immediately: once `disable` returns, the handler of
/// that line must not start running until the matching `enable`.
pub trait InterruptController {
    /// Unmasks `line`.
    fn enable(&self, line: IrqLine);

    /// Masks `line`.
    fn disable(&self, line: IrqLine);
}

impl<C: InterruptController> InterruptController for &C {
    #[inline]
    fn enable(&self, line: IrqLine) {
        (**self).enable(line)
    }

    #[inline]
    fn disable(&self, line: IrqLine) {
        (**self).disable(line)
    }
}

/// Masks both receive lines for as long as it is alive.
///
/// The foreground uses this around the few updates of receive state that the receive interrupt
/// must not observe half-done.
pub(crate) struct RxCriticalSection<'a, C: InterruptController> {
    irq: &'a C,
}

impl<'a, C: InterruptController> RxCriticalSection<'a, C> {
    pub(crate) fn enter(irq: &'a C) -> Self {
        irq.disable(IrqLine::Fifo0);
        irq.disable(IrqLine::Fifo1);
        Self { irq }
    }
}

impl<C: InterruptController> Drop for RxCriticalSection<'_, C> {
    fn drop(&mut self) {
        self.irq.enable(IrqLine::Fifo1);
        self.irq.enable(IrqLine::Fifo0);
    }
}
