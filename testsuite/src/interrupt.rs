//! Scoped handlers for the CAN1 interrupt lines.

use core::cell::RefCell;

use cortex_m::interrupt::{self as cs, Mutex};

use crate::pac::interrupt;

irq::scoped_interrupts! {
    #[allow(non_camel_case_types)]
    pub enum Interrupt {
        USB_HP_CAN_TX,
        USB_LP_CAN_RX0,
        CAN_RX1,
    }

    use #[interrupt];
}

pub use Interrupt::CAN_RX1 as CAN1_RX1;
pub use Interrupt::USB_HP_CAN_TX as CAN1_TX;
pub use Interrupt::USB_LP_CAN_RX0 as CAN1_RX0;

/// Hands a value borrowed by the test to its interrupt handler.
///
/// Every access runs with interrupts disabled.
pub struct Shared<T>(Mutex<RefCell<T>>);

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Shared(Mutex::new(RefCell::new(value)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        cs::free(|token| f(&mut self.0.borrow(token).borrow_mut()))
    }
}
