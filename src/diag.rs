//! Register dumps and bus error status.

use crate::pac::{esr, Reg, Registers};

/// Receives named register values, e.g. for printing on a console.
pub trait Diagnostics {
    /// Reports the current `value` of the register called `name`.
    fn dump(&mut self, name: &str, value: u32);
}

/// Logs register dumps via `defmt`.
#[cfg(feature = "unstable-defmt")]
pub struct DefmtDiagnostics;

#[cfg(feature = "unstable-defmt")]
impl Diagnostics for DefmtDiagnostics {
    fn dump(&mut self, name: &str, value: u32) {
        defmt::info!("{} = {}", name, value);
    }
}

const DUMPED: [(&str, Reg); 13] = [
    ("MCR", Reg::Mcr),
    ("MSR", Reg::Msr),
    ("TSR", Reg::Tsr),
    ("RF0R", Reg::Rfr(crate::Fifo::Fifo0)),
    ("RF1R", Reg::Rfr(crate::Fifo::Fifo1)),
    ("IER", Reg::Ier),
    ("ESR", Reg::Esr),
    ("BTR", Reg::Btr),
    ("FMR", Reg::Fmr),
    ("FM1R", Reg::Fm1r),
    ("FS1R", Reg::Fs1r),
    ("FFA1R", Reg::Ffa1r),
    ("FA1R", Reg::Fa1r),
];

/// Reports the control, status and filter configuration registers to `sink`.
///
/// Only registers without read side effects are dumped; the receive FIFO output registers are
/// left alone.
pub(crate) fn dump<R: Registers, D: Diagnostics>(regs: &R, sink: &mut D) {
    for &(name, reg) in DUMPED.iter() {
        sink.dump(name, regs.read(reg));
    }
}

/// Kind of the last error detected on the bus.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum LastError {
    Stuff,
    Form,
    Acknowledgement,
    BitRecessive,
    BitDominant,
    Crc,
    /// Code set by software to detect when the peripheral updates it.
    Software,
}

/// Contents of the error status register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub struct ErrorStatus {
    /// Transmit error counter.
    pub transmit_errors: u8,
    /// Receive error counter.
    pub receive_errors: u8,
    /// Last error code, `None` if no error occurred since it was reset.
    pub last_error: Option<LastError>,
    /// The controller is in the bus-off state.
    pub bus_off: bool,
    /// An error counter exceeded 127.
    pub error_passive: bool,
    /// An error counter reached the warning limit of 96.
    pub error_warning: bool,
}

impl ErrorStatus {
    pub(crate) fn from_esr(bits: u32) -> Self {
        let last_error = match (bits & esr::LEC_MASK) >> esr::LEC_SHIFT {
            0 => None,
            1 => Some(LastError::Stuff),
            2 => Some(LastError::Form),
            3 => Some(LastError::Acknowledgement),
            4 => Some(LastError::BitRecessive),
            5 => Some(LastError::BitDominant),
            6 => Some(LastError::Crc),
            _ => Some(LastError::Software),
        };

        Self {
            transmit_errors: (bits >> esr::TEC_SHIFT) as u8,
            receive_errors: (bits >> esr::REC_SHIFT) as u8,
            last_error,
            bus_off: bits & esr::BOFF != 0,
            error_passive: bits & esr::EPVF != 0,
            error_warning: bits & esr::EWGF != 0,
        }
    }
}
