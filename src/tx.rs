//! Transmit mailboxes.

use crate::frame::MailboxImage;
use crate::pac::{tir, tsr, Reg, Registers};
use crate::Frame;

/// Identifies one of the three transmit mailboxes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum Mailbox {
    /// Transmit mailbox 0
    Mailbox0 = 0,
    /// Transmit mailbox 1
    Mailbox1 = 1,
    /// Transmit mailbox 2
    Mailbox2 = 2,
}

impl Mailbox {
    /// All mailboxes, in the order `transmit` considers them.
    pub const ALL: [Mailbox; 3] = [Mailbox::Mailbox0, Mailbox::Mailbox1, Mailbox::Mailbox2];
}

/// State of a transmit mailbox, as reported by the peripheral.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum TxState {
    /// A request is submitted and the peripheral is still arbitrating or transmitting.
    Pending,
    /// The last request was transmitted successfully.
    Success,
    /// The last request failed because another node won arbitration.
    ArbitrationLost,
    /// The last request failed, or the status bits do not describe a known outcome.
    TransmitError,
}

impl TxState {
    /// Decodes the request-completed, transmit-ok and mailbox-empty bits of a mailbox.
    ///
    /// | RQCP | TXOK | TME | state           |
    /// |------|------|-----|-----------------|
    /// | 0    | 0    | 0   | `Pending`       |
    /// | 1    | 0    | 1   | `TransmitError` |
    /// | 1    | 1    | 1   | `Success`       |
    /// | any other       | | `TransmitError` |
    pub fn decode(request_completed: bool, transmit_ok: bool, mailbox_empty: bool) -> Self {
        match (request_completed, transmit_ok, mailbox_empty) {
            (false, false, false) => TxState::Pending,
            (true, true, true) => TxState::Success,
            (true, false, true) => TxState::TransmitError,
            _ => TxState::TransmitError,
        }
    }
}

/// Error returned by `transmit`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum TxError {
    /// All three mailboxes hold a pending request.
    ///
    /// Retry later, or reclaim a mailbox with `cancel`.
    NoMailboxAvailable,
    /// The controller has not been initialized.
    NotReady,
}

/// Returns the first empty mailbox, in priority order.
pub(crate) fn free_mailbox<R: Registers>(regs: &R) -> Option<Mailbox> {
    let tsr = regs.read(Reg::Tsr);
    Mailbox::ALL
        .iter()
        .copied()
        .find(|&mb| tsr & tsr::tme(mb) != 0)
}

/// Loads `frame` into `mailbox` and requests its transmission.
///
/// The transmit request bit is set by the last write, after the identifier, length and data are in
/// place.
pub(crate) fn write_mailbox<R: Registers>(regs: &R, mailbox: Mailbox, frame: &Frame) {
    let image = MailboxImage::encode(frame);

    regs.write(Reg::Tir(mailbox), image.id);
    regs.write(Reg::Tdtr(mailbox), image.dlc_time);
    regs.write(Reg::Tdlr(mailbox), image.data_low);
    regs.write(Reg::Tdhr(mailbox), image.data_high);
    regs.write(Reg::Tir(mailbox), image.id | tir::TXRQ);
}

pub(crate) fn status<R: Registers>(regs: &R, mailbox: Mailbox) -> TxState {
    decode_tsr(regs.read(Reg::Tsr), mailbox)
}

fn decode_tsr(tsr: u32, mailbox: Mailbox) -> TxState {
    let state = TxState::decode(
        tsr & tsr::rqcp(mailbox) != 0,
        tsr & tsr::txok(mailbox) != 0,
        tsr & tsr::tme(mailbox) != 0,
    );

    match state {
        TxState::TransmitError if tsr & tsr::alst(mailbox) != 0 => TxState::ArbitrationLost,
        state => state,
    }
}

/// Requests the abort of a pending transmission. Does not wait for the peripheral to act on it.
pub(crate) fn abort<R: Registers>(regs: &R, mailbox: Mailbox) {
    // All other bits of TSR are either read-only or write-1-to-clear.
    regs.write(Reg::Tsr, tsr::abrq(mailbox));
}

pub(crate) fn is_idle<R: Registers>(regs: &R) -> bool {
    regs.read(Reg::Tsr) & tsr::TME_ALL == tsr::TME_ALL
}

/// Clears the request-completed flag of every mailbox that has one set.
///
/// Returns the outcome of each acknowledged mailbox, decoded before the flags were cleared.
/// Clearing `RQCP` also clears the mailbox's `TXOK`, `ALST` and `TERR` bits.
pub(crate) fn acknowledge<R: Registers>(regs: &R) -> [Option<TxState>; 3] {
    let tsr = regs.read(Reg::Tsr);

    let mut completed = [None; 3];
    let mut clear = 0;
    for &mb in Mailbox::ALL.iter() {
        if tsr & tsr::rqcp(mb) != 0 {
            completed[mb as usize] = Some(decode_tsr(tsr, mb));
            clear |= tsr::rqcp(mb);
        }
    }

    if clear != 0 {
        regs.write(Reg::Tsr, clear);
    }
    completed
}
