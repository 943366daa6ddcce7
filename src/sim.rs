//! In-memory model of the peripheral, for host tests.
//!
//! Models the parts of the register file the driver relies on: the initialization handshake, the
//! write-1-to-clear status bits, transmit mailboxes and the three-slot receive FIFOs. Filter
//! registers are plain storage that refuse configuration writes outside filter init mode.

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use crate::interrupt::{InterruptController, IrqLine};
use crate::pac::{btr, fmr, mcr, msr, rfr, tir, tsr, Reg, Registers};
use crate::{Fifo, Mailbox};

const SLAK: u32 = 1 << 1;
const FIFO_DEPTH: usize = 3;

/// How the peripheral answers initialization requests.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Handshake {
    /// `INAK` follows `INRQ` at once.
    Immediate,
    /// `INAK` is never set.
    NeverAck,
    /// `INAK` is set, but never cleared again.
    NeverRelease,
}

/// Outcome of a simulated transmission.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Outcome {
    Success,
    ArbitrationLost,
    Error,
}

struct Inner {
    mcr: u32,
    msr: u32,
    tsr: u32,
    ier: u32,
    esr: u32,
    btr: u32,
    mailboxes: [[u32; 4]; 3],
    fifos: [VecDeque<[u32; 4]>; 2],
    overrun: [bool; 2],
    fmr: u32,
    fm1r: u32,
    fs1r: u32,
    ffa1r: u32,
    fa1r: u32,
    banks: [[u32; 2]; 28],
}

pub(crate) struct SimRegisters {
    inner: RefCell<Inner>,
    handshake: Cell<Handshake>,
    auto_complete: Cell<bool>,
    mcr_writes: Cell<u32>,
    msr_reads: Cell<u32>,
    log: RefCell<Vec<(Reg, u32)>>,
}

impl SimRegisters {
    /// A peripheral in its reset state.
    pub(crate) fn new() -> Self {
        Self::with_handshake(Handshake::Immediate)
    }

    pub(crate) fn with_handshake(handshake: Handshake) -> Self {
        Self {
            inner: RefCell::new(Inner {
                mcr: 0x0001_0002,
                msr: 0x0000_0C02,
                tsr: tsr::TME_ALL,
                ier: 0,
                esr: 0,
                btr: 0x0123_0000,
                mailboxes: [[0; 4]; 3],
                fifos: [VecDeque::new(), VecDeque::new()],
                overrun: [false; 2],
                fmr: 0x2A1C_0E01,
                fm1r: 0,
                fs1r: 0,
                ffa1r: 0,
                fa1r: 0,
                banks: [[0; 2]; 28],
            }),
            handshake: Cell::new(handshake),
            auto_complete: Cell::new(false),
            mcr_writes: Cell::new(0),
            msr_reads: Cell::new(0),
            log: RefCell::new(Vec::new()),
        }
    }

    /// Changes how later initialization requests are answered.
    pub(crate) fn set_handshake(&self, handshake: Handshake) {
        self.handshake.set(handshake);
    }

    /// Completes every transmit request as soon as it is made.
    pub(crate) fn auto_complete(&self, enabled: bool) {
        self.auto_complete.set(enabled);
    }

    pub(crate) fn mcr_writes(&self) -> u32 {
        self.mcr_writes.get()
    }

    pub(crate) fn msr_reads(&self) -> u32 {
        self.msr_reads.get()
    }

    /// Returns and forgets all writes seen so far.
    pub(crate) fn take_writes(&self) -> Vec<(Reg, u32)> {
        self.log.replace(Vec::new())
    }

    pub(crate) fn set_esr(&self, esr: u32) {
        self.inner.borrow_mut().esr = esr;
    }

    /// Overwrites `TSR` with a raw value, bypassing the write-1-to-clear logic.
    pub(crate) fn force_tsr(&self, tsr: u32) {
        self.inner.borrow_mut().tsr = tsr;
    }

    /// Finishes the pending request of `mailbox` with `outcome`.
    ///
    /// A successful transmission in loopback mode is also received into FIFO 0.
    pub(crate) fn complete(&self, mailbox: Mailbox, outcome: Outcome) {
        let mut inner = self.inner.borrow_mut();
        inner.complete(mailbox, outcome);
    }

    /// Delivers a frame to `fifo`, as matched by filter `fmi`.
    ///
    /// If the FIFO is full the frame is dropped and the overrun flag set.
    pub(crate) fn receive(&self, fifo: Fifo, id: u32, dlc: u32, data: [u32; 2], fmi: u8) {
        self.inner
            .borrow_mut()
            .receive(fifo, [id & !tir::TXRQ, dlc | u32::from(fmi) << 8, data[0], data[1]]);
    }

    pub(crate) fn pending(&self, fifo: Fifo) -> usize {
        self.inner.borrow().fifos[fifo as usize].len()
    }
}

impl Inner {
    fn complete(&mut self, mailbox: Mailbox, outcome: Outcome) {
        let image = self.mailboxes[mailbox as usize];
        self.mailboxes[mailbox as usize][0] &= !tir::TXRQ;

        self.tsr |= tsr::rqcp(mailbox) | tsr::tme(mailbox);
        match outcome {
            Outcome::Success => self.tsr |= tsr::txok(mailbox),
            Outcome::ArbitrationLost => self.tsr |= tsr::alst(mailbox),
            Outcome::Error => self.tsr |= 1 << (3 + 8 * mailbox as u32),
        }

        if outcome == Outcome::Success && self.btr & btr::LBKM != 0 {
            let [id, dlc_time, low, high] = image;
            self.receive(Fifo::Fifo0, [id & !tir::TXRQ, dlc_time & 0xF, low, high]);
        }
    }

    fn receive(&mut self, fifo: Fifo, slot: [u32; 4]) {
        let fifo = fifo as usize;
        if self.fifos[fifo].len() == FIFO_DEPTH {
            self.overrun[fifo] = true;
        } else {
            self.fifos[fifo].push_back(slot);
        }
    }

    fn read_slot(&self, fifo: Fifo, word: usize) -> u32 {
        self.fifos[fifo as usize]
            .front()
            .map_or(0, |slot| slot[word])
    }

    fn write_tsr(&mut self, value: u32) {
        for &mb in Mailbox::ALL.iter() {
            if value & tsr::rqcp(mb) != 0 {
                // RQCP, TXOK, ALST and TERR
                self.tsr &= !(0xF << (8 * mb as u32));
            }
            if value & tsr::abrq(mb) != 0 && self.tsr & tsr::tme(mb) == 0 {
                self.mailboxes[mb as usize][0] &= !tir::TXRQ;
                self.tsr |= tsr::rqcp(mb) | tsr::tme(mb);
                self.tsr &= !tsr::txok(mb);
            }
        }
    }

    fn filter_config_write(&mut self, reg: Reg, value: u32) {
        assert!(
            self.fmr & fmr::FINIT != 0,
            "{:?} written outside filter init mode",
            reg
        );
        match reg {
            Reg::Fm1r => self.fm1r = value,
            Reg::Fs1r => self.fs1r = value,
            Reg::Ffa1r => self.ffa1r = value,
            Reg::Fr1(bank) => self.banks[usize::from(bank)][0] = value,
            Reg::Fr2(bank) => self.banks[usize::from(bank)][1] = value,
            _ => unreachable!(),
        }
    }
}

impl Registers for SimRegisters {
    const NUM_FILTER_BANKS: u8 = 28;

    fn read(&self, reg: Reg) -> u32 {
        let inner = self.inner.borrow();
        match reg {
            Reg::Mcr => inner.mcr,
            Reg::Msr => {
                self.msr_reads.set(self.msr_reads.get() + 1);
                inner.msr
            }
            Reg::Tsr => inner.tsr,
            Reg::Rfr(fifo) => {
                let mut bits = inner.fifos[fifo as usize].len() as u32;
                if inner.overrun[fifo as usize] {
                    bits |= rfr::FOVR;
                }
                bits
            }
            Reg::Ier => inner.ier,
            Reg::Esr => inner.esr,
            Reg::Btr => inner.btr,
            Reg::Tir(mb) => inner.mailboxes[mb as usize][0],
            Reg::Tdtr(mb) => inner.mailboxes[mb as usize][1],
            Reg::Tdlr(mb) => inner.mailboxes[mb as usize][2],
            Reg::Tdhr(mb) => inner.mailboxes[mb as usize][3],
            Reg::Rir(fifo) => inner.read_slot(fifo, 0),
            Reg::Rdtr(fifo) => inner.read_slot(fifo, 1),
            Reg::Rdlr(fifo) => inner.read_slot(fifo, 2),
            Reg::Rdhr(fifo) => inner.read_slot(fifo, 3),
            Reg::Fmr => inner.fmr,
            Reg::Fm1r => inner.fm1r,
            Reg::Fs1r => inner.fs1r,
            Reg::Ffa1r => inner.ffa1r,
            Reg::Fa1r => inner.fa1r,
            Reg::Fr1(bank) => inner.banks[usize::from(bank)][0],
            Reg::Fr2(bank) => inner.banks[usize::from(bank)][1],
        }
    }

    fn write(&self, reg: Reg, value: u32) {
        self.log.borrow_mut().push((reg, value));
        let mut inner = self.inner.borrow_mut();
        match reg {
            Reg::Mcr => {
                self.mcr_writes.set(self.mcr_writes.get() + 1);
                inner.mcr = value;

                let requested = value & mcr::INRQ != 0;
                let acked = match (self.handshake.get(), requested) {
                    (Handshake::NeverAck, _) => false,
                    (Handshake::NeverRelease, false) => inner.msr & msr::INAK != 0,
                    (_, requested) => requested,
                };
                if acked {
                    inner.msr |= msr::INAK;
                } else {
                    inner.msr &= !msr::INAK;
                }

                if value & mcr::SLEEP != 0 {
                    inner.msr |= SLAK;
                } else {
                    inner.msr &= !SLAK;
                }
            }
            Reg::Msr | Reg::Esr => {}
            Reg::Tsr => inner.write_tsr(value),
            Reg::Rfr(fifo) => {
                let index = fifo as usize;
                if value & rfr::FOVR != 0 {
                    inner.overrun[index] = false;
                }
                if value & rfr::RFOM != 0 {
                    inner.fifos[index].pop_front();
                }
            }
            Reg::Ier => inner.ier = value,
            Reg::Btr => {
                // Only writable in initialization mode.
                if inner.msr & msr::INAK != 0 {
                    inner.btr = value;
                }
            }
            Reg::Tir(mb) => {
                inner.mailboxes[mb as usize][0] = value;
                if value & tir::TXRQ != 0 && inner.tsr & tsr::tme(mb) != 0 {
                    inner.tsr &= !tsr::tme(mb);
                    if self.auto_complete.get() {
                        inner.complete(mb, Outcome::Success);
                    }
                }
            }
            Reg::Tdtr(mb) => inner.mailboxes[mb as usize][1] = value,
            Reg::Tdlr(mb) => inner.mailboxes[mb as usize][2] = value,
            Reg::Tdhr(mb) => inner.mailboxes[mb as usize][3] = value,
            Reg::Rir(_) | Reg::Rdtr(_) | Reg::Rdlr(_) | Reg::Rdhr(_) => {}
            Reg::Fmr => inner.fmr = value,
            Reg::Fa1r => inner.fa1r = value,
            Reg::Fm1r | Reg::Fs1r | Reg::Ffa1r | Reg::Fr1(_) | Reg::Fr2(_) => {
                inner.filter_config_write(reg, value)
            }
        }
    }
}

/// Interrupt controller that records which lines are unmasked.
#[derive(Default)]
pub(crate) struct SimNvic {
    enabled: Cell<[bool; 3]>,
    disables: Cell<u32>,
}

impl SimNvic {
    pub(crate) fn is_enabled(&self, line: IrqLine) -> bool {
        self.enabled.get()[line as usize]
    }

    /// Number of `disable` calls so far.
    pub(crate) fn disables(&self) -> u32 {
        self.disables.get()
    }
}

impl InterruptController for SimNvic {
    fn enable(&self, line: IrqLine) {
        let mut enabled = self.enabled.get();
        enabled[line as usize] = true;
        self.enabled.set(enabled);
    }

    fn disable(&self, line: IrqLine) {
        let mut enabled = self.enabled.get();
        enabled[line as usize] = false;
        self.enabled.set(enabled);
        self.disables.set(self.disables.get() + 1);
    }
}
