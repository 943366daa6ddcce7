//! Register block and register access.
//!
//! All driver logic talks to the peripheral through the [`Registers`] trait. [`Mmio`] implements it
//! for the memory-mapped register block of a real [`Instance`], the test suite implements it for an
//! in-memory register file.

use core::marker::PhantomData;

use vcell::VolatileCell;

use crate::{Fifo, Instance, Mailbox};

/// Register block of a bxCAN peripheral.
#[repr(C)]
pub struct RegisterBlock {
    pub mcr: VolatileCell<u32>,
    pub msr: VolatileCell<u32>,
    pub tsr: VolatileCell<u32>,
    pub rfr: [VolatileCell<u32>; 2],
    pub ier: VolatileCell<u32>,
    pub esr: VolatileCell<u32>,
    pub btr: VolatileCell<u32>,
    _reserved0: [u32; 88],
    pub tx: [TxMailboxRegisters; 3],
    pub rx: [RxFifoRegisters; 2],
    _reserved1: [u32; 12],
    pub fmr: VolatileCell<u32>,
    pub fm1r: VolatileCell<u32>,
    _reserved2: u32,
    pub fs1r: VolatileCell<u32>,
    _reserved3: u32,
    pub ffa1r: VolatileCell<u32>,
    _reserved4: u32,
    pub fa1r: VolatileCell<u32>,
    _reserved5: [u32; 8],
    pub fb: [FilterBankRegisters; 28],
}

/// Registers of one transmit mailbox.
#[repr(C)]
pub struct TxMailboxRegisters {
    pub tir: VolatileCell<u32>,
    pub tdtr: VolatileCell<u32>,
    pub tdlr: VolatileCell<u32>,
    pub tdhr: VolatileCell<u32>,
}

/// Output registers of one receive FIFO.
#[repr(C)]
pub struct RxFifoRegisters {
    pub rir: VolatileCell<u32>,
    pub rdtr: VolatileCell<u32>,
    pub rdlr: VolatileCell<u32>,
    pub rdhr: VolatileCell<u32>,
}

/// The two filter registers of a filter bank.
#[repr(C)]
pub struct FilterBankRegisters {
    pub fr1: VolatileCell<u32>,
    pub fr2: VolatileCell<u32>,
}

/// Names a single 32-bit register of the peripheral.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum Reg {
    /// Master control register.
    Mcr,
    /// Master status register.
    Msr,
    /// Transmit status register.
    Tsr,
    /// Receive FIFO register.
    Rfr(Fifo),
    /// Interrupt enable register.
    Ier,
    /// Error status register.
    Esr,
    /// Bit timing register.
    Btr,
    /// Mailbox identifier register.
    Tir(Mailbox),
    /// Mailbox data length control and time stamp register.
    Tdtr(Mailbox),
    /// Mailbox data low register (bytes 0-3).
    Tdlr(Mailbox),
    /// Mailbox data high register (bytes 4-7).
    Tdhr(Mailbox),
    /// Receive FIFO mailbox identifier register.
    Rir(Fifo),
    /// Receive FIFO mailbox data length control and time stamp register.
    Rdtr(Fifo),
    /// Receive FIFO mailbox data low register (bytes 0-3).
    Rdlr(Fifo),
    /// Receive FIFO mailbox data high register (bytes 4-7).
    Rdhr(Fifo),
    /// Filter master register.
    Fmr,
    /// Filter mode register.
    Fm1r,
    /// Filter scale register.
    Fs1r,
    /// Filter FIFO assignment register.
    Ffa1r,
    /// Filter activation register.
    Fa1r,
    /// First register of a filter bank.
    Fr1(u8),
    /// Second register of a filter bank.
    Fr2(u8),
}

pub(crate) mod mcr {
    pub const INRQ: u32 = 1 << 0;
    pub const SLEEP: u32 = 1 << 1;
    pub const TXFP: u32 = 1 << 2;
    pub const RFLM: u32 = 1 << 3;
    pub const NART: u32 = 1 << 4;
    pub const AWUM: u32 = 1 << 5;
    pub const ABOM: u32 = 1 << 6;
    pub const TTCM: u32 = 1 << 7;
}

pub(crate) mod msr {
    pub const INAK: u32 = 1 << 0;
}

pub(crate) mod tsr {
    use crate::Mailbox;

    const RQCP: u32 = 1 << 0;
    const TXOK: u32 = 1 << 1;
    const ALST: u32 = 1 << 2;
    const ABRQ: u32 = 1 << 7;
    const TME: u32 = 1 << 26;

    const fn shift(mailbox: Mailbox) -> u32 {
        8 * mailbox as u32
    }

    pub const fn rqcp(mailbox: Mailbox) -> u32 {
        RQCP << shift(mailbox)
    }

    pub const fn txok(mailbox: Mailbox) -> u32 {
        TXOK << shift(mailbox)
    }

    pub const fn alst(mailbox: Mailbox) -> u32 {
        ALST << shift(mailbox)
    }

    pub const fn abrq(mailbox: Mailbox) -> u32 {
        ABRQ << shift(mailbox)
    }

    pub const fn tme(mailbox: Mailbox) -> u32 {
        TME << mailbox as u32
    }

    pub const TME_ALL: u32 = 0b111 << 26;
}

pub(crate) mod rfr {
    pub const FMP_MASK: u32 = 0b11;
    pub const FOVR: u32 = 1 << 4;
    pub const RFOM: u32 = 1 << 5;
}

pub(crate) mod esr {
    pub const EWGF: u32 = 1 << 0;
    pub const EPVF: u32 = 1 << 1;
    pub const BOFF: u32 = 1 << 2;
    pub const LEC_SHIFT: u32 = 4;
    pub const LEC_MASK: u32 = 0b111 << LEC_SHIFT;
    pub const TEC_SHIFT: u32 = 16;
    pub const REC_SHIFT: u32 = 24;
}

pub(crate) mod btr {
    pub const BRP_MASK: u32 = 0x3FF;
    pub const TS1_SHIFT: u32 = 16;
    pub const TS1_MASK: u32 = 0xF << TS1_SHIFT;
    pub const TS2_SHIFT: u32 = 20;
    pub const TS2_MASK: u32 = 0x7 << TS2_SHIFT;
    pub const SJW_SHIFT: u32 = 24;
    pub const SJW_MASK: u32 = 0x3 << SJW_SHIFT;
    pub const LBKM: u32 = 1 << 30;
    pub const SILM: u32 = 1 << 31;
    pub const TIMING_MASK: u32 = BRP_MASK | TS1_MASK | TS2_MASK | SJW_MASK;
}

pub(crate) mod tir {
    pub const TXRQ: u32 = 1 << 0;
}

pub(crate) mod fmr {
    pub const FINIT: u32 = 1 << 0;
}

/// Access to the registers of a bxCAN peripheral.
///
/// Implementations must perform each `read` and `write` as exactly one access of the named
/// register: several registers have read-to-observe and write-1-to-clear side effects.
pub trait Registers {
    /// Number of filter banks available to this peripheral.
    const NUM_FILTER_BANKS: u8;

    /// Reads the current value of `reg`.
    fn read(&self, reg: Reg) -> u32;

    /// Writes `value` to `reg`.
    fn write(&self, reg: Reg, value: u32);

    /// Read-modify-write of `reg`.
    ///
    /// Must not be used on registers with write-1-to-clear bits.
    #[inline]
    fn modify<F>(&self, reg: Reg, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let bits = self.read(reg);
        self.write(reg, f(bits));
    }

    /// Sets all bits of `mask` in `reg`, leaving the others unchanged.
    #[inline]
    fn set_bits(&self, reg: Reg, mask: u32) {
        self.modify(reg, |bits| bits | mask);
    }

    /// Clears all bits of `mask` in `reg`, leaving the others unchanged.
    #[inline]
    fn clear_bits(&self, reg: Reg, mask: u32) {
        self.modify(reg, |bits| bits & !mask);
    }

    /// Returns `true` if any bit of `mask` is set in `reg`.
    #[inline]
    fn is_set(&self, reg: Reg, mask: u32) -> bool {
        self.read(reg) & mask != 0
    }
}

impl<R: Registers> Registers for &R {
    const NUM_FILTER_BANKS: u8 = R::NUM_FILTER_BANKS;

    #[inline]
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    #[inline]
    fn write(&self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

/// Memory-mapped registers of the peripheral instance `I`.
pub struct Mmio<I> {
    _can: PhantomData<I>,
}

impl<I> Mmio<I>
where
    I: Instance,
{
    /// Takes ownership of the peripheral instance and provides access to its registers.
    pub fn new(instance: I) -> Self {
        let _ = instance;
        Self { _can: PhantomData }
    }

    fn block(&self) -> &RegisterBlock {
        unsafe { &*I::REGISTERS }
    }

    fn cell(&self, reg: Reg) -> &VolatileCell<u32> {
        let can = self.block();
        match reg {
            Reg::Mcr => &can.mcr,
            Reg::Msr => &can.msr,
            Reg::Tsr => &can.tsr,
            Reg::Rfr(fifo) => &can.rfr[fifo as usize],
            Reg::Ier => &can.ier,
            Reg::Esr => &can.esr,
            Reg::Btr => &can.btr,
            Reg::Tir(mb) => &can.tx[mb as usize].tir,
            Reg::Tdtr(mb) => &can.tx[mb as usize].tdtr,
            Reg::Tdlr(mb) => &can.tx[mb as usize].tdlr,
            Reg::Tdhr(mb) => &can.tx[mb as usize].tdhr,
            Reg::Rir(fifo) => &can.rx[fifo as usize].rir,
            Reg::Rdtr(fifo) => &can.rx[fifo as usize].rdtr,
            Reg::Rdlr(fifo) => &can.rx[fifo as usize].rdlr,
            Reg::Rdhr(fifo) => &can.rx[fifo as usize].rdhr,
            Reg::Fmr => &can.fmr,
            Reg::Fm1r => &can.fm1r,
            Reg::Fs1r => &can.fs1r,
            Reg::Ffa1r => &can.ffa1r,
            Reg::Fa1r => &can.fa1r,
            Reg::Fr1(bank) => &can.fb[usize::from(bank)].fr1,
            Reg::Fr2(bank) => &can.fb[usize::from(bank)].fr2,
        }
    }
}

// Every handle refers to the same register block; see `Can::new`.
impl<I> Clone for Mmio<I> {
    fn clone(&self) -> Self {
        Self { _can: PhantomData }
    }
}

impl<I> Registers for Mmio<I>
where
    I: Instance + crate::FilterOwner,
{
    const NUM_FILTER_BANKS: u8 = I::NUM_FILTER_BANKS;

    #[inline]
    fn read(&self, reg: Reg) -> u32 {
        self.cell(reg).get()
    }

    #[inline]
    fn write(&self, reg: Reg, value: u32) {
        self.cell(reg).set(value)
    }
}
