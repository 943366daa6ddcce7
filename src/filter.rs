//! Filter bank API.
//!
//! A filter bank holds two 32-bit registers whose meaning depends on its scale and mode. The
//! builders in this module produce those register values; [`Can::filter`] writes them.
//!
//! [`Can::filter`]: crate::Can::filter

use crate::pac::{fmr, Reg, Registers};
use crate::{ExtendedId, Fifo, Id, StandardId};

/// Width of the identifiers a filter bank compares against.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum FilterScale {
    /// Two 16-bit filters (list mode: four), standard identifiers only.
    Scale16,
    /// One 32-bit filter (list mode: two), standard and extended identifiers.
    Scale32,
}

/// How the two filter registers of a bank are interpreted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum FilterMode {
    /// Identifier and mask pairs: only the bits set in the mask are compared.
    Mask,
    /// Lists of identifiers that must match exactly.
    List,
}

/// A 16-bit filter list entry.
///
/// This can match data and remote frames using standard IDs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub struct ListEntry16(u16);

/// A 32-bit filter list entry.
///
/// This can match data and remote frames using extended or standard IDs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub struct ListEntry32(u32);

/// A 16-bit identifier mask.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub struct Mask16 {
    id: u16,
    mask: u16,
}

/// A 32-bit identifier mask.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub struct Mask32 {
    id: u32,
    mask: u32,
}

impl ListEntry16 {
    /// Creates a filter list entry that accepts data frames with the given standard ID.
    ///
    /// This entry will *not* accept remote frames with the same ID.
    pub fn data_frames_with_id(id: StandardId) -> Self {
        Self(id.as_raw() << 5)
    }

    /// Creates a filter list entry that accepts remote frames with the given standard ID.
    pub fn remote_frames_with_id(id: StandardId) -> Self {
        Self(id.as_raw() << 5 | 1 << 4)
    }
}

impl ListEntry32 {
    /// Creates a filter list entry that accepts data frames with the given ID.
    ///
    /// This entry will *not* accept remote frames with the same ID.
    ///
    /// The filter will only accept *either* standard *or* extended frames, depending on `id`.
    pub fn data_frames_with_id(id: impl Into<Id>) -> Self {
        match id.into() {
            Id::Standard(id) => Self(u32::from(id.as_raw()) << 21),
            Id::Extended(id) => Self(id.as_raw() << 3 | 0b100),
        }
    }

    /// Creates a filter list entry that accepts remote frames with the given ID.
    pub fn remote_frames_with_id(id: impl Into<Id>) -> Self {
        match id.into() {
            Id::Standard(id) => Self(u32::from(id.as_raw()) << 21 | 0b010),
            Id::Extended(id) => Self(id.as_raw() << 3 | 0b110),
        }
    }
}

impl Mask16 {
    /// Creates a 16-bit identifier mask that accepts all frames.
    ///
    /// This will accept both standard and extended data and remote frames with any ID.
    pub fn accept_all() -> Self {
        Self { id: 0, mask: 0 }
    }

    /// Creates a 16-bit identifier mask that accepts all standard frames whose ID matches `id` in
    /// the bits set in `mask`.
    ///
    /// Both data and remote frames will be accepted. Any extended frames will be rejected.
    pub fn frames_with_std_id(id: StandardId, mask: StandardId) -> Self {
        Self {
            id: id.as_raw() << 5,
            mask: mask.as_raw() << 5 | 0b1000, // also require IDE = 0
        }
    }
}

impl Mask32 {
    /// Creates a 32-bit identifier mask that accepts all frames.
    ///
    /// This will accept both standard and extended data and remote frames with any ID.
    pub fn accept_all() -> Self {
        Self { id: 0, mask: 0 }
    }

    /// Creates a 32-bit identifier mask that accepts all extended frames whose ID matches `id` in
    /// the bits set in `mask`.
    ///
    /// Both data and remote frames will be accepted. Standard frames will be rejected.
    pub fn frames_with_ext_id(id: ExtendedId, mask: ExtendedId) -> Self {
        Self {
            id: id.as_raw() << 3 | 0b100,
            mask: mask.as_raw() << 3 | 0b100, // also require IDE = 1
        }
    }

    /// Creates a 32-bit identifier mask that accepts all standard frames whose ID matches `id` in
    /// the bits set in `mask`.
    ///
    /// Both data and remote frames will be accepted. Extended frames will be rejected.
    pub fn frames_with_std_id(id: StandardId, mask: StandardId) -> Self {
        Self {
            id: u32::from(id.as_raw()) << 21,
            mask: u32::from(mask.as_raw()) << 21 | 0b100, // also require IDE = 0
        }
    }
}

/// The configuration of a filter bank.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub enum BankConfig {
    List16([ListEntry16; 4]),
    List32([ListEntry32; 2]),
    Mask16([Mask16; 2]),
    Mask32(Mask32),
}

impl BankConfig {
    /// Scale this configuration requires.
    pub fn scale(&self) -> FilterScale {
        match self {
            BankConfig::List16(_) | BankConfig::Mask16(_) => FilterScale::Scale16,
            BankConfig::List32(_) | BankConfig::Mask32(_) => FilterScale::Scale32,
        }
    }

    /// Mode this configuration requires.
    pub fn mode(&self) -> FilterMode {
        match self {
            BankConfig::List16(_) | BankConfig::List32(_) => FilterMode::List,
            BankConfig::Mask16(_) | BankConfig::Mask32(_) => FilterMode::Mask,
        }
    }

    /// The values of the bank's two filter registers.
    pub fn registers(&self) -> (u32, u32) {
        match *self {
            BankConfig::List16([a, b, c, d]) => (
                (u32::from(b.0) << 16) | u32::from(a.0),
                (u32::from(d.0) << 16) | u32::from(c.0),
            ),
            BankConfig::List32([a, b]) => (a.0, b.0),
            BankConfig::Mask16([a, b]) => (
                (u32::from(a.mask) << 16) | u32::from(a.id),
                (u32::from(b.mask) << 16) | u32::from(b.id),
            ),
            BankConfig::Mask32(a) => (a.id, a.mask),
        }
    }
}

impl From<[ListEntry16; 4]> for BankConfig {
    #[inline]
    fn from(entries: [ListEntry16; 4]) -> Self {
        Self::List16(entries)
    }
}

impl From<[ListEntry32; 2]> for BankConfig {
    #[inline]
    fn from(entries: [ListEntry32; 2]) -> Self {
        Self::List32(entries)
    }
}

impl From<[Mask16; 2]> for BankConfig {
    #[inline]
    fn from(entries: [Mask16; 2]) -> Self {
        Self::Mask16(entries)
    }
}

impl From<Mask32> for BankConfig {
    #[inline]
    fn from(filter: Mask32) -> Self {
        Self::Mask32(filter)
    }
}

/// Configuration of a filter bank as read back from the peripheral.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub struct FilterBank {
    pub active: bool,
    pub fifo: Fifo,
    pub scale: FilterScale,
    pub mode: FilterMode,
    pub fr1: u32,
    pub fr2: u32,
}

/// Filter initialization mode, left when dropped.
///
/// Filter registers only take writes while `FINIT` is set. The hardware applies the request
/// immediately, so no acknowledgement is polled.
struct FilterInit<'a, R: Registers> {
    regs: &'a R,
}

impl<'a, R: Registers> FilterInit<'a, R> {
    fn enter(regs: &'a R) -> Self {
        regs.set_bits(Reg::Fmr, fmr::FINIT);
        Self { regs }
    }
}

impl<R: Registers> Drop for FilterInit<'_, R> {
    #[inline]
    fn drop(&mut self) {
        self.regs.clear_bits(Reg::Fmr, fmr::FINIT);
    }
}

/// Deactivates `bank`, rewrites its scale, mode, FIFO assignment and filter registers, and
/// activates it again. No other bank is touched.
pub(crate) fn configure<R: Registers>(
    regs: &R,
    bank: u8,
    fifo: Fifo,
    scale: FilterScale,
    mode: FilterMode,
    fr1: u32,
    fr2: u32,
) {
    debug_assert!(bank < R::NUM_FILTER_BANKS);
    let bit = 1 << bank;

    let _init = FilterInit::enter(regs);

    regs.clear_bits(Reg::Fa1r, bit);

    write_bank_bit(regs, Reg::Fs1r, bit, scale == FilterScale::Scale32);
    write_bank_bit(regs, Reg::Fm1r, bit, mode == FilterMode::List);
    write_bank_bit(regs, Reg::Ffa1r, bit, fifo == Fifo::Fifo1);

    regs.write(Reg::Fr1(bank), fr1);
    regs.write(Reg::Fr2(bank), fr2);

    regs.set_bits(Reg::Fa1r, bit);
}

/// Deactivates `bank`. Frames it would have accepted are discarded unless another bank accepts
/// them.
pub(crate) fn disable<R: Registers>(regs: &R, bank: u8) {
    debug_assert!(bank < R::NUM_FILTER_BANKS);
    let _init = FilterInit::enter(regs);
    regs.clear_bits(Reg::Fa1r, 1 << bank);
}

/// Deactivates all filter banks.
pub(crate) fn clear<R: Registers>(regs: &R) {
    let _init = FilterInit::enter(regs);
    let mask = filter_bitmask(0, R::NUM_FILTER_BANKS);
    regs.clear_bits(Reg::Fa1r, mask);
}

pub(crate) fn read<R: Registers>(regs: &R, bank: u8) -> FilterBank {
    debug_assert!(bank < R::NUM_FILTER_BANKS);
    let bit = 1 << bank;

    FilterBank {
        active: regs.is_set(Reg::Fa1r, bit),
        fifo: if regs.is_set(Reg::Ffa1r, bit) {
            Fifo::Fifo1
        } else {
            Fifo::Fifo0
        },
        scale: if regs.is_set(Reg::Fs1r, bit) {
            FilterScale::Scale32
        } else {
            FilterScale::Scale16
        },
        mode: if regs.is_set(Reg::Fm1r, bit) {
            FilterMode::List
        } else {
            FilterMode::Mask
        },
        fr1: regs.read(Reg::Fr1(bank)),
        fr2: regs.read(Reg::Fr2(bank)),
    }
}

fn write_bank_bit<R: Registers>(regs: &R, reg: Reg, bit: u32, set: bool) {
    if set {
        regs.set_bits(reg, bit);
    } else {
        regs.clear_bits(reg, bit);
    }
}

/// Computes a bitmask for per-filter-bank registers that only includes filters in the given range.
fn filter_bitmask(start_idx: u8, bank_count: u8) -> u32 {
    let count_mask = ((1u64 << bank_count) - 1) as u32; // `bank_count` 1-bits
    count_mask << start_idx
}
