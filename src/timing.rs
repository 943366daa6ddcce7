//! Nominal bit timing.

use crate::pac::btr;

/// Supplies the input clock frequency of the CAN peripheral.
pub trait Clock {
    /// Returns the peripheral (APB) clock frequency in Hz.
    fn peripheral_frequency(&self) -> u32;
}

/// A fixed, known clock frequency in Hz.
impl Clock for u32 {
    #[inline]
    fn peripheral_frequency(&self) -> u32 {
        *self
    }
}

/// Bit timing parameters, in time quanta.
///
/// A bit consists of one synchronization quantum followed by `seg1` and `seg2` quanta; the sample
/// point sits between the two segments. The resulting bit rate is
/// `clock / (prescaler * (1 + seg1 + seg2))`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "unstable-defmt", derive(defmt::Format))]
pub struct BitTiming {
    /// Clock prescaler, `1..=1024`.
    pub prescaler: u16,
    /// Time segment 1 (propagation + phase segment 1), `1..=16`.
    pub seg1: u8,
    /// Time segment 2 (phase segment 2), `1..=8`.
    pub seg2: u8,
    /// Resynchronization jump width, `1..=4`.
    pub sjw: u8,
}

impl BitTiming {
    const MAX_PRESCALER: u32 = 1024;
    const MAX_QUANTA: u32 = 20;
    const MIN_QUANTA: u32 = 8;

    /// Computes a timing that yields exactly `bit_rate` from `clock`.
    ///
    /// Bit lengths from 20 down to 8 time quanta are tried and the first one that divides the clock
    /// evenly is used. Phase segment 2 takes an eighth of the bit (rounded up), placing the sample
    /// point between 75% and 87.5%. Returns `None` if no exact divider exists.
    pub fn new(clock: u32, bit_rate: u32) -> Option<Self> {
        if bit_rate == 0 {
            return None;
        }

        for quanta in (Self::MIN_QUANTA..=Self::MAX_QUANTA).rev() {
            let quantum_rate = match bit_rate.checked_mul(quanta) {
                Some(rate) => rate,
                None => continue,
            };
            if clock % quantum_rate != 0 {
                continue;
            }

            let prescaler = clock / quantum_rate;
            if prescaler == 0 || prescaler > Self::MAX_PRESCALER {
                continue;
            }

            let seg2 = (quanta + 7) / 8;
            let seg1 = quanta - 1 - seg2;

            return Some(Self {
                prescaler: prescaler as u16,
                seg1: seg1 as u8,
                seg2: seg2 as u8,
                sjw: 1,
            });
        }

        None
    }

    /// Decodes the timing fields of a raw `BTR` register value.
    ///
    /// Mode bits are ignored. Useful with timings computed by external tools.
    pub fn from_btr(btr: u32) -> Self {
        Self {
            prescaler: (btr & btr::BRP_MASK) as u16 + 1,
            seg1: ((btr & btr::TS1_MASK) >> btr::TS1_SHIFT) as u8 + 1,
            seg2: ((btr & btr::TS2_MASK) >> btr::TS2_SHIFT) as u8 + 1,
            sjw: ((btr & btr::SJW_MASK) >> btr::SJW_SHIFT) as u8 + 1,
        }
    }

    /// Encodes the timing fields of the `BTR` register. Mode bits are left clear.
    ///
    /// Out-of-range values are truncated to the width of their field.
    pub fn to_btr(&self) -> u32 {
        let brp = u32::from(self.prescaler).saturating_sub(1) & btr::BRP_MASK;
        let ts1 = (u32::from(self.seg1).saturating_sub(1) << btr::TS1_SHIFT) & btr::TS1_MASK;
        let ts2 = (u32::from(self.seg2).saturating_sub(1) << btr::TS2_SHIFT) & btr::TS2_MASK;
        let sjw = (u32::from(self.sjw).saturating_sub(1) << btr::SJW_SHIFT) & btr::SJW_MASK;
        brp | ts1 | ts2 | sjw
    }

    /// Number of time quanta per bit.
    pub fn quanta(&self) -> u32 {
        1 + u32::from(self.seg1) + u32::from(self.seg2)
    }

    /// The bit rate this timing produces from `clock`.
    ///
    /// Returns `None` for a zero prescaler.
    pub fn bit_rate(&self, clock: u32) -> Option<u32> {
        u32::from(self.prescaler)
            .checked_mul(self.quanta())
            .and_then(|divisor| clock.checked_div(divisor))
    }

    /// Sample point in permille of the bit time.
    pub fn sample_point(&self) -> u32 {
        (1 + u32::from(self.seg1)) * 1000 / self.quanta()
    }
}
