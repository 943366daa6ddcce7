//! CAN frames and their register representation.


use core::convert::TryFrom;
use core::ops::{Deref, DerefMut};

use crate::{ExtendedId, Id, StandardId};

/// The identifier word of a mailbox or FIFO slot (`TIxR` / `RIxR`).
///
/// Standard identifiers occupy bits 21..=31, extended identifiers bits 3..=31. Bit 2 marks an
/// extended identifier, bit 1 a remote frame. Bit 0 is the transmit request and is never part of
/// an `IdReg`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct IdReg(u32);

impl IdReg {
    pub(crate) const STANDARD_SHIFT: u32 = 21;

    pub(crate) const EXTENDED_SHIFT: u32 = 3;

    pub(crate) const IDE_MASK: u32 = 0x0000_0004;

    pub(crate) const RTR_MASK: u32 = 0x0000_0002;

    fn new_standard(id: StandardId) -> Self {
        Self(u32::from(id.as_raw()) << Self::STANDARD_SHIFT)
    }

    fn new_extended(id: ExtendedId) -> IdReg {
        Self(id.as_raw() << Self::EXTENDED_SHIFT | Self::IDE_MASK)
    }

    fn from_register(reg: u32) -> IdReg {
        Self(reg & 0xFFFF_FFFE)
    }

    /// Sets the remote transmission (RTR) flag. This marks the identifier as
    /// being part of a remote frame.
    #[must_use = "returns a new IdReg without modifying `self`"]
    fn with_rtr(self, rtr: bool) -> IdReg {
        if rtr {
            Self(self.0 | Self::RTR_MASK)
        } else {
            Self(self.0 & !Self::RTR_MASK)
        }
    }

    /// Returns the identifier.
    fn to_id(self) -> Id {
        if self.is_extended() {
            Id::Extended(unsafe { ExtendedId::new_unchecked(self.0 >> Self::EXTENDED_SHIFT) })
        } else {
            Id::Standard(unsafe {
                StandardId::new_unchecked((self.0 >> Self::STANDARD_SHIFT) as u16)
            })
        }
    }

    /// Returns `true` if the identifier is an extended identifier.
    fn is_extended(self) -> bool {
        self.0 & Self::IDE_MASK != 0
    }

    /// Returns `true` if the identifer is part of a remote frame (RTR bit set).
    fn rtr(self) -> bool {
        self.0 & Self::RTR_MASK != 0
    }
}

/// Payload of a CAN data frame.
///
/// Contains 0 to 8 Bytes of data.
#[derive(Debug, Copy, Clone)]
pub struct Data {
    pub(crate) len: u8,
    pub(crate) bytes: [u8; 8],
}

impl Data {
    /// Creates a data payload from a raw byte slice.
    ///
    /// Returns `None` if `data` contains more than 8 Bytes (which is the maximum).
    pub fn new(data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }

        let mut bytes = [0; 8];
        bytes[..data.len()].copy_from_slice(data);

        Some(Self {
            len: data.len() as u8,
            bytes,
        })
    }

    /// Creates an empty data payload containing 0 bytes.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            len: 0,
            bytes: [0; 8],
        }
    }
}

impl Deref for Data {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }
}

impl DerefMut for Data {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..usize::from(self.len)]
    }
}

impl AsRef<[u8]> for Data {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.deref()
    }
}

impl AsMut<[u8]> for Data {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.deref_mut()
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for Data {}

impl<'a> TryFrom<&'a [u8]> for Data {
    type Error = ();

    fn try_from(data: &'a [u8]) -> Result<Self, ()> {
        Data::new(data).ok_or(())
    }
}

macro_rules! data_from_array {
    ( $($len:literal),+ ) => {
        $(
            impl From<[u8; $len]> for Data {
                #[inline]
                fn from(arr: [u8; $len]) -> Self {
                    let mut bytes = [0; 8];
                    bytes[..$len].copy_from_slice(&arr);
                    Self {
                        len: $len,
                        bytes,
                    }
                }
            }
        )+
    };
}

data_from_array!(0, 1, 2, 3, 4, 5, 6, 7, 8);

#[cfg(feature = "unstable-defmt")]
impl defmt::Format for Data {
    fn format(&self, fmt: defmt::Formatter<'_>) {
        self.as_ref().format(fmt)
    }
}

/// A CAN data or remote frame.
///
/// Frames received from a FIFO also carry the index of the filter that accepted them. That index is
/// reception metadata and does not take part in comparisons.
#[derive(Clone, Debug)]
pub struct Frame {
    pub(crate) id: IdReg,
    pub(crate) data: Data,
    pub(crate) filter_match_index: Option<u8>,
}

impl Frame {
    /// Creates a new data frame.
    pub fn new_data(id: impl Into<Id>, data: impl Into<Data>) -> Self {
        let id = match id.into() {
            Id::Standard(id) => IdReg::new_standard(id),
            Id::Extended(id) => IdReg::new_extended(id),
        };

        Self {
            id,
            data: data.into(),
            filter_match_index: None,
        }
    }

    /// Creates a new remote frame requesting `dlc` bytes.
    ///
    /// Returns `None` if `dlc` is larger than 8.
    pub fn new_remote(id: impl Into<Id>, dlc: u8) -> Option<Self> {
        if dlc > 8 {
            return None;
        }

        let mut frame = Self::new_data(id, []);
        // Just extend the data length, even with no data present. The API does not hand out this
        // `Data` object.
        frame.data.len = dlc;
        frame.id = frame.id.with_rtr(true);
        Some(frame)
    }

    /// Returns true if this frame is an extended frame.
    #[inline]
    pub fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    /// Returns true if this frame is a standard frame.
    #[inline]
    pub fn is_standard(&self) -> bool {
        !self.id.is_extended()
    }

    /// Returns true if this frame is a remote frame.
    #[inline]
    pub fn is_remote_frame(&self) -> bool {
        self.id.rtr()
    }

    /// Returns true if this frame is a data frame.
    #[inline]
    pub fn is_data_frame(&self) -> bool {
        !self.is_remote_frame()
    }

    /// Returns the frame identifier.
    #[inline]
    pub fn id(&self) -> Id {
        self.id.to_id()
    }

    /// Returns the data length code (DLC) which is in the range 0..8.
    ///
    /// For data frames the DLC value always matches the length of the data.
    /// Remote frames do not carry any data, yet the DLC can be greater than 0.
    #[inline]
    pub fn dlc(&self) -> u8 {
        self.data.len
    }

    /// Returns the frame data (0..8 bytes in length) if this is a data frame.
    ///
    /// If this is a remote frame, returns `None`.
    pub fn data(&self) -> Option<&Data> {
        if self.is_data_frame() {
            Some(&self.data)
        } else {
            None
        }
    }

    /// Returns the index of the acceptance filter that matched this frame.
    ///
    /// Only frames taken from the receive queue carry a filter match index.
    #[inline]
    pub fn filter_match_index(&self) -> Option<u8> {
        self.filter_match_index
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        match (self.data(), other.data()) {
            (None, None) => self.id.eq(&other.id) && self.dlc() == other.dlc(),
            (Some(a), Some(b)) => self.id.eq(&other.id) && a.eq(b),
            (None, Some(_)) | (Some(_), None) => false,
        }
    }
}

impl Eq for Frame {}

#[cfg(feature = "unstable-defmt")]
impl defmt::Format for Frame {
    fn format(&self, fmt: defmt::Formatter<'_>) {
        defmt::write!(fmt, "Frame {{ id: {}, dlc: {}", self.id(), self.dlc());
        if let Some(data) = self.data() {
            defmt::write!(fmt, ", data: {}", data);
        }
        defmt::write!(fmt, " }}");
    }
}

/// The four register words a frame occupies in a transmit mailbox or receive FIFO slot.
///
/// Payload bytes are packed little-endian: `data_low` holds bytes 0-3, `data_high` bytes 4-7.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct MailboxImage {
    pub(crate) id: u32,
    pub(crate) dlc_time: u32,
    pub(crate) data_low: u32,
    pub(crate) data_high: u32,
}

impl MailboxImage {
    const DLC_MASK: u32 = 0xF;
    const FMI_SHIFT: u32 = 8;
    const FMI_MASK: u32 = 0xFF << Self::FMI_SHIFT;

    /// Encodes `frame` for a transmit mailbox. The transmit request bit is left clear.
    pub(crate) fn encode(frame: &Frame) -> Self {
        let bytes = &frame.data.bytes;
        Self {
            id: frame.id.0,
            dlc_time: u32::from(frame.dlc()),
            data_low: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data_high: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Decodes the contents of a receive FIFO slot.
    ///
    /// Data length codes above 8 are clamped to 8, as the peripheral transfers at most 8 bytes.
    pub(crate) fn decode(&self) -> Frame {
        let dlc = (self.dlc_time & Self::DLC_MASK).min(8) as u8;
        let fmi = ((self.dlc_time & Self::FMI_MASK) >> Self::FMI_SHIFT) as u8;

        let mut bytes = [0; 8];
        bytes[..4].copy_from_slice(&self.data_low.to_le_bytes());
        bytes[4..].copy_from_slice(&self.data_high.to_le_bytes());

        Frame {
            id: IdReg::from_register(self.id),
            data: Data { len: dlc, bytes },
            filter_match_index: Some(fmi),
        }
    }
}
