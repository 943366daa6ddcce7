//! `embedded_can` trait impls.

use crate::{
    Can, Clock, Data, ExtendedId, Frame, Id, InterruptController, LastError, Registers,
    StandardId, TxError,
};

use core::convert::TryFrom;

use embedded_can as can;

impl<'q, R, C, K, const N: usize> can::nb::Can for Can<'q, R, C, K, N>
where
    R: Registers,
    C: InterruptController,
    K: Clock,
{
    type Frame = Frame;

    type Error = TxError;

    /// Never replaces a pending frame: all mailboxes being busy is reported as `WouldBlock`.
    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        match self.transmit(frame) {
            Ok(_mailbox) => Ok(None),
            Err(TxError::NoMailboxAvailable) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        match self.receive() {
            Ok(frame) => Ok(frame),
            Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(e)) => match e {},
        }
    }
}

impl can::Error for TxError {
    fn kind(&self) -> can::ErrorKind {
        can::ErrorKind::Other
    }
}

impl can::Error for LastError {
    fn kind(&self) -> can::ErrorKind {
        match self {
            LastError::Stuff => can::ErrorKind::Stuff,
            LastError::Form => can::ErrorKind::Form,
            LastError::Acknowledgement => can::ErrorKind::Acknowledge,
            LastError::BitRecessive | LastError::BitDominant => can::ErrorKind::Bit,
            LastError::Crc => can::ErrorKind::Crc,
            LastError::Software => can::ErrorKind::Other,
        }
    }
}

impl From<can::Id> for Id {
    fn from(id: can::Id) -> Self {
        // Both sides enforce the same ranges.
        match id {
            can::Id::Standard(id) => unsafe { StandardId::new_unchecked(id.as_raw()) }.into(),
            can::Id::Extended(id) => unsafe { ExtendedId::new_unchecked(id.as_raw()) }.into(),
        }
    }
}

impl From<Id> for can::Id {
    fn from(id: Id) -> Self {
        match id {
            Id::Standard(id) => unsafe { can::StandardId::new_unchecked(id.as_raw()) }.into(),
            Id::Extended(id) => unsafe { can::ExtendedId::new_unchecked(id.as_raw()) }.into(),
        }
    }
}

impl can::Frame for Frame {
    fn new(id: impl Into<can::Id>, data: &[u8]) -> Option<Self> {
        let id: can::Id = id.into();
        Data::new(data).map(|data| Frame::new_data(Id::from(id), data))
    }

    fn new_remote(id: impl Into<can::Id>, dlc: usize) -> Option<Self> {
        let id: can::Id = id.into();
        Frame::new_remote(Id::from(id), u8::try_from(dlc).ok()?)
    }

    #[inline]
    fn is_extended(&self) -> bool {
        self.is_extended()
    }

    #[inline]
    fn is_remote_frame(&self) -> bool {
        self.is_remote_frame()
    }

    #[inline]
    fn id(&self) -> can::Id {
        self.id().into()
    }

    #[inline]
    fn dlc(&self) -> usize {
        self.dlc().into()
    }

    fn data(&self) -> &[u8] {
        self.data().map_or(&[][..], |data| &data[..])
    }
}
