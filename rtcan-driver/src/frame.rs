//! CAN frame and identifier types.

use core::ops::Deref;

/// Error returned when a raw value does not fit the target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Standard 11-bit CAN identifier, `0..=0x7FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StandardId(u16);

impl StandardId {
    /// Highest valid identifier.
    pub const MAX: Self = Self(0x7FF);

    /// Creates a standard identifier. Returns `None` when `bits` exceeds 11 bits.
    pub const fn new(bits: u16) -> Option<Self> {
        if bits <= Self::MAX.0 { Some(Self(bits)) } else { None }
    }

    /// Creates a standard identifier from the low 11 bits of `bits`.
    pub const fn from_bits_truncating(bits: u16) -> Self {
        Self(bits & Self::MAX.0)
    }

    pub const fn into_bits(self) -> u16 {
        self.0
    }
}

impl From<StandardId> for u16 {
    fn from(id: StandardId) -> u16 {
        id.into_bits()
    }
}

impl TryFrom<u16> for StandardId {
    type Error = InvalidValue;

    fn try_from(bits: u16) -> Result<Self, InvalidValue> {
        Self::new(bits).ok_or(InvalidValue)
    }
}

/// Extended 29-bit CAN identifier, `0..=0x1FFF_FFFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtendedId(u32);

impl ExtendedId {
    /// Highest valid identifier.
    pub const MAX: Self = Self(0x1FFF_FFFF);

    /// Creates an extended identifier. Returns `None` when `bits` exceeds 29 bits.
    pub const fn new(bits: u32) -> Option<Self> {
        if bits <= Self::MAX.0 { Some(Self(bits)) } else { None }
    }

    /// Creates an extended identifier from the low 29 bits of `bits`.
    pub const fn from_bits_truncating(bits: u32) -> Self {
        Self(bits & Self::MAX.0)
    }

    pub const fn into_bits(self) -> u32 {
        self.0
    }
}

impl From<ExtendedId> for u32 {
    fn from(id: ExtendedId) -> u32 {
        id.into_bits()
    }
}

impl TryFrom<u32> for ExtendedId {
    type Error = InvalidValue;

    fn try_from(bits: u32) -> Result<Self, InvalidValue> {
        Self::new(bits).ok_or(InvalidValue)
    }
}

/// A standard or extended CAN identifier.
///
/// The two kinds never compare equal, even for equal raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanId {
    Standard(StandardId),
    Extended(ExtendedId),
}

impl CanId {
    const EXTENDED_BIT: u32 = 1 << 31;

    /// Packs the identifier into one word: raw bits in the low 29 bits,
    /// bit 31 set for the extended kind.
    pub const fn into_bits(self) -> u32 {
        match self {
            CanId::Standard(id) => id.into_bits() as u32,
            CanId::Extended(id) => id.into_bits() | Self::EXTENDED_BIT,
        }
    }

    /// Raw identifier value without the kind tag.
    pub const fn raw(self) -> u32 {
        match self {
            CanId::Standard(id) => id.into_bits() as u32,
            CanId::Extended(id) => id.into_bits(),
        }
    }

    pub const fn is_extended(self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

impl From<StandardId> for CanId {
    fn from(id: StandardId) -> Self {
        CanId::Standard(id)
    }
}

impl From<ExtendedId> for CanId {
    fn from(id: ExtendedId) -> Self {
        CanId::Extended(id)
    }
}

/// Frame payload: up to 8 bytes, length-delimited.
///
/// Bytes past the stored length always read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Data {
    length: u8,
    bytes: [u8; Data::MAX_LENGTH],
}

impl Data {
    /// Largest payload a classic CAN frame carries.
    pub const MAX_LENGTH: usize = 8;

    /// Zero-length payload.
    pub const EMPTY: Self = Self {
        length: 0,
        bytes: [0; Self::MAX_LENGTH],
    };

    /// Copies `bytes` into a new payload. Returns `None` when more than
    /// [`Data::MAX_LENGTH`] bytes are given.
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > Self::MAX_LENGTH {
            return None;
        }
        let mut data = Self::EMPTY;
        data.length = bytes.len() as u8;
        data.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(data)
    }

    pub const fn len(&self) -> usize {
        self.length as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes[..self.length as usize]
    }
}

impl TryFrom<&[u8]> for Data {
    type Error = InvalidValue;

    fn try_from(bytes: &[u8]) -> Result<Self, InvalidValue> {
        Self::new(bytes).ok_or(InvalidValue)
    }
}

/// A classic CAN frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    id: CanId,
    data: Data,
    remote: bool,
}

impl Frame {
    /// Creates a data frame.
    pub fn new(id: impl Into<CanId>, data: Data) -> Self {
        Self {
            id: id.into(),
            data,
            remote: false,
        }
    }

    /// Creates a remote frame requesting `dlc` bytes.
    ///
    /// Returns `None` when `dlc` exceeds [`Data::MAX_LENGTH`].
    pub fn new_remote(id: impl Into<CanId>, dlc: usize) -> Option<Self> {
        if dlc > Data::MAX_LENGTH {
            return None;
        }
        let mut data = Data::EMPTY;
        data.length = dlc as u8;
        Some(Self {
            id: id.into(),
            data,
            remote: true,
        })
    }

    pub const fn id(&self) -> CanId {
        self.id
    }

    /// Data length code: payload length for data frames, requested length
    /// for remote frames.
    pub const fn dlc(&self) -> usize {
        self.data.len()
    }

    /// Payload bytes. Empty for remote frames.
    pub fn data(&self) -> &[u8] {
        if self.remote { &[] } else { &self.data }
    }

    pub const fn is_remote(&self) -> bool {
        self.remote
    }

    pub const fn is_extended(&self) -> bool {
        self.id.is_extended()
    }
}
