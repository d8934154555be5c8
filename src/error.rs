use std::array::TryFromSliceError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    General(String),
    Io(std::io::Error),
    Serde(serde_json::Error),
    InvalidBinaryFormat(TryFromSliceError),
    /// Inconsistent framing fields within one data unit. Scoped to that
    /// unit: the connection resynchronizes instead of closing.
    Framing(String),
    /// Codec id outside the supported set. Same disposition as Framing.
    UnknownCodec(u8),
    /// CRC over the codec+data payload did not match the trailing field.
    /// The unit is dropped but still acknowledged with its claimed count.
    ChecksumMismatch { expected: u16, actual: u16 },
    /// Handshake identity is not a plausible device serial. Connection-fatal:
    /// before authentication there is no frame boundary to resynchronize to.
    InvalidIdentity(String),
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::InvalidBinaryFormat(value)
    }
}
