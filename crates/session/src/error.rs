use thiserror::Error;

/// Failures from [`crate::SessionTable`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session table already holds 2^32 slots")]
    TableFull,
    #[error("session factory failed to initialize a session")]
    FactoryFailed,
}

/// Failures from parsing, verifying, or sealing a v1 packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet is {len} bytes, v1 requires at least {min}")]
    TooShort { len: usize, min: usize },
    #[error("unsupported packet version {0}")]
    UnsupportedVersion(u8),
    #[error("no live session for sidx {0}")]
    UnknownSession(u32),
    #[error("session protocol version does not match the packet's")]
    VersionMismatch,
    #[error("AEAD tag verification failed")]
    AeadOpenFailed,
    #[error("AEAD seal failed")]
    AeadSealFailed,
    #[error("decrypted payload carried no request code")]
    EmptyPayload,
}
