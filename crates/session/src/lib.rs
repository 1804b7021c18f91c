//! Session table and v1 packet codec.
//!
//! The table allocates short integer session indices (SIDX) and stores
//! per-session AEAD state; the codec parses, verifies, and seals the UDP
//! wire packets that carry a SIDX and an AES-256-GCM-sealed payload.

mod error;
mod packet;
mod session;

pub use error::{PacketError, SessionError};
pub use packet::{
    derive_nonce, is_meaningful_v1, parse_header, seal, verify, HeaderV1, VerifiedPacket,
    HEADER_LEN_V1, MIN_PACKET_LEN_V1, TAG_LEN,
};
pub use session::{GameState, Session, SessionTable, Sidx};
