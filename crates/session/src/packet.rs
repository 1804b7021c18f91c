use std::sync::Arc;

use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Nonce, Tag};

use crate::error::PacketError;
use crate::session::{Session, SessionTable, Sidx};

/// Byte length of the unencrypted v1 header (`version | sidx | sequence_nb`).
pub const HEADER_LEN_V1: usize = 9;
/// GCM authentication tag length.
pub const TAG_LEN: usize = 16;
/// A v1 packet shorter than this carries no payload beyond the tag.
pub const MIN_PACKET_LEN_V1: usize = HEADER_LEN_V1 + TAG_LEN + 1;
const NONCE_LEN: usize = 12;

/// The parsed, not-yet-decrypted v1 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV1 {
    pub version: u8,
    pub sidx: Sidx,
    pub sequence_nb: u32,
}

/// Reads the version byte and, if it is `1`, the rest of the v1 header.
/// Any other version is rejected rather than guessed at.
pub fn parse_header(buf: &[u8]) -> Result<HeaderV1, PacketError> {
    if buf.is_empty() {
        return Err(PacketError::TooShort {
            len: buf.len(),
            min: MIN_PACKET_LEN_V1,
        });
    }
    let version = buf[0];
    if version != 1 {
        return Err(PacketError::UnsupportedVersion(version));
    }
    if buf.len() < HEADER_LEN_V1 {
        return Err(PacketError::TooShort {
            len: buf.len(),
            min: MIN_PACKET_LEN_V1,
        });
    }
    let sidx = u32::from_be_bytes(buf[1..5].try_into().unwrap());
    let sequence_nb = u32::from_be_bytes(buf[5..9].try_into().unwrap());
    Ok(HeaderV1 {
        version,
        sidx,
        sequence_nb,
    })
}

/// `true` iff a v1 packet of this length carries at least one payload byte
/// in addition to version, header fields, and tag.
pub fn is_meaningful_v1(len: usize) -> bool {
    len > MIN_PACKET_LEN_V1
}

/// Fills `scratch` with the 12-byte nonce for `sequence_nb`: the first 4
/// bytes are the big-endian sequence number, the rest are zero. Reuses
/// `scratch`'s allocation when it already has nonce-sized capacity, so a
/// caller that keeps one `scratch` buffer per worker and passes it into
/// every `verify`/`seal` call never allocates here past the first call.
pub fn derive_nonce(sequence_nb: u32, scratch: &mut Vec<u8>) {
    debug_assert!(NONCE_LEN >= 4, "AEAD nonce size must fit the sequence number");
    if scratch.capacity() < NONCE_LEN {
        *scratch = Vec::with_capacity(NONCE_LEN);
    }
    scratch.clear();
    scratch.extend_from_slice(&sequence_nb.to_be_bytes());
    scratch.extend_from_slice(&[0u8; 8]);
}

/// A verified, decrypted v1 packet, ready for dispatch.
pub struct VerifiedPacket {
    pub session: Arc<Session>,
    pub request_code: u8,
    pub payload: Vec<u8>,
}

/// Look up `buf`'s session, open the AEAD tag in place, and split the
/// decrypted plaintext into request code and payload. Rejects short
/// packets, unknown sidx, version mismatches, and any tampering of
/// header/ciphertext/tag.
///
/// `buf` is decrypted in place and `nonce_scratch` is reused for nonce
/// derivation, so a caller that owns both across repeated calls (e.g. one
/// per worker task) keeps the hot path free of heap allocation beyond the
/// final small payload copy handed back in [`VerifiedPacket`].
pub fn verify(
    table: &SessionTable,
    buf: &mut [u8],
    nonce_scratch: &mut Vec<u8>,
) -> Result<VerifiedPacket, PacketError> {
    if buf.len() < MIN_PACKET_LEN_V1 {
        return Err(PacketError::TooShort {
            len: buf.len(),
            min: MIN_PACKET_LEN_V1,
        });
    }
    let header = parse_header(buf)?;
    let session = table
        .get(header.sidx)
        .ok_or(PacketError::UnknownSession(header.sidx))?;
    if session.version() != header.version {
        return Err(PacketError::VersionMismatch);
    }

    derive_nonce(header.sequence_nb, nonce_scratch);
    let nonce = Nonce::from_slice(nonce_scratch);

    let (aad, rest) = buf.split_at_mut(HEADER_LEN_V1);
    let (ciphertext, tag_bytes) = rest.split_at_mut(rest.len() - TAG_LEN);
    let tag = Tag::from_slice(tag_bytes);

    session
        .cipher()
        .decrypt_in_place_detached(nonce, aad, ciphertext, tag)
        .map_err(|_| PacketError::AeadOpenFailed)?;

    if ciphertext.is_empty() {
        return Err(PacketError::EmptyPayload);
    }
    let request_code = ciphertext[0];
    let payload = ciphertext[1..].to_vec();

    Ok(VerifiedPacket {
        session,
        request_code,
        payload,
    })
}

/// The symmetric inverse of [`verify`]: build a v1 packet for `session`
/// sealing `request_code || payload` under the session's key, encrypting
/// in place and appending the detached tag. `nonce_scratch` is reused the
/// same way as in [`verify`].
pub fn seal(
    session: &Session,
    sequence_nb: u32,
    request_code: u8,
    payload: &[u8],
    nonce_scratch: &mut Vec<u8>,
) -> Result<Vec<u8>, PacketError> {
    let mut buf = Vec::with_capacity(HEADER_LEN_V1 + 1 + payload.len() + TAG_LEN);
    buf.push(session.version());
    buf.extend_from_slice(&session.sidx().to_be_bytes());
    buf.extend_from_slice(&sequence_nb.to_be_bytes());
    let header_len = buf.len();

    buf.push(request_code);
    buf.extend_from_slice(payload);

    derive_nonce(sequence_nb, nonce_scratch);
    let nonce = Nonce::from_slice(nonce_scratch);

    let (aad, plaintext) = buf.split_at_mut(header_len);
    let tag = session
        .cipher()
        .encrypt_in_place_detached(nonce, aad, plaintext)
        .map_err(|_| PacketError::AeadSealFailed)?;
    buf.extend_from_slice(&tag);
    Ok(buf)
}
