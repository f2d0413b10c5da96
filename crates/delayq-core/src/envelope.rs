//! Envelope encoding for sorted-set members.
//!
//! A sorted set holds each member at most once, so identical payloads need a
//! unique token in front of them to be stored as separate entries.
//!
//! Layout (binary):
//! - 1-byte tag (`0x01`)
//! - 2-byte big-endian token length
//! - token bytes (a hyphenated UUIDv7)
//! - raw payload
//!
//! Members written by older producers carry a bare 36-byte hyphenated UUID in
//! front of the payload and no tag. Those are still recognized.

use uuid::Uuid;

const ENVELOPE_TAG: u8 = 0x01;

/// Header size before the token: tag byte plus u16 length.
const HEADER_LEN: usize = 3;

/// Length of the hyphenated UUID used as a bare prefix by legacy producers.
pub const LEGACY_TOKEN_LEN: usize = 36;

/// How a stored member was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFormat {
    /// Tagged, length-prefixed envelope.
    Tagged,
    /// Bare 36-byte UUID prefix.
    Legacy,
    /// Not an envelope; returned unmodified.
    Raw,
}

/// Wrap a payload in an envelope with a fresh UUIDv7 token.
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let token = Uuid::now_v7().hyphenated().to_string();
    seal_with_token(token.as_bytes(), payload)
}

/// Wrap a payload in an envelope with the given token. Tokens longer than
/// `u16::MAX` bytes are truncated.
pub fn seal_with_token(token: &[u8], payload: &[u8]) -> Vec<u8> {
    let len = u16::try_from(token.len()).unwrap_or(u16::MAX);
    let token = &token[..len as usize];
    let mut buf = Vec::with_capacity(HEADER_LEN + token.len() + payload.len());
    buf.push(ENVELOPE_TAG);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(token);
    buf.extend_from_slice(payload);
    buf
}

/// Detect the envelope format of a stored member and return the offset where
/// the payload starts.
pub fn classify(member: &[u8]) -> (EnvelopeFormat, usize) {
    if let Some(offset) = tagged_payload_offset(member) {
        return (EnvelopeFormat::Tagged, offset);
    }
    if member.len() >= LEGACY_TOKEN_LEN
        && Uuid::try_parse_ascii(&member[..LEGACY_TOKEN_LEN]).is_ok()
    {
        return (EnvelopeFormat::Legacy, LEGACY_TOKEN_LEN);
    }
    (EnvelopeFormat::Raw, 0)
}

/// Strip the envelope from a stored member, recovering the original payload.
///
/// Members that are not envelopes come back unmodified rather than truncated.
pub fn open(mut member: Vec<u8>) -> (EnvelopeFormat, Vec<u8>) {
    let (format, offset) = classify(&member);
    member.drain(..offset);
    (format, member)
}

fn tagged_payload_offset(member: &[u8]) -> Option<usize> {
    if member.len() < HEADER_LEN || member[0] != ENVELOPE_TAG {
        return None;
    }
    let token_len = u16::from_be_bytes([member[1], member[2]]) as usize;
    let offset = HEADER_LEN + token_len;
    if token_len == 0 || offset > member.len() {
        return None;
    }
    Some(offset)
}
