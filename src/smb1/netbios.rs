//! NetBIOS Session Service: frame types and first-level name encoding.
//! RFC 1001 Section 14.1, RFC 1002 Section 4.3

use bytes::{BufMut, BytesMut};

/// NBSS frame types used by this client.
pub const SESSION_MESSAGE: u8 = 0x00;
pub const SESSION_REQUEST: u8 = 0x81;
pub const POSITIVE_SESSION_RESPONSE: u8 = 0x82;
pub const NEGATIVE_SESSION_RESPONSE: u8 = 0x83;

/// NetBIOS name suffix for the file service.
pub const SUFFIX_FILE_SERVICE: u8 = 0x20;

/// Fixed calling name this client identifies itself with.
pub const CLIENT_NAME: &str = "3DSCLIENT";

/// First-level encode a NetBIOS name.
///
/// The name is upper-cased, truncated to 15 bytes, space-padded, and given a
/// one-byte service suffix; each of the 16 bytes is then split into two
/// nibbles with 'A' added to each, yielding 32 ASCII characters.
pub fn encode_name(name: &str, suffix: u8) -> [u8; 32] {
    let mut padded = [b' '; 16];
    for (i, b) in name.to_uppercase().bytes().take(15).enumerate() {
        padded[i] = b;
    }
    padded[15] = suffix;

    let mut out = [0u8; 32];
    for (i, b) in padded.iter().enumerate() {
        out[i * 2] = (b >> 4) + b'A';
        out[i * 2 + 1] = (b & 0x0F) + b'A';
    }
    out
}

/// Append one second-level encoded name field: length 0x20, 32 encoded
/// characters, null label terminator.
fn put_name_field(buf: &mut BytesMut, name: &str, suffix: u8) {
    buf.put_u8(0x20);
    buf.put_slice(&encode_name(name, suffix));
    buf.put_u8(0x00);
}

/// Build the SESSION_REQUEST payload: called name (the server), then calling
/// name (this client), both for the file service.
pub fn session_request_payload(called: &str, calling: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(68);
    put_name_field(&mut buf, called, SUFFIX_FILE_SERVICE);
    put_name_field(&mut buf, calling, SUFFIX_FILE_SERVICE);
    buf.to_vec()
}
