//! SMB1 protocol types: header, commands, status codes, and string encoding.
//!
//! Implements the minimal CIFS subset the 3DS microSD Management server
//! speaks, dialect "NT LM 0.12" only.
//! Reference: [MS-CIFS] — Common Internet File System Protocol

pub mod close;
pub mod create;
pub mod delete;
pub mod echo;
pub mod header;
pub mod negotiate;
pub mod netbios;
pub mod read;
pub mod rename;
pub mod session;
pub mod status;
pub mod trans2;
pub mod tree;
pub mod write;

use bytes::{BufMut, BytesMut};

/// SMB1 command codes used by this client.
/// [MS-CIFS] Section 2.2.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Smb1Command {
    CreateDirectory = 0x00,
    DeleteDirectory = 0x01,
    Close = 0x04,
    Delete = 0x06,
    Rename = 0x07,
    Echo = 0x2B,
    ReadAndx = 0x2E,
    WriteAndx = 0x2F,
    Transaction2 = 0x32,
    TreeDisconnect = 0x71,
    Negotiate = 0x72,
    SessionSetupAndx = 0x73,
    LogoffAndx = 0x74,
    TreeConnectAndx = 0x75,
    NtCreateAndx = 0xA2,
}

/// Marker for an ANDX chain that carries no follow-up command.
pub const ANDX_NONE: u8 = 0xFF;

/// BufferFormat tag preceding a pathname in certain data blocks.
/// [MS-CIFS] 2.2.1.2: historically a type marker, always 0x04 for strings.
pub const BUFFER_FORMAT_STRING: u8 = 0x04;

/// Decode a UTF-16LE byte slice into a Rust String.
pub fn utf16le_to_string(data: &[u8]) -> String {
    let u16s: Vec<u16> = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&u16s).trim_end_matches('\0').to_string()
}

/// Encode a Rust string as UTF-16LE bytes, without a terminator.
pub fn string_to_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Append a NUL-terminated UTF-16LE string.
pub fn put_utf16le_nul(buf: &mut BytesMut, s: &str) {
    buf.put_slice(&string_to_utf16le(s));
    buf.put_u16_le(0);
}

/// Append a BufferFormat-tagged, alignment-padded, NUL-terminated UTF-16LE
/// pathname to a data block.
///
/// The server rejects DELETE and RENAME pathnames whose UTF-16LE payload does
/// not begin on an even offset within the data block, so after the 0x04 tag a
/// single pad byte is inserted whenever the payload would land on an odd
/// offset. `buf` must hold exactly the data block built so far.
pub fn put_aligned_path(buf: &mut BytesMut, path: &str) {
    buf.put_u8(BUFFER_FORMAT_STRING);
    if buf.len() % 2 != 0 {
        buf.put_u8(0);
    }
    put_utf16le_nul(buf, path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_roundtrip() {
        let s = "\\Nintendo 3DS\\title.bin";
        let enc = string_to_utf16le(s);
        assert_eq!(enc.len(), s.len() * 2);
        assert_eq!(utf16le_to_string(&enc), s);
    }

    #[test]
    fn test_utf16_decode_strips_terminator() {
        let mut enc = string_to_utf16le("DCIM");
        enc.extend_from_slice(&[0, 0]);
        assert_eq!(utf16le_to_string(&enc), "DCIM");
    }

    #[test]
    fn test_aligned_path_pads_at_block_start() {
        let mut buf = BytesMut::new();
        put_aligned_path(&mut buf, "\\a.bin");
        // 0x04, pad, then the UTF-16 payload at even offset 2
        assert_eq!(buf[0], BUFFER_FORMAT_STRING);
        assert_eq!(buf[1], 0);
        assert_eq!(&buf[2..4], &string_to_utf16le("\\")[..]);
        assert_eq!(buf.len(), 2 + 2 * 6 + 2);
    }

    #[test]
    fn test_aligned_path_second_string_stays_even() {
        let mut buf = BytesMut::new();
        put_aligned_path(&mut buf, "\\old.bin");
        let second_tag = buf.len();
        put_aligned_path(&mut buf, "\\new.bin");
        // first payload consumed an even number of bytes, so the second tag
        // lands even and its payload needs the pad again
        assert_eq!(second_tag % 2, 0);
        assert_eq!(buf[second_tag], BUFFER_FORMAT_STRING);
        assert_eq!(buf[second_tag + 1], 0);
        assert_eq!((second_tag + 2) % 2, 0);
    }

    #[test]
    fn test_unpadded_variant_is_misaligned() {
        // Pin the negative case: without the pad byte the payload begins at
        // offset 1, which the server rejects as a malformed name.
        let mut buf = BytesMut::new();
        buf.put_u8(BUFFER_FORMAT_STRING);
        put_utf16le_nul(&mut buf, "\\abc.bin");
        assert_eq!(1 % 2, 1);
        assert_eq!(&buf[1..3], &string_to_utf16le("\\")[..]);
    }
}
