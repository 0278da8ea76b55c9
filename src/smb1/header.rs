//! SMB1 Message Header.
//! [MS-CIFS] Section 2.2.3.1

use bytes::{BufMut, BytesMut};

use crate::smb1::status::NtStatus;

/// Size of the SMB1 header in bytes.
pub const SMB1_HEADER_SIZE: usize = 32;

/// SMB1 protocol magic: 0xFF 'S' 'M' 'B'
pub const SMB1_MAGIC: [u8; 4] = [0xFF, b'S', b'M', b'B'];

/// Flags: case-insensitive pathnames + canonicalized paths (what the 3DS expects).
pub const FLAGS_DEFAULT: u8 = 0x18;

/// Flags2: UNICODE | NT_STATUS | EXTENDED_SECURITY | IS_LONG_NAME | LONG_NAMES_ALLOWED.
pub const FLAGS2_DEFAULT: u16 = 0xC841;

/// Flags2 bit: strings are UTF-16LE.
pub const FLAGS2_UNICODE: u16 = 0x8000;
/// Flags2 bit: Status field is a 32-bit NT status.
pub const FLAGS2_NT_STATUS: u16 = 0x4000;

/// The multiplex identifiers carried by every SMB1 message.
///
/// Pre-negotiation frames use zeros for TID/UID; the PID is chosen once per
/// connection and the MID is allocated per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmbIds {
    pub tid: u16,
    pub pid: u16,
    pub uid: u16,
    pub mid: u16,
}

/// Parsed SMB1 response header.
#[derive(Debug, Clone)]
pub struct SmbHeader {
    pub command: u8,
    pub status: NtStatus,
    pub flags: u8,
    pub flags2: u16,
    pub ids: SmbIds,
}

impl SmbHeader {
    /// Parse an SMB1 header from the front of a message.
    /// Returns None if the slice is too short or the magic doesn't match.
    pub fn parse(input: &[u8]) -> Option<Self> {
        if input.len() < SMB1_HEADER_SIZE {
            return None;
        }
        if input[0..4] != SMB1_MAGIC {
            return None;
        }
        let command = input[4];
        let status = NtStatus::from_u32(u32::from_le_bytes([
            input[5], input[6], input[7], input[8],
        ]));
        let flags = input[9];
        let flags2 = u16::from_le_bytes([input[10], input[11]]);
        // [12..14] PIDHigh, [14..22] SecuritySignature, [22..24] Reserved
        let tid = u16::from_le_bytes([input[24], input[25]]);
        let pid = u16::from_le_bytes([input[26], input[27]]);
        let uid = u16::from_le_bytes([input[28], input[29]]);
        let mid = u16::from_le_bytes([input[30], input[31]]);

        Some(SmbHeader {
            command,
            status,
            flags,
            flags2,
            ids: SmbIds { tid, pid, uid, mid },
        })
    }

    /// Serialize a request header for `command` carrying `ids`.
    ///
    /// Status, PIDHigh, signature, and the reserved words are always zero in
    /// requests from this client.
    pub fn serialize_request(command: u8, ids: SmbIds, buf: &mut BytesMut) {
        buf.put_slice(&SMB1_MAGIC); // 0..4
        buf.put_u8(command); // 4
        buf.put_u32_le(0); // 5..9:   Status
        buf.put_u8(FLAGS_DEFAULT); // 9
        buf.put_u16_le(FLAGS2_DEFAULT); // 10..12
        buf.put_u16_le(0); // 12..14: PIDHigh
        buf.put_slice(&[0u8; 8]); // 14..22: SecuritySignature
        buf.put_u16_le(0); // 22..24: Reserved
        buf.put_u16_le(ids.tid); // 24..26
        buf.put_u16_le(ids.pid); // 26..28
        buf.put_u16_le(ids.uid); // 28..30
        buf.put_u16_le(ids.mid); // 30..32
    }
}
