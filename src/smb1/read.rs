//! SMB_COM_READ_ANDX (0x2E).
//! [MS-CIFS] Section 2.2.4.42

use bytes::{BufMut, Bytes, BytesMut};

use crate::smb1::ANDX_NONE;

/// READ_ANDX request with a 64-bit offset (12 parameter words).
#[derive(Debug)]
pub struct ReadRequest {
    pub fid: u16,
    pub offset: u64,
    pub max_count: u16,
}

impl ReadRequest {
    /// AndXCommand(1) + AndXReserved(1) + AndXOffset(2) + FID(2) + Offset(4) +
    /// MaxCountOfBytesToReturn(2) + MinCountOfBytesToReturn(2) + Timeout(4) +
    /// Remaining(2) + OffsetHigh(4) = 24 bytes
    pub fn serialize_params(&self, buf: &mut BytesMut) {
        buf.put_u8(ANDX_NONE);
        buf.put_u8(0);
        buf.put_u16_le(0);
        buf.put_u16_le(self.fid);
        buf.put_u32_le(self.offset as u32);
        buf.put_u16_le(self.max_count);
        buf.put_u16_le(0); // MinCount
        buf.put_u32_le(0xFFFF_FFFF); // Timeout: server default
        buf.put_u16_le(0); // Remaining
        buf.put_u32_le((self.offset >> 32) as u32);
    }
}

/// Extract the returned bytes from a READ_ANDX response.
///
/// DataOffset is relative to the start of the SMB message, so the whole raw
/// message is needed, not just the data block.
/// Response words: AndX(4) + Available(2) + DataCompactionMode(2) +
/// Reserved(2) + DataLength(2) + DataOffset(2) + Reserved2(10)
pub fn parse_data(params: &[u8], raw: &Bytes) -> Option<Bytes> {
    if params.len() < 14 {
        return None;
    }
    let data_length = u16::from_le_bytes([params[10], params[11]]) as usize;
    let data_offset = u16::from_le_bytes([params[12], params[13]]) as usize;
    if data_offset + data_length > raw.len() {
        return None;
    }
    Some(raw.slice(data_offset..data_offset + data_length))
}
