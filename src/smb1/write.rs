//! SMB_COM_WRITE_ANDX (0x2F).
//! [MS-CIFS] Section 2.2.4.43

use bytes::{BufMut, BytesMut};

use crate::smb1::header::SMB1_HEADER_SIZE;
use crate::smb1::ANDX_NONE;

/// Fixed parameter block length: 14 words.
const PARAMS_LEN: usize = 28;

/// WRITE_ANDX request with a 64-bit offset.
#[derive(Debug)]
pub struct WriteRequest<'a> {
    pub fid: u16,
    pub offset: u64,
    pub data: &'a [u8],
}

impl WriteRequest<'_> {
    /// AndXCommand(1) + AndXReserved(1) + AndXOffset(2) + FID(2) + Offset(4) +
    /// Timeout(4) + WriteMode(2) + Remaining(2) + DataLengthHigh(2) +
    /// DataLength(2) + DataOffset(2) + OffsetHigh(4) = 28 bytes
    pub fn serialize_params(&self, buf: &mut BytesMut) {
        buf.put_u8(ANDX_NONE);
        buf.put_u8(0);
        buf.put_u16_le(0);
        buf.put_u16_le(self.fid);
        buf.put_u32_le(self.offset as u32);
        buf.put_u32_le(0); // Timeout
        buf.put_u16_le(0); // WriteMode
        buf.put_u16_le(0); // Remaining
        buf.put_u16_le(0); // DataLengthHigh
        buf.put_u16_le(self.data.len() as u16);
        buf.put_u16_le(Self::data_offset() as u16);
        buf.put_u32_le((self.offset >> 32) as u32);
    }

    /// Serialize the data block: one pad byte, then the payload, so the
    /// payload sits at the offset the parameter block promised.
    pub fn serialize_data(&self, buf: &mut BytesMut) {
        buf.put_u8(0);
        buf.put_slice(self.data);
    }

    /// Absolute offset of the payload within the SMB message:
    /// header + WordCount + params + ByteCount + pad.
    fn data_offset() -> usize {
        SMB1_HEADER_SIZE + 1 + PARAMS_LEN + 2 + 1
    }
}

/// Extract the written-byte count from a WRITE_ANDX response.
/// Response words: AndX(4) + Count(2) + Remaining(2) + CountHigh(2) + Reserved(2)
pub fn parse_count(params: &[u8]) -> Option<u16> {
    if params.len() < 6 {
        return None;
    }
    Some(u16::from_le_bytes([params[4], params[5]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let payload = b"0123456789";
        let req = WriteRequest { fid: 3, offset: 0x2_0000_0010, data: payload };
        let mut params = BytesMut::new();
        req.serialize_params(&mut params);
        assert_eq!(params.len(), PARAMS_LEN);
        assert_eq!(u16::from_le_bytes([params[4], params[5]]), 3);
        assert_eq!(
            u32::from_le_bytes(params[6..10].try_into().unwrap()),
            0x0000_0010
        );
        // DataLength and DataOffset
        assert_eq!(u16::from_le_bytes([params[20], params[21]]), 10);
        assert_eq!(u16::from_le_bytes([params[22], params[23]]), 64);
        // OffsetHigh
        assert_eq!(u32::from_le_bytes(params[24..28].try_into().unwrap()), 2);
    }

    #[test]
    fn test_data_offset_matches_frame_layout() {
        // hdr(32) + wc(1) + words(28) + bc(2) + pad(1) = 64
        assert_eq!(WriteRequest::data_offset(), 64);
    }

    #[test]
    fn test_data_block_has_pad() {
        let req = WriteRequest { fid: 1, offset: 0, data: b"xy" };
        let mut buf = BytesMut::new();
        req.serialize_data(&mut buf);
        assert_eq!(&buf[..], &[0, b'x', b'y']);
    }

    #[test]
    fn test_parse_count() {
        let mut params = vec![0u8; 8];
        params[4..6].copy_from_slice(&512u16.to_le_bytes());
        assert_eq!(parse_count(&params), Some(512));
        assert_eq!(parse_count(&params[..5]), None);
    }
}
