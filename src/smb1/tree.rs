//! SMB_COM_TREE_CONNECT_ANDX (0x75) and SMB_COM_TREE_DISCONNECT (0x71).
//! [MS-CIFS] Sections 2.2.4.55 and 2.2.4.51

use bytes::{BufMut, BytesMut};

use crate::smb1::{put_utf16le_nul, ANDX_NONE};

/// Request flags: TREE_CONNECT_ANDX_EXTENDED_RESPONSE | EXTENDED_SIGNATURES.
const TREE_CONNECT_FLAGS: u16 = 0x000C;

/// Service string matching any share type.
const SERVICE_ANY: &[u8] = b"?????\0";

/// TREE_CONNECT_ANDX request for `\\SERVER\share`.
#[derive(Debug)]
pub struct TreeConnectRequest {
    pub unc: String,
}

impl TreeConnectRequest {
    pub fn new(server_name: &str, share: &str) -> Self {
        TreeConnectRequest {
            unc: format!("\\\\{}\\{}", server_name.to_uppercase(), share),
        }
    }

    /// Serialize the 4-word parameter block.
    /// AndXCommand(1) + AndXReserved(1) + AndXOffset(2) + Flags(2) +
    /// PasswordLength(2) = 8 bytes
    pub fn serialize_params(&self, buf: &mut BytesMut) {
        buf.put_u8(ANDX_NONE);
        buf.put_u8(0);
        buf.put_u16_le(0);
        buf.put_u16_le(TREE_CONNECT_FLAGS);
        buf.put_u16_le(1); // PasswordLength: single null byte
    }

    /// Serialize the data block: null password, UNC path, service string.
    ///
    /// The one-byte password doubles as the alignment pad, putting the
    /// UTF-16LE UNC on an even message offset.
    pub fn serialize_data(&self, buf: &mut BytesMut) {
        buf.put_u8(0); // Password
        put_utf16le_nul(buf, &self.unc);
        buf.put_slice(SERVICE_ANY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb1::string_to_utf16le;

    #[test]
    fn test_unc_is_uppercased() {
        let req = TreeConnectRequest::new("my3ds", "microSD");
        assert_eq!(req.unc, "\\\\MY3DS\\microSD");
    }

    #[test]
    fn test_params_shape() {
        let req = TreeConnectRequest::new("MY3DS", "microSD");
        let mut buf = BytesMut::new();
        req.serialize_params(&mut buf);
        assert_eq!(buf.len(), 8);
        assert_eq!(u16::from_le_bytes([buf[4], buf[5]]), TREE_CONNECT_FLAGS);
        assert_eq!(u16::from_le_bytes([buf[6], buf[7]]), 1);
    }

    #[test]
    fn test_data_block_layout() {
        let req = TreeConnectRequest::new("MY3DS", "microSD");
        let mut buf = BytesMut::new();
        req.serialize_data(&mut buf);

        assert_eq!(buf[0], 0);
        let unc = string_to_utf16le("\\\\MY3DS\\microSD");
        assert_eq!(&buf[1..1 + unc.len()], &unc[..]);
        // UTF-16 NUL terminator, then the service string
        let tail = 1 + unc.len();
        assert_eq!(&buf[tail..tail + 2], &[0, 0]);
        assert_eq!(&buf[tail + 2..], SERVICE_ANY);
    }
}
