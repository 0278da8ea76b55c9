//! SMB_COM_CLOSE (0x04).
//! [MS-CIFS] Section 2.2.4.5

use bytes::{BufMut, BytesMut};

/// LastTimeModified value asking the server to stamp the time itself.
const LAST_WRITE_SERVER: u32 = 0xFFFF_FFFF;

/// Build the 3-word CLOSE parameter block: FID(2) + LastTimeModified(4).
pub fn request_params(fid: u16) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u16_le(fid);
    buf.put_u32_le(LAST_WRITE_SERVER);
    buf.to_vec()
}
