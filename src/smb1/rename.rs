//! SMB_COM_RENAME (0x07).
//! [MS-CIFS] Section 2.2.4.8

use bytes::BytesMut;

use crate::smb1::delete::SEARCH_HIDDEN_SYSTEM;
use crate::smb1::put_aligned_path;

/// Build the RENAME parameter block: SearchAttributes(2).
pub fn rename_params() -> Vec<u8> {
    SEARCH_HIDDEN_SYSTEM.to_le_bytes().to_vec()
}

/// Build the RENAME data block: two aligned pathnames, old then new.
///
/// Both pathnames use the aligned BufferFormat form; the first leaves an even
/// number of bytes behind it, so the second tag lands even and needs its own
/// pad again.
pub fn rename_data(old: &str, new: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_aligned_path(&mut buf, old);
    put_aligned_path(&mut buf, new);
    buf.to_vec()
}
