//! SMB_COM_DELETE (0x06) and SMB_COM_DELETE_DIRECTORY (0x01).
//! [MS-CIFS] Sections 2.2.4.7 and 2.2.4.2

use bytes::{BufMut, BytesMut};

use crate::smb1::{put_aligned_path, put_utf16le_nul, BUFFER_FORMAT_STRING};

/// SearchAttributes including hidden and system, so any file is reachable.
pub const SEARCH_HIDDEN_SYSTEM: u16 = 0x0006;

/// Build the DELETE parameter block: SearchAttributes(2).
pub fn delete_params() -> Vec<u8> {
    SEARCH_HIDDEN_SYSTEM.to_le_bytes().to_vec()
}

/// Build the DELETE data block.
///
/// The server insists on the aligned form: BufferFormat, pad, UTF-16LE path.
pub fn delete_data(path: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    put_aligned_path(&mut buf, path);
    buf.to_vec()
}

/// Build the DELETE_DIRECTORY data block (no parameter words).
///
/// Unlike DELETE, the directory form takes the plain unpadded pathname.
pub fn delete_directory_data(path: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(BUFFER_FORMAT_STRING);
    put_utf16le_nul(&mut buf, path);
    buf.to_vec()
}
