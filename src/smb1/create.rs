//! SMB_COM_NT_CREATE_ANDX (0xA2): open or create a file or directory.
//! [MS-CIFS] Section 2.2.4.64

use bytes::{BufMut, BytesMut};

use crate::smb1::header::SMB1_HEADER_SIZE;
use crate::smb1::{put_utf16le_nul, string_to_utf16le, ANDX_NONE};

// Desired access masks observed to work against the 3DS share.
/// FILE_READ_DATA | FILE_READ_EA | FILE_READ_ATTRIBUTES | READ_CONTROL.
pub const ACCESS_READ: u32 = 0x0002_0089;
/// Generic read/write set minus DELETE-only bits; used for uploads.
pub const ACCESS_READ_WRITE: u32 = 0x001F_01BF;
/// FILE_ALL_ACCESS; used for directory creation.
pub const ACCESS_ALL: u32 = 0x001F_01FF;

// Create disposition values.
pub const FILE_OPEN: u32 = 1;
pub const FILE_CREATE: u32 = 2;
pub const FILE_OVERWRITE_IF: u32 = 5;

// Create options flags.
pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;
pub const FILE_NON_DIRECTORY_FILE: u32 = 0x0000_0040;

// Share access flags.
pub const FILE_SHARE_READ: u32 = 0x0000_0001;
pub const FILE_SHARE_NONE: u32 = 0x0000_0000;

// File attributes.
pub const FILE_ATTRIBUTE_HIDDEN: u32 = 0x0000_0002;
pub const FILE_ATTRIBUTE_SYSTEM: u32 = 0x0000_0004;
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;

/// NtCreateFlags: request oplock + extended response.
const CREATE_FLAGS: u32 = 0x16;

/// SECURITY_IMPERSONATION.
const IMPERSONATION_LEVEL: u32 = 2;

/// What the caller wants to do with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

/// What to do when the path does or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fail if the path does not exist.
    OpenExisting,
    /// Fail if the path already exists.
    CreateNew,
    /// Create, or truncate an existing file.
    OverwriteIf,
}

impl Access {
    fn desired_access(self) -> u32 {
        match self {
            Access::Read => ACCESS_READ,
            Access::Write | Access::ReadWrite => ACCESS_READ_WRITE,
        }
    }

    fn share_access(self) -> u32 {
        match self {
            Access::Read => FILE_SHARE_READ,
            Access::Write | Access::ReadWrite => FILE_SHARE_NONE,
        }
    }
}

impl Disposition {
    fn as_u32(self) -> u32 {
        match self {
            Disposition::OpenExisting => FILE_OPEN,
            Disposition::CreateNew => FILE_CREATE,
            Disposition::OverwriteIf => FILE_OVERWRITE_IF,
        }
    }
}

/// NT_CREATE_ANDX request.
#[derive(Debug)]
pub struct NtCreateRequest<'a> {
    pub path: &'a str,
    pub desired_access: u32,
    pub file_attributes: u32,
    pub share_access: u32,
    pub disposition: u32,
    pub create_options: u32,
}

impl<'a> NtCreateRequest<'a> {
    /// Request to open or create a regular file.
    pub fn file(path: &'a str, access: Access, disposition: Disposition) -> Self {
        NtCreateRequest {
            path,
            desired_access: access.desired_access(),
            file_attributes: 0,
            share_access: access.share_access(),
            disposition: disposition.as_u32(),
            create_options: FILE_NON_DIRECTORY_FILE,
        }
    }

    /// Request to create a directory.
    pub fn directory(path: &'a str) -> Self {
        NtCreateRequest {
            path,
            desired_access: ACCESS_ALL,
            file_attributes: 0,
            share_access: FILE_SHARE_READ,
            disposition: FILE_CREATE,
            create_options: FILE_DIRECTORY_FILE,
        }
    }

    /// Serialize the 24-word parameter block.
    /// [MS-CIFS] 2.2.4.64.1: AndXCommand(1) + AndXReserved(1) + AndXOffset(2) +
    /// Reserved(1) + NameLength(2) + Flags(4) + RootDirectoryFID(4) +
    /// DesiredAccess(4) + AllocationSize(8) + ExtFileAttributes(4) +
    /// ShareAccess(4) + CreateDisposition(4) + CreateOptions(4) +
    /// ImpersonationLevel(4) + SecurityFlags(1) = 48 bytes
    pub fn serialize_params(&self, buf: &mut BytesMut) {
        let name_len = string_to_utf16le(self.path).len() + 2; // incl. terminator
        buf.put_u8(ANDX_NONE);
        buf.put_u8(0);
        buf.put_u16_le(0);
        buf.put_u8(0); // Reserved
        buf.put_u16_le(name_len as u16);
        buf.put_u32_le(CREATE_FLAGS);
        buf.put_u32_le(0); // RootDirectoryFID
        buf.put_u32_le(self.desired_access);
        buf.put_u64_le(0); // AllocationSize
        buf.put_u32_le(self.file_attributes);
        buf.put_u32_le(self.share_access);
        buf.put_u32_le(self.disposition);
        buf.put_u32_le(self.create_options);
        buf.put_u32_le(IMPERSONATION_LEVEL);
        buf.put_u8(0); // SecurityFlags
    }

    /// Serialize the data block: pad byte (the fixed parameter block leaves
    /// the name on an odd offset) then the UTF-16LE path.
    pub fn serialize_data(&self, buf: &mut BytesMut) {
        const PARAMS_LEN: usize = 48;
        if (SMB1_HEADER_SIZE + 1 + PARAMS_LEN + 2) % 2 != 0 {
            buf.put_u8(0);
        }
        put_utf16le_nul(buf, self.path);
    }
}

/// Parsed NT_CREATE_ANDX response.
#[derive(Debug)]
pub struct NtCreateResponse {
    pub fid: u16,
    pub file_attributes: u32,
    pub end_of_file: u64,
    pub is_directory: bool,
}

impl NtCreateResponse {
    /// Parse from the response parameter block (34 words).
    /// AndX(4) + OpLockLevel(1) + FID(2) + CreateDisposition(4) +
    /// CreationTime(8) + LastAccessTime(8) + LastWriteTime(8) + ChangeTime(8) +
    /// ExtFileAttributes(4) + AllocationSize(8) + EndOfFile(8) + FileType(2) +
    /// DeviceState(2) + Directory(1) = 68 bytes
    pub fn parse(params: &[u8]) -> Option<Self> {
        if params.len() < 68 {
            return None;
        }
        let fid = u16::from_le_bytes([params[5], params[6]]);
        let file_attributes = u32::from_le_bytes(params[43..47].try_into().ok()?);
        let end_of_file = u64::from_le_bytes(params[55..63].try_into().ok()?);
        let is_directory = params[67] != 0;

        Some(NtCreateResponse {
            fid,
            file_attributes,
            end_of_file,
            is_directory,
        })
    }
}
