//! SMB_COM_TRANSACTION2 (0x32): FIND_FIRST2, FIND_NEXT2, QUERY_FS_INFORMATION.
//! [MS-CIFS] Sections 2.2.4.46, 2.2.6.2, 2.2.6.3, 2.2.6.4

use bytes::{BufMut, Bytes, BytesMut};

use crate::smb1::create::FILE_ATTRIBUTE_DIRECTORY;
use crate::smb1::header::SMB1_HEADER_SIZE;
use crate::smb1::{put_utf16le_nul, utf16le_to_string};

// TRANS2 subcommands.
pub const TRANS2_FIND_FIRST2: u16 = 0x0001;
pub const TRANS2_FIND_NEXT2: u16 = 0x0002;
pub const TRANS2_QUERY_FS_INFORMATION: u16 = 0x0003;

/// SMB_FIND_FILE_BOTH_DIRECTORY_INFO.
pub const INFO_LEVEL_BOTH_DIRECTORY: u16 = 0x0104;
/// SMB_QUERY_FS_SIZE_INFO.
pub const INFO_LEVEL_FS_SIZE: u16 = 0x0103;

/// SearchAttributes: hidden + system + directory.
const SEARCH_ATTRIBUTES: u16 = 0x0016;
/// Entries per FIND round trip.
const SEARCH_COUNT: u16 = 1024;

// FIND flags.
const FIND_CLOSE_AT_EOS: u16 = 0x0002;
const FIND_RETURN_RESUME_KEYS: u16 = 0x0004;
const FIND_CONTINUE_FROM_LAST: u16 = 0x0008;

/// Windows FILETIME epoch offset from the Unix epoch, in 100-ns ticks.
pub const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

/// Fixed request layout: 14 parameter words + 1 setup word.
const WORDS_LEN: usize = 30;

/// Build the full TRANS2 request: returns (parameter words, data block).
///
/// The transaction's own parameter and data regions ride inside the SMB data
/// block, each padded to a 4-byte boundary measured from the message start.
pub fn build_request(subcommand: u16, t2_params: &[u8], t2_data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let fixed = SMB1_HEADER_SIZE + 1 + WORDS_LEN + 2;
    let pad_p = fixed.wrapping_neg() & 3;
    let param_offset = fixed + pad_p;
    let pad_d = (param_offset + t2_params.len()).wrapping_neg() & 3;
    let data_offset = param_offset + t2_params.len() + pad_d;

    let mut words = BytesMut::with_capacity(WORDS_LEN);
    words.put_u16_le(t2_params.len() as u16); // TotalParameterCount
    words.put_u16_le(t2_data.len() as u16); // TotalDataCount
    words.put_u16_le(10); // MaxParameterCount
    words.put_u16_le(16644); // MaxDataCount
    words.put_u8(0); // MaxSetupCount
    words.put_u8(0); // Reserved
    words.put_u16_le(0); // Flags
    words.put_u32_le(0); // Timeout
    words.put_u16_le(0); // Reserved2
    words.put_u16_le(t2_params.len() as u16); // ParameterCount
    words.put_u16_le(param_offset as u16); // ParameterOffset
    words.put_u16_le(t2_data.len() as u16); // DataCount
    words.put_u16_le(data_offset as u16); // DataOffset
    words.put_u8(1); // SetupCount
    words.put_u8(0); // Reserved3
    words.put_u16_le(subcommand); // Setup[0]

    let mut block = BytesMut::with_capacity(pad_p + t2_params.len() + pad_d + t2_data.len());
    block.put_bytes(0, pad_p);
    block.put_slice(t2_params);
    block.put_bytes(0, pad_d);
    block.put_slice(t2_data);

    (words.to_vec(), block.to_vec())
}

/// The transaction-level parameter and data regions of a TRANS2 response.
#[derive(Debug)]
pub struct Trans2Response {
    pub params: Bytes,
    pub data: Bytes,
}

/// Split a TRANS2 response; offsets are relative to the SMB message start.
/// Response words: TotalParameterCount(2) + TotalDataCount(2) + Reserved(2) +
/// ParameterCount(2) + ParameterOffset(2) + ParameterDisplacement(2) +
/// DataCount(2) + DataOffset(2) + DataDisplacement(2) + SetupCount(1) + Reserved(1)
pub fn parse_response(params: &[u8], raw: &Bytes) -> Option<Trans2Response> {
    if params.len() < 16 {
        return None;
    }
    let pc = u16::from_le_bytes([params[6], params[7]]) as usize;
    let po = u16::from_le_bytes([params[8], params[9]]) as usize;
    let dc = u16::from_le_bytes([params[12], params[13]]) as usize;
    let dof = u16::from_le_bytes([params[14], params[15]]) as usize;
    if po + pc > raw.len() || dof + dc > raw.len() {
        return None;
    }
    Some(Trans2Response {
        params: raw.slice(po..po + pc),
        data: raw.slice(dof..dof + dc),
    })
}

// ---- FIND_FIRST2 / FIND_NEXT2 ----

/// Build FIND_FIRST2 transaction parameters for `pattern` (e.g. `\dir\*`).
pub fn find_first2_params(pattern: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16_le(SEARCH_ATTRIBUTES);
    buf.put_u16_le(SEARCH_COUNT);
    buf.put_u16_le(FIND_CLOSE_AT_EOS | FIND_RETURN_RESUME_KEYS);
    buf.put_u16_le(INFO_LEVEL_BOTH_DIRECTORY);
    buf.put_u32_le(0); // SearchStorageType
    put_utf16le_nul(&mut buf, pattern);
    buf.to_vec()
}

/// Build FIND_NEXT2 transaction parameters continuing search `sid`.
pub fn find_next2_params(sid: u16) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16_le(sid);
    buf.put_u16_le(SEARCH_COUNT);
    buf.put_u16_le(INFO_LEVEL_BOTH_DIRECTORY);
    buf.put_u32_le(0); // ResumeKey: continuing from last entry instead
    buf.put_u16_le(FIND_CLOSE_AT_EOS | FIND_CONTINUE_FROM_LAST);
    put_utf16le_nul(&mut buf, "");
    buf.to_vec()
}

/// FIND_FIRST2 response parameters.
#[derive(Debug)]
pub struct FindFirstResponse {
    pub sid: u16,
    pub search_count: u16,
    pub end_of_search: bool,
}

impl FindFirstResponse {
    /// SID(2) + SearchCount(2) + EndOfSearch(2) + EaErrorOffset(2) + LastNameOffset(2)
    pub fn parse(params: &[u8]) -> Option<Self> {
        if params.len() < 8 {
            return None;
        }
        Some(FindFirstResponse {
            sid: u16::from_le_bytes([params[0], params[1]]),
            search_count: u16::from_le_bytes([params[2], params[3]]),
            end_of_search: u16::from_le_bytes([params[4], params[5]]) != 0,
        })
    }
}

/// FIND_NEXT2 response parameters.
#[derive(Debug)]
pub struct FindNextResponse {
    pub search_count: u16,
    pub end_of_search: bool,
}

impl FindNextResponse {
    /// SearchCount(2) + EndOfSearch(2) + EaErrorOffset(2) + LastNameOffset(2)
    pub fn parse(params: &[u8]) -> Option<Self> {
        if params.len() < 6 {
            return None;
        }
        Some(FindNextResponse {
            search_count: u16::from_le_bytes([params[0], params[1]]),
            end_of_search: u16::from_le_bytes([params[2], params[3]]) != 0,
        })
    }
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub attributes: u32,
    pub is_dir: bool,
    /// LastWriteTime as a raw FILETIME.
    pub mtime: u64,
}

impl DirEntry {
    /// Modification time as Unix seconds (0 for pre-epoch timestamps).
    pub fn mtime_unix_secs(&self) -> u64 {
        self.mtime.saturating_sub(FILETIME_UNIX_DIFF) / 10_000_000
    }
}

/// Minimum fixed size of one SMB_FIND_FILE_BOTH_DIRECTORY_INFO record.
const BOTH_DIR_INFO_FIXED: usize = 94;

fn u32_le(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

fn u64_le(data: &[u8], off: usize) -> u64 {
    (u32_le(data, off) as u64) | ((u32_le(data, off + 4) as u64) << 32)
}

/// Decode a run of SMB_FIND_FILE_BOTH_DIRECTORY_INFO records.
///
/// Layout per entry: NextEntryOffset(4) + FileIndex(4) + CreationTime(8) +
/// LastAccessTime(8) + LastWriteTime(8) + ChangeTime(8) + EndOfFile(8) +
/// AllocationSize(8) + ExtFileAttributes(4) + FileNameLength(4) + EaSize(4) +
/// ShortNameLength(1) + Reserved(1) + ShortName(24) + FileName
///
/// `.` and `..` are filtered out here; the caller never sees them.
pub fn parse_both_dir_info(data: &[u8], count: usize) -> Vec<DirEntry> {
    let mut entries = Vec::new();
    let mut off = 0usize;

    for _ in 0..count {
        if off + BOTH_DIR_INFO_FIXED > data.len() {
            break;
        }
        let next = u32_le(data, off) as usize;
        let mtime = u64_le(data, off + 24);
        let size = u64_le(data, off + 40);
        let attributes = u32_le(data, off + 56);
        let name_len = u32_le(data, off + 60) as usize;

        let name_at = off + BOTH_DIR_INFO_FIXED;
        let mut raw_name = data.get(name_at..name_at + name_len).unwrap_or(&[]);
        if raw_name.ends_with(&[0, 0]) {
            raw_name = &raw_name[..raw_name.len() - 2];
        }
        let name = utf16le_to_string(raw_name);

        if name != "." && name != ".." {
            entries.push(DirEntry {
                name,
                size,
                attributes,
                is_dir: attributes & FILE_ATTRIBUTE_DIRECTORY != 0,
                mtime,
            });
        }

        if next == 0 {
            break;
        }
        off += next;
    }

    entries
}

// ---- QUERY_FS_INFORMATION ----

/// Build QUERY_FS_INFORMATION transaction parameters: InformationLevel(2).
pub fn query_fs_size_params() -> Vec<u8> {
    INFO_LEVEL_FS_SIZE.to_le_bytes().to_vec()
}

/// SMB_QUERY_FS_SIZE_INFO payload.
#[derive(Debug, Clone, Copy)]
pub struct FsSizeInfo {
    pub total_units: u64,
    pub free_units: u64,
    pub sectors_per_unit: u32,
    pub bytes_per_sector: u32,
}

impl FsSizeInfo {
    /// TotalAllocationUnits(8) + TotalFreeAllocationUnits(8) +
    /// SectorsPerAllocationUnit(4) + BytesPerSector(4) = 24 bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 24 {
            return None;
        }
        Some(FsSizeInfo {
            total_units: u64::from_le_bytes(data[0..8].try_into().ok()?),
            free_units: u64::from_le_bytes(data[8..16].try_into().ok()?),
            sectors_per_unit: u32::from_le_bytes(data[16..20].try_into().ok()?),
            bytes_per_sector: u32::from_le_bytes(data[20..24].try_into().ok()?),
        })
    }

    pub fn unit_bytes(&self) -> u64 {
        self.sectors_per_unit as u64 * self.bytes_per_sector as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_units * self.unit_bytes()
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_units * self.unit_bytes()
    }
}
