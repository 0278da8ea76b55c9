//! SMB1 client for the 3DS microSD Management share.
//!
//! Drives the connection handshake (NBSS session request, NEGOTIATE,
//! SESSION_SETUP_ANDX, TREE_CONNECT_ANDX) over [`SmbTransport`] and exposes
//! file-oriented verbs. One outstanding request at a time; a `Client` is not
//! meant to be shared across concurrent callers.

use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::auth;
use crate::error::{Error, NetworkError, Result};
use crate::smb1::status::NtStatus;
use crate::smb1::{
    close, create, delete, echo, negotiate, rename, session, trans2, tree, Smb1Command,
};
use crate::transport::{SmbResponse, SmbTransport};

pub use crate::smb1::create::{Access, Disposition};
pub use crate::smb1::trans2::DirEntry;

/// Default share exposed by microSD Management.
pub const DEFAULT_SHARE: &str = "microSD";
/// NetBIOS session service port.
pub const DEFAULT_PORT: u16 = 139;
/// Default per-operation socket timeout.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection lifecycle. Most verbs are legal only in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Closed,
    NbssReady,
    Negotiated,
    Authed,
    Ready,
}

impl ConnState {
    fn name(self) -> &'static str {
        match self {
            ConnState::Closed => "closed",
            ConnState::NbssReady => "nbss-ready",
            ConnState::Negotiated => "negotiated",
            ConnState::Authed => "authed",
            ConnState::Ready => "ready",
        }
    }
}

/// An open remote file. Valid only within the connection that produced it.
#[derive(Debug, Clone, Copy)]
pub struct FileHandle {
    pub fid: u16,
    pub end_of_file: u64,
    pub attributes: u32,
    pub is_directory: bool,
}

/// Result of [`Client::disk_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
}

/// Tunables for a client connection.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub share: String,
    pub port: u16,
    pub io_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            share: DEFAULT_SHARE.to_string(),
            port: DEFAULT_PORT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// SMB1 client bound to one server address and NetBIOS name.
pub struct Client {
    ip: Ipv4Addr,
    name: String,
    settings: ClientSettings,
    transport: Option<SmbTransport>,
    state: ConnState,
    max_buffer_size: u32,
    session_key: u32,
}

impl Client {
    /// Create a disconnected client with default settings.
    pub fn new(ip: Ipv4Addr, name: impl Into<String>) -> Self {
        Self::with_settings(ip, name, ClientSettings::default())
    }

    pub fn with_settings(ip: Ipv4Addr, name: impl Into<String>, settings: ClientSettings) -> Self {
        Client {
            ip,
            name: name.into(),
            settings,
            transport: None,
            state: ConnState::Closed,
            max_buffer_size: 0,
            session_key: 0,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    // -- connection lifecycle ------------------------------------------------

    /// Run the full connection handshake. Legal only from `Closed`.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ConnState::Closed {
            return Err(Error::State {
                expected: ConnState::Closed.name(),
                actual: self.state.name(),
            });
        }
        match self.do_connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    async fn do_connect(&mut self) -> Result<()> {
        let addr = (self.ip, self.settings.port);
        let stream = match timeout(self.settings.io_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::Network(NetworkError::Timeout)),
        };

        let mut transport = SmbTransport::new(stream, self.settings.io_timeout);
        transport.request_session(&self.name).await?;
        self.transport = Some(transport);
        self.state = ConnState::NbssReady;

        self.negotiate().await?;
        self.session_setup().await?;
        self.tree_connect().await?;

        info!(ip = %self.ip, name = %self.name, share = %self.settings.share, "connected");
        Ok(())
    }

    async fn negotiate(&mut self) -> Result<()> {
        let data = negotiate::request_data();
        let resp = self.request(Smb1Command::Negotiate, &[], &data).await?;
        let resp = expect_ok(Smb1Command::Negotiate, resp)?;

        let neg = negotiate::NegotiateResponse::parse(&resp.params)
            .ok_or_else(|| Error::Protocol("short NEGOTIATE response".into()))?;
        if neg.dialect_index != 0 {
            return Err(Error::Protocol(format!(
                "server selected dialect index {}, expected 0 (NT LM 0.12)",
                neg.dialect_index
            )));
        }
        self.max_buffer_size = neg.max_buffer_size;
        self.session_key = neg.session_key;
        self.state = ConnState::Negotiated;
        debug!(max_buffer_size = neg.max_buffer_size, "negotiated NT LM 0.12");
        Ok(())
    }

    async fn session_setup(&mut self) -> Result<()> {
        let blob = auth::build_negotiate_token();
        let req = session::SessionSetupRequest {
            server_max_buffer: self.max_buffer_size,
            session_key: self.session_key,
            security_blob: &blob,
        };
        let mut params = BytesMut::new();
        req.serialize_params(&mut params);
        let mut data = BytesMut::new();
        req.serialize_data(&mut data);

        // The 3DS accepts the first leg outright; a conformant server would
        // answer MORE_PROCESSING_REQUIRED here, which we treat as a failure
        // since we have no second leg to send.
        let resp = self
            .request(Smb1Command::SessionSetupAndx, &params, &data)
            .await?;
        let resp = expect_ok(Smb1Command::SessionSetupAndx, resp)?;

        let uid = resp.header.ids.uid;
        self.transport_mut()?.set_uid(uid);
        self.state = ConnState::Authed;
        debug!(uid, "session established");
        Ok(())
    }

    async fn tree_connect(&mut self) -> Result<()> {
        let req = tree::TreeConnectRequest::new(&self.name, &self.settings.share);
        let mut params = BytesMut::new();
        req.serialize_params(&mut params);
        let mut data = BytesMut::new();
        req.serialize_data(&mut data);

        let resp = self
            .request(Smb1Command::TreeConnectAndx, &params, &data)
            .await?;
        let resp = expect_ok(Smb1Command::TreeConnectAndx, resp)?;

        let tid = resp.header.ids.tid;
        self.transport_mut()?.set_tid(tid);
        self.state = ConnState::Ready;
        debug!(tid, unc = %req.unc, "tree connected");
        Ok(())
    }

    /// Best-effort polite shutdown: TREE_DISCONNECT, LOGOFF_ANDX, then the
    /// socket. Errors on the way out are ignored; the server tolerates an
    /// abrupt close too.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if self.state == ConnState::Ready {
                let _ = transport
                    .send_recv(Smb1Command::TreeDisconnect, &[], &[])
                    .await;
                let _ = transport
                    .send_recv(Smb1Command::LogoffAndx, &session::logoff_params(), &[])
                    .await;
            }
            transport.shutdown().await;
        }
        self.state = ConnState::Closed;
    }

    /// Drop the transport without the polite sequence.
    async fn abort(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown().await;
        }
        self.state = ConnState::Closed;
    }

    // -- file verbs ----------------------------------------------------------

    /// List a directory. An empty directory yields an empty vec.
    pub async fn listdir(&mut self, path: &str) -> Result<Vec<DirEntry>> {
        self.ensure_ready()?;
        validate_path(path)?;

        let pattern = format!("{}\\*", path.trim_end_matches('\\'));
        let t2_params = trans2::find_first2_params(&pattern);
        let (words, block) = trans2::build_request(trans2::TRANS2_FIND_FIRST2, &t2_params, &[]);
        let resp = self.request(Smb1Command::Transaction2, &words, &block).await?;

        // "No entries matched" is an empty listing, not a failure.
        if resp.status() == NtStatus::NoSuchFile {
            return Ok(Vec::new());
        }
        let resp = expect_ok(Smb1Command::Transaction2, resp)?;
        let t2 = trans2::parse_response(&resp.params, &resp.raw)
            .ok_or_else(|| Error::Protocol("malformed TRANS2 response".into()))?;
        let first = trans2::FindFirstResponse::parse(&t2.params)
            .ok_or_else(|| Error::Protocol("short FIND_FIRST2 response".into()))?;

        let mut entries = trans2::parse_both_dir_info(&t2.data, first.search_count as usize);
        let mut end = first.end_of_search;
        let sid = first.sid;

        while !end {
            let t2_params = trans2::find_next2_params(sid);
            let (words, block) =
                trans2::build_request(trans2::TRANS2_FIND_NEXT2, &t2_params, &[]);
            let resp = self.request(Smb1Command::Transaction2, &words, &block).await?;
            let resp = expect_ok(Smb1Command::Transaction2, resp)?;
            let t2 = trans2::parse_response(&resp.params, &resp.raw)
                .ok_or_else(|| Error::Protocol("malformed TRANS2 response".into()))?;
            let next = trans2::FindNextResponse::parse(&t2.params)
                .ok_or_else(|| Error::Protocol("short FIND_NEXT2 response".into()))?;
            entries.extend(trans2::parse_both_dir_info(&t2.data, next.search_count as usize));
            end = next.end_of_search;
        }

        debug!(path, count = entries.len(), "listed directory");
        Ok(entries)
    }

    /// Open (or create) a file and return its handle.
    pub async fn open(
        &mut self,
        path: &str,
        access: Access,
        disposition: Disposition,
    ) -> Result<FileHandle> {
        self.ensure_ready()?;
        validate_path(path)?;

        let req = create::NtCreateRequest::file(path, access, disposition);
        self.nt_create(req).await
    }

    async fn nt_create(&mut self, req: create::NtCreateRequest<'_>) -> Result<FileHandle> {
        let mut params = BytesMut::new();
        req.serialize_params(&mut params);
        let mut data = BytesMut::new();
        req.serialize_data(&mut data);

        let resp = self.request(Smb1Command::NtCreateAndx, &params, &data).await?;
        let resp = expect_ok(Smb1Command::NtCreateAndx, resp)?;
        let created = create::NtCreateResponse::parse(&resp.params)
            .ok_or_else(|| Error::Protocol("short NT_CREATE_ANDX response".into()))?;

        Ok(FileHandle {
            fid: created.fid,
            end_of_file: created.end_of_file,
            attributes: created.file_attributes,
            is_directory: created.is_directory,
        })
    }

    /// Read up to `length` bytes at `offset`. An empty result means EOF.
    ///
    /// `length` must respect [`Client::read_chunk_limit`]; loop for more.
    pub async fn read(&mut self, fid: u16, offset: u64, length: usize) -> Result<Bytes> {
        self.ensure_ready()?;
        if length > self.read_chunk_limit() {
            return Err(Error::Argument(format!(
                "read length {} exceeds negotiated chunk limit {}",
                length,
                self.read_chunk_limit()
            )));
        }

        let req = crate::smb1::read::ReadRequest {
            fid,
            offset,
            max_count: length as u16,
        };
        let mut params = BytesMut::new();
        req.serialize_params(&mut params);

        let resp = self.request(Smb1Command::ReadAndx, &params, &[]).await?;
        if resp.status() == NtStatus::EndOfFile {
            return Ok(Bytes::new());
        }
        let resp = expect_ok(Smb1Command::ReadAndx, resp)?;
        crate::smb1::read::parse_data(&resp.params, &resp.raw)
            .ok_or_else(|| Error::Protocol("malformed READ_ANDX response".into()))
    }

    /// Write `data` at `offset`. Returns the count the server accepted.
    ///
    /// `data` must respect [`Client::write_chunk_limit`]; loop for more.
    pub async fn write(&mut self, fid: u16, offset: u64, data: &[u8]) -> Result<usize> {
        self.ensure_ready()?;
        if data.len() > self.write_chunk_limit() {
            return Err(Error::Argument(format!(
                "write length {} exceeds negotiated chunk limit {}",
                data.len(),
                self.write_chunk_limit()
            )));
        }

        let req = crate::smb1::write::WriteRequest { fid, offset, data };
        let mut params = BytesMut::new();
        req.serialize_params(&mut params);
        let mut block = BytesMut::new();
        req.serialize_data(&mut block);

        let resp = self.request(Smb1Command::WriteAndx, &params, &block).await?;
        let resp = expect_ok(Smb1Command::WriteAndx, resp)?;
        let count = crate::smb1::write::parse_count(&resp.params)
            .ok_or_else(|| Error::Protocol("short WRITE_ANDX response".into()))?;
        Ok(count as usize)
    }

    /// Close a file handle.
    pub async fn close_file(&mut self, fid: u16) -> Result<()> {
        self.ensure_ready()?;
        let resp = self
            .request(Smb1Command::Close, &close::request_params(fid), &[])
            .await?;
        expect_ok(Smb1Command::Close, resp)?;
        Ok(())
    }

    /// Download `path` into `sink`. Returns the byte count transferred.
    pub async fn get_file<W>(&mut self, path: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let handle = self
            .open(path, Access::Read, Disposition::OpenExisting)
            .await?;
        let chunk = self.read_chunk_limit();
        let mut total: u64 = 0;

        let result = async {
            loop {
                let data = self.read(handle.fid, total, chunk).await?;
                if data.is_empty() {
                    break;
                }
                sink.write_all(&data).await?;
                total += data.len() as u64;
            }
            sink.flush().await?;
            Ok(total)
        }
        .await;

        let _ = self.close_file(handle.fid).await;
        if result.is_ok() {
            debug!(path, bytes = total, "downloaded file");
        }
        result
    }

    /// Upload `source` to `path`, creating or truncating it.
    /// Returns the byte count transferred.
    pub async fn put_file<R>(&mut self, path: &str, source: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let handle = self
            .open(path, Access::Write, Disposition::OverwriteIf)
            .await?;
        let chunk = self.write_chunk_limit();
        let mut buf = vec![0u8; chunk];
        let mut total: u64 = 0;

        let result = async {
            loop {
                let n = source.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                self.write(handle.fid, total, &buf[..n]).await?;
                total += n as u64;
            }
            Ok(total)
        }
        .await;

        let _ = self.close_file(handle.fid).await;
        if result.is_ok() {
            debug!(path, bytes = total, "uploaded file");
        }
        result
    }

    /// Create a directory.
    pub async fn mkdir(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        validate_path(path)?;
        let handle = self.nt_create(create::NtCreateRequest::directory(path)).await?;
        let _ = self.close_file(handle.fid).await;
        Ok(())
    }

    /// Remove an empty directory.
    pub async fn rmdir(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        validate_path(path)?;
        let resp = self
            .request(
                Smb1Command::DeleteDirectory,
                &[],
                &delete::delete_directory_data(path),
            )
            .await?;
        expect_ok(Smb1Command::DeleteDirectory, resp)?;
        Ok(())
    }

    /// Delete a file.
    pub async fn delete(&mut self, path: &str) -> Result<()> {
        self.ensure_ready()?;
        validate_path(path)?;
        let resp = self
            .request(
                Smb1Command::Delete,
                &delete::delete_params(),
                &delete::delete_data(path),
            )
            .await?;
        expect_ok(Smb1Command::Delete, resp)?;
        Ok(())
    }

    /// Rename or move a file or directory.
    pub async fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        self.ensure_ready()?;
        validate_path(old)?;
        validate_path(new)?;
        let resp = self
            .request(
                Smb1Command::Rename,
                &rename::rename_params(),
                &rename::rename_data(old, new),
            )
            .await?;
        expect_ok(Smb1Command::Rename, resp)?;
        Ok(())
    }

    /// Liveness probe.
    pub async fn echo(&mut self) -> Result<()> {
        self.ensure_ready()?;
        let resp = self
            .request(Smb1Command::Echo, &echo::request_params(), echo::ECHO_PAYLOAD)
            .await?;
        expect_ok(Smb1Command::Echo, resp)?;
        Ok(())
    }

    /// Query total/free space on the card.
    pub async fn disk_info(&mut self) -> Result<DiskInfo> {
        self.ensure_ready()?;
        let t2_params = trans2::query_fs_size_params();
        let (words, block) =
            trans2::build_request(trans2::TRANS2_QUERY_FS_INFORMATION, &t2_params, &[]);
        let resp = self.request(Smb1Command::Transaction2, &words, &block).await?;
        let resp = expect_ok(Smb1Command::Transaction2, resp)?;
        let t2 = trans2::parse_response(&resp.params, &resp.raw)
            .ok_or_else(|| Error::Protocol("malformed TRANS2 response".into()))?;
        let info = trans2::FsSizeInfo::parse(&t2.data)
            .ok_or_else(|| Error::Protocol("short QUERY_FS_SIZE_INFO response".into()))?;

        let total_bytes = info.total_bytes();
        let free_bytes = info.free_bytes();
        Ok(DiskInfo {
            total_bytes,
            free_bytes,
            used_bytes: total_bytes - free_bytes,
        })
    }

    // -- internals -----------------------------------------------------------

    /// Largest READ_ANDX payload the negotiated buffer allows.
    pub fn read_chunk_limit(&self) -> usize {
        (self.max_buffer_size.saturating_sub(64) as usize).clamp(1, 32768)
    }

    /// Largest WRITE_ANDX payload the negotiated buffer allows.
    pub fn write_chunk_limit(&self) -> usize {
        (self.max_buffer_size.saturating_sub(128) as usize).clamp(1, 16384)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state != ConnState::Ready {
            return Err(Error::State {
                expected: ConnState::Ready.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    fn transport_mut(&mut self) -> Result<&mut SmbTransport> {
        self.transport.as_mut().ok_or(Error::Network(NetworkError::Closed))
    }

    /// Issue one request; a fatal transport error closes the client.
    async fn request(
        &mut self,
        command: Smb1Command,
        params: &[u8],
        data: &[u8],
    ) -> Result<SmbResponse> {
        let transport = self.transport.as_mut().ok_or(Error::Network(NetworkError::Closed))?;
        match transport.send_recv(command, params, data).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                if e.is_fatal() {
                    warn!(command = ?command, error = %e, "fatal transport error, closing");
                    self.abort().await;
                }
                Err(e)
            }
        }
    }
}

/// Fail on any error-class NT status, carrying the command for context.
fn expect_ok(command: Smb1Command, resp: SmbResponse) -> Result<SmbResponse> {
    if resp.status().is_error() {
        return Err(Error::smb(command as u8, resp.status()));
    }
    Ok(resp)
}

/// Reject paths the share cannot express: client-side strings use `\`
/// separators, start at the share root, and fit in 255 UTF-16 code units.
fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::Argument("path is empty".into()));
    }
    if !path.starts_with('\\') {
        return Err(Error::Argument(format!("path must begin with '\\': {:?}", path)));
    }
    if path.contains('/') {
        return Err(Error::Argument(format!("path contains '/': {:?}", path)));
    }
    if path.contains('\0') {
        return Err(Error::Argument("path contains NUL".into()));
    }
    if path.split('\\').any(|c| c == "..") {
        return Err(Error::Argument(format!("path contains '..': {:?}", path)));
    }
    if path.encode_utf16().count() > 255 {
        return Err(Error::Argument("path exceeds 255 UTF-16 code units".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smb1::header::{SmbHeader, SmbIds};
    use crate::smb1::netbios;
    use crate::transport;
    use bytes::BufMut;
    use tokio::net::TcpListener;

    const T: Duration = Duration::from_secs(2);
    const SERVER_MAX_BUFFER: u32 = 4096;

    fn u16_at(buf: &[u8], off: usize) -> u16 {
        u16::from_le_bytes([buf[off], buf[off + 1]])
    }

    fn u32_at(buf: &[u8], off: usize) -> u32 {
        u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
    }

    /// Build a response message echoing the request's multiplex ids.
    fn reply(req: &[u8], status: u32, uid: u16, tid: u16, params: &[u8], data: &[u8]) -> Vec<u8> {
        let ids = SmbIds {
            tid,
            pid: u16_at(req, 26),
            uid,
            mid: u16_at(req, 30),
        };
        let mut msg = BytesMut::new();
        SmbHeader::serialize_request(req[4], ids, &mut msg);
        msg[5..9].copy_from_slice(&status.to_le_bytes());
        msg.put_u8((params.len() / 2) as u8);
        msg.put_slice(params);
        msg.put_u16_le(data.len() as u16);
        msg.put_slice(data);
        msg.to_vec()
    }

    /// Wrap TRANS2 parameter/data regions in a response message.
    fn trans2_reply(req: &[u8], uid: u16, tid: u16, t2p: &[u8], t2d: &[u8]) -> Vec<u8> {
        let param_offset = 32 + 1 + 20 + 2 + 1; // header + wc + words + bc + pad
        let data_offset = param_offset + t2p.len();

        let mut words = BytesMut::new();
        words.put_u16_le(t2p.len() as u16); // TotalParameterCount
        words.put_u16_le(t2d.len() as u16); // TotalDataCount
        words.put_u16_le(0); // Reserved
        words.put_u16_le(t2p.len() as u16); // ParameterCount
        words.put_u16_le(param_offset as u16); // ParameterOffset
        words.put_u16_le(0); // ParameterDisplacement
        words.put_u16_le(t2d.len() as u16); // DataCount
        words.put_u16_le(data_offset as u16); // DataOffset
        words.put_u16_le(0); // DataDisplacement
        words.put_u8(0); // SetupCount
        words.put_u8(0);

        let mut block = BytesMut::new();
        block.put_u8(0); // pad to the promised offset
        block.put_slice(t2p);
        block.put_slice(t2d);

        reply(req, 0, uid, tid, &words, &block)
    }

    /// One SMB_FIND_FILE_BOTH_DIRECTORY_INFO record.
    fn dir_record(name: &str, size: u64, attributes: u32, last: bool) -> Vec<u8> {
        let name_enc = crate::smb1::string_to_utf16le(name);
        let total = 94 + name_enc.len();
        let mut buf = vec![0u8; total];
        let next = if last { 0u32 } else { total as u32 };
        buf[0..4].copy_from_slice(&next.to_le_bytes());
        buf[40..48].copy_from_slice(&size.to_le_bytes());
        buf[56..60].copy_from_slice(&attributes.to_le_bytes());
        buf[60..64].copy_from_slice(&(name_enc.len() as u32).to_le_bytes());
        buf[94..].copy_from_slice(&name_enc);
        buf
    }

    /// Scripted stand-in for the 3DS microSD Management server: accepts one
    /// connection, performs the NBSS/SMB handshake, and emulates a one-file
    /// card with the same quirks the client codes against.
    async fn serve_3ds(listener: TcpListener) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (frame_type, _) = transport::read_frame(&mut stream, T).await.unwrap();
        assert_eq!(frame_type, netbios::SESSION_REQUEST);
        transport::write_frame(&mut stream, netbios::POSITIVE_SESSION_RESPONSE, &[], T)
            .await
            .unwrap();

        const UID: u16 = 0x0805;
        const TID: u16 = 0x2001;
        let mut disk: Vec<u8> = Vec::new();

        loop {
            let req = match transport::read_frame(&mut stream, Duration::from_secs(10)).await {
                Ok((netbios::SESSION_MESSAGE, req)) => req,
                _ => break,
            };

            let resp = match req[4] {
                0x72 => {
                    // NEGOTIATE: dialect 0, MaxBufferSize, SessionKey
                    let mut params = vec![0u8; 34];
                    params[7..11].copy_from_slice(&SERVER_MAX_BUFFER.to_le_bytes());
                    params[15..19].copy_from_slice(&0x1122_3344u32.to_le_bytes());
                    reply(&req, 0, 0, 0, &params, &[])
                }
                0x73 => {
                    // SESSION_SETUP_ANDX: expect a well-formed 12-word block
                    assert_eq!(req[32], 12);
                    assert_eq!(req[33], 0xFF);
                    reply(&req, 0, UID, 0, &[0xFF, 0, 0, 0, 0, 0], &[])
                }
                0x75 => reply(&req, 0, UID, TID, &[0xFF, 0, 0, 0, 0, 0, 0, 0], &[]),
                0xA2 => {
                    let disposition = u32_at(&req, 68);
                    if disposition == create::FILE_OVERWRITE_IF {
                        disk.clear();
                    }
                    let mut params = vec![0u8; 68];
                    params[5..7].copy_from_slice(&1u16.to_le_bytes());
                    params[55..63].copy_from_slice(&(disk.len() as u64).to_le_bytes());
                    reply(&req, 0, UID, TID, &params, &[])
                }
                0x2F => {
                    // WRITE_ANDX
                    let offset =
                        u32_at(&req, 39) as u64 | ((u32_at(&req, 57) as u64) << 32);
                    let dlen = u16_at(&req, 53) as usize;
                    let doff = u16_at(&req, 55) as usize;
                    let payload = &req[doff..doff + dlen];
                    let end = offset as usize + dlen;
                    if disk.len() < end {
                        disk.resize(end, 0);
                    }
                    disk[offset as usize..end].copy_from_slice(payload);
                    let mut params = vec![0u8; 8];
                    params[4..6].copy_from_slice(&(dlen as u16).to_le_bytes());
                    reply(&req, 0, UID, TID, &params, &[])
                }
                0x2E => {
                    // READ_ANDX
                    let offset =
                        (u32_at(&req, 39) as u64 | ((u32_at(&req, 53) as u64) << 32)) as usize;
                    let want = u16_at(&req, 43) as usize;
                    if offset >= disk.len() {
                        reply(&req, NtStatus::EndOfFile.as_u32(), UID, TID, &[], &[])
                    } else {
                        let slice = &disk[offset..disk.len().min(offset + want)];
                        let doff = 32 + 1 + 24 + 2 + 1;
                        let mut params = vec![0u8; 24];
                        params[10..12].copy_from_slice(&(slice.len() as u16).to_le_bytes());
                        params[12..14].copy_from_slice(&(doff as u16).to_le_bytes());
                        let mut data = vec![0u8];
                        data.extend_from_slice(slice);
                        reply(&req, 0, UID, TID, &params, &data)
                    }
                }
                0x04 => reply(&req, 0, UID, TID, &[], &[]),
                0x2B => reply(&req, 0, UID, TID, &[1, 0], b"PING"),
                0x06 => {
                    // DELETE: enforce the alignment quirk
                    if req[37] == 0x04 && req[38] == 0x00 {
                        reply(&req, 0, UID, TID, &[], &[])
                    } else {
                        reply(&req, NtStatus::ObjectNameInvalid.as_u32(), UID, TID, &[], &[])
                    }
                }
                0x01 | 0x07 | 0x71 | 0x74 => reply(&req, 0, UID, TID, &[], &[]),
                0x32 => {
                    // established-phase requests must carry the granted ids
                    assert_eq!(u16_at(&req, 24), TID);
                    assert_eq!(u16_at(&req, 28), UID);
                    let subcommand = u16_at(&req, 61);
                    match subcommand {
                        trans2::TRANS2_FIND_FIRST2 => {
                            let mut t2p = vec![0u8; 10];
                            t2p[0..2].copy_from_slice(&0x0042u16.to_le_bytes()); // SID
                            t2p[2..4].copy_from_slice(&3u16.to_le_bytes()); // SearchCount
                            // EndOfSearch = 0: more entries follow
                            let mut t2d = Vec::new();
                            t2d.extend(dir_record(".", 0, 0x10, false));
                            t2d.extend(dir_record("..", 0, 0x10, false));
                            t2d.extend(dir_record("DCIM", 0, 0x10, true));
                            trans2_reply(&req, UID, TID, &t2p, &t2d)
                        }
                        trans2::TRANS2_FIND_NEXT2 => {
                            // transaction params start at the dword-aligned
                            // offset 68; the SID is their first field
                            assert_eq!(u16_at(&req, 68), 0x0042);
                            let mut t2p = vec![0u8; 8];
                            t2p[0..2].copy_from_slice(&1u16.to_le_bytes());
                            t2p[2..4].copy_from_slice(&1u16.to_le_bytes()); // EndOfSearch
                            let t2d = dir_record("boot.firm", 262_144, 0x20, true);
                            trans2_reply(&req, UID, TID, &t2p, &t2d)
                        }
                        trans2::TRANS2_QUERY_FS_INFORMATION => {
                            let mut t2d = vec![0u8; 24];
                            t2d[0..8].copy_from_slice(&1_000_000u64.to_le_bytes());
                            t2d[8..16].copy_from_slice(&250_000u64.to_le_bytes());
                            t2d[16..20].copy_from_slice(&8u32.to_le_bytes());
                            t2d[20..24].copy_from_slice(&512u32.to_le_bytes());
                            trans2_reply(&req, UID, TID, &[], &t2d)
                        }
                        _ => reply(&req, NtStatus::NotSupported.as_u32(), UID, TID, &[], &[]),
                    }
                }
                _ => reply(&req, NtStatus::NotSupported.as_u32(), UID, TID, &[], &[]),
            };

            transport::write_frame(&mut stream, netbios::SESSION_MESSAGE, &resp, T)
                .await
                .unwrap();
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }

    async fn connected_client() -> (Client, tokio::task::JoinHandle<()>) {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_3ds(listener));

        let settings = ClientSettings { port, io_timeout: T, ..Default::default() };
        let mut client = Client::with_settings(Ipv4Addr::LOCALHOST, "TESTDS", settings);
        client.connect().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_connect_handshake_and_echo() {
        let (mut client, server) = connected_client().await;
        assert_eq!(client.state(), ConnState::Ready);
        assert_eq!(client.max_buffer_size, SERVER_MAX_BUFFER);

        client.echo().await.unwrap();

        client.close().await;
        assert_eq!(client.state(), ConnState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_listdir_spans_find_next() {
        let (mut client, server) = connected_client().await;

        let entries = client.listdir("\\").await.unwrap();
        // dot entries filtered; FIND_NEXT2 page included
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "DCIM");
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].name, "boot.firm");
        assert!(!entries[1].is_dir);
        assert_eq!(entries[1].size, 262_144);

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_chunks() {
        let (mut client, server) = connected_client().await;

        // Larger than both negotiated chunk limits, so the loops engage.
        let blob: Vec<u8> = (0..10_000u32).map(|i| (i * 7 + 3) as u8).collect();
        let put = client.put_file("\\roundtrip.bin", &mut &blob[..]).await.unwrap();
        assert_eq!(put, blob.len() as u64);

        let mut sink = Vec::new();
        let got = client.get_file("\\roundtrip.bin", &mut sink).await.unwrap();
        assert_eq!(got, blob.len() as u64);
        assert_eq!(sink, blob);

        client.delete("\\roundtrip.bin").await.unwrap();
        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_zero_byte_file() {
        let (mut client, server) = connected_client().await;

        let put = client.put_file("\\empty.bin", &mut &b""[..]).await.unwrap();
        assert_eq!(put, 0);
        let mut sink = Vec::new();
        let got = client.get_file("\\empty.bin", &mut sink).await.unwrap();
        assert_eq!(got, 0);
        assert!(sink.is_empty());

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_unpadded_variant_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_3ds(listener));

        // Drive the transport by hand to send the non-conformant encoding
        // the client refuses to produce.
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut t = SmbTransport::new(stream, T);
        t.request_session("TESTDS").await.unwrap();

        let mut unpadded = BytesMut::new();
        unpadded.put_u8(0x04);
        crate::smb1::put_utf16le_nul(&mut unpadded, "\\abc.bin");
        let resp = t
            .send_recv(Smb1Command::Delete, &delete::delete_params(), &unpadded)
            .await
            .unwrap();
        assert_eq!(resp.status(), NtStatus::ObjectNameInvalid);

        // The padded form the client emits goes through.
        let resp = t
            .send_recv(
                Smb1Command::Delete,
                &delete::delete_params(),
                &delete::delete_data("\\abc.bin"),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), NtStatus::Success);

        t.shutdown().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disk_info_arithmetic() {
        let (mut client, server) = connected_client().await;

        let df = client.disk_info().await.unwrap();
        assert!(df.total_bytes > 0);
        assert!(df.free_bytes <= df.total_bytes);
        assert_eq!(df.used_bytes + df.free_bytes, df.total_bytes);

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_and_dirs() {
        let (mut client, server) = connected_client().await;

        client.mkdir("\\photos").await.unwrap();
        client.rename("\\photos", "\\pictures").await.unwrap();
        client.rmdir("\\pictures").await.unwrap();

        client.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_verbs_require_ready() {
        let mut client = Client::new(Ipv4Addr::LOCALHOST, "TESTDS");
        let err = client.listdir("\\").await.unwrap_err();
        assert!(matches!(err, Error::State { expected: "ready", .. }));

        let err = client.echo().await.unwrap_err();
        assert!(matches!(err, Error::State { .. }));
    }

    #[test]
    fn test_path_validation() {
        assert!(validate_path("\\").is_ok());
        assert!(validate_path("\\DCIM\\100NIN03").is_ok());

        assert!(matches!(validate_path(""), Err(Error::Argument(_))));
        assert!(matches!(validate_path("DCIM"), Err(Error::Argument(_))));
        assert!(matches!(validate_path("\\a/b"), Err(Error::Argument(_))));
        assert!(matches!(validate_path("\\a\\..\\b"), Err(Error::Argument(_))));
        assert!(matches!(validate_path("\\a\0b"), Err(Error::Argument(_))));

        // 255 UTF-16 units is fine, 256 is not
        let ok = format!("\\{}", "x".repeat(254));
        assert_eq!(ok.encode_utf16().count(), 255);
        assert!(validate_path(&ok).is_ok());
        let too_long = format!("\\{}", "x".repeat(255));
        assert!(matches!(validate_path(&too_long), Err(Error::Argument(_))));
    }

    #[test]
    fn test_chunk_limits_follow_negotiated_buffer() {
        let mut client = Client::new(Ipv4Addr::LOCALHOST, "TESTDS");
        client.max_buffer_size = 0x11000;
        assert_eq!(client.read_chunk_limit(), 32768);
        assert_eq!(client.write_chunk_limit(), 16384);

        client.max_buffer_size = 4096;
        assert_eq!(client.read_chunk_limit(), 4032);
        assert_eq!(client.write_chunk_limit(), 3968);
    }
}
