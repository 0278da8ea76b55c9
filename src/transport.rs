//! NetBIOS Session Service framing and the SMB1 request/response transport.
//!
//! Each NBSS frame is: type(1) + flags(1) + length(2, big-endian); bit 0 of
//! flags extends the length to 17 bits. SMB1 messages travel inside
//! SESSION_MESSAGE frames.
//!
//! RFC 1002 Section 4.3; [MS-CIFS] Section 2.1

use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, NetworkError, Result};
use crate::smb1::header::{SmbHeader, SmbIds, SMB1_HEADER_SIZE};
use crate::smb1::netbios;
use crate::smb1::status::NtStatus;
use crate::smb1::Smb1Command;

/// Maximum NBSS frame payload (17-bit length field).
pub const MAX_FRAME_SIZE: usize = 0x1_FFFF;

/// Read a single NBSS frame. Returns the frame type and its payload.
pub async fn read_frame(stream: &mut TcpStream, deadline: Duration) -> Result<(u8, Vec<u8>)> {
    let mut head = [0u8; 4];
    io_bounded(deadline, stream.read_exact(&mut head)).await?;

    let frame_type = head[0];
    let len = ((head[1] as usize & 0x01) << 16) | ((head[2] as usize) << 8) | head[3] as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!("NBSS frame too large: {} bytes", len)));
    }

    let mut payload = vec![0u8; len];
    io_bounded(deadline, stream.read_exact(&mut payload)).await?;
    Ok((frame_type, payload))
}

/// Write a single NBSS frame of the given type.
pub async fn write_frame(
    stream: &mut TcpStream,
    frame_type: u8,
    payload: &[u8],
    deadline: Duration,
) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "NBSS payload too large: {} bytes",
            payload.len()
        )));
    }
    let len = payload.len();
    let head = [
        frame_type,
        ((len >> 16) & 0x01) as u8,
        ((len >> 8) & 0xFF) as u8,
        (len & 0xFF) as u8,
    ];
    io_bounded(deadline, stream.write_all(&head)).await?;
    io_bounded(deadline, stream.write_all(payload)).await?;
    io_bounded(deadline, stream.flush()).await?;
    Ok(())
}

/// Run one socket operation under the transport deadline.
async fn io_bounded<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = std::io::Result<T>>,
) -> Result<T> {
    match timeout(deadline, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(Error::Network(NetworkError::Timeout)),
    }
}

/// One decoded SMB1 response.
#[derive(Debug)]
pub struct SmbResponse {
    pub header: SmbHeader,
    /// The whole SMB message; TRANS2 and READ_ANDX carry offsets relative
    /// to its start.
    pub raw: Bytes,
    /// Parameter words block (WordCount * 2 bytes).
    pub params: Bytes,
    /// Data block (ByteCount bytes).
    pub data: Bytes,
}

impl SmbResponse {
    pub fn status(&self) -> NtStatus {
        self.header.status
    }
}

/// Owns the TCP connection to the server and the per-connection multiplex
/// state. Exactly one request may be outstanding at a time.
pub struct SmbTransport {
    stream: TcpStream,
    io_timeout: Duration,
    pid: u16,
    mid: u16,
    tid: u16,
    uid: u16,
    /// Set after a timeout or framing violation; MID synchronization is lost
    /// and the connection must be discarded.
    poisoned: bool,
}

impl SmbTransport {
    /// Take ownership of a connected stream.
    pub fn new(stream: TcpStream, io_timeout: Duration) -> Self {
        SmbTransport {
            stream,
            io_timeout,
            pid: std::process::id() as u16,
            mid: 0,
            tid: 0,
            uid: 0,
            poisoned: false,
        }
    }

    pub fn set_tid(&mut self, tid: u16) {
        self.tid = tid;
    }

    pub fn set_uid(&mut self, uid: u16) {
        self.uid = uid;
    }

    pub fn tid(&self) -> u16 {
        self.tid
    }

    pub fn uid(&self) -> u16 {
        self.uid
    }

    /// Allocate the next multiplex ID. Wraps within 1..=0xFFFF, never 0.
    fn next_mid(&mut self) -> u16 {
        self.mid = (self.mid % 0xFFFF) + 1;
        self.mid
    }

    /// Perform the NBSS session request handshake.
    ///
    /// `called` is the server's NetBIOS name as shown on the console screen.
    pub async fn request_session(&mut self, called: &str) -> Result<()> {
        let payload = netbios::session_request_payload(called, netbios::CLIENT_NAME);
        write_frame(
            &mut self.stream,
            netbios::SESSION_REQUEST,
            &payload,
            self.io_timeout,
        )
        .await?;

        let (frame_type, body) = read_frame(&mut self.stream, self.io_timeout).await?;
        match frame_type {
            netbios::POSITIVE_SESSION_RESPONSE => {
                debug!(called, "NetBIOS session established");
                Ok(())
            }
            netbios::NEGATIVE_SESSION_RESPONSE => {
                let code = body.first().copied().unwrap_or(0);
                Err(Error::Protocol(format!(
                    "NetBIOS session refused (error 0x{:02X}); check the name",
                    code
                )))
            }
            other => Err(Error::Protocol(format!(
                "unexpected NBSS frame type 0x{:02X} to session request",
                other
            ))),
        }
    }

    /// Send one SMB1 request and read its response.
    ///
    /// Builds header + WordCount + parameter words + ByteCount + data, frames
    /// it as a SESSION_MESSAGE, and validates the response signature, command
    /// echo, and MID. Any mismatch poisons the transport: after a lost or
    /// reordered reply the MID counter cannot be trusted again.
    pub async fn send_recv(
        &mut self,
        command: Smb1Command,
        params: &[u8],
        data: &[u8],
    ) -> Result<SmbResponse> {
        if self.poisoned {
            return Err(Error::Network(NetworkError::Closed));
        }
        debug_assert!(params.len() % 2 == 0 && params.len() <= 2 * 255);

        let mid = self.next_mid();
        let ids = SmbIds { tid: self.tid, pid: self.pid, uid: self.uid, mid };

        let mut msg = BytesMut::with_capacity(SMB1_HEADER_SIZE + 3 + params.len() + data.len());
        SmbHeader::serialize_request(command as u8, ids, &mut msg);
        msg.put_u8((params.len() / 2) as u8);
        msg.put_slice(params);
        msg.put_u16_le(data.len() as u16);
        msg.put_slice(data);

        trace!(
            command = ?command,
            mid,
            words = params.len() / 2,
            bytes = data.len(),
            "sending request"
        );

        if let Err(e) = self.exchange_inner(&mut msg).await {
            self.poisoned = true;
            return Err(e);
        }

        let raw = Bytes::from(msg.to_vec());
        match Self::split_response(command, mid, raw) {
            Ok(resp) => Ok(resp),
            Err(e) => {
                warn!(command = ?command, mid, error = %e, "poisoning transport");
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Write the request frame and replace `msg` with the response message.
    async fn exchange_inner(&mut self, msg: &mut BytesMut) -> Result<()> {
        write_frame(
            &mut self.stream,
            netbios::SESSION_MESSAGE,
            msg,
            self.io_timeout,
        )
        .await?;

        let (frame_type, payload) = read_frame(&mut self.stream, self.io_timeout).await?;
        if frame_type != netbios::SESSION_MESSAGE {
            return Err(Error::Protocol(format!(
                "unexpected NBSS frame type 0x{:02X}",
                frame_type
            )));
        }
        msg.clear();
        msg.put_slice(&payload);
        Ok(())
    }

    /// Validate a response message and split it into header/params/data.
    fn split_response(command: Smb1Command, mid: u16, raw: Bytes) -> Result<SmbResponse> {
        let header = SmbHeader::parse(&raw)
            .ok_or_else(|| Error::Protocol("bad SMB signature in response".into()))?;

        if header.ids.mid != mid {
            return Err(Error::Protocol(format!(
                "MID mismatch: sent {}, got {}",
                mid, header.ids.mid
            )));
        }
        if header.command != command as u8 {
            return Err(Error::Protocol(format!(
                "command mismatch: sent 0x{:02X}, got 0x{:02X}",
                command as u8, header.command
            )));
        }

        let wc_at = SMB1_HEADER_SIZE;
        if raw.len() < wc_at + 1 {
            return Err(Error::Protocol("response truncated at WordCount".into()));
        }
        let words_len = raw[wc_at] as usize * 2;
        let params_at = wc_at + 1;
        let bc_at = params_at + words_len;
        if raw.len() < bc_at + 2 {
            return Err(Error::Protocol("response truncated at ByteCount".into()));
        }
        let data_len = u16::from_le_bytes([raw[bc_at], raw[bc_at + 1]]) as usize;
        let data_at = bc_at + 2;
        if raw.len() < data_at + data_len {
            return Err(Error::Protocol("response truncated in data block".into()));
        }

        Ok(SmbResponse {
            header,
            params: raw.slice(params_at..bc_at),
            data: raw.slice(data_at..data_at + data_len),
            raw,
        })
    }

    /// Close the TCP stream. The polite TREE_DISCONNECT/LOGOFF sequence is the
    /// client's job; an abrupt close is tolerated by the server.
    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
        self.poisoned = true;
    }
}
