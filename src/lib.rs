//! SMB1 client and service discovery for the Nintendo 3DS microSD
//! Management share.
//!
//! The console runs an intentionally minimal CIFS server on port 139 that
//! never verifies credentials, demands precise Unicode alignment in a couple
//! of commands, and serves one client at a time. This crate speaks exactly
//! that dialect: NBSS framing, the handful of SMB1 verbs needed for browsing
//! and transfer, and the quirk workarounds, plus a WS-Discovery/DPWS engine
//! that finds the console's IP and NetBIOS name on the local network.
//!
//! ```no_run
//! use n3ds_smb::{discover, Client, DiscoverOptions};
//!
//! # async fn demo() -> n3ds_smb::Result<()> {
//! let found = discover(&DiscoverOptions::default()).await?;
//! let mut client = Client::new(found.ip, found.name);
//! client.connect().await?;
//! for entry in client.listdir("\\").await? {
//!     println!("{} {}", if entry.is_dir { "d" } else { "-" }, entry.name);
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod smb1;
pub mod transport;

pub use client::{
    Access, Client, ClientSettings, ConnState, DirEntry, DiskInfo, Disposition, FileHandle,
};
pub use config::{load_config, Config};
pub use discovery::{
    discover, verify_name, DiscoverOptions, Discovered, DiscoveryMethod, Timings,
};
pub use error::{DiscoveryError, Error, NetworkError, Result};
pub use smb1::status::NtStatus;
