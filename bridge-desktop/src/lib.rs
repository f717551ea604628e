//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `RemoteFileStore` using a local directory through `tokio::fs`
//!   ([`DirectoryStore`]), handy for backups to a mounted share and for
//!   exercising the upload core end to end
//! - Helpers turning paths on disk into `LocalFileHandle`s
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{local_file_handles, DirectoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = DirectoryStore::new("/mnt/backup");
//!     let files = local_file_handles("/home/ana/photos").await.unwrap();
//!
//!     // Hand both to the upload core
//! }
//! ```

mod directory_store;

pub use directory_store::{local_file_handle, local_file_handles, DirectoryStore, DEFAULT_CHUNK_SIZE};
