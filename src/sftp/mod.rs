//! SFTP file management module
//!
//! Remote filesystem access, concurrent directory listing, transfers and
//! text editing.

pub mod error;
pub mod fetcher;
pub mod path_utils;
pub mod remote;
pub mod transfer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SftpError;
pub use fetcher::{fetch_listing, DirectoryFetcher, LISTING_WORKERS};
pub use remote::{RemoteFs, RemoteReader, RemoteWriter, SftpClient};
pub use transfer::{download, read_text, upload, write_content, write_text};
pub use types::*;
