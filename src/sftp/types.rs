//! SFTP data types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Raw entry as reported by one directory read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Attributes of a remote path (`stat` follows links)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub is_symlink: bool,
    pub size: u64,
    /// Unix timestamp
    pub modified: i64,
    /// Permission bits
    pub permissions: u32,
}

/// One resolved entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    /// Directories (and links to directories) end with `/`
    pub full_path: String,
    pub is_dir: bool,
    pub is_link: bool,
}

/// Queried path → entries. Entry order within a path is unspecified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryListing {
    entries: HashMap<String, Vec<FileEntry>>,
}

impl DirectoryListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `path` has an entry even when the directory is empty.
    pub fn ensure_path(&mut self, path: &str) {
        self.entries.entry(path.to_string()).or_default();
    }

    pub fn push(&mut self, path: &str, entry: FileEntry) {
        self.entries.entry(path.to_string()).or_default().push(entry);
    }

    pub fn get(&self, path: &str) -> Option<&[FileEntry]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Directories first, then by name.
    pub fn sorted(&self, path: &str) -> Vec<FileEntry> {
        let mut entries = self.get(path).map(<[_]>::to_vec).unwrap_or_default();
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> HashMap<String, Vec<FileEntry>> {
        self.entries
    }
}

/// Remote file content prepared for viewing or editing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TextContent {
    Text {
        data: String,
        /// Detected encoding (e.g., "UTF-8", "GBK", "Shift_JIS")
        encoding: String,
        has_bom: bool,
    },
    /// Not shown as text
    Binary { size: u64 },
}

/// Counts of what a transfer moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub files: u64,
    pub directories: u64,
    pub bytes: u64,
}

/// Heuristic binary check on the first 8 KiB.
pub fn is_likely_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(8192)];
    if sample.is_empty() {
        return true;
    }

    let mut control_count = 0usize;
    for &byte in sample {
        match byte {
            0x00 => return false,
            0x09 | 0x0A | 0x0D => {}
            0x01..=0x08 | 0x0B..=0x0C | 0x0E..=0x1F | 0x7F => control_count += 1,
            _ => {}
        }
    }

    // More than 10% control characters reads as binary
    control_count * 10 <= sample.len()
}

/// Detect encoding and decode bytes to a UTF-8 string.
///
/// Returns (decoded_text, encoding_name, has_bom)
pub fn detect_and_decode(bytes: &[u8]) -> (String, String, bool) {
    use chardetng::EncodingDetector;

    if let Some(encoding) = bom_encoding(bytes) {
        let (cow, _, _) = encoding.decode(bytes);
        return (cow.into_owned(), encoding.name().to_string(), true);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), encoding_rs::UTF_8.name().to_string(), false);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    let (cow, _, _) = encoding.decode(bytes);
    (cow.into_owned(), encoding.name().to_string(), false)
}

fn bom_encoding(bytes: &[u8]) -> Option<&'static encoding_rs::Encoding> {
    use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8};

    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some(UTF_8)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some(UTF_16BE)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some(UTF_16LE)
    } else {
        None
    }
}

/// Encode UTF-8 text back into the file's original encoding.
pub fn encode_to_encoding(text: &str, encoding_name: &str) -> Vec<u8> {
    let encoding =
        encoding_rs::Encoding::for_label(encoding_name.as_bytes()).unwrap_or(encoding_rs::UTF_8);

    if encoding == encoding_rs::UTF_8 {
        return text.as_bytes().to_vec();
    }

    let (cow, _, _) = encoding.encode(text);
    cow.into_owned()
}
