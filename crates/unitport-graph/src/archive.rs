//! `.big` packed container reader
//!
//! Layout: 4-byte magic (`BIGF` or `BIG4`), little-endian total size, big-endian
//! entry count, big-endian header size, then per entry a big-endian offset, a
//! big-endian size and a NUL-terminated path.

use crate::error::ArchiveError;
use crate::source::ArchiveReader;
use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const MAGIC_BIGF: &[u8; 4] = b"BIGF";
const MAGIC_BIG4: &[u8; 4] = b"BIG4";
const PREAMBLE_LEN: usize = 16;

/// Location of one entry's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigEntry {
    pub offset: u32,
    pub size: u32,
}

/// Parsed index of one container
#[derive(Debug, Clone)]
pub struct BigArchive {
    path: PathBuf,
    entries: IndexMap<String, BigEntry>,
}

impl BigArchive {
    /// Read the entry table of a container
    ///
    /// # Errors
    /// IO failures, unknown magic, or a truncated table.
    pub async fn open(path: &Path) -> Result<Self, ArchiveError> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ArchiveError::io_error(path, e))?;

        let mut preamble = [0u8; PREAMBLE_LEN];
        file.read_exact(&mut preamble).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ArchiveError::Truncated {
                path: path.to_path_buf(),
            },
            _ => ArchiveError::io_error(path, e),
        })?;

        let header_size = be_u32(&preamble[12..16]) as usize;
        let mut header = vec![0u8; header_size.max(PREAMBLE_LEN)];
        header[..PREAMBLE_LEN].copy_from_slice(&preamble);
        if header_size > PREAMBLE_LEN {
            file.read_exact(&mut header[PREAMBLE_LEN..])
                .await
                .map_err(|_| ArchiveError::Truncated {
                    path: path.to_path_buf(),
                })?;
        }

        Self::parse_index(path, &header)
    }

    /// Parse an entry table from header bytes
    ///
    /// # Errors
    /// Unknown magic or a table shorter than its declared entry count.
    pub fn parse_index(path: &Path, header: &[u8]) -> Result<Self, ArchiveError> {
        let truncated = || ArchiveError::Truncated {
            path: path.to_path_buf(),
        };

        if header.len() < PREAMBLE_LEN {
            return Err(truncated());
        }
        let magic = &header[0..4];
        if magic != MAGIC_BIGF && magic != MAGIC_BIG4 {
            return Err(ArchiveError::InvalidMagic {
                path: path.to_path_buf(),
            });
        }

        let count = be_u32(&header[8..12]) as usize;
        let mut entries = IndexMap::with_capacity(count);
        let mut pos = PREAMBLE_LEN;

        for _ in 0..count {
            let fixed = header.get(pos..pos + 8).ok_or_else(truncated)?;
            let offset = be_u32(&fixed[0..4]);
            let size = be_u32(&fixed[4..8]);
            pos += 8;

            let rest = header.get(pos..).ok_or_else(truncated)?;
            let nul = rest.iter().position(|b| *b == 0).ok_or_else(truncated)?;
            let name = String::from_utf8_lossy(&rest[..nul]).into_owned();
            pos += nul + 1;

            entries.insert(name, BigEntry { offset, size });
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry paths in table order
    #[must_use]
    pub fn entry_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Look up an entry, ignoring case and separator style
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<(&str, BigEntry)> {
        if let Some((key, entry)) = self.entries.get_key_value(name) {
            return Some((key.as_str(), *entry));
        }
        let wanted = normalize_entry(name);
        self.entries
            .iter()
            .find(|(k, _)| normalize_entry(k) == wanted)
            .map(|(k, e)| (k.as_str(), *e))
    }

    /// Read one entry's bytes from the container file
    ///
    /// # Errors
    /// Missing entry, IO failure, or an entry extending past the file end.
    pub async fn read_entry(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let (key, entry) = self.entry(name).ok_or_else(|| ArchiveError::EntryNotFound {
            container: self.path.clone(),
            entry: name.to_string(),
        })?;

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| ArchiveError::io_error(&self.path, e))?;
        file.seek(SeekFrom::Start(u64::from(entry.offset)))
            .await
            .map_err(|e| ArchiveError::io_error(&self.path, e))?;

        let mut buf = vec![0u8; entry.size as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|_| ArchiveError::EntryOutOfBounds {
                container: self.path.clone(),
                entry: key.to_string(),
            })?;
        Ok(buf)
    }
}

/// Encode entries into container bytes
///
/// Used to build fixtures and to repack extracted content.
#[must_use]
pub fn encode_big(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let table_len: usize = entries.iter().map(|(name, _)| 8 + name.len() + 1).sum();
    let header_size = PREAMBLE_LEN + table_len;
    let total: usize = header_size + entries.iter().map(|(_, data)| data.len()).sum::<usize>();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(MAGIC_BIGF);
    out.extend_from_slice(&to_u32(total).to_le_bytes());
    out.extend_from_slice(&to_u32(entries.len()).to_be_bytes());
    out.extend_from_slice(&to_u32(header_size).to_be_bytes());

    let mut offset = header_size;
    for (name, data) in entries {
        out.extend_from_slice(&to_u32(offset).to_be_bytes());
        out.extend_from_slice(&to_u32(data.len()).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        offset += data.len();
    }
    for (_, data) in entries {
        out.extend_from_slice(data);
    }
    out
}

/// [`ArchiveReader`] over `.big` containers, caching each parsed entry table
#[derive(Debug, Default, Clone)]
pub struct BigArchiveReader {
    opened: Arc<DashMap<PathBuf, Arc<BigArchive>>>,
}

impl BigArchiveReader {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn archive(&self, container: &Path) -> Result<Arc<BigArchive>, ArchiveError> {
        if let Some(found) = self.opened.get(container) {
            return Ok(Arc::clone(found.value()));
        }
        let archive = Arc::new(BigArchive::open(container).await?);
        self.opened
            .insert(container.to_path_buf(), Arc::clone(&archive));
        Ok(archive)
    }
}

#[async_trait]
impl ArchiveReader for BigArchiveReader {
    async fn list_entries(&self, container: &Path) -> Result<Vec<String>, ArchiveError> {
        Ok(self.archive(container).await?.entry_names())
    }

    async fn extract(&self, container: &Path, entry: &str) -> Result<Vec<u8>, ArchiveError> {
        self.archive(container).await?.read_entry(entry).await
    }

    async fn exists(&self, container: &Path, entry: &str) -> bool {
        match self.archive(container).await {
            Ok(archive) => archive.entry(entry).is_some(),
            Err(_) => false,
        }
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn normalize_entry(name: &str) -> String {
    name.replace('\\', "/").to_ascii_lowercase()
}
