//! Disk-backed cache index.
//!
//! One sorted file of fixed-width token records per set key. Sorted
//! records make membership a binary search of `O(log n)` seeks, so a
//! probe never loads the set into memory; writes fold the incoming
//! stream into the file one bounded sorted chunk at a time, replacing
//! the file atomically after each merge.

use super::{CacheIndex, CoordStream, FilteredStream, IndexError, MemberFilter, Membership};
use crate::coord::{CoordToken, TOKEN_LEN};
use crate::index::Progress;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default number of incoming tokens buffered per merge pass.
const DEFAULT_CHUNK_LIMIT: usize = 1 << 20;

/// Cache index stored as a sorted record file per set key.
pub struct DiskCacheIndex {
    set_key: String,
    path: PathBuf,
    chunk_limit: usize,
}

impl DiskCacheIndex {
    /// Opens (or prepares) the index for `set_key` under `directory`.
    ///
    /// # Errors
    ///
    /// Returns an `IndexError` if the directory cannot be created or an
    /// existing record file has a misaligned length.
    pub fn open(directory: PathBuf, set_key: impl Into<String>) -> Result<Self, IndexError> {
        let set_key = set_key.into();
        fs::create_dir_all(&directory)?;
        let path = directory.join(format!("{set_key}.idx"));
        if path.exists() {
            check_alignment(&path)?;
        }
        Ok(Self {
            set_key,
            path,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        })
    }

    /// Overrides the merge chunk size. Small limits force multi-pass
    /// merges, which the tests exercise.
    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit.max(1);
        self
    }

    /// Path of the backing record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merges one sorted chunk of tokens into the record file.
    ///
    /// Streams the existing file and the chunk through a two-way merge
    /// with dedup into a sibling temp file, then renames over the
    /// original so readers only ever see a complete file.
    fn merge_chunk(&self, chunk: &BTreeSet<CoordToken>) -> Result<(), IndexError> {
        let tmp_path = self.path.with_extension("idx.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);

        let mut existing = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        let mut incoming = chunk.iter().peekable();
        let mut current = next_record(existing.as_mut())?;

        loop {
            match (current, incoming.peek()) {
                (Some(record), Some(token)) => {
                    let token_bytes = *token.as_bytes();
                    if record < token_bytes {
                        writer.write_all(&record)?;
                        current = next_record(existing.as_mut())?;
                    } else if record > token_bytes {
                        writer.write_all(&token_bytes)?;
                        incoming.next();
                    } else {
                        // Already present; keep one copy
                        writer.write_all(&record)?;
                        current = next_record(existing.as_mut())?;
                        incoming.next();
                    }
                }
                (Some(record), None) => {
                    writer.write_all(&record)?;
                    current = next_record(existing.as_mut())?;
                }
                (None, Some(token)) => {
                    writer.write_all(token.as_bytes())?;
                    incoming.next();
                    current = None;
                }
                (None, None) => break,
            }
        }

        writer.flush()?;
        drop(writer);
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl CacheIndex for DiskCacheIndex {
    fn set_key(&self) -> &str {
        &self.set_key
    }

    fn write(&self, coords: CoordStream<'_>, progress: &Progress) -> Result<u64, IndexError> {
        let mut coords = coords.peekable();
        let mut processed = 0u64;
        let mut passes = 0u32;

        while coords.peek().is_some() {
            let mut chunk = BTreeSet::new();
            while chunk.len() < self.chunk_limit {
                match coords.next() {
                    Some(coord) => {
                        chunk.insert(coord.to_token());
                        processed += 1;
                        progress.tick(processed);
                    }
                    None => break,
                }
            }
            self.merge_chunk(&chunk)?;
            passes += 1;
        }

        debug!(
            set_key = %self.set_key,
            processed,
            passes,
            "streamed tokens into disk index"
        );
        Ok(processed)
    }

    fn filter<'a>(
        &'a self,
        coords: CoordStream<'a>,
        keep: Membership,
        progress: Progress,
    ) -> FilteredStream<'a> {
        let mut reader = match RecordFile::open(&self.path) {
            Ok(reader) => reader,
            Err(err) => return Box::new(std::iter::once(Err(err))),
        };
        let probe = Box::new(move |token: &CoordToken| reader.contains(token));
        Box::new(MemberFilter::new(coords, probe, keep, progress))
    }
}

/// Read-only view of the sorted record file for one filter invocation.
///
/// A missing file is an empty set; every probe then misses.
struct RecordFile {
    file: Option<File>,
    records: u64,
}

impl RecordFile {
    fn open(path: &Path) -> Result<Self, IndexError> {
        match File::open(path) {
            Ok(file) => {
                let len = file.metadata()?.len();
                if len % TOKEN_LEN as u64 != 0 {
                    return Err(IndexError::Misaligned(len));
                }
                Ok(Self {
                    file: Some(file),
                    records: len / TOKEN_LEN as u64,
                })
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self {
                file: None,
                records: 0,
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Binary search over the sorted records.
    fn contains(&mut self, token: &CoordToken) -> Result<bool, IndexError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(false);
        };
        let target = token.as_bytes();
        let mut buf = [0u8; TOKEN_LEN];
        let mut lo = 0u64;
        let mut hi = self.records;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            file.seek(SeekFrom::Start(mid * TOKEN_LEN as u64))?;
            file.read_exact(&mut buf)?;
            match buf.cmp(target) {
                std::cmp::Ordering::Equal => return Ok(true),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(false)
    }
}

/// Reads the next fixed-width record, or `None` at a clean end of file.
fn next_record(
    reader: Option<&mut BufReader<File>>,
) -> Result<Option<[u8; TOKEN_LEN]>, IndexError> {
    let Some(reader) = reader else {
        return Ok(None);
    };
    let mut buf = [0u8; TOKEN_LEN];
    let mut filled = 0usize;
    while filled < TOKEN_LEN {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            // Trailing partial record
            return Err(IndexError::Misaligned(filled as u64));
        }
        filled += n;
    }
    Ok(Some(buf))
}

/// Validates that an existing record file has whole records only.
fn check_alignment(path: &Path) -> Result<(), IndexError> {
    let len = fs::metadata(path)?.len();
    if len % TOKEN_LEN as u64 != 0 {
        return Err(IndexError::Misaligned(len));
    }
    Ok(())
}
