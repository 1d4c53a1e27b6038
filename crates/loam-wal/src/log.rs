//! Append-only page log with commit-delimited durability.

use crate::frame::{Frame, FrameType, FRAME_TYPE_SIZE};
use bytes::Bytes;
use loam_common::layout::{PAGE_REF_SIZE, PAGE_SIZE};
use loam_common::{Error, PageNum, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// The write-ahead log.
///
/// PUT frames record full page images; a COMMIT frame makes every PUT before
/// it durable. Two maps index the newest on-disk offset of each page's bytes:
/// `uncommitted` for frames appended since the last commit, `committed` for
/// the rest. Opening the log rebuilds the committed map by scanning the file
/// and truncates anything past the last COMMIT frame, so a torn tail from a
/// crash is silently discarded.
pub struct Wal {
    file: File,
    /// Byte offset where the next frame is appended.
    write_offset: u64,
    /// Page-data offsets for frames appended since the last commit.
    uncommitted: HashMap<PageNum, u64>,
    /// Page-data offsets for committed frames.
    committed: HashMap<PageNum, u64>,
    /// Whether commits fsync the file.
    sync_writes: bool,
}

impl Wal {
    /// Opens (creating if absent) the log file at `path` and recovers its
    /// committed state.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let mut wal = Self {
            file,
            write_offset: 0,
            uncommitted: HashMap::new(),
            committed: HashMap::new(),
            sync_writes,
        };
        wal.recover()?;
        Ok(wal)
    }

    /// Scans the file from the start, rebuilding the committed map and
    /// truncating the file to just past the last COMMIT frame.
    fn recover(&mut self) -> Result<()> {
        let file_len = self.file.metadata()?.len();
        self.file.seek(SeekFrom::Start(0))?;

        let mut committed: HashMap<PageNum, u64> = HashMap::new();
        let mut pending: HashMap<PageNum, u64> = HashMap::new();
        let mut offset: u64 = 0;
        let mut durable_end: u64 = 0;

        let mut reader = BufReader::new(&self.file);
        loop {
            let mut tag = [0u8; FRAME_TYPE_SIZE];
            if !read_exact_or_eof(&mut reader, &mut tag)? {
                break;
            }
            let frame_type =
                FrameType::try_from(i16::from_le_bytes(tag)).map_err(|_| Error::WalCorrupted {
                    offset,
                    reason: "unrecognized frame type".to_string(),
                })?;
            match frame_type {
                FrameType::Commit => {
                    committed.extend(pending.drain());
                    offset += Frame::COMMIT_SIZE as u64;
                    durable_end = offset;
                }
                FrameType::Put => {
                    let mut page_num_buf = [0u8; PAGE_REF_SIZE];
                    if !read_exact_or_eof(&mut reader, &mut page_num_buf)? {
                        break;
                    }
                    let page_num = PageNum::from_le_bytes(page_num_buf);
                    let data_offset = offset + (FRAME_TYPE_SIZE + PAGE_REF_SIZE) as u64;
                    // only the offset is indexed; skip past the page image
                    let skipped = std::io::copy(
                        &mut Read::by_ref(&mut reader).take(PAGE_SIZE as u64),
                        &mut std::io::sink(),
                    )?;
                    if skipped < PAGE_SIZE as u64 {
                        break;
                    }
                    pending.insert(page_num, data_offset);
                    offset = data_offset + PAGE_SIZE as u64;
                }
            }
        }
        drop(reader);

        if file_len > durable_end {
            debug!(
                discarded = file_len - durable_end,
                "discarding WAL tail past the last commit"
            );
        }
        self.file.set_len(durable_end)?;
        self.write_offset = durable_end;
        self.committed = committed;
        self.uncommitted.clear();
        debug!(pages = self.committed.len(), "write-ahead log recovered");
        Ok(())
    }

    /// True if recovery found at least one committed page.
    pub fn has_committed(&self) -> bool {
        !self.committed.is_empty()
    }

    /// Page numbers with committed frames, for checkpointing.
    pub fn committed_pages(&self) -> Vec<PageNum> {
        self.committed.keys().copied().collect()
    }

    /// Appends a PUT frame for `page_num`. The bytes are not durable until
    /// the next [`Wal::commit`].
    pub fn append_put(&mut self, page_num: PageNum, data: Bytes) -> Result<()> {
        let frame = Frame::Put { page_num, data };
        let encoded = frame.encode()?;
        self.file.seek(SeekFrom::Start(self.write_offset))?;
        self.file.write_all(&encoded)?;
        let data_offset = self.write_offset + (FRAME_TYPE_SIZE + PAGE_REF_SIZE) as u64;
        self.uncommitted.insert(page_num, data_offset);
        self.write_offset += encoded.len() as u64;
        Ok(())
    }

    /// Appends a COMMIT frame: every uncommitted entry becomes committed and
    /// the file is synced. This is the sole durability boundary.
    pub fn commit(&mut self) -> Result<()> {
        let encoded = Frame::Commit.encode()?;
        self.file.seek(SeekFrom::Start(self.write_offset))?;
        self.file.write_all(&encoded)?;
        self.write_offset += encoded.len() as u64;
        self.committed.extend(self.uncommitted.drain());
        if self.sync_writes {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Returns the page bytes for `page_num` if the log holds them.
    ///
    /// An uncommitted entry wins over a committed one: with a single writer
    /// it is the latest in-flight write to that page.
    pub fn read(&mut self, page_num: PageNum) -> Result<Option<Bytes>> {
        let offset = match self
            .uncommitted
            .get(&page_num)
            .or_else(|| self.committed.get(&page_num))
        {
            Some(&offset) => offset,
            None => return Ok(None),
        };
        let mut buf = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(Some(Bytes::from(buf)))
    }

    /// Truncates the log and forgets all entries.
    ///
    /// Call only after a checkpoint has written every committed page to the
    /// data file and synced it.
    pub fn clear(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.write_offset = 0;
        self.uncommitted.clear();
        self.committed.clear();
        Ok(())
    }
}

/// Fills `buf` from `reader`, returning `Ok(false)` if the reader ends first.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}
