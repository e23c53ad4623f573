// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Segment storage
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A segment is one preallocated file of `max_segment_size` bytes:
//
//   [0..64)            descriptor
//   [64..write_offset) contiguous frames, one per record
//   [write_offset..)   unwritten, or stale bytes from a truncated tail
//
// Reads never look past `write_offset`, so stale bytes are invisible to
// readers. Whenever a frame is written over a region that may hold stale
// frames, the following header is zeroed in the same write so that a
// rescan on reopen stops at the real tail.
//
// Storage is either positional file I/O (`Disk`) or a writable memory map
// (`Mapped`). All state lives behind one `RwLock`: the single writer takes
// it exclusively, readers share it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use memmap2::MmapMut;
use tracing::{debug, warn};

use crate::codec::{Decoded, Frame, FrameBuffer, FrameCodec, FRAME_HEADER_BYTES};
use crate::config::StorageLevel;
use crate::descriptor::{Descriptor, DESCRIPTOR_BYTES, UPDATED_RANGE};
use crate::error::{FrameCorruption, JournalError, JournalResult};
use crate::index::SparseIndex;

/// Chunk size used by bulk copies and disk scans.
const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Static parameters shared by every segment of one journal.
#[derive(Debug, Clone, Copy)]
pub struct SegmentOptions {
    /// Disk or memory-mapped storage.
    pub storage_level: StorageLevel,
    /// Frame codec.
    pub codec: FrameCodec,
    /// Sparse index density.
    pub index_density: f64,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

enum Storage {
    Disk(File),
    Mapped { file: File, map: MmapMut },
}

impl Storage {
    fn open(file: File, level: StorageLevel) -> io::Result<Self> {
        match level {
            StorageLevel::Disk => Ok(Self::Disk(file)),
            StorageLevel::Mapped => {
                // SAFETY: The segment file is owned by this journal and its
                // length is fixed at `max_segment_size` before mapping; it is
                // never resized while the map is alive.
                let map = unsafe { MmapMut::map_mut(&file)? };
                Ok(Self::Mapped { file, map })
            }
        }
    }

    fn file(&self) -> &File {
        match self {
            Self::Disk(file) | Self::Mapped { file, .. } => file,
        }
    }

    fn write_all_at(&mut self, bytes: &[u8], offset: u64) -> io::Result<()> {
        match self {
            Self::Disk(file) => write_all_at(file, bytes, offset),
            Self::Mapped { map, .. } => {
                let start = usize::try_from(offset).map_err(io::Error::other)?;
                let end = start + bytes.len();
                let region = map.get_mut(start..end).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "write past end of mapped segment")
                })?;
                region.copy_from_slice(bytes);
                Ok(())
            }
        }
    }

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        match self {
            Self::Disk(file) => read_exact_at(file, buf, offset),
            Self::Mapped { map, .. } => {
                let start = usize::try_from(offset).map_err(io::Error::other)?;
                let region = map.get(start..start + buf.len()).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of mapped segment")
                })?;
                buf.copy_from_slice(region);
                Ok(())
            }
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self {
            Self::Disk(file) => file.sync_data(),
            Self::Mapped { map, .. } => map.flush(),
        }
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match read_at(file, buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "segment file shorter than expected",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match std::os::windows::fs::FileExt::seek_write(file, buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Sequential reader over `[offset, end)` of a file using positional reads.
struct PositionalReader<'a> {
    file: &'a File,
    offset: u64,
    end: u64,
}

impl Read for PositionalReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.end {
            return Ok(0);
        }
        let available = (self.end - self.offset).min(buf.len() as u64) as usize;
        let n = read_at(self.file, &mut buf[..available], self.offset)?;
        self.offset += n as u64;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

struct SegmentState {
    storage: Option<Storage>,
    descriptor: Descriptor,
    index: SparseIndex,
    /// Last record index held; `first_index - 1` when empty.
    last_index: u64,
    /// Offset at which the next frame is written.
    write_offset: u64,
    /// Bytes past this offset were never written in this segment's life.
    high_water: u64,
    /// Offset and cause of a torn frame dropped by the load-time scan.
    torn_tail: Option<(u64, FrameCorruption)>,
}

impl SegmentState {
    fn storage(&self, id: u64) -> JournalResult<&Storage> {
        self.storage.as_ref().ok_or(JournalError::SegmentClosed(id))
    }

    fn storage_mut(&mut self, id: u64) -> JournalResult<&mut Storage> {
        self.storage.as_mut().ok_or(JournalError::SegmentClosed(id))
    }
}

/// One bounded storage unit holding a contiguous run of records.
pub struct Segment {
    path: PathBuf,
    id: u64,
    first_index: u64,
    max_segment_size: u64,
    max_entries: u32,
    options: SegmentOptions,
    state: RwLock<SegmentState>,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("first_index", &self.first_index)
            .field("last_index", &self.last_index())
            .finish()
    }
}

impl Segment {
    /// Open the segment at `path`, creating it from `descriptor` if the
    /// file does not exist.
    pub fn open(path: &Path, descriptor: Descriptor, options: SegmentOptions) -> JournalResult<Self> {
        if path.exists() {
            Self::load(path, options)
        } else {
            Self::create(path, descriptor, options)
        }
    }

    /// Create a new, empty segment file.
    pub fn create(path: &Path, descriptor: Descriptor, options: SegmentOptions) -> JournalResult<Self> {
        let max_segment_size = u64::from(descriptor.max_segment_size());
        if (max_segment_size as usize) < DESCRIPTOR_BYTES + FRAME_HEADER_BYTES {
            return Err(JournalError::InvalidConfig(format!(
                "segment size {max_segment_size} cannot hold a single frame"
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(max_segment_size)?;
        write_all_at(&file, &descriptor.to_bytes(), 0)?;

        let storage = Storage::open(file, options.storage_level)?;

        debug!(
            path = %path.display(),
            id = descriptor.id(),
            first_index = descriptor.index(),
            "Created journal segment"
        );

        Ok(Self::with_state(
            path,
            descriptor,
            options,
            storage,
            DESCRIPTOR_BYTES as u64,
            DESCRIPTOR_BYTES as u64,
        ))
    }

    /// Open an existing segment file and rebuild its sparse index by
    /// scanning its frames. A frame that does not decode ends the segment
    /// only when nothing decodable follows it (a torn write); anywhere else
    /// it fails the load with [`JournalError::Corrupted`].
    pub fn load(path: &Path, options: SegmentOptions) -> JournalResult<Self> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(JournalError::SegmentNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut header = [0u8; DESCRIPTOR_BYTES];
        read_exact_at(&file, &mut header, 0).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                JournalError::MalformedDescriptor(format!("{} is too short", path.display()))
            }
            _ => JournalError::Io(e),
        })?;
        let descriptor = Descriptor::parse(&header)?;

        let max_segment_size = u64::from(descriptor.max_segment_size());
        if file.metadata()?.len() < max_segment_size {
            file.set_len(max_segment_size)?;
        }

        let storage = Storage::open(file, options.storage_level)?;
        let segment = Self::with_state(
            path,
            descriptor,
            options,
            storage,
            DESCRIPTOR_BYTES as u64,
            max_segment_size,
        );
        segment.scan()?;

        debug!(
            path = %path.display(),
            id = segment.id,
            first_index = segment.first_index,
            last_index = segment.last_index(),
            "Loaded journal segment"
        );

        Ok(segment)
    }

    fn with_state(
        path: &Path,
        descriptor: Descriptor,
        options: SegmentOptions,
        storage: Storage,
        write_offset: u64,
        high_water: u64,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            id: descriptor.id(),
            first_index: descriptor.index(),
            max_segment_size: u64::from(descriptor.max_segment_size()),
            max_entries: descriptor.max_entries(),
            options,
            state: RwLock::new(SegmentState {
                storage: Some(storage),
                descriptor,
                index: SparseIndex::new(options.index_density),
                last_index: descriptor.index() - 1,
                write_offset,
                high_water,
                torn_tail: None,
            }),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SegmentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SegmentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn scan(&self) -> JournalResult<()> {
        let mut state = self.write_state();
        let codec = self.options.codec;
        let mut offset = DESCRIPTOR_BYTES as u64;
        let mut next_index = self.first_index;
        let mut positions = Vec::new();

        let failure = {
            let storage = state.storage(self.id)?;
            let mut buffer = FrameBuffer::default();
            buffer.reset(offset);
            let result = match storage {
                Storage::Disk(file) => {
                    let mut src = PositionalReader {
                        file,
                        offset,
                        end: self.max_segment_size,
                    };
                    scan_frames(&codec, &mut buffer, &mut src, self.max_entries, &mut positions)
                }
                Storage::Mapped { map, .. } => {
                    let mut src = &map[DESCRIPTOR_BYTES..];
                    scan_frames(&codec, &mut buffer, &mut src, self.max_entries, &mut positions)
                }
            };
            match result {
                Ok(()) => None,
                Err(JournalError::Corrupted { offset, detail }) => Some((offset, detail)),
                Err(e) => return Err(e),
            }
        };

        for (frame_offset, frame_len) in positions {
            state.index.record(next_index, frame_offset);
            next_index += 1;
            offset = frame_offset + frame_len as u64;
        }

        if let Some((bad_offset, detail)) = failure {
            let storage = state.storage(self.id)?;
            if !self.is_torn_tail(storage, offset)? {
                return Err(JournalError::Corrupted {
                    offset: bad_offset,
                    detail,
                });
            }
            warn!(
                path = %self.path.display(),
                offset = bad_offset,
                error = %detail,
                "Segment ends in a torn frame; truncating it"
            );
            state.torn_tail = Some((bad_offset, detail));
        }

        state.last_index = next_index - 1;
        state.write_offset = offset;
        Ok(())
    }

    /// `true` if the undecodable frame at `offset` is the last thing ever
    /// written to this segment: nothing decodable follows its declared
    /// extent.
    fn is_torn_tail(&self, storage: &Storage, offset: u64) -> JournalResult<bool> {
        let codec = &self.options.codec;
        let header_bytes = FRAME_HEADER_BYTES as u64;
        let max_frame = FRAME_HEADER_BYTES + codec.max_entry_size() as usize;
        let mut header = [0u8; FRAME_HEADER_BYTES];

        if offset + header_bytes > self.max_segment_size {
            return Ok(true);
        }
        storage.read_exact_at(&mut header, offset)?;
        let Some(frame_len) = codec.peek_frame_len(&header) else {
            return Ok(true);
        };
        let next = offset + frame_len as u64;
        if next + header_bytes > self.max_segment_size {
            return Ok(true);
        }

        storage.read_exact_at(&mut header, next)?;
        let Some(next_len) = codec.peek_frame_len(&header) else {
            return Ok(true);
        };
        if next_len > max_frame || next + next_len as u64 > self.max_segment_size {
            return Ok(true);
        }
        let mut bytes = vec![0u8; next_len];
        storage.read_exact_at(&mut bytes, next)?;
        Ok(!matches!(
            codec.decode_slice(&bytes, next),
            Ok(Decoded::Complete(_))
        ))
    }

    /// Where the load-time scan found a torn trailing frame, if it did.
    pub(crate) fn torn_tail(&self) -> Option<(u64, FrameCorruption)> {
        self.read_state().torn_tail
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Path of the segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Segment identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// First record index of the segment.
    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Last record index held, or `first_index - 1` when empty.
    pub fn last_index(&self) -> u64 {
        self.read_state().last_index
    }

    /// `true` if the segment holds no records.
    pub fn is_empty(&self) -> bool {
        self.last_index() < self.first_index
    }

    /// Number of records held.
    pub fn entry_count(&self) -> u64 {
        self.last_index() + 1 - self.first_index
    }

    /// Bytes in use, descriptor included.
    pub fn size(&self) -> u64 {
        self.read_state().write_offset
    }

    /// Maximum size of the segment file.
    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    /// Current descriptor, including the latest `updated` value.
    pub fn descriptor(&self) -> Descriptor {
        self.read_state().descriptor
    }

    /// `true` once the segment has been closed.
    pub fn is_closed(&self) -> bool {
        self.read_state().storage.is_none()
    }

    /// `true` if a frame of `frame_len` bytes can still be appended.
    pub fn has_room(&self, frame_len: usize) -> bool {
        let state = self.read_state();
        let entries = state.last_index + 1 - self.first_index;
        state.write_offset + frame_len as u64 <= self.max_segment_size
            && entries < u64::from(self.max_entries)
    }

    /// `true` if a frame of `frame_len` bytes fits in an empty segment of
    /// this size.
    pub fn fits_empty(max_segment_size: u64, frame_len: usize) -> bool {
        (DESCRIPTOR_BYTES + frame_len) as u64 <= max_segment_size
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write `frame` at the write cursor as the next record and return the
    /// offset it was written at.
    pub fn append_raw(&self, frame: &[u8]) -> JournalResult<u64> {
        let mut state = self.write_state();
        let offset = state.write_offset;
        let end = offset + frame.len() as u64;
        let entries = state.last_index + 1 - self.first_index;
        if end > self.max_segment_size || entries >= u64::from(self.max_entries) {
            return Err(JournalError::EntryTooLarge {
                size: frame.len(),
                limit: self.max_segment_size.saturating_sub(offset) as usize,
            });
        }

        let terminate = end < state.high_water && end + FRAME_HEADER_BYTES as u64 <= self.max_segment_size;
        let storage = state.storage_mut(self.id)?;
        if terminate {
            let mut bytes = Vec::with_capacity(frame.len() + FRAME_HEADER_BYTES);
            bytes.extend_from_slice(frame);
            bytes.extend_from_slice(&[0u8; FRAME_HEADER_BYTES]);
            storage.write_all_at(&bytes, offset)?;
        } else {
            storage.write_all_at(frame, offset)?;
        }

        let index = state.last_index + 1;
        state.index.record(index, offset);
        state.last_index = index;
        state.write_offset = end;
        state.high_water = state.high_water.max(end);
        Ok(offset)
    }

    /// Discard every record above `index`. Records are kept on disk until
    /// overwritten, but the header after the new tail is zeroed so they can
    /// never be read back.
    pub fn truncate(&self, index: u64) -> JournalResult<()> {
        let mut state = self.write_state();
        if index >= state.last_index {
            return Ok(());
        }
        let keep = index.max(self.first_index - 1);
        let offset = self.locate_locked(&state, keep + 1)?;

        let updated = now_millis();
        state.descriptor.set_updated(updated);
        let storage = state.storage_mut(self.id)?;
        if offset + FRAME_HEADER_BYTES as u64 <= self.max_segment_size {
            storage.write_all_at(&[0u8; FRAME_HEADER_BYTES], offset)?;
        }
        storage.write_all_at(&updated.to_be_bytes(), UPDATED_RANGE.start as u64)?;

        state.index.truncate(keep);
        state.last_index = keep;
        state.write_offset = offset;

        debug!(
            id = self.id,
            last_index = keep,
            offset,
            "Truncated journal segment"
        );
        Ok(())
    }

    /// Move the write cursor so the next append lands at `index`, without
    /// touching the bytes after it.
    pub fn reset_to(&self, index: u64) -> JournalResult<()> {
        let mut state = self.write_state();
        let target = index.max(self.first_index);
        if target > state.last_index + 1 {
            return Err(JournalError::IndexOutOfRange {
                index,
                first: self.first_index,
                last: state.last_index + 1,
            });
        }
        let offset = self.locate_locked(&state, target)?;
        state.index.truncate(target - 1);
        state.last_index = target - 1;
        state.write_offset = offset;
        Ok(())
    }

    /// Flush written data to stable storage.
    pub fn flush(&self) -> JournalResult<()> {
        let state = self.read_state();
        state.storage(self.id)?.flush()?;
        Ok(())
    }

    /// Release the file handle and memory map. Safe to call repeatedly.
    pub fn close(&self) {
        let mut state = self.write_state();
        if let Some(storage) = state.storage.take() {
            if let Err(e) = storage.flush() {
                warn!(path = %self.path.display(), error = %e, "Failed to flush segment on close");
            }
        }
    }

    /// Close the segment and remove its file.
    pub fn delete(&self) -> JournalResult<()> {
        self.close();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %self.path.display(), id = self.id, "Deleted journal segment");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Decode the frame at `offset`, using `buffer` for disk reads.
    ///
    /// Offsets at or past the write cursor yield [`Decoded::EndOfData`].
    /// On a complete frame the buffer's source offset is left just past it.
    pub fn read_at(&self, offset: u64, buffer: &mut FrameBuffer) -> JournalResult<Decoded> {
        let state = self.read_state();
        let storage = state.storage(self.id)?;
        let end = state.write_offset;
        if offset >= end {
            buffer.reset(offset);
            return Ok(Decoded::EndOfData);
        }

        match storage {
            Storage::Mapped { map, .. } => {
                let decoded = self
                    .options
                    .codec
                    .decode_slice(&map[offset as usize..end as usize], offset)?;
                let next = match &decoded {
                    Decoded::Complete(frame) => offset + frame.len as u64,
                    Decoded::Incomplete | Decoded::EndOfData => offset,
                };
                buffer.reset(next);
                Ok(decoded)
            }
            Storage::Disk(file) => {
                if buffer.source_offset() != offset || buffer.fill_offset() > end {
                    buffer.reset(offset);
                }
                let mut src = PositionalReader {
                    file,
                    offset: buffer.fill_offset(),
                    end,
                };
                buffer.read_frame(&self.options.codec, &mut src)
            }
        }
    }

    /// Byte offset of the frame for record `index`. For `last_index + 1`
    /// this is the write cursor. Returns `None` outside that range.
    pub fn locate(&self, index: u64) -> JournalResult<Option<u64>> {
        let state = self.read_state();
        if index < self.first_index || index > state.last_index + 1 {
            return Ok(None);
        }
        self.locate_locked(&state, index).map(Some)
    }

    fn locate_locked(&self, state: &SegmentState, index: u64) -> JournalResult<u64> {
        if index > state.last_index {
            return Ok(state.write_offset);
        }
        let (mut current, mut offset) = match state.index.lookup(index) {
            Some(position) => (position.index, position.offset),
            None => (self.first_index, DESCRIPTOR_BYTES as u64),
        };

        let storage = state.storage(self.id)?;
        let mut header = [0u8; FRAME_HEADER_BYTES];
        while current < index {
            storage.read_exact_at(&mut header, offset)?;
            let frame_len = self
                .options
                .codec
                .peek_frame_len(&header)
                .unwrap_or(FRAME_HEADER_BYTES);
            offset += frame_len as u64;
            current += 1;
        }
        Ok(offset)
    }

    /// Read the frame for record `index`.
    pub fn read_entry(&self, index: u64) -> JournalResult<Option<Frame>> {
        let Some(offset) = self.locate(index)? else {
            return Ok(None);
        };
        let mut buffer = FrameBuffer::with_capacity(FRAME_HEADER_BYTES);
        Ok(self.read_at(offset, &mut buffer)?.into_frame())
    }

    // -----------------------------------------------------------------------
    // Bulk transfer
    // -----------------------------------------------------------------------

    /// Copy up to `len` raw bytes starting at `start` into `dst`, stopping
    /// at the write cursor. Returns the number of bytes copied.
    pub fn copy_range<W: Write>(&self, start: u64, dst: &mut W, len: u64) -> JournalResult<u64> {
        let state = self.read_state();
        let storage = state.storage(self.id)?;
        let end = state.write_offset.min(start.saturating_add(len));
        if start >= end {
            return Ok(0);
        }

        match storage {
            Storage::Mapped { map, .. } => dst.write_all(&map[start as usize..end as usize])?,
            Storage::Disk(file) => {
                let mut chunk = vec![0u8; COPY_CHUNK_BYTES];
                let mut offset = start;
                while offset < end {
                    let n = (end - offset).min(COPY_CHUNK_BYTES as u64) as usize;
                    read_exact_at(file, &mut chunk[..n], offset)?;
                    dst.write_all(&chunk[..n])?;
                    offset += n as u64;
                }
            }
        }
        Ok(end - start)
    }

    /// Copy up to `len` raw bytes starting at `start` into `dst` at
    /// `dst_offset`, stopping at the write cursor. Returns the number of
    /// bytes copied.
    pub fn copy_range_to(&self, start: u64, dst: &File, dst_offset: u64, len: u64) -> JournalResult<u64> {
        let state = self.read_state();
        let storage = state.storage(self.id)?;
        let end = state.write_offset.min(start.saturating_add(len));
        if start >= end {
            return Ok(0);
        }

        let mut chunk = vec![0u8; COPY_CHUNK_BYTES];
        let mut offset = start;
        while offset < end {
            let n = (end - offset).min(COPY_CHUNK_BYTES as u64) as usize;
            storage.read_exact_at(&mut chunk[..n], offset)?;
            write_all_at(dst, &chunk[..n], dst_offset + (offset - start))?;
            offset += n as u64;
        }
        Ok(end - start)
    }

    /// Length of the segment file on disk.
    pub fn file_len(&self) -> JournalResult<u64> {
        let state = self.read_state();
        Ok(state.storage(self.id)?.file().metadata()?.len())
    }
}

fn scan_frames<R: Read>(
    codec: &FrameCodec,
    buffer: &mut FrameBuffer,
    src: &mut R,
    max_entries: u32,
    positions: &mut Vec<(u64, usize)>,
) -> JournalResult<()> {
    while positions.len() < max_entries as usize {
        let offset = buffer.source_offset();
        match buffer.read_frame(codec, src)? {
            Decoded::Complete(frame) => positions.push((offset, frame.len)),
            Decoded::Incomplete | Decoded::EndOfData => break,
        }
    }
    Ok(())
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
