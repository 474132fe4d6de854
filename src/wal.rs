use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_RECORD_BYTES;
use crate::model::Event;

/// Length prefix plus trailing CRC.
const FRAME_OVERHEAD: u64 = 8;

/// Encode one appointment event as `[u32 len][bincode][u32 crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_RECORD_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "event exceeds record size limit"));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the log ended (cleanly or mid-record).
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next record and its size on disk. `Ok(None)` marks the end of
/// the usable log: EOF, a torn tail from a crash, an oversized length
/// prefix, a CRC mismatch or an undecodable payload.
fn decode_next(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_BYTES {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, len as u64 + FRAME_OVERHEAD)))
}

/// Every intact event from the start of the log, and the byte offset where
/// the intact prefix ends.
fn read_intact(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut offset = 0;
    while let Some((event, size)) = decode_next(&mut reader)? {
        events.push(event);
        offset += size;
    }
    Ok((events, offset))
}

/// Append-only log of appointment events for one salon.
///
/// Appends are buffered; `flush_sync` makes a whole batch durable with one
/// fsync. A batch that fails anywhere is cut back off the file with
/// `rollback`. Compaction writes a sibling `.wal.tmp` file and renames it
/// over the log.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    /// File length after the last successful `flush_sync`.
    durable_len: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path` for appending. Call on a log that
    /// went through `recover`, or appends may land behind a torn tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = Self::open_append(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            durable_len,
            appends_since_compact: 0,
        })
    }

    fn open_append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Append and fsync a single event.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without syncing. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.durable_len = self.writer.get_ref().metadata()?.len();
        Ok(())
    }

    /// Throw away everything since the last successful `flush_sync`: the
    /// unflushed buffer and any bytes of the batch that already reached the file.
    pub fn rollback(&mut self) -> io::Result<()> {
        let fresh = BufWriter::new(Self::open_append(&self.path)?);
        // `into_parts` hands back the file without flushing the buffer.
        let (file, _discarded) = std::mem::replace(&mut self.writer, fresh).into_parts();
        file.set_len(self.durable_len)?;
        file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write the compacted snapshot to the temp file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::tmp_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the log and reopen it for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::tmp_path(&self.path), &self.path)?;
        let file = Self::open_append(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every intact event from disk. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        read_intact(path).map(|(events, _)| events)
    }

    /// Replay the log and cut off anything after the last intact record,
    /// so later appends follow readable data.
    pub fn recover(path: &Path) -> io::Result<Vec<Event>> {
        let (events, intact) = read_intact(path)?;
        let on_disk = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(events),
            Err(e) => return Err(e),
        };
        if on_disk > intact {
            tracing::warn!(
                path = %path.display(),
                intact,
                discarded = on_disk - intact,
                "discarding unreadable WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(intact)?;
            file.sync_all()?;
        }
        Ok(events)
    }
}
