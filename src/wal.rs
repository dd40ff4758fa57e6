//! Append-only event log.
//!
//! Each record is `[u32 len][bincode Event][u32 crc32]`, little endian, where
//! `len` counts the bincode payload only. A crash can leave a torn record at
//! the tail; `Wal::open` cuts the file back to the last intact record so new
//! appends never land behind garbage.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const HEADER_LEN: u64 = 4;
const TRAILER_LEN: u64 = 4;
/// Larger length prefixes can only come from corruption.
const MAX_RECORD_LEN: usize = 16 << 20;

fn write_record(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large for one record"))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

/// Outcome of reading one record.
enum Record {
    Intact { event: Event, size: u64 },
    /// Clean end of file.
    End,
    /// Short read, CRC mismatch or undecodable payload.
    Torn(String),
}

/// `read_exact` that reports a short read as `Ok(false)`.
fn fill(input: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_record(input: &mut impl Read) -> io::Result<Record> {
    let mut header = [0u8; HEADER_LEN as usize];
    let mut got = 0;
    while got < header.len() {
        match input.read(&mut header[got..])? {
            0 if got == 0 => return Ok(Record::End),
            0 => return Ok(Record::Torn("partial length prefix".into())),
            n => got += n,
        }
    }
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(Record::Torn(format!("implausible record length {len}")));
    }

    let mut payload = vec![0u8; len];
    if !fill(input, &mut payload)? {
        return Ok(Record::Torn("short payload".into()));
    }
    let mut trailer = [0u8; TRAILER_LEN as usize];
    if !fill(input, &mut trailer)? {
        return Ok(Record::Torn("missing checksum".into()));
    }
    if u32::from_le_bytes(trailer) != crc32fast::hash(&payload) {
        return Ok(Record::Torn("checksum mismatch".into()));
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Record::Intact {
            event,
            size: HEADER_LEN + len as u64 + TRAILER_LEN,
        }),
        Err(e) => Ok(Record::Torn(format!("undecodable payload: {e}"))),
    }
}

/// Intact events in file order plus the byte length they cover.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut input = BufReader::new(file);
    let mut events = Vec::new();
    let mut good_len = 0u64;
    loop {
        match read_record(&mut input)? {
            Record::Intact { event, size } => {
                events.push(event);
                good_len += size;
            }
            Record::End => break,
            Record::Torn(reason) => {
                tracing::warn!(path = %path.display(), offset = good_len, "wal: {reason}, dropping tail");
                break;
            }
        }
    }
    Ok((events, good_len))
}

pub struct Wal {
    file: File,
    path: PathBuf,
    /// Bytes known durable. A failed batch is cut back to this.
    committed_len: u64,
    appends_since_compact: u64,
    /// Write only this many bytes of the next batch, then fail.
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl Wal {
    /// Open or create the log, returning it with every intact event already
    /// on disk. A torn tail is truncated away first.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, good_len) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() > good_len {
            file.set_len(good_len)?;
            file.sync_all()?;
        }
        let wal = Self {
            file,
            path: path.to_path_buf(),
            committed_len: good_len,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_after: None,
        };
        Ok((wal, events))
    }

    /// Read-only view of the intact events, for inspection and tests.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }

    /// Append `events` as one unit and fsync. On any error the log is cut
    /// back to its length before the call, so a batch is either wholly
    /// durable or absent.
    pub fn append_batch<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        let mut bytes = Vec::new();
        let mut count = 0;
        for event in events {
            write_record(&mut bytes, event)?;
            count += 1;
        }
        if let Err(e) = self.write_durable(&bytes) {
            self.roll_back();
            return Err(e);
        }
        self.committed_len += bytes.len() as u64;
        self.appends_since_compact += count;
        Ok(())
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_batch([event])
    }

    fn write_durable(&mut self, bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.fail_after.take() {
            self.file.write_all(&bytes[..n.min(bytes.len())])?;
            return Err(io::Error::other("no space left on device"));
        }
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }

    fn roll_back(&mut self) {
        let truncated = self
            .file
            .set_len(self.committed_len)
            .and_then(|()| self.file.sync_all());
        if let Err(e) = truncated {
            tracing::error!(
                path = %self.path.display(),
                len = self.committed_len,
                "wal: could not cut back a failed batch: {e}"
            );
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.path.with_extension("wal.compact")
    }

    /// Replace the log with `events`: write a sibling file, fsync it, rename
    /// it over the log and reopen for appends. A crash before the rename
    /// leaves the old log in place.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp = self.snapshot_path();
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for event in events {
                write_record(&mut out, event)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        #[cfg(unix)]
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty())
            && let Err(e) = sync_dir(dir)
        {
            tracing::warn!(dir = %dir.display(), "wal: directory fsync after rename failed: {e}");
        }
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        self.appends_since_compact = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

/// Make a rename inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
