use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Intent record for a multi-collection commit: the files whose staged
/// `<name>.tmp` copies must all be renamed into place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: Ulid,
    pub files: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum JournalState {
    /// No commit in flight.
    Absent,
    /// Journal present but incomplete or failing its checksum: the commit
    /// never reached the rename phase.
    Torn,
    /// Commit reached the rename phase and must be rolled forward.
    Pending(CommitRecord),
}

/// Encode a record as `[len][bincode][crc32]`.
fn encode_record(writer: &mut impl Write, record: &CommitRecord) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Single-record commit journal living next to the collection files.
///
/// Format: `[u32: len][bincode: CommitRecord][u32: crc32]`.
/// A journal that is truncated or fails its CRC is reported as torn.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably record the intent to publish `record.files`.
    pub fn begin(&self, record: &CommitRecord) -> io::Result<()> {
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        encode_record(&mut writer, record)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Mark the in-flight commit as done.
    pub fn finish(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn read(&self) -> io::Result<JournalState> {
        let mut bytes = Vec::new();
        match File::open(&self.path) {
            Ok(mut f) => f.read_to_end(&mut bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(JournalState::Absent),
            Err(e) => return Err(e),
        };

        if bytes.len() < 4 {
            return Ok(JournalState::Torn);
        }
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let Some(payload) = bytes.get(4..4 + len) else {
            return Ok(JournalState::Torn);
        };
        let Some(crc_bytes) = bytes.get(4 + len..8 + len) else {
            return Ok(JournalState::Torn);
        };
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if stored_crc != crc32fast::hash(payload) {
            return Ok(JournalState::Torn);
        }

        match bincode::deserialize::<CommitRecord>(payload) {
            Ok(record) => Ok(JournalState::Pending(record)),
            Err(_) => Ok(JournalState::Torn),
        }
    }
}
