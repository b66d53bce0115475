//! Raw RGB frame log.
//!
//! Layout (little endian):
//!
//! ```text
//! header:  "IPCR" | version u8 | name_len u16 | device name (utf-8)
//! record:  width u32 | height u32 | sequence u64 | unix_ms u64 | len u32 | pixels
//! ```
//!
//! Records are appended in write order. A truncated trailing record (crash
//! mid-write) is ignored by `read_raw_artifact`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};

use super::{artifact_stem, MediaArtifact, MediaSink};
use crate::error::SinkError;
use crate::frame::Frame;

const RAW_MAGIC: &[u8; 4] = b"IPCR";
const RAW_VERSION: u8 = 1;
pub const RAW_EXTENSION: &str = "rgbraw";

/// Upper bound on suffixed names tried when an artifact name is taken.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Clone, Debug, Default)]
pub struct RawFileSink;

impl RawFileSink {
    pub fn new() -> Self {
        Self
    }
}

impl MediaSink for RawFileSink {
    fn create(
        &mut self,
        dir: &Path,
        device: &str,
        timestamp: DateTime<Local>,
    ) -> Result<Box<dyn MediaArtifact>, SinkError> {
        let create_err = |source| SinkError::CreateFailed {
            dir: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(create_err)?;

        let stem = artifact_stem(device, timestamp);
        let (path, file) = open_unique(dir, &stem).map_err(create_err)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, device).map_err(|source| SinkError::CreateFailed {
            dir: dir.to_path_buf(),
            source,
        })?;
        log::info!("RawFileSink: opened {}", path.display());
        Ok(Box::new(RawArtifact { path, writer }))
    }
}

struct RawArtifact {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl MediaArtifact for RawArtifact {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let unix_ms = frame
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let pixels = frame.pixels();
        let result = (|| {
            self.writer.write_all(&frame.width.to_le_bytes())?;
            self.writer.write_all(&frame.height.to_le_bytes())?;
            self.writer.write_all(&frame.sequence.to_le_bytes())?;
            self.writer.write_all(&unix_ms.to_le_bytes())?;
            self.writer.write_all(&(pixels.len() as u32).to_le_bytes())?;
            self.writer.write_all(pixels)
        })();
        result.map_err(|source| SinkError::WriteFailed {
            path: self.path.clone(),
            source,
        })
    }

    fn close(self: Box<Self>) -> Result<PathBuf, SinkError> {
        let RawArtifact { path, writer } = *self;
        let file = writer.into_inner().map_err(|e| SinkError::CloseFailed {
            path: path.clone(),
            source: e.into_error(),
        })?;
        file.sync_all().map_err(|source| SinkError::CloseFailed {
            path: path.clone(),
            source,
        })?;
        log::info!("RawFileSink: closed {}", path.display());
        Ok(path)
    }
}

fn open_unique(dir: &Path, stem: &str) -> std::io::Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}.{}", stem, RAW_EXTENSION)
        } else {
            format!("{}_{}.{}", stem, attempt, RAW_EXTENSION)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free artifact name for {}", stem),
    ))
}

fn write_header(writer: &mut impl Write, device: &str) -> std::io::Result<()> {
    let name = device.as_bytes();
    let name_len = u16::try_from(name.len())
        .map_err(|_| std::io::Error::new(ErrorKind::InvalidInput, "device name too long"))?;
    writer.write_all(RAW_MAGIC)?;
    writer.write_all(&[RAW_VERSION])?;
    writer.write_all(&name_len.to_le_bytes())?;
    writer.write_all(name)
}

// ----------------------------------------------------------------------------
// Reading back (tooling and tests)
// ----------------------------------------------------------------------------

/// Metadata of one recorded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrameRecord {
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub unix_ms: u64,
    pub byte_len: u32,
}

/// Parse an artifact written by `RawFileSink`. Returns the device name and frame records.
pub fn read_raw_artifact(path: &Path) -> Result<(String, Vec<RawFrameRecord>)> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;

    if bytes.len() < 7 || &bytes[..4] != RAW_MAGIC {
        return Err(anyhow!("{} is not a raw recording", path.display()));
    }
    if bytes[4] != RAW_VERSION {
        return Err(anyhow!("unsupported raw recording version {}", bytes[4]));
    }
    let name_len = u16::from_le_bytes([bytes[5], bytes[6]]) as usize;
    let mut cursor = 7;
    let name = bytes
        .get(cursor..cursor + name_len)
        .ok_or_else(|| anyhow!("truncated header"))?;
    let device = String::from_utf8(name.to_vec())?;
    cursor += name_len;

    const RECORD_HEADER: usize = 4 + 4 + 8 + 8 + 4;
    let mut records = Vec::new();
    while cursor + RECORD_HEADER <= bytes.len() {
        let h = &bytes[cursor..cursor + RECORD_HEADER];
        let record = RawFrameRecord {
            width: u32::from_le_bytes(h[0..4].try_into()?),
            height: u32::from_le_bytes(h[4..8].try_into()?),
            sequence: u64::from_le_bytes(h[8..16].try_into()?),
            unix_ms: u64::from_le_bytes(h[16..24].try_into()?),
            byte_len: u32::from_le_bytes(h[24..28].try_into()?),
        };
        let end = cursor + RECORD_HEADER + record.byte_len as usize;
        if end > bytes.len() {
            break;
        }
        records.push(record);
        cursor = end;
    }
    Ok((device, records))
}
