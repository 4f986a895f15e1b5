//! Checksummed record codec.
//!
//! Every file the database writes is one record:
//!
//! ```text
//! magic "QVR\0" | version u32 | payload length u64 | crc32 u32 | bincode payload
//! ```
//!
//! Header integers are little-endian. A record whose magic, version, length
//! or checksum disagrees with its payload is rejected as corrupt, so torn or
//! foreign files are never mistaken for data.

use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{QuiverError, Result};

pub const RECORD_MAGIC: [u8; 4] = *b"QVR\0";
pub const RECORD_FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 4;

/// Extension of in-progress writes; such files are never read back.
pub const TEMP_EXTENSION: &str = "tmp";

/// Serialize `value` into a complete record.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)
        .map_err(|e| QuiverError::persistence(format!("couldn't encode record: {e}")))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.write_all(&RECORD_MAGIC)?;
    buf.write_u32::<LittleEndian>(RECORD_FORMAT_VERSION)?;
    buf.write_u64::<LittleEndian>(payload.len() as u64)?;
    buf.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Verify and deserialize a complete record.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(QuiverError::persistence(format!(
            "record truncated: {} bytes is shorter than the header",
            bytes.len()
        )));
    }

    let mut header = Cursor::new(&bytes[..HEADER_LEN]);
    let mut magic = [0u8; 4];
    header.read_exact(&mut magic)?;
    if magic != RECORD_MAGIC {
        return Err(QuiverError::persistence("not a quiver record (bad magic)"));
    }
    let version = header.read_u32::<LittleEndian>()?;
    if version != RECORD_FORMAT_VERSION {
        return Err(QuiverError::persistence(format!(
            "record format version mismatch: expected {RECORD_FORMAT_VERSION}, found {version}"
        )));
    }
    let length = header.read_u64::<LittleEndian>()?;
    let checksum = header.read_u32::<LittleEndian>()?;

    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != length {
        return Err(QuiverError::persistence(format!(
            "record length mismatch: header says {length} bytes, found {}",
            payload.len()
        )));
    }
    let actual = crc32fast::hash(payload);
    if actual != checksum {
        return Err(QuiverError::persistence(format!(
            "record checksum mismatch: expected {checksum:08x}, computed {actual:08x}"
        )));
    }

    bincode::deserialize(payload)
        .map_err(|e| QuiverError::persistence(format!("couldn't decode record: {e}")))
}

/// Write one record to a caller-supplied stream.
pub(crate) fn write_to<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let bytes = encode(value)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one record from a caller-supplied stream.
pub(crate) fn read_from<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    decode(&bytes)
}

/// Replace `path` with a record holding `value`.
///
/// The bytes go to a uniquely named sibling `*.tmp` file first, which is
/// optionally fsynced and then renamed over `path`. Readers observe either
/// the old record or the new one.
pub(crate) fn write_record_atomic<T: Serialize>(path: &Path, value: &T, sync: bool) -> Result<()> {
    let bytes = encode(value)?;
    let temp = temp_path(path);

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp)?;
        file.write_all(&bytes)?;
        if sync {
            file.sync_all()?;
        }
        Ok(())
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(QuiverError::persistence_io("couldn't write", &temp, e));
    }

    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(QuiverError::persistence_io("couldn't rename into", path, e));
    }
    Ok(())
}

/// Read and verify the record stored at `path`.
pub(crate) fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| QuiverError::persistence_io("couldn't read", path, e))?;
    decode(&bytes).map_err(|e| match e {
        QuiverError::Persistence(msg) => {
            QuiverError::persistence(format!("'{}': {msg}", path.display()))
        }
        other => other,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{}.{TEMP_EXTENSION}", uuid::Uuid::new_v4()))
}
