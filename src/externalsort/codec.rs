//! Spill file codec
//!
//! Writes and reads merged series data in the spill format:
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │ Header                                            │
//! │   TypeNameLen: i32 (4) | TypeName: UTF-8 (len)    │
//! ├───────────────────────────────────────────────────┤
//! │ Body (repeated)                                   │
//! │   Timestamp: i64 (8) | Value (width by type)      │
//! │   TEXT value = Len: i32 (4) | UTF-8 (len)         │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, TsError};
use crate::series::{DataType, SeriesReader, TimeValuePair, TypedValue};

/// Longest type name accepted in a header
const MAX_TYPE_NAME_LEN: usize = 64;

// =============================================================================
// Serializer
// =============================================================================

/// Writes pairs of one data type to a spill file
pub struct TimeValuePairSerializer {
    path: PathBuf,
    writer: BufWriter<File>,
    data_type: DataType,
    count: u64,
}

impl TimeValuePairSerializer {
    /// Create (or truncate) the file and write the header
    pub fn create(path: &Path, data_type: DataType) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);

        let name = data_type.name().as_bytes();
        writer.write_all(&(name.len() as i32).to_be_bytes())?;
        writer.write_all(name)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            data_type,
            count: 0,
        })
    }

    /// Append one pair; its value must have the file's data type
    pub fn write(&mut self, pair: &TimeValuePair) -> Result<()> {
        pair.value.expect_type(self.data_type)?;

        self.writer.write_all(&pair.timestamp.to_be_bytes())?;
        match &pair.value {
            TypedValue::Boolean(v) => self.writer.write_all(&[*v as u8])?,
            TypedValue::Int32(v) => self.writer.write_all(&v.to_be_bytes())?,
            TypedValue::Int64(v) => self.writer.write_all(&v.to_be_bytes())?,
            TypedValue::Float(v) => self.writer.write_all(&v.to_be_bytes())?,
            TypedValue::Double(v) => self.writer.write_all(&v.to_be_bytes())?,
            TypedValue::Text(v) => {
                self.writer.write_all(&(v.len() as i32).to_be_bytes())?;
                self.writer.write_all(v.as_bytes())?;
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Drain a reader into the file
    pub fn write_all_from(&mut self, reader: &mut dyn SeriesReader) -> Result<()> {
        while let Some(pair) = reader.next_pair()? {
            self.write(&pair)?;
        }
        Ok(())
    }

    /// Flush, sync and return the number of pairs written
    pub fn finish(self) -> Result<u64> {
        let file = self.writer.into_inner().map_err(|e| {
            TsError::Io(io::Error::new(
                e.error().kind(),
                format!("Failed to flush {}: {}", self.path.display(), e.error()),
            ))
        })?;
        file.sync_all()?;
        Ok(self.count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// =============================================================================
// Deserializer
// =============================================================================

/// Type-specific value decoder selected once from the header
type ValueDecoder = fn(&mut BufReader<File>) -> io::Result<TypedValue>;

/// Reads pairs back from a spill (or sealed) file
pub struct TimeValuePairDeserializer {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    data_type: DataType,
    decode: ValueDecoder,
    /// Temporary files are removed on close
    delete_on_close: bool,
}

impl TimeValuePairDeserializer {
    /// Open a persistent file; it survives `close()`
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, false)
    }

    /// Open a temporary spill file; `close()` deletes it
    pub fn open_temporary(path: &Path) -> Result<Self> {
        Self::open_with(path, true)
    }

    fn open_with(path: &Path, delete_on_close: bool) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let data_type = read_header(&mut reader, path)?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            data_type,
            decode: decoder_for(data_type),
            delete_on_close,
        })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_pair(&mut self) -> Result<Option<TimeValuePair>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };
        if reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let mut ts = [0u8; 8];
        reader
            .read_exact(&mut ts)
            .map_err(|e| truncated(e, &self.path, "timestamp"))?;
        let value = (self.decode)(reader).map_err(|e| truncated(e, &self.path, "value"))?;

        Ok(Some(TimeValuePair::new(i64::from_be_bytes(ts), value)))
    }

    fn remove_file(&self) -> io::Result<()> {
        fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "removed spill file");
        Ok(())
    }
}

impl SeriesReader for TimeValuePairDeserializer {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        self.read_pair()
    }

    fn close(&mut self) -> Result<()> {
        if self.reader.take().is_none() {
            return Ok(());
        }
        if self.delete_on_close {
            self.remove_file().map_err(|e| {
                TsError::Io(io::Error::new(
                    e.kind(),
                    format!(
                        "Delete external sort tmp file error. FilePath: {}: {}",
                        self.path.display(),
                        e
                    ),
                ))
            })?;
        }
        Ok(())
    }
}

impl Drop for TimeValuePairDeserializer {
    fn drop(&mut self) {
        if self.reader.take().is_some() && self.delete_on_close {
            if let Err(e) = self.remove_file() {
                warn!(path = %self.path.display(), error = %e, "failed to remove spill file");
            }
        }
    }
}

fn read_header(reader: &mut BufReader<File>, path: &Path) -> Result<DataType> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| truncated(e, path, "header length"))?;

    let len = i32::from_be_bytes(len_bytes);
    if len <= 0 || len as usize > MAX_TYPE_NAME_LEN {
        return Err(TsError::Corruption(format!(
            "{}: invalid type name length {}",
            path.display(),
            len
        )));
    }

    let mut name = vec![0u8; len as usize];
    reader
        .read_exact(&mut name)
        .map_err(|e| truncated(e, path, "header type name"))?;
    let name = String::from_utf8(name).map_err(|_| {
        TsError::Corruption(format!("{}: type name is not UTF-8", path.display()))
    })?;

    DataType::from_name(&name)
}

fn truncated(err: io::Error, path: &Path, what: &str) -> TsError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        TsError::TruncatedRecord(format!("{}: EOF while reading {}", path.display(), what))
    } else {
        TsError::Io(err)
    }
}

// =============================================================================
// Value decoders
// =============================================================================

fn decoder_for(data_type: DataType) -> ValueDecoder {
    match data_type {
        DataType::Boolean => read_boolean,
        DataType::Int32 => read_int32,
        DataType::Int64 => read_int64,
        DataType::Float => read_float,
        DataType::Double => read_double,
        DataType::Text => read_text,
    }
}

fn read_boolean(reader: &mut BufReader<File>) -> io::Result<TypedValue> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(TypedValue::Boolean(buf[0] != 0))
}

fn read_int32(reader: &mut BufReader<File>) -> io::Result<TypedValue> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(TypedValue::Int32(i32::from_be_bytes(buf)))
}

fn read_int64(reader: &mut BufReader<File>) -> io::Result<TypedValue> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(TypedValue::Int64(i64::from_be_bytes(buf)))
}

fn read_float(reader: &mut BufReader<File>) -> io::Result<TypedValue> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(TypedValue::Float(f32::from_be_bytes(buf)))
}

fn read_double(reader: &mut BufReader<File>) -> io::Result<TypedValue> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(TypedValue::Double(f64::from_be_bytes(buf)))
}

fn read_text(reader: &mut BufReader<File>) -> io::Result<TypedValue> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = i32::from_be_bytes(len);
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative text length {}", len),
        ));
    }

    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes)
        .map(TypedValue::Text)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
