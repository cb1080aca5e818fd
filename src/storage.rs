//! File-manager abstraction between the index and blob storage.
//!
//! The index never touches paths directly: raw column batches come in through
//! [`FileManager::cache_raw_data_to_memory`], serialized index buffers go out
//! through [`FileManager::add_file`] and come back through
//! [`FileManager::load_index_to_memory`]. [`LocalFileManager`] is the
//! directory-backed implementation used by tests and embedded deployments.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::FieldType;
use crate::error::{GeoCellError, Result};
use crate::format::BinarySet;

/// One batch of column values with optional per-row validity.
#[derive(Debug, Clone)]
pub struct FieldBatch {
    field_type: FieldType,
    values: Vec<Bytes>,
    validity: Option<Vec<bool>>,
}

impl FieldBatch {
    /// Batch where every row is valid.
    pub fn new(field_type: FieldType, values: Vec<Bytes>) -> Self {
        Self {
            field_type,
            values,
            validity: None,
        }
    }

    /// Batch with an explicit validity flag per row.
    pub fn with_validity(
        field_type: FieldType,
        values: Vec<Bytes>,
        validity: Vec<bool>,
    ) -> Result<Self> {
        if values.len() != validity.len() {
            return Err(GeoCellError::InvalidConfig(format!(
                "validity length {} does not match {} rows",
                validity.len(),
                values.len()
            )));
        }
        Ok(Self {
            field_type,
            values,
            validity: Some(validity),
        })
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn num_rows(&self) -> usize {
        self.values.len()
    }

    /// Whether the row holds a value; rows without validity info are valid.
    pub fn is_valid(&self, row: usize) -> bool {
        self.validity.as_ref().map_or(true, |v| v[row])
    }

    pub fn value(&self, row: usize) -> &Bytes {
        &self.values[row]
    }
}

/// Storage collaborator the index reads batches from and uploads buffers to.
pub trait FileManager: Send + Sync {
    /// Read raw column blobs into memory as field batches.
    fn cache_raw_data_to_memory(&self, paths: &[String]) -> Result<Vec<FieldBatch>>;

    /// Read serialized index blobs into a keyed binary set.
    fn load_index_to_memory(&self, paths: &[String]) -> Result<BinarySet>;

    /// Persist every buffer of a binary set.
    fn add_file(&mut self, set: &BinarySet) -> Result<()>;

    /// Paths and sizes of everything persisted through this manager.
    fn remote_paths_to_size(&self) -> Vec<(String, u64)>;
}

/// File manager rooted at a local directory.
pub struct LocalFileManager {
    root: PathBuf,
    uploaded: Vec<(String, u64)>,
}

impl LocalFileManager {
    /// Create a manager rooted at `root`, creating the directory if needed.
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            uploaded: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a raw column batch blob and return its path key.
    pub fn write_raw_batch(&self, name: &str, batch: &FieldBatch) -> Result<String> {
        let data = encode_field_batch(batch);
        fs::write(self.root.join(name), &data)?;
        Ok(name.to_string())
    }
}

impl FileManager for LocalFileManager {
    fn cache_raw_data_to_memory(&self, paths: &[String]) -> Result<Vec<FieldBatch>> {
        let mut batches = Vec::with_capacity(paths.len());
        for path in paths {
            let data = fs::read(self.root.join(path))?;
            batches.push(decode_field_batch(&data)?);
        }
        Ok(batches)
    }

    fn load_index_to_memory(&self, paths: &[String]) -> Result<BinarySet> {
        let mut set = BinarySet::new();
        for path in paths {
            let data = fs::read(self.root.join(path))?;
            set.append(path.clone(), Bytes::from(data));
        }
        Ok(set)
    }

    fn add_file(&mut self, set: &BinarySet) -> Result<()> {
        for (key, data) in set.iter() {
            fs::write(self.root.join(key), data)?;
            self.uploaded.push((key.clone(), data.len() as u64));
        }
        Ok(())
    }

    fn remote_paths_to_size(&self) -> Vec<(String, u64)> {
        self.uploaded.clone()
    }
}

/// Encode a field batch blob: field type code, row count, then per row a
/// validity byte, a 4-byte length, and the payload. Little-endian throughout.
pub fn encode_field_batch(batch: &FieldBatch) -> Bytes {
    let payload: usize = (0..batch.num_rows())
        .map(|row| 1 + 4 + batch.value(row).len())
        .sum();
    let mut buf = BytesMut::with_capacity(1 + 8 + payload);
    buf.put_u8(batch.field_type().code());
    buf.put_u64_le(batch.num_rows() as u64);
    for row in 0..batch.num_rows() {
        buf.put_u8(batch.is_valid(row) as u8);
        let value = batch.value(row);
        buf.put_u32_le(value.len() as u32);
        buf.put_slice(value);
    }
    buf.freeze()
}

/// Decode a field batch blob written by [`encode_field_batch`].
pub fn decode_field_batch(data: &[u8]) -> Result<FieldBatch> {
    let mut buf = data;
    if buf.remaining() < 1 + 8 {
        return Err(GeoCellError::CorruptIndex(
            "truncated field batch header".to_string(),
        ));
    }
    let field_type = FieldType::from_code(buf.get_u8())?;
    let num_rows = buf.get_u64_le() as usize;
    let mut values = Vec::with_capacity(num_rows);
    let mut validity = Vec::with_capacity(num_rows);
    for _ in 0..num_rows {
        if buf.remaining() < 1 + 4 {
            return Err(GeoCellError::CorruptIndex(
                "truncated field batch row".to_string(),
            ));
        }
        let valid = buf.get_u8() != 0;
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len {
            return Err(GeoCellError::CorruptIndex(
                "truncated field batch payload".to_string(),
            ));
        }
        values.push(buf.copy_to_bytes(len));
        validity.push(valid);
    }
    FieldBatch::with_validity(field_type, values, validity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> FieldBatch {
        FieldBatch::with_validity(
            FieldType::Geospatial,
            vec![
                Bytes::from_static(b"first"),
                Bytes::new(),
                Bytes::from_static(b"third"),
            ],
            vec![true, false, true],
        )
        .unwrap()
    }

    #[test]
    fn test_field_batch_codec_round_trip() {
        let batch = sample_batch();
        let decoded = decode_field_batch(&encode_field_batch(&batch)).unwrap();

        assert_eq!(decoded.field_type(), FieldType::Geospatial);
        assert_eq!(decoded.num_rows(), 3);
        for row in 0..3 {
            assert_eq!(decoded.is_valid(row), batch.is_valid(row));
            assert_eq!(decoded.value(row), batch.value(row));
        }
    }

    #[test]
    fn test_field_batch_truncation_is_corrupt() {
        let encoded = encode_field_batch(&sample_batch());
        assert!(decode_field_batch(&encoded[..encoded.len() - 2]).is_err());
        assert!(decode_field_batch(&encoded[..4]).is_err());
    }

    #[test]
    fn test_validity_length_mismatch_rejected() {
        let result = FieldBatch::with_validity(
            FieldType::Geospatial,
            vec![Bytes::from_static(b"one")],
            vec![true, false],
        );
        assert!(matches!(result, Err(GeoCellError::InvalidConfig(_))));
    }

    #[test]
    fn test_local_file_manager_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = LocalFileManager::new(dir.path()).unwrap();

        let path = manager.write_raw_batch("batch_0", &sample_batch()).unwrap();
        let batches = manager.cache_raw_data_to_memory(&[path]).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 3);

        let mut set = BinarySet::new();
        set.append("INDEX_NUM_ROWS", Bytes::from_static(b"12345678"));
        manager.add_file(&set).unwrap();

        let sizes = manager.remote_paths_to_size();
        assert_eq!(sizes, vec![("INDEX_NUM_ROWS".to_string(), 8)]);

        let loaded = manager
            .load_index_to_memory(&["INDEX_NUM_ROWS".to_string()])
            .unwrap();
        assert_eq!(
            loaded.get("INDEX_NUM_ROWS").unwrap().as_ref(),
            b"12345678"
        );
    }
}
