//! Binary storage for vector files.
//!
//! The same layout holds two kinds of file: raw embedding matrices
//! (`embedded/<corpus>_embeddings.bin`) and built indexes
//! (`index/<corpus>.index`, normalized rows).
//!
//! Header (48 bytes):
//! - version: u8 (2)
//! - kind: u8 (1 = index, 2 = embeddings)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, in row order):
//! - row_id: u64 (little-endian)
//! - vector: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::FlatIndex;
use crate::verses::temp_path_for;

/// Current file format version
const FORMAT_VERSION: u8 = 2;

/// Header size in bytes: version(1) + kind(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 48;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Wrong kind of vector file: expected {expected:?}, found {got:?}")]
    KindMismatch { expected: VectorKind, got: VectorKind },
}

/// What a vector file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Index = 1,
    Embeddings = 2,
}

impl VectorKind {
    fn from_byte(byte: u8) -> Result<Self, VectorStorageError> {
        match byte {
            1 => Ok(VectorKind::Index),
            2 => Ok(VectorKind::Embeddings),
            other => Err(VectorStorageError::InvalidFormat(format!(
                "unknown vector file kind {other}"
            ))),
        }
    }
}

/// Header fields of a stored vector file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredHeader {
    pub version: u8,
    pub kind: VectorKind,
    pub model_id: [u8; 32],
    pub dimensions: u16,
    pub entry_count: u64,
}

/// Raw embedding matrix read back from disk, in row order.
#[derive(Debug, Clone)]
pub struct StoredEmbeddings {
    pub row_ids: Vec<u64>,
    pub vectors: Vec<Vec<f32>>,
}

/// Storage manager for one vector file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and checksum the header only.
    pub fn header(&self) -> Result<StoredHeader, VectorStorageError> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        read_header(&mut reader)
    }

    /// Open the file and validate its header against the expected kind,
    /// model and dimensions and against the file length, so the entry
    /// count can be trusted for allocation.
    fn open_checked(
        &self,
        kind: VectorKind,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(BufReader<File>, StoredHeader), VectorStorageError> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader)?;
        validate_header(&header, kind, expected_model_id, expected_dimensions)?;

        let entry_size = 8 + 4 * header.dimensions as u64;
        let expected_len = header
            .entry_count
            .checked_mul(entry_size)
            .and_then(|body| body.checked_add(HEADER_SIZE as u64));
        if expected_len != Some(file_len) {
            return Err(VectorStorageError::InvalidFormat(format!(
                "header says {} entries of {} dimensions, file is {} bytes",
                header.entry_count, header.dimensions, file_len
            )));
        }

        Ok((reader, header))
    }

    /// Load a built index.
    pub fn load_index(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<FlatIndex, VectorStorageError> {
        let (mut reader, header) = self.open_checked(VectorKind::Index, expected_model_id, expected_dimensions)?;

        let dimensions = header.dimensions as usize;
        let count = header.entry_count as usize;
        let mut row_ids = Vec::with_capacity(count);
        let mut vectors = Vec::with_capacity(count * dimensions);

        for _ in 0..count {
            let (row_id, vector) = read_entry(&mut reader, dimensions)?;
            row_ids.push(row_id);
            vectors.extend(vector);
        }
        ensure_eof(&mut reader)?;

        Ok(FlatIndex::from_parts(dimensions, row_ids, vectors))
    }

    /// Save a built index.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save_index(&self, index: &FlatIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let header = new_header(VectorKind::Index, model_id, index.dimensions(), index.len())?;
        self.write_atomic(&header, index.iter())
    }

    /// Load a raw embedding matrix.
    pub fn load_embeddings(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<StoredEmbeddings, VectorStorageError> {
        let (mut reader, header) =
            self.open_checked(VectorKind::Embeddings, expected_model_id, expected_dimensions)?;

        let count = header.entry_count as usize;
        let mut stored = StoredEmbeddings {
            row_ids: Vec::with_capacity(count),
            vectors: Vec::with_capacity(count),
        };
        for _ in 0..count {
            let (row_id, vector) = read_entry(&mut reader, header.dimensions as usize)?;
            stored.row_ids.push(row_id);
            stored.vectors.push(vector);
        }
        ensure_eof(&mut reader)?;

        Ok(stored)
    }

    /// Save a raw embedding matrix, one vector per row id.
    pub fn save_embeddings(
        &self,
        row_ids: &[u64],
        vectors: &[Vec<f32>],
        dimensions: usize,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        if row_ids.len() != vectors.len() {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{} row ids for {} vectors",
                row_ids.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(VectorStorageError::DimensionMismatch {
                expected: dimensions,
                got: bad.len(),
            });
        }

        let header = new_header(VectorKind::Embeddings, model_id, dimensions, vectors.len())?;
        let entries = row_ids.iter().copied().zip(vectors.iter().map(|v| v.as_slice()));
        self.write_atomic(&header, entries)
    }

    fn write_atomic<'a>(
        &self,
        header: &StoredHeader,
        entries: impl Iterator<Item = (u64, &'a [f32])>,
    ) -> Result<(), VectorStorageError> {
        let temp_path = temp_path_for(&self.path);

        let result = write_to_file(&temp_path, header, entries);
        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn new_header(
    kind: VectorKind,
    model_id: &[u8; 32],
    dimensions: usize,
    count: usize,
) -> Result<StoredHeader, VectorStorageError> {
    let dimensions = u16::try_from(dimensions).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("{dimensions} dimensions do not fit the header"))
    })?;
    Ok(StoredHeader {
        version: FORMAT_VERSION,
        kind,
        model_id: *model_id,
        dimensions,
        entry_count: count as u64,
    })
}

fn write_to_file<'a>(
    path: &Path,
    header: &StoredHeader,
    entries: impl Iterator<Item = (u64, &'a [f32])>,
) -> Result<(), VectorStorageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write_header(&mut writer, header)?;

    let mut written = 0u64;
    for (row_id, vector) in entries {
        writer.write_all(&row_id.to_le_bytes())?;
        for &value in vector {
            writer.write_all(&value.to_le_bytes())?;
        }
        written += 1;
    }
    if written != header.entry_count {
        return Err(VectorStorageError::InvalidFormat(format!(
            "header says {} entries, wrote {}",
            header.entry_count, written
        )));
    }

    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(())
}

fn write_header(writer: &mut impl Write, header: &StoredHeader) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1] = header.kind as u8;
    header_bytes[2..34].copy_from_slice(&header.model_id);
    header_bytes[34..36].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[36..44].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..44]);
    header_bytes[44..48].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_header(reader: &mut impl Read) -> Result<StoredHeader, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(truncated)?;

    let version = header_bytes[0];
    if version != FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes([
        header_bytes[44],
        header_bytes[45],
        header_bytes[46],
        header_bytes[47],
    ]);
    if stored_checksum != crc32fast::hash(&header_bytes[0..44]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    let kind = VectorKind::from_byte(header_bytes[1])?;

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[2..34]);

    let dimensions = u16::from_le_bytes([header_bytes[34], header_bytes[35]]);
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header_bytes[36..44]);

    Ok(StoredHeader {
        version,
        kind,
        model_id,
        dimensions,
        entry_count: u64::from_le_bytes(count_bytes),
    })
}

fn validate_header(
    header: &StoredHeader,
    expected_kind: VectorKind,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), VectorStorageError> {
    if header.kind != expected_kind {
        return Err(VectorStorageError::KindMismatch {
            expected: expected_kind,
            got: header.kind,
        });
    }

    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn read_entry(reader: &mut impl Read, dimensions: usize) -> Result<(u64, Vec<f32>), VectorStorageError> {
    let mut id_bytes = [0u8; 8];
    reader.read_exact(&mut id_bytes).map_err(truncated)?;

    let mut vector_bytes = vec![0u8; dimensions * 4];
    reader.read_exact(&mut vector_bytes).map_err(truncated)?;
    let vector = vector_bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok((u64::from_le_bytes(id_bytes), vector))
}

fn ensure_eof(reader: &mut impl Read) -> Result<(), VectorStorageError> {
    let mut extra = [0u8; 1];
    if reader.read(&mut extra)? != 0 {
        return Err(VectorStorageError::InvalidFormat(
            "trailing bytes after last entry".to_string(),
        ));
    }
    Ok(())
}

fn truncated(e: std::io::Error) -> VectorStorageError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        VectorStorageError::InvalidFormat("file is truncated".to_string())
    } else {
        VectorStorageError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::with_capacity(3, 0);
        index.add(0, vec![1.0, 0.0, 0.0]).unwrap();
        index.add(1, vec![0.0, 2.0, 0.0]).unwrap();
        index.add(2, vec![0.0, 0.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_save_and_load_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("empty.index"));
        let model_id = test_model_id();

        storage.save_index(&FlatIndex::with_capacity(384, 0), &model_id).unwrap();
        assert!(storage.exists());

        let loaded = storage.load_index(&model_id, 384).unwrap();
        assert_eq!(loaded.len(), 0);
        assert_eq!(loaded.dimensions(), 384);
    }

    #[test]
    fn test_save_and_load_index_keeps_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("bible.index"));
        let model_id = test_model_id();

        storage.save_index(&sample_index(), &model_id).unwrap();

        let loaded = storage.load_index(&model_id, 3).unwrap();
        assert_eq!(loaded.row_ids(), &[0, 1, 2]);
        assert_eq!(loaded.iter().nth(1), Some((1, &[0.0, 1.0, 0.0][..])));
        assert_eq!(loaded.zero_rows(), 1);

        let header = storage.header().unwrap();
        assert_eq!(header.kind, VectorKind::Index);
        assert_eq!(header.entry_count, 3);
    }

    #[test]
    fn test_save_and_load_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("bible_embeddings.bin"));
        let model_id = test_model_id();

        let vectors = vec![vec![3.0, 4.0], vec![-1.5, 0.25]];
        storage.save_embeddings(&[0, 1], &vectors, 2, &model_id).unwrap();

        let loaded = storage.load_embeddings(&model_id, 2).unwrap();
        assert_eq!(loaded.row_ids, vec![0, 1]);
        assert_eq!(loaded.vectors, vectors);
    }

    #[test]
    fn test_save_embeddings_rejects_ragged_input() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("x.bin"));
        let model_id = test_model_id();

        let result = storage.save_embeddings(&[0, 1], &[vec![1.0, 0.0]], 2, &model_id);
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));

        let result = storage.save_embeddings(&[0], &[vec![1.0]], 2, &model_id);
        assert!(matches!(result, Err(VectorStorageError::DimensionMismatch { .. })));
        assert!(!storage.exists());
    }

    #[test]
    fn test_kind_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("bible.index"));
        let model_id = test_model_id();

        storage.save_index(&sample_index(), &model_id).unwrap();
        let result = storage.load_embeddings(&model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::KindMismatch { .. })));
    }

    #[test]
    fn test_model_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("bible.index"));
        storage.save_index(&FlatIndex::with_capacity(3, 0), &test_model_id()).unwrap();

        let mut wrong_model_id = [0u8; 32];
        wrong_model_id[0] = 0xFF;

        let result = storage.load_index(&wrong_model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::ModelMismatch)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("bible.index"));
        let model_id = test_model_id();
        storage.save_index(&FlatIndex::with_capacity(3, 0), &model_id).unwrap();

        let result = storage.load_index(&model_id, 384);
        assert!(matches!(result, Err(VectorStorageError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_atomic_write_cleans_up_on_error() {
        let path = PathBuf::from("/nonexistent/directory/bible.index");
        let storage = VectorStorage::new(path.clone());

        let result = storage.save_index(&FlatIndex::with_capacity(3, 0), &test_model_id());

        assert!(result.is_err());
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        use std::io::{Seek, SeekFrom};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bible.index");
        let storage = VectorStorage::new(path.clone());
        let model_id = test_model_id();
        storage.save_index(&sample_index(), &model_id).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let result = storage.load_index(&model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::ChecksumMismatch)));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bible.index");
        let storage = VectorStorage::new(path.clone());
        let model_id = test_model_id();
        storage.save_index(&sample_index(), &model_id).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let result = storage.load_index(&model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));

        std::fs::write(&path, &bytes[..20]).unwrap();
        let result = storage.load_index(&model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));
    }

    #[test]
    fn test_entry_count_must_match_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bible.index");
        let storage = VectorStorage::new(path.clone());
        let model_id = test_model_id();

        let header = StoredHeader {
            version: FORMAT_VERSION,
            kind: VectorKind::Index,
            model_id,
            dimensions: 3,
            entry_count: u64::MAX / 4,
        };
        let mut bytes = Vec::new();
        write_header(&mut bytes, &header).unwrap();
        bytes.extend_from_slice(&[0u8; 20]);
        std::fs::write(&path, &bytes).unwrap();

        let result = storage.load_index(&model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));

        let header = StoredHeader {
            kind: VectorKind::Embeddings,
            entry_count: u64::MAX,
            ..header
        };
        let mut bytes = Vec::new();
        write_header(&mut bytes, &header).unwrap();
        std::fs::write(&path, &bytes).unwrap();

        let result = storage.load_embeddings(&model_id, 3);
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bible.index");
        let storage = VectorStorage::new(path.clone());
        storage.save_index(&FlatIndex::with_capacity(3, 0), &test_model_id()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = 1;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            storage.header(),
            Err(VectorStorageError::VersionMismatch(1, FORMAT_VERSION))
        ));
    }
}
