//! Hierarchical binary container used for trajectories and analysis output.
//!
//! Layout: the 8-byte magic `MDSCNTR1`, compressed chunk blocks, a JSON index
//! describing datasets (dtype, shape, chunk hyperslabs and their byte ranges,
//! attributes) and groups (attributes only), then the index offset and length
//! as little-endian `u64` and the 8-byte trailer `MDSCEND1`.

use crate::domain::{AnalysisError, ErrorKind};
use flate2::Compression as Level;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const MAGIC: &[u8; 8] = b"MDSCNTR1";
pub const TRAILER: &[u8; 8] = b"MDSCEND1";
const FOOTER_LENGTH: u64 = 24;
const CHUNK_CACHE_SIZE: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid container index: {0}")]
    Index(#[from] serde_json::Error),
    #[error("'{0}' is not a container file")]
    NotAContainer(PathBuf),
    #[error("corrupted container: {0}")]
    Corrupt(String),
    #[error("no dataset named '{0}'")]
    UnknownDataset(String),
    #[error("dataset '{0}' already exists")]
    DuplicateDataset(String),
    #[error("invalid hyperslab for '{dataset}': {message}")]
    InvalidSlab { dataset: String, message: String },
    #[error("unknown compression '{0}', expected none, gzip or lzf")]
    UnknownCompression(String),
}

impl ContainerError {
    /// Maps onto the analysis error model, naming the file involved.
    pub fn into_analysis(self, path: &Path) -> AnalysisError {
        let message = format!("{}: {self}", path.display());
        match self {
            Self::Io(_) => AnalysisError::io("IO.CONTAINER", message),
            Self::Index(_) | Self::NotAContainer(_) | Self::Corrupt(_) => {
                AnalysisError::corrupted("IO.CORRUPTED_CONTAINER", message)
            }
            Self::UnknownDataset(_) => {
                AnalysisError::trajectory("TRAJECTORY.MISSING_VARIABLE", message)
            }
            Self::DuplicateDataset(_) | Self::InvalidSlab { .. } => {
                AnalysisError::internal("INTERNAL.CONTAINER", message)
            }
            Self::UnknownCompression(_) => {
                AnalysisError::new(ErrorKind::Job, "INPUT.COMPRESSION", message)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    /// LZF blocks from the `lzf` crate, each prefixed by a flag and the decoded length.
    Lzf,
}

impl Compression {
    pub fn parse(value: &str) -> Result<Self, ContainerError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "lzf" => Ok(Self::Lzf),
            other => Err(ContainerError::UnknownCompression(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Lzf => "lzf",
        }
    }

    fn encode(self, bytes: Vec<u8>) -> Result<Vec<u8>, ContainerError> {
        match self {
            Self::None => Ok(bytes),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Level::default());
                encoder.write_all(&bytes)?;
                Ok(encoder.finish()?)
            }
            Self::Lzf => Ok(lzf_block(&bytes)),
        }
    }

    fn decode(self, bytes: Vec<u8>) -> Result<Vec<u8>, ContainerError> {
        match self {
            Self::None => Ok(bytes),
            Self::Gzip => {
                let mut decoded = Vec::new();
                GzDecoder::new(bytes.as_slice()).read_to_end(&mut decoded)?;
                Ok(decoded)
            }
            Self::Lzf => unlzf_block(&bytes),
        }
    }
}

const LZF_STORED: u8 = 0;
const LZF_PACKED: u8 = 1;
const LZF_HEADER: usize = 9;

/// One LZF block: a flag byte, the decoded length as little-endian `u64`,
/// then the payload. Incompressible chunks are stored as they are.
fn lzf_block(bytes: &[u8]) -> Vec<u8> {
    let (flag, payload) = match lzf::compress(bytes) {
        Ok(packed) if packed.len() < bytes.len() => (LZF_PACKED, packed),
        _ => (LZF_STORED, bytes.to_vec()),
    };
    let mut block = Vec::with_capacity(LZF_HEADER + payload.len());
    block.push(flag);
    block.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    block.extend_from_slice(&payload);
    block
}

fn unlzf_block(block: &[u8]) -> Result<Vec<u8>, ContainerError> {
    if block.len() < LZF_HEADER {
        return Err(ContainerError::Corrupt(format!("lzf block of {} bytes", block.len())));
    }
    let mut length = [0u8; 8];
    length.copy_from_slice(&block[1..LZF_HEADER]);
    let length = u64::from_le_bytes(length) as usize;
    let payload = &block[LZF_HEADER..];
    match block[0] {
        LZF_STORED if payload.len() == length => Ok(payload.to_vec()),
        LZF_PACKED => lzf::decompress(payload, length)
            .map_err(|error| ContainerError::Corrupt(format!("lzf payload: {error:?}"))),
        flag => Err(ContainerError::Corrupt(format!(
            "lzf block with flag {flag} and {} payload bytes for {length}",
            payload.len()
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    F64,
    F32,
}

impl Dtype {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "float64" | "f64" => Some(Self::F64),
            "float32" | "f32" => Some(Self::F32),
            _ => None,
        }
    }

    const fn size(self) -> usize {
        match self {
            Self::F64 => 8,
            Self::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub start: Vec<usize>,
    pub extent: Vec<usize>,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub compression: Compression,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl DatasetInfo {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerIndex {
    pub datasets: BTreeMap<String, DatasetInfo>,
    pub groups: BTreeMap<String, BTreeMap<String, Value>>,
}

fn normalize(name: &str) -> String {
    format!("/{}", name.trim_matches('/'))
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Visits every multi-index of `extent`, row-major.
fn for_each_index(extent: &[usize], mut visit: impl FnMut(&[usize])) {
    if extent.iter().any(|&e| e == 0) {
        return;
    }
    let mut index = vec![0; extent.len()];
    loop {
        visit(&index);
        let mut axis = extent.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < extent[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

fn check_slab(info: &DatasetInfo, name: &str, start: &[usize], extent: &[usize]) -> Result<(), ContainerError> {
    let invalid = |message: String| ContainerError::InvalidSlab {
        dataset: name.to_string(),
        message,
    };
    if start.len() != info.shape.len() || extent.len() != info.shape.len() {
        return Err(invalid(format!(
            "rank {} does not match dataset rank {}",
            start.len(),
            info.shape.len()
        )));
    }
    for axis in 0..start.len() {
        if start[axis] + extent[axis] > info.shape[axis] {
            return Err(invalid(format!(
                "axis {axis} range {}..{} exceeds {}",
                start[axis],
                start[axis] + extent[axis],
                info.shape[axis]
            )));
        }
    }
    Ok(())
}

pub struct ContainerWriter {
    path: PathBuf,
    file: BufWriter<File>,
    position: u64,
    index: ContainerIndex,
}

impl ContainerWriter {
    pub fn create(path: &Path) -> Result<Self, ContainerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(MAGIC)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            position: MAGIC.len() as u64,
            index: ContainerIndex::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create_dataset(
        &mut self,
        name: &str,
        dtype: Dtype,
        shape: &[usize],
        compression: Compression,
    ) -> Result<(), ContainerError> {
        let name = normalize(name);
        if self.index.datasets.contains_key(&name) {
            return Err(ContainerError::DuplicateDataset(name));
        }
        self.index.datasets.insert(
            name,
            DatasetInfo {
                dtype,
                shape: shape.to_vec(),
                compression,
                chunks: Vec::new(),
                attributes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        self.index.datasets.contains_key(&normalize(name))
    }

    pub fn set_attribute(&mut self, dataset: &str, key: &str, value: impl Into<Value>) -> Result<(), ContainerError> {
        let name = normalize(dataset);
        let info = self
            .index
            .datasets
            .get_mut(&name)
            .ok_or(ContainerError::UnknownDataset(name))?;
        info.attributes.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Shrinks a dataset along its leading axis; chunks beyond the new
    /// length are rejected.
    pub fn truncate_dataset(&mut self, dataset: &str, rows: usize) -> Result<(), ContainerError> {
        let name = normalize(dataset);
        let info = self
            .index
            .datasets
            .get_mut(&name)
            .ok_or_else(|| ContainerError::UnknownDataset(name.clone()))?;
        let overflow = info
            .chunks
            .iter()
            .any(|chunk| chunk.start.first().copied().unwrap_or(0) + chunk.extent.first().copied().unwrap_or(0) > rows);
        if info.shape.is_empty() || rows > info.shape[0] || overflow {
            return Err(ContainerError::InvalidSlab {
                dataset: name,
                message: format!("cannot truncate to {rows} rows"),
            });
        }
        info.shape[0] = rows;
        Ok(())
    }

    pub fn set_group_attribute(&mut self, group: &str, key: &str, value: impl Into<Value>) {
        self.index
            .groups
            .entry(normalize(group))
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Writes one hyperslab; `data` is row-major over `extent`.
    pub fn write_chunk(
        &mut self,
        dataset: &str,
        start: &[usize],
        extent: &[usize],
        data: &[f64],
    ) -> Result<(), ContainerError> {
        let name = normalize(dataset);
        let info = self
            .index
            .datasets
            .get(&name)
            .ok_or_else(|| ContainerError::UnknownDataset(name.clone()))?;
        check_slab(info, &name, start, extent)?;
        let expected: usize = extent.iter().product();
        if data.len() != expected {
            return Err(ContainerError::InvalidSlab {
                dataset: name,
                message: format!("{} values for a hyperslab of {expected}", data.len()),
            });
        }
        let mut bytes = Vec::with_capacity(data.len() * info.dtype.size());
        for value in data {
            match info.dtype {
                Dtype::F64 => bytes.extend_from_slice(&value.to_le_bytes()),
                Dtype::F32 => bytes.extend_from_slice(&(*value as f32).to_le_bytes()),
            }
        }
        let encoded = info.compression.encode(bytes)?;
        self.file.write_all(&encoded)?;
        let chunk = Chunk {
            start: start.to_vec(),
            extent: extent.to_vec(),
            offset: self.position,
            length: encoded.len() as u64,
        };
        self.position += encoded.len() as u64;
        if let Some(info) = self.index.datasets.get_mut(&name) {
            info.chunks.push(chunk);
        }
        Ok(())
    }

    /// Creates a dataset and writes it as a single chunk.
    pub fn write_dataset(
        &mut self,
        name: &str,
        shape: &[usize],
        data: &[f64],
        compression: Compression,
    ) -> Result<(), ContainerError> {
        self.create_dataset(name, Dtype::F64, shape, compression)?;
        let start = vec![0; shape.len()];
        self.write_chunk(name, &start, shape, data)
    }

    pub fn finish(mut self) -> Result<PathBuf, ContainerError> {
        let index = serde_json::to_vec(&self.index)?;
        self.file.write_all(&index)?;
        self.file.write_all(&self.position.to_le_bytes())?;
        self.file.write_all(&(index.len() as u64).to_le_bytes())?;
        self.file.write_all(TRAILER)?;
        self.file.flush()?;
        Ok(self.path)
    }
}

type CachedChunk = (String, usize, Arc<Vec<f64>>);

pub struct ContainerReader {
    path: PathBuf,
    file: Mutex<File>,
    index: ContainerIndex,
    cache: Mutex<VecDeque<CachedChunk>>,
}

impl std::fmt::Debug for ContainerReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("path", &self.path)
            .field("datasets", &self.index.datasets.len())
            .finish()
    }
}

impl ContainerReader {
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let mut file = File::open(path)?;
        let length = file.metadata()?.len();
        if length < MAGIC.len() as u64 + FOOTER_LENGTH {
            return Err(ContainerError::NotAContainer(path.to_path_buf()));
        }
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ContainerError::NotAContainer(path.to_path_buf()));
        }
        file.seek(SeekFrom::Start(length - FOOTER_LENGTH))?;
        let mut footer = [0u8; FOOTER_LENGTH as usize];
        file.read_exact(&mut footer)?;
        if &footer[16..] != TRAILER {
            return Err(ContainerError::Corrupt("missing trailer, file was not closed".to_string()));
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&footer[..8]);
        let index_offset = u64::from_le_bytes(word);
        word.copy_from_slice(&footer[8..16]);
        let index_length = u64::from_le_bytes(word);
        if index_offset + index_length + FOOTER_LENGTH != length {
            return Err(ContainerError::Corrupt("index range does not match file size".to_string()));
        }
        file.seek(SeekFrom::Start(index_offset))?;
        let mut buffer = vec![0u8; index_length as usize];
        file.read_exact(&mut buffer)?;
        let index: ContainerIndex = serde_json::from_slice(&buffer)?;
        for (name, info) in &index.datasets {
            for chunk in &info.chunks {
                if chunk.offset + chunk.length > index_offset {
                    return Err(ContainerError::Corrupt(format!(
                        "chunk of '{name}' points past the data section"
                    )));
                }
                check_slab(info, name, &chunk.start, &chunk.extent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
            cache: Mutex::new(VecDeque::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &ContainerIndex {
        &self.index
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        self.index.datasets.contains_key(&normalize(name))
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetInfo, ContainerError> {
        let name = normalize(name);
        self.index
            .datasets
            .get(&name)
            .ok_or(ContainerError::UnknownDataset(name))
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.index.datasets.keys().map(String::as_str)
    }

    pub fn group_attributes(&self, group: &str) -> Option<&BTreeMap<String, Value>> {
        self.index.groups.get(&normalize(group))
    }

    fn chunk_values(&self, name: &str, info: &DatasetInfo, chunk_index: usize) -> Result<Arc<Vec<f64>>, ContainerError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some((_, _, values)) = cache
                .iter()
                .find(|(cached, index, _)| cached == name && *index == chunk_index)
            {
                return Ok(Arc::clone(values));
            }
        }
        let chunk = &info.chunks[chunk_index];
        let mut raw = vec![0u8; chunk.length as usize];
        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| ContainerError::Corrupt("file handle poisoned".to_string()))?;
            file.seek(SeekFrom::Start(chunk.offset))?;
            file.read_exact(&mut raw)?;
        }
        let bytes = info.compression.decode(raw)?;
        let expected: usize = chunk.extent.iter().product();
        if bytes.len() != expected * info.dtype.size() {
            return Err(ContainerError::Corrupt(format!(
                "chunk {chunk_index} of '{name}' holds {} bytes, expected {}",
                bytes.len(),
                expected * info.dtype.size()
            )));
        }
        let values: Vec<f64> = match info.dtype {
            Dtype::F64 => bytes
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            Dtype::F32 => bytes
                .chunks_exact(4)
                .map(|b| f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
                .collect(),
        };
        let values = Arc::new(values);
        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() >= CHUNK_CACHE_SIZE {
                cache.pop_front();
            }
            cache.push_back((name.to_string(), chunk_index, Arc::clone(&values)));
        }
        Ok(values)
    }

    /// Row-major values of a hyperslab. Regions never written read as zero.
    pub fn read_slice(&self, dataset: &str, start: &[usize], extent: &[usize]) -> Result<Vec<f64>, ContainerError> {
        let name = normalize(dataset);
        let info = self.dataset(&name)?;
        check_slab(info, &name, start, extent)?;
        let total: usize = extent.iter().product();
        let mut out = vec![0.0; total];
        let out_strides = row_major_strides(extent);
        for (chunk_index, chunk) in info.chunks.iter().enumerate() {
            let mut lower = Vec::with_capacity(start.len());
            let mut overlap = Vec::with_capacity(start.len());
            for axis in 0..start.len() {
                let low = start[axis].max(chunk.start[axis]);
                let high = (start[axis] + extent[axis]).min(chunk.start[axis] + chunk.extent[axis]);
                if high <= low {
                    overlap.clear();
                    break;
                }
                lower.push(low);
                overlap.push(high - low);
            }
            if overlap.len() != start.len() {
                continue;
            }
            let values = self.chunk_values(&name, info, chunk_index)?;
            let chunk_strides = row_major_strides(&chunk.extent);
            for_each_index(&overlap, |offset| {
                let mut source = 0;
                let mut target = 0;
                for axis in 0..offset.len() {
                    let global = lower[axis] + offset[axis];
                    source += (global - chunk.start[axis]) * chunk_strides[axis];
                    target += (global - start[axis]) * out_strides[axis];
                }
                out[target] = values[source];
            });
        }
        Ok(out)
    }

    pub fn read_all(&self, dataset: &str) -> Result<Vec<f64>, ContainerError> {
        let info = self.dataset(dataset)?;
        let start = vec![0; info.shape.len()];
        let shape = info.shape.clone();
        self.read_slice(dataset, &start, &shape)
    }
}

#[cfg(test)]
mod tests {
    use super::{Compression, ContainerError, ContainerReader, ContainerWriter, Dtype, LZF_PACKED, LZF_STORED};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn chunked_datasets_read_back_across_chunks() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("data.mdc");
        let mut writer = ContainerWriter::create(&path).expect("create");
        writer
            .create_dataset("/configuration/coordinates", Dtype::F64, &[3, 2, 3], Compression::Gzip)
            .expect("dataset");
        for frame in 0..3 {
            let values: Vec<f64> = (0..6).map(|i| (frame * 6 + i) as f64).collect();
            writer
                .write_chunk("/configuration/coordinates", &[frame, 0, 0], &[1, 2, 3], &values)
                .expect("chunk");
        }
        writer
            .set_attribute("configuration/coordinates", "units", "nm")
            .expect("attribute");
        writer.set_group_attribute("/chemical_system", "name", "argon");
        writer.finish().expect("finish");

        let reader = ContainerReader::open(&path).expect("open");
        let info = reader.dataset("/configuration/coordinates").expect("info");
        assert_eq!(info.shape, vec![3, 2, 3]);
        assert_eq!(info.string_attribute("units"), Some("nm"));
        assert_eq!(
            reader.group_attributes("chemical_system").and_then(|g| g["name"].as_str()),
            Some("argon")
        );
        let atom = reader
            .read_slice("/configuration/coordinates", &[0, 1, 0], &[3, 1, 3])
            .expect("atom");
        assert_eq!(atom, vec![3.0, 4.0, 5.0, 9.0, 10.0, 11.0, 15.0, 16.0, 17.0]);
        assert_eq!(reader.read_all("/configuration/coordinates").expect("all").len(), 18);
    }

    #[test]
    fn single_precision_and_lzf_round_trip() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("small.mdc");
        let mut writer = ContainerWriter::create(&path).expect("create");
        writer
            .create_dataset("time", Dtype::F32, &[4], Compression::Lzf)
            .expect("dataset");
        writer.write_chunk("time", &[0], &[4], &[0.0, 0.5, 1.0, 1.5]).expect("chunk");
        writer.finish().expect("finish");
        let reader = ContainerReader::open(&path).expect("open");
        assert_eq!(reader.read_all("/time").expect("time"), vec![0.0, 0.5, 1.0, 1.5]);
        assert!(matches!(
            reader.read_all("/velocities").expect_err("missing"),
            ContainerError::UnknownDataset(_)
        ));
    }

    #[test]
    fn lzf_chunks_are_lzf_blocks_not_gzip_streams() {
        let repetitive: Vec<u8> = (0..4096).map(|i| (i % 16) as u8).collect();
        let block = Compression::Lzf.encode(repetitive.clone()).expect("encode");
        assert_eq!(block[0], LZF_PACKED);
        assert_ne!(&block[..2], &[0x1f, 0x8b]);
        assert!(block.len() < repetitive.len());
        assert_eq!(Compression::Lzf.decode(block).expect("decode"), repetitive);

        let tiny = vec![7u8, 1, 200];
        let block = Compression::Lzf.encode(tiny.clone()).expect("encode");
        assert_eq!(block[0], LZF_STORED);
        assert_eq!(Compression::Lzf.decode(block).expect("decode"), tiny);

        let gzip = Compression::Gzip.encode(repetitive).expect("gzip");
        assert!(matches!(Compression::Lzf.decode(gzip), Err(ContainerError::Corrupt(_))));
    }

    #[test]
    fn truncated_and_foreign_files_are_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let foreign = temp.path().join("foreign.bin");
        fs::write(&foreign, b"this is certainly not a container file").expect("write");
        assert!(matches!(
            ContainerReader::open(&foreign).expect_err("foreign"),
            ContainerError::NotAContainer(_)
        ));

        let path = temp.path().join("data.mdc");
        let mut writer = ContainerWriter::create(&path).expect("create");
        writer.write_dataset("x", &[2], &[1.0, 2.0], Compression::None).expect("x");
        writer.finish().expect("finish");
        let bytes = fs::read(&path).expect("read");
        fs::write(&path, &bytes[..bytes.len() - 4]).expect("truncate");
        assert!(matches!(
            ContainerReader::open(&path).expect_err("truncated"),
            ContainerError::Corrupt(_)
        ));
        assert!(Compression::parse("zstd").is_err());
    }
}
