use std::collections::HashMap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use std::time::Instant;

use memmap2::{Mmap, MmapOptions};

use crate::api::error::{GgufError, GgufResult};
use crate::api::types::{GGUFHeader, Metadata, TensorDescriptor};
use crate::core::parser::parse_header;

/// Bytes backing a container: a read-only file mapping or an owned buffer.
#[derive(Debug)]
pub enum MappedRegion {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for MappedRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            MappedRegion::Mapped(m) => m,
            MappedRegion::Owned(v) => v,
        }
    }
}

/// A parsed container with its data region.
///
/// Every descriptor has been bounds-checked against the region at open time,
/// so `tensor_bytes` can only fail for descriptors not taken from this container.
#[derive(Debug)]
pub struct TensorContainer {
    header: GGUFHeader,
    index: HashMap<String, usize>,
    region: MappedRegion,
}

impl TensorContainer {
    /// Memory-map a container file read-only and parse it.
    pub fn open(path: impl AsRef<Path>) -> GgufResult<Self> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the container is treated as
        // immutable for the lifetime of the process.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let container = Self::from_region(MappedRegion::Mapped(mmap))?;
        log::info!(
            "Opened {} (GGUF v{}, {} tensors, {} metadata keys, {} bytes)",
            path.display(),
            container.header.version,
            container.header.descriptors.len(),
            container.header.metadata.len(),
            container.region.len()
        );
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("[perf] gguf::open {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
        }
        Ok(container)
    }

    /// Parse a container held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> GgufResult<Self> {
        Self::from_region(MappedRegion::Owned(bytes))
    }

    fn from_region(region: MappedRegion) -> GgufResult<Self> {
        let header = parse_header(&region)?;
        let index = header
            .descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();
        Ok(Self {
            header,
            index,
            region,
        })
    }

    pub fn header(&self) -> &GGUFHeader {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.header.metadata
    }

    /// Descriptors in declaration order.
    pub fn descriptors(&self) -> &[TensorDescriptor] {
        &self.header.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&TensorDescriptor> {
        self.index.get(name).map(|&i| &self.header.descriptors[i])
    }

    pub fn require(&self, name: &str) -> GgufResult<&TensorDescriptor> {
        self.descriptor(name)
            .ok_or_else(|| GgufError::UnknownTensor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn region_len(&self) -> usize {
        self.region.len()
    }

    /// Borrow the raw bytes of a tensor from the data region.
    pub fn tensor_bytes(&self, desc: &TensorDescriptor) -> GgufResult<&[u8]> {
        let start = usize::try_from(desc.offset)
            .ok()
            .and_then(|o| o.checked_add(self.header.data_offset));
        let end = start.and_then(|s| s.checked_add(desc.byte_len));
        match (start, end) {
            (Some(start), Some(end)) if end <= self.region.len() => Ok(&self.region[start..end]),
            (start, end) => Err(GgufError::OutOfBounds {
                tensor: desc.name.clone(),
                start: start.unwrap_or(usize::MAX),
                end: end.unwrap_or(usize::MAX),
                region_len: self.region.len(),
            }),
        }
    }

    /// Bytes of a tensor looked up by name.
    pub fn bytes_by_name(&self, name: &str) -> GgufResult<&[u8]> {
        let desc = self.require(name)?;
        self.tensor_bytes(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::GGMLType;
    use crate::core::builder::GgufBuilder;
    use std::io::Write;

    fn sample() -> Vec<u8> {
        let mut b = GgufBuilder::new();
        b.add_string("general.architecture", "llama");
        b.add_tensor_f32("a.weight", &[4], &[1.0, 2.0, 3.0, 4.0]);
        b.add_tensor_f32("b.weight", &[2, 2], &[5.0, 6.0, 7.0, 8.0]);
        b.build()
    }

    fn f32s(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_from_bytes_reads_tensor_data() {
        let c = TensorContainer::from_bytes(sample()).unwrap();
        assert_eq!(c.descriptors().len(), 2);
        assert_eq!(f32s(c.bytes_by_name("a.weight").unwrap()), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(f32s(c.bytes_by_name("b.weight").unwrap()), vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(c.metadata().get_str("general.architecture"), Some("llama"));
    }

    #[test]
    fn test_descriptor_lookup() {
        let c = TensorContainer::from_bytes(sample()).unwrap();
        let d = c.descriptor("b.weight").unwrap();
        assert_eq!(d.ggml_type, GGMLType::F32);
        assert_eq!(d.shape(), vec![2, 2]);
        assert!(c.descriptor("missing").is_none());
        assert!(matches!(c.require("missing"), Err(GgufError::UnknownTensor(_))));
    }

    #[test]
    fn test_foreign_descriptor_out_of_bounds() {
        let c = TensorContainer::from_bytes(sample()).unwrap();
        let mut d = c.descriptor("a.weight").unwrap().clone();
        d.offset = 1 << 20;
        assert!(matches!(c.tensor_bytes(&d), Err(GgufError::OutOfBounds { .. })));
    }

    #[test]
    fn test_open_mapped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        let mut f = File::create(&path).unwrap();
        f.write_all(&sample()).unwrap();
        drop(f);

        let c = TensorContainer::open(&path).unwrap();
        assert_eq!(c.version(), 3);
        assert_eq!(f32s(c.bytes_by_name("a.weight").unwrap()), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_open_missing_file() {
        let err = TensorContainer::open("/nonexistent/model.gguf").unwrap_err();
        assert!(matches!(err, GgufError::Io(_)));
    }
}
