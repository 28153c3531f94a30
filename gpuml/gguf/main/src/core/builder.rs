use crate::api::types::{GGMLType, GGUFValue};
use crate::core::parser::{DEFAULT_ALIGNMENT, GGUF_MAGIC};

struct PendingTensor {
    name: String,
    dims: Vec<usize>,
    type_id: u32,
    data: Vec<u8>,
    offset_override: Option<u64>,
}

/// Writes a GGUF v3 container in memory.
///
/// Used by tests and fixtures across the workspace to produce small models
/// without shipping binary files. Tensor offsets are laid out automatically
/// at the container alignment (`general.alignment` if added, else 32).
#[derive(Default)]
pub struct GgufBuilder {
    metadata: Vec<(String, GGUFValue)>,
    tensors: Vec<PendingTensor>,
}

impl GgufBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, key: &str, value: GGUFValue) -> &mut Self {
        self.metadata.push((key.to_string(), value));
        self
    }

    pub fn add_string(&mut self, key: &str, value: &str) -> &mut Self {
        self.add_value(key, GGUFValue::String(value.to_string()))
    }

    pub fn add_u32(&mut self, key: &str, value: u32) -> &mut Self {
        self.add_value(key, GGUFValue::U32(value))
    }

    pub fn add_f32(&mut self, key: &str, value: f32) -> &mut Self {
        self.add_value(key, GGUFValue::F32(value))
    }

    pub fn add_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.add_value(key, GGUFValue::Bool(value))
    }

    pub fn add_string_array(&mut self, key: &str, values: &[&str]) -> &mut Self {
        let values = values
            .iter()
            .map(|s| GGUFValue::String(s.to_string()))
            .collect();
        self.add_value(key, GGUFValue::Array(values))
    }

    pub fn add_f32_array(&mut self, key: &str, values: &[f32]) -> &mut Self {
        let values = values.iter().map(|v| GGUFValue::F32(*v)).collect();
        self.add_value(key, GGUFValue::Array(values))
    }

    /// Add a tensor with pre-encoded bytes. `dims` are innermost first.
    pub fn add_tensor_raw(
        &mut self,
        name: &str,
        dims: &[usize],
        ggml_type: GGMLType,
        data: Vec<u8>,
    ) -> &mut Self {
        self.tensors.push(PendingTensor {
            name: name.to_string(),
            dims: dims.to_vec(),
            type_id: ggml_type.id(),
            data,
            offset_override: None,
        });
        self
    }

    pub fn add_tensor_f32(&mut self, name: &str, dims: &[usize], values: &[f32]) -> &mut Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.add_tensor_raw(name, dims, GGMLType::F32, data)
    }

    /// Replace the computed offset of a tensor (for malformed-container tests).
    pub fn override_offset(&mut self, name: &str, offset: u64) -> &mut Self {
        if let Some(t) = self.tensors.iter_mut().find(|t| t.name == name) {
            t.offset_override = Some(offset);
        }
        self
    }

    /// Replace the declared type id of a tensor (for malformed-container tests).
    pub fn override_type_id(&mut self, name: &str, type_id: u32) -> &mut Self {
        if let Some(t) = self.tensors.iter_mut().find(|t| t.name == name) {
            t.type_id = type_id;
        }
        self
    }

    fn alignment(&self) -> usize {
        self.metadata
            .iter()
            .rev()
            .find(|(k, _)| k == "general.alignment")
            .and_then(|(_, v)| v.as_u64())
            .filter(|a| *a > 0)
            .map(|a| a as usize)
            .unwrap_or(DEFAULT_ALIGNMENT)
    }

    pub fn build(&self) -> Vec<u8> {
        let alignment = self.alignment();

        let mut offsets = Vec::with_capacity(self.tensors.len());
        let mut next = 0usize;
        for t in &self.tensors {
            offsets.push(t.offset_override.unwrap_or(next as u64));
            next = (next + t.data.len()).div_ceil(alignment) * alignment;
        }

        let mut out = Vec::new();
        out.extend_from_slice(&GGUF_MAGIC);
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&(self.tensors.len() as u64).to_le_bytes());
        out.extend_from_slice(&(self.metadata.len() as u64).to_le_bytes());

        for (key, value) in &self.metadata {
            write_string(&mut out, key);
            out.extend_from_slice(&value.type_id().to_le_bytes());
            write_value(&mut out, value);
        }

        for (t, offset) in self.tensors.iter().zip(&offsets) {
            write_string(&mut out, &t.name);
            out.extend_from_slice(&(t.dims.len() as u32).to_le_bytes());
            for d in &t.dims {
                out.extend_from_slice(&(*d as u64).to_le_bytes());
            }
            out.extend_from_slice(&t.type_id.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
        }

        let data_offset = out.len().div_ceil(alignment) * alignment;
        out.resize(data_offset, 0);

        // Data is always written at the computed layout; overrides only change the descriptor.
        let mut cursor = 0usize;
        for t in &self.tensors {
            out.resize(data_offset + cursor, 0);
            out.extend_from_slice(&t.data);
            cursor = (cursor + t.data.len()).div_ceil(alignment) * alignment;
        }
        out.resize(data_offset + cursor, 0);
        out
    }
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn write_value(out: &mut Vec<u8>, value: &GGUFValue) {
    match value {
        GGUFValue::U8(v) => out.push(*v),
        GGUFValue::I8(v) => out.push(*v as u8),
        GGUFValue::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        GGUFValue::Bool(v) => out.push(*v as u8),
        GGUFValue::String(s) => write_string(out, s),
        GGUFValue::Array(values) => {
            let elem_type = values.first().map(|v| v.type_id()).unwrap_or(0);
            out.extend_from_slice(&elem_type.to_le_bytes());
            out.extend_from_slice(&(values.len() as u64).to_le_bytes());
            for v in values {
                write_value(out, v);
            }
        }
    }
}
