use std::collections::{HashMap, HashSet};

use crate::api::error::{GgufError, GgufResult};
use crate::api::types::*;

/// GGUF magic bytes: "GGUF"
pub const GGUF_MAGIC: [u8; 4] = [0x47, 0x47, 0x55, 0x46];

/// Alignment of the data region when `general.alignment` is absent.
pub const DEFAULT_ALIGNMENT: usize = 32;

const ALIGNMENT_KEY: &str = "general.alignment";

/// Little-endian reader over the container bytes.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> GgufResult<[u8; N]> {
        if self.remaining() < N {
            return Err(eof_error(self.pos));
        }
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(buf)
    }

    fn read_u8(&mut self) -> GgufResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn read_u16(&mut self) -> GgufResult<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn read_u32(&mut self) -> GgufResult<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn read_u64(&mut self) -> GgufResult<u64> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn read_f32(&mut self) -> GgufResult<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn read_f64(&mut self) -> GgufResult<f64> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn read_len(&mut self) -> GgufResult<usize> {
        let len = self.read_u64()?;
        usize::try_from(len)
            .map_err(|_| GgufError::InvalidFormat(format!("length {} does not fit in memory", len)))
    }

    fn read_string(&mut self) -> GgufResult<String> {
        let len = self.read_len()?;
        if self.remaining() < len {
            return Err(eof_error(self.pos));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        let s = std::str::from_utf8(bytes)
            .map_err(|e| {
                GgufError::InvalidFormat(format!("invalid UTF-8 string at byte {}: {}", self.pos, e))
            })?
            .to_string();
        self.pos += len;
        Ok(s)
    }

    fn read_value(&mut self, type_id: u32) -> GgufResult<GGUFValue> {
        match type_id {
            0 => Ok(GGUFValue::U8(self.read_u8()?)),
            1 => Ok(GGUFValue::I8(self.read_u8()? as i8)),
            2 => Ok(GGUFValue::U16(self.read_u16()?)),
            3 => Ok(GGUFValue::I16(self.read_u16()? as i16)),
            4 => Ok(GGUFValue::U32(self.read_u32()?)),
            5 => Ok(GGUFValue::I32(self.read_u32()? as i32)),
            6 => Ok(GGUFValue::F32(self.read_f32()?)),
            7 => match self.read_u8()? {
                0 => Ok(GGUFValue::Bool(false)),
                1 => Ok(GGUFValue::Bool(true)),
                other => Err(GgufError::InvalidFormat(format!("invalid bool byte {}", other))),
            },
            8 => Ok(GGUFValue::String(self.read_string()?)),
            9 => {
                let elem_type = self.read_u32()?;
                if elem_type == 9 {
                    return Err(GgufError::InvalidFormat("nested metadata arrays".to_string()));
                }
                let count = self.read_len()?;
                // Every element occupies at least one byte; don't trust the count for capacity.
                let mut values = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    values.push(self.read_value(elem_type)?);
                }
                Ok(GGUFValue::Array(values))
            }
            10 => Ok(GGUFValue::U64(self.read_u64()?)),
            11 => Ok(GGUFValue::I64(self.read_u64()? as i64)),
            12 => Ok(GGUFValue::F64(self.read_f64()?)),
            _ => Err(GgufError::InvalidFormat(format!(
                "unknown metadata value type {}",
                type_id
            ))),
        }
    }
}

fn eof_error(pos: usize) -> GgufError {
    GgufError::InvalidFormat(format!("unexpected end of container at byte {}", pos))
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Parse header, metadata and descriptor table, validating every tensor's
/// byte range against `data` (the whole container).
pub fn parse_header(data: &[u8]) -> GgufResult<GGUFHeader> {
    let mut cur = Cursor::new(data);

    let magic = cur.take::<4>()?;
    if magic != GGUF_MAGIC {
        return Err(GgufError::InvalidFormat(format!(
            "invalid magic: expected {:?}, got {:?}",
            GGUF_MAGIC, magic
        )));
    }

    let version = cur.read_u32()?;
    if !(2..=3).contains(&version) {
        return Err(GgufError::InvalidFormat(format!(
            "unsupported GGUF version: {}",
            version
        )));
    }

    let tensor_count = cur.read_len()?;
    let metadata_count = cur.read_len()?;

    let mut values = HashMap::new();
    for _ in 0..metadata_count {
        let key = cur.read_string()?;
        let value_type = cur.read_u32()?;
        let value = cur.read_value(value_type)?;
        if values.insert(key.clone(), value).is_some() {
            return Err(GgufError::InvalidFormat(format!("duplicate metadata key '{}'", key)));
        }
    }
    let metadata = Metadata::new(values);

    let alignment = match metadata.get(ALIGNMENT_KEY) {
        None => DEFAULT_ALIGNMENT,
        Some(v) => match v.as_u64() {
            Some(a) if a > 0 => a as usize,
            _ => {
                return Err(GgufError::InvalidFormat(format!(
                    "invalid {}: {:?}",
                    ALIGNMENT_KEY, v
                )))
            }
        },
    };

    let mut raw = Vec::with_capacity(tensor_count.min(cur.remaining()));
    for _ in 0..tensor_count {
        let name = cur.read_string()?;
        let n_dims = cur.read_u32()? as usize;
        if n_dims == 0 || n_dims > 4 {
            return Err(GgufError::InvalidFormat(format!(
                "tensor '{}' declares {} dimensions",
                name, n_dims
            )));
        }
        let mut dimensions = Vec::with_capacity(n_dims);
        for _ in 0..n_dims {
            dimensions.push(cur.read_len()?);
        }
        let type_id = cur.read_u32()?;
        let offset = cur.read_u64()?;
        raw.push((name, dimensions, type_id, offset));
    }

    let data_offset = align_up(cur.pos, alignment);
    let mut seen = HashSet::with_capacity(raw.len());
    let mut descriptors = Vec::with_capacity(raw.len());
    for (name, dimensions, type_id, offset) in raw {
        if !seen.insert(name.clone()) {
            return Err(GgufError::InvalidFormat(format!("duplicate tensor '{}'", name)));
        }
        let ggml_type = GGMLType::from_u32(type_id).ok_or_else(|| GgufError::UnknownTensorType {
            tensor: name.clone(),
            type_id,
        })?;
        let descriptor = describe(name, dimensions, ggml_type, offset, alignment)?;
        check_bounds(&descriptor, data_offset, data.len())?;
        descriptors.push(descriptor);
    }

    Ok(GGUFHeader {
        version,
        metadata,
        descriptors,
        alignment,
        data_offset,
    })
}

fn describe(
    name: String,
    dimensions: Vec<usize>,
    ggml_type: GGMLType,
    offset: u64,
    alignment: usize,
) -> GgufResult<TensorDescriptor> {
    if offset % alignment as u64 != 0 {
        return Err(GgufError::Misaligned {
            tensor: name,
            offset,
            alignment,
        });
    }

    let elements = dimensions
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            GgufError::InvalidFormat(format!("tensor '{}' element count overflows", name))
        })?;

    let block_size = ggml_type.block_size();
    if elements % block_size != 0 {
        return Err(GgufError::BlockAlignment {
            tensor: name,
            ggml_type: ggml_type.to_string(),
            elements,
            block_size,
        });
    }
    let byte_len = (elements / block_size)
        .checked_mul(ggml_type.block_bytes())
        .ok_or_else(|| GgufError::InvalidFormat(format!("tensor '{}' byte size overflows", name)))?;

    Ok(TensorDescriptor {
        name,
        dimensions,
        ggml_type,
        offset,
        byte_len,
    })
}

fn check_bounds(desc: &TensorDescriptor, data_offset: usize, region_len: usize) -> GgufResult<()> {
    let start = usize::try_from(desc.offset)
        .ok()
        .and_then(|o| o.checked_add(data_offset));
    let end = start.and_then(|s| s.checked_add(desc.byte_len));
    match (start, end) {
        (Some(start), Some(end)) if end <= region_len => Ok(()),
        (start, end) => Err(GgufError::OutOfBounds {
            tensor: desc.name.clone(),
            start: start.unwrap_or(usize::MAX),
            end: end.unwrap_or(usize::MAX),
            region_len,
        }),
    }
}
