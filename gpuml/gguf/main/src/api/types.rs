use std::collections::HashMap;
use std::fmt;

/// GGML tensor types as declared in the container's descriptor table.
///
/// The reader knows the block geometry of every tag so it can bound-check
/// tensors it will never execute; which tags are actually usable is decided
/// by the quantized tensor model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GGMLType {
    F32 = 0,
    F16 = 1,
    Q4_0 = 2,
    Q4_1 = 3,
    Q5_0 = 6,
    Q5_1 = 7,
    Q8_0 = 8,
    Q8_1 = 9,
    Q2K = 10,
    Q3K = 11,
    Q4K = 12,
    Q5K = 13,
    Q6K = 14,
    Q8K = 15,
    BF16 = 30,
}

impl GGMLType {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(GGMLType::F32),
            1 => Some(GGMLType::F16),
            2 => Some(GGMLType::Q4_0),
            3 => Some(GGMLType::Q4_1),
            6 => Some(GGMLType::Q5_0),
            7 => Some(GGMLType::Q5_1),
            8 => Some(GGMLType::Q8_0),
            9 => Some(GGMLType::Q8_1),
            10 => Some(GGMLType::Q2K),
            11 => Some(GGMLType::Q3K),
            12 => Some(GGMLType::Q4K),
            13 => Some(GGMLType::Q5K),
            14 => Some(GGMLType::Q6K),
            15 => Some(GGMLType::Q8K),
            30 => Some(GGMLType::BF16),
            _ => None,
        }
    }

    pub fn id(&self) -> u32 {
        *self as u32
    }

    /// Bytes per block for quantized types, or bytes per element for float types.
    pub fn block_bytes(&self) -> usize {
        match self {
            GGMLType::F32 => 4,
            GGMLType::F16 | GGMLType::BF16 => 2,
            GGMLType::Q4_0 => 18,
            GGMLType::Q4_1 => 20,
            GGMLType::Q5_0 => 22,
            GGMLType::Q5_1 => 24,
            GGMLType::Q8_0 => 34,
            GGMLType::Q8_1 => 40,
            GGMLType::Q2K => 84,
            GGMLType::Q3K => 110,
            GGMLType::Q4K => 144,
            GGMLType::Q5K => 176,
            GGMLType::Q6K => 210,
            GGMLType::Q8K => 292,
        }
    }

    /// Elements per block (1 for the float types).
    pub fn block_size(&self) -> usize {
        match self {
            GGMLType::F32 | GGMLType::F16 | GGMLType::BF16 => 1,
            GGMLType::Q2K
            | GGMLType::Q3K
            | GGMLType::Q4K
            | GGMLType::Q5K
            | GGMLType::Q6K
            | GGMLType::Q8K => 256,
            _ => 32,
        }
    }

    pub fn is_block_quantized(&self) -> bool {
        self.block_size() > 1
    }

    pub fn name(&self) -> &'static str {
        match self {
            GGMLType::F32 => "F32",
            GGMLType::F16 => "F16",
            GGMLType::Q4_0 => "Q4_0",
            GGMLType::Q4_1 => "Q4_1",
            GGMLType::Q5_0 => "Q5_0",
            GGMLType::Q5_1 => "Q5_1",
            GGMLType::Q8_0 => "Q8_0",
            GGMLType::Q8_1 => "Q8_1",
            GGMLType::Q2K => "Q2_K",
            GGMLType::Q3K => "Q3_K",
            GGMLType::Q4K => "Q4_K",
            GGMLType::Q5K => "Q5_K",
            GGMLType::Q6K => "Q6_K",
            GGMLType::Q8K => "Q8_K",
            GGMLType::BF16 => "BF16",
        }
    }
}

impl fmt::Display for GGMLType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// GGUF metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum GGUFValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<GGUFValue>),
}

impl GGUFValue {
    /// Any non-negative integer value as `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            GGUFValue::U8(v) => Some(*v as u64),
            GGUFValue::U16(v) => Some(*v as u64),
            GGUFValue::U32(v) => Some(*v as u64),
            GGUFValue::U64(v) => Some(*v),
            GGUFValue::I8(v) if *v >= 0 => Some(*v as u64),
            GGUFValue::I16(v) if *v >= 0 => Some(*v as u64),
            GGUFValue::I32(v) if *v >= 0 => Some(*v as u64),
            GGUFValue::I64(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            GGUFValue::F32(v) => Some(*v),
            GGUFValue::F64(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GGUFValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            GGUFValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[GGUFValue]> {
        match self {
            GGUFValue::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// Type id used by the GGUF encoding.
    pub fn type_id(&self) -> u32 {
        match self {
            GGUFValue::U8(_) => 0,
            GGUFValue::I8(_) => 1,
            GGUFValue::U16(_) => 2,
            GGUFValue::I16(_) => 3,
            GGUFValue::U32(_) => 4,
            GGUFValue::I32(_) => 5,
            GGUFValue::F32(_) => 6,
            GGUFValue::Bool(_) => 7,
            GGUFValue::String(_) => 8,
            GGUFValue::Array(_) => 9,
            GGUFValue::U64(_) => 10,
            GGUFValue::I64(_) => 11,
            GGUFValue::F64(_) => 12,
        }
    }
}

/// Metadata key/value map with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    values: HashMap<String, GGUFValue>,
}

impl Metadata {
    pub fn new(values: HashMap<String, GGUFValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&GGUFValue> {
        self.values.get(key)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.as_u32())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key)
            .and_then(|v| v.as_u64())
            .and_then(|v| usize::try_from(v).ok())
    }

    pub fn get_f32(&self, key: &str) -> Option<f32> {
        self.get(key).and_then(|v| v.as_f32())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_string())
    }

    /// String array (e.g. `tokenizer.ggml.tokens`). Non-string elements make the whole lookup fail.
    pub fn get_string_array(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key)?
            .as_array()?
            .iter()
            .map(|v| v.as_string())
            .collect()
    }

    pub fn get_f32_array(&self, key: &str) -> Option<Vec<f32>> {
        self.get(key)?.as_array()?.iter().map(|v| v.as_f32()).collect()
    }

    pub fn array_len(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.as_array()).map(|a| a.len())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GGUFValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One entry of the tensor descriptor table. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDescriptor {
    pub name: String,
    /// Dimension sizes as stored in the container (innermost first).
    pub dimensions: Vec<usize>,
    pub ggml_type: GGMLType,
    /// Byte offset relative to the start of the data region.
    pub offset: u64,
    /// Byte length of the tensor's data.
    pub byte_len: usize,
}

impl TensorDescriptor {
    pub fn element_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// Row-major shape (outermost first), the reverse of the stored order.
    pub fn shape(&self) -> Vec<usize> {
        self.dimensions.iter().rev().copied().collect()
    }

    /// Number of rows when viewed as a matrix `[rows, cols]`.
    pub fn rows(&self) -> usize {
        self.dimensions.iter().skip(1).product()
    }

    /// Innermost dimension (the contiguous one).
    pub fn cols(&self) -> usize {
        self.dimensions.first().copied().unwrap_or(1)
    }
}

/// Parsed container header: version, metadata and descriptors, without tensor data.
#[derive(Debug, Clone)]
pub struct GGUFHeader {
    pub version: u32,
    pub metadata: Metadata,
    pub descriptors: Vec<TensorDescriptor>,
    pub alignment: usize,
    /// Absolute byte offset of the data region.
    pub data_offset: usize,
}
