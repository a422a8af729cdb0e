use anyhow::{bail, ensure, Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    Bool,
    U8,
    I32,
    I64,
    F16,
    F32,
    /// Variable-length byte strings, serialized as `u32` little-endian length + payload.
    Bytes,
}

impl DType {
    /// Parses the element type names used in model configuration (`TYPE_STRING`, ...).
    pub fn from_config_name(name: &str) -> Result<Self> {
        Ok(match name {
            "TYPE_BOOL" => DType::Bool,
            "TYPE_UINT8" => DType::U8,
            "TYPE_INT32" => DType::I32,
            "TYPE_INT64" => DType::I64,
            "TYPE_FP16" => DType::F16,
            "TYPE_FP32" => DType::F32,
            "TYPE_STRING" => DType::Bytes,
            other => bail!("unsupported data_type in model config: {other}"),
        })
    }

    pub fn config_name(self) -> &'static str {
        match self {
            DType::Bool => "TYPE_BOOL",
            DType::U8 => "TYPE_UINT8",
            DType::I32 => "TYPE_INT32",
            DType::I64 => "TYPE_INT64",
            DType::F16 => "TYPE_FP16",
            DType::F32 => "TYPE_FP32",
            DType::Bytes => "TYPE_STRING",
        }
    }

    /// Parses the datatype names used on the inference wire protocol (`BYTES`, `FP32`, ...).
    pub fn from_wire_name(name: &str) -> Result<Self> {
        Ok(match name {
            "BOOL" => DType::Bool,
            "UINT8" => DType::U8,
            "INT32" => DType::I32,
            "INT64" => DType::I64,
            "FP16" => DType::F16,
            "FP32" => DType::F32,
            "BYTES" => DType::Bytes,
            other => bail!("unsupported wire datatype: {other}"),
        })
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            DType::Bool => "BOOL",
            DType::U8 => "UINT8",
            DType::I32 => "INT32",
            DType::I64 => "INT64",
            DType::F16 => "FP16",
            DType::F32 => "FP32",
            DType::Bytes => "BYTES",
        }
    }

    /// Fixed element width, `None` for variable-length byte strings.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            DType::Bool | DType::U8 => Some(1),
            DType::F16 => Some(2),
            DType::I32 | DType::F32 => Some(4),
            DType::I64 => Some(8),
            DType::Bytes => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn vector(len: usize) -> Self {
        Self::from_slice(&[len])
    }
    /// Element count; dims come from requests, so overflow is an error.
    pub fn numel(&self) -> Result<usize> {
        self.0
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
            .with_context(|| format!("shape {:?} overflows the element count", self.dims()))
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

/// A host tensor. Storage is always CPU bytes in the host's layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Shape,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, data: Bytes) -> Result<Self> {
        if let Some(width) = dtype.byte_size() {
            let expected = shape
                .numel()?
                .checked_mul(width)
                .context("tensor byte size overflows")?;
            ensure!(
                data.len() == expected,
                "tensor byte size mismatch: got {}, expected {}",
                data.len(),
                expected
            );
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn from_strings<I, S>(shape: Shape, items: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut buf = BytesMut::new();
        let mut count = 0usize;
        for item in items {
            let item = item.as_ref();
            let len = u32::try_from(item.len())?;
            buf.put_u32_le(len);
            buf.put_slice(item);
            count += 1;
        }
        let expected = shape.numel()?;
        ensure!(
            count == expected,
            "string tensor has {count} elements but shape {:?} holds {expected}",
            shape.dims()
        );
        Ok(Self {
            dtype: DType::Bytes,
            shape,
            data: buf.freeze(),
        })
    }

    pub fn from_bools(shape: Shape, values: &[bool]) -> Result<Self> {
        let data: Vec<u8> = values.iter().map(|v| u8::from(*v)).collect();
        Self::from_cpu_bytes(DType::Bool, shape, Bytes::from(data))
    }

    pub fn from_u8s(shape: Shape, values: &[u8]) -> Result<Self> {
        Self::from_cpu_bytes(DType::U8, shape, Bytes::copy_from_slice(values))
    }

    pub fn from_i32s(shape: Shape, values: &[i32]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * 4);
        values.iter().for_each(|v| buf.put_i32_le(*v));
        Self::from_cpu_bytes(DType::I32, shape, buf.freeze())
    }

    pub fn from_i64s(shape: Shape, values: &[i64]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * 8);
        values.iter().for_each(|v| buf.put_i64_le(*v));
        Self::from_cpu_bytes(DType::I64, shape, buf.freeze())
    }

    pub fn from_f32s(shape: Shape, values: &[f32]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * 4);
        values.iter().for_each(|v| buf.put_f32_le(*v));
        Self::from_cpu_bytes(DType::F32, shape, buf.freeze())
    }

    pub fn numel(&self) -> Result<usize> {
        self.shape.numel()
    }

    /// Splits a BYTES tensor into its elements without copying.
    pub fn strings(&self) -> Result<Vec<Bytes>> {
        ensure!(
            self.dtype == DType::Bytes,
            "expected a BYTES tensor, got {}",
            self.dtype.wire_name()
        );

        let expected = self.numel()?;
        // each element costs at least its 4-byte prefix
        let mut out = Vec::with_capacity(expected.min(self.data.len() / 4));
        let mut offset = 0usize;
        while offset < self.data.len() {
            ensure!(
                self.data.len() - offset >= 4,
                "truncated length prefix at byte {offset}"
            );
            let prefix = &self.data[offset..offset + 4];
            let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            offset += 4;
            ensure!(
                self.data.len() - offset >= len,
                "element {} claims {len} bytes but only {} remain",
                out.len(),
                self.data.len() - offset
            );
            out.push(self.data.slice(offset..offset + len));
            offset += len;
        }

        ensure!(
            out.len() == expected,
            "BYTES tensor holds {} elements but shape {:?} expects {expected}",
            out.len(),
            self.shape.dims()
        );
        Ok(out)
    }

    pub fn bools(&self) -> Result<Vec<bool>> {
        ensure!(self.dtype == DType::Bool, "expected a BOOL tensor");
        Ok(self.data.iter().map(|b| *b != 0).collect())
    }

    pub fn i32s(&self) -> Result<Vec<i32>> {
        ensure!(self.dtype == DType::I32, "expected an INT32 tensor");
        Ok(self
            .data
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    pub fn i64s(&self) -> Result<Vec<i64>> {
        ensure!(self.dtype == DType::I64, "expected an INT64 tensor");
        Ok(self
            .data
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }

    pub fn f32s(&self) -> Result<Vec<f32>> {
        ensure!(self.dtype == DType::F32, "expected an FP32 tensor");
        Ok(self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}
