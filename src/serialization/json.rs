//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存镜像和脏索引的JSON编码，可选gzip压缩。

use super::Serializer;
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入时gzip压缩，读取时解压
    ///
    /// 未启用 `compression` 特性时退化为普通JSON
    pub fn with_compression() -> Self {
        Self { compress: true }
    }
}

fn codec_error(e: impl std::fmt::Display) -> CacheError {
    CacheError::Serialization(e.to_string())
}

#[cfg(feature = "compression")]
fn gzip(json: Vec<u8>) -> Result<Vec<u8>> {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::fast());
    encoder.write_all(&json).map_err(codec_error)?;
    encoder.finish().map_err(codec_error)
}

#[cfg(not(feature = "compression"))]
fn gzip(json: Vec<u8>) -> Result<Vec<u8>> {
    Ok(json)
}

#[cfg(feature = "compression")]
fn gunzip(data: &[u8]) -> Result<std::borrow::Cow<'_, [u8]>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(codec_error)?;
    Ok(decoded.into())
}

#[cfg(not(feature = "compression"))]
fn gunzip(data: &[u8]) -> Result<std::borrow::Cow<'_, [u8]>> {
    Ok(data.into())
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(codec_error)?;
        if self.compress {
            gzip(json)
        } else {
            Ok(json)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        if self.compress {
            serde_json::from_slice(&gunzip(data)?).map_err(codec_error)
        } else {
            serde_json::from_slice(data).map_err(codec_error)
        }
    }
}
