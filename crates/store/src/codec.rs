use crate::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zstd::stream::{decode_all, encode_all};

/// Compression codec options for stored documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    /// No compression (useful for debugging or inspecting the raw store).
    None,
    /// Zstd compression (default, good balance of speed and ratio).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, where higher = better compression but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn none() -> Self {
        Self::default().with_codec(CompressionCodec::None)
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.codec == CompressionCodec::Zstd && !(1..=22).contains(&self.level) {
            return Err(StoreError::Codec(format!(
                "zstd level must be within 1..=22, got {}",
                self.level
            )));
        }
        Ok(())
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }

    /// Serialize a document to its stored byte form.
    pub fn encode(&self, doc: &Map<String, Value>) -> Result<Vec<u8>, StoreError> {
        let raw = serde_json::to_vec(doc)?;
        self.compress(&raw)
    }

    /// Inverse of [`CompressionConfig::encode`].
    pub fn decode(&self, bytes: &[u8]) -> Result<Map<String, Value>, StoreError> {
        let raw = self.decompress(bytes)?;
        match serde_json::from_slice(&raw)? {
            Value::Object(doc) => Ok(doc),
            other => Err(StoreError::Codec(format!(
                "stored value is not a document: {other}"
            ))),
        }
    }
}
