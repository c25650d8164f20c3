//! Transform configuration and the in-memory image file type.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// An image file held in memory: original name plus encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub data: Arc<[u8]>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// How the slip transform picks pixels and deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelMethod {
    /// Every visible pixel, each channel moved by ±1.
    #[default]
    Every,
    /// A random subset of visible pixels, each channel moved by ±1..=±3.
    Sparse,
}

impl PixelMethod {
    /// Largest absolute per-channel delta this method can apply.
    pub fn max_delta(self) -> u8 {
        match self {
            PixelMethod::Every => 1,
            PixelMethod::Sparse => 3,
        }
    }
}

/// Uniqueness (slip) stage settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniquenessSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_copy_count")]
    pub copy_count: u32,
    #[serde(default)]
    pub pixel_method: PixelMethod,
}

/// Upper bound on variants per input.
pub const MAX_COPY_COUNT: u32 = 100;

fn default_copy_count() -> u32 {
    1
}

impl UniquenessSpec {
    /// Checks `copy_count` is within `1..=MAX_COPY_COUNT`.
    pub fn validate(&self) -> Result<(), TransformError> {
        if (1..=MAX_COPY_COUNT).contains(&self.copy_count) {
            Ok(())
        } else {
            Err(TransformError::InvalidCopyCount {
                copy_count: self.copy_count,
            })
        }
    }
}

impl Default for UniquenessSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            copy_count: default_copy_count(),
            pixel_method: PixelMethod::default(),
        }
    }
}

/// Full pipeline configuration, fixed for the lifetime of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub normalize: bool,
    #[serde(default)]
    pub uniqueness: UniquenessSpec,
}

impl TransformSpec {
    /// True when neither stage would touch an input.
    pub fn is_passthrough(&self) -> bool {
        !self.normalize && !self.uniqueness.enabled
    }
}
