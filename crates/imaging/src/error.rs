//! Transform error types.

/// Errors produced while transforming an input image.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("copy count must be between 1 and {max}, got {copy_count}", max = crate::types::MAX_COPY_COUNT)]
    InvalidCopyCount { copy_count: u32 },

    #[error("could not produce {copy_count} distinct variants of {name}")]
    NotUnique { name: String, copy_count: u32 },
}
