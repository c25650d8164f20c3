//! Image transform pipeline applied to inputs before submission.
//!
//! Two independently optional stages run in order:
//!
//! 1. **Normalize**: re-encode anything the platform does not accept as PNG
//! 2. **Slip**: emit `copy_count` pixel-perturbed variants per input so that
//!    every uploaded file is byte-distinct while looking identical
//!
//! All work here is CPU-bound and synchronous; async callers should run it
//! on a blocking thread.

pub mod error;
pub mod naming;
pub mod normalize;
pub mod pipeline;
pub mod slip;
pub mod types;

pub use error::TransformError;
pub use pipeline::TransformPipeline;
pub use types::{ImageFile, MAX_COPY_COUNT, PixelMethod, TransformSpec, UniquenessSpec};
