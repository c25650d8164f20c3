//! Ordered application of the transform stages.

use rand::Rng;

use crate::error::TransformError;
use crate::normalize::normalize;
use crate::slip::slip_variants;
use crate::types::{ImageFile, TransformSpec};

/// Applies a fixed [`TransformSpec`] to input files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformPipeline {
    spec: TransformSpec,
}

impl TransformPipeline {
    pub fn new(spec: TransformSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }

    /// Number of output files produced per input file.
    pub fn outputs_per_input(&self) -> u32 {
        if self.spec.uniqueness.enabled {
            self.spec.uniqueness.copy_count
        } else {
            1
        }
    }

    /// Runs normalization then slip, using the thread-local RNG.
    pub fn run(&self, input: ImageFile) -> Result<Vec<ImageFile>, TransformError> {
        self.run_with_rng(input, &mut rand::thread_rng())
    }

    /// Runs normalization then slip with the given RNG.
    pub fn run_with_rng<R: Rng + ?Sized>(
        &self,
        input: ImageFile,
        rng: &mut R,
    ) -> Result<Vec<ImageFile>, TransformError> {
        if self.spec.uniqueness.enabled {
            self.spec.uniqueness.validate()?;
        }

        let file = if self.spec.normalize {
            normalize(input)?
        } else {
            input
        };

        if self.spec.uniqueness.enabled {
            slip_variants(&file, &self.spec.uniqueness, rng)
        } else {
            Ok(vec![file])
        }
    }
}
