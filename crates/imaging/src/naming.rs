//! File naming helpers shared by the transform stages.

use std::path::Path;

/// Extension of the canonical encoding.
pub const CANONICAL_EXT: &str = "png";

/// File name without its final extension (`"a.b.png"` -> `"a.b"`).
pub fn base_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// Same base name with the canonical extension.
pub fn canonical_name(file_name: &str) -> String {
    format!("{}.{CANONICAL_EXT}", base_name(file_name))
}

/// Name of the `index`-th (1-based) slip variant of `file_name`.
pub fn variant_name(file_name: &str, index: u32) -> String {
    format!("{}_{index}.{CANONICAL_EXT}", base_name(file_name))
}
