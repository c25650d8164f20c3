//! Wire and domain types for the upload API.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Description attached to every uploaded asset.
pub const DEFAULT_DESCRIPTION: &str = "Uploaded Using AnnaUploader";

/// Publication type of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    TShirt,
    Decal,
}

impl Category {
    /// Both categories, in the order a "both" selection expands them.
    pub const ALL: [Category; 2] = [Category::TShirt, Category::Decal];

    /// Numeric asset type used by the platform catalog.
    pub fn asset_type_id(self) -> u32 {
        match self {
            Category::TShirt => 11,
            Category::Decal => 13,
        }
    }

    /// Value of the `assetType` field in the upload request.
    pub fn wire_name(self) -> &'static str {
        match self {
            Category::TShirt => "TShirt",
            Category::Decal => "Decal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tshirt" | "t-shirt" | "shirt" => Ok(Category::TShirt),
            "decal" => Ok(Category::Decal),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// The account that will own uploaded assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub account_id: u64,
    #[serde(default)]
    pub is_group: bool,
}

impl Creator {
    pub fn user(account_id: u64) -> Self {
        Self {
            account_id,
            is_group: false,
        }
    }

    pub fn group(account_id: u64) -> Self {
        Self {
            account_id,
            is_group: true,
        }
    }
}

/// Short-lived CSRF credential required on every submission.
///
/// Opaque: validity is only known once the platform rejects a use of it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the raw credential.
        write!(f, "SessionToken(<{} chars>)", self.0.len())
    }
}

/// A single submission as handed to the transport.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub file_name: String,
    pub content_type: &'static str,
    pub data: Arc<[u8]>,
    pub display_name: String,
    pub description: String,
    pub category: Category,
    pub creator: Creator,
}

impl SubmitRequest {
    /// Builds the JSON metadata part of the multipart upload.
    pub fn metadata(&self) -> UploadMetadata {
        let creator = if self.creator.is_group {
            CreatorRef::GroupId(self.creator.account_id)
        } else {
            CreatorRef::UserId(self.creator.account_id)
        };
        UploadMetadata {
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            asset_type: self.category.wire_name().to_string(),
            creation_context: CreationContext {
                creator,
                expected_price: 0,
            },
        }
    }
}

/// The `request` form field of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub display_name: String,
    pub description: String,
    pub asset_type: String,
    pub creation_context: CreationContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationContext {
    pub creator: CreatorRef,
    pub expected_price: u64,
}

/// Serialized as `{"userId": n}` or `{"groupId": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CreatorRef {
    UserId(u64),
    GroupId(u64),
}

/// Returns the MIME type for an image file name, by extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("tga") => "image/x-tga",
        _ => "application/octet-stream",
    }
}
