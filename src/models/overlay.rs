//! Override overlay model
//!
//! Overlay rows give the author of a pending request an immediate view of
//! their own change. They exist only while the backing request is pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DocumentId;

/// Per-user adjustment of a document's tags
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserTagOverride {
    pub user_id: String,
    pub document_id: DocumentId,
    pub tag_name: String,
    pub tag_category: String,
    /// True if the user added the tag, false if they removed it
    pub is_added: bool,
    pub created_at: DateTime<Utc>,
}

/// A tag as one particular user sees it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectiveTag {
    pub tag_name: String,
    pub tag_category: String,
    /// True when the tag is visible only because of the user's overlay
    pub from_overlay: bool,
}
