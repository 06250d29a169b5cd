//! Document popularity counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DocumentId;

/// View counters maintained for one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewCount {
    pub document_id: DocumentId,
    pub view_count: i64,
    pub unique_view_count: i64,
    pub last_viewed: DateTime<Utc>,
}
