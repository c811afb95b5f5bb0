//! Comment document - append-only, keyed by response id

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ResponseId, UserId};

/// A comment on a challenge response. Ordered newest-first when listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub response_id: ResponseId,
    pub author_id: UserId,
    pub author_name: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
