//! Dead-letter entry: a job that exhausted its retries (§3, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub post_id: Uuid,
    pub stage: Option<Stage>,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}
