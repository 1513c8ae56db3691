use serde::{Deserialize, Serialize};

use crate::models::earnings::Earning;

/// Catalog entry at `tasks/{taskId}`. Read-mostly; rewards are always
/// resolved server-side from this record, never taken from the caller.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub reward: i64,
    pub category: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub earning: Earning,
    pub new_balance: i64,
    pub tasks_completed: i64,
}
