use serde::{Deserialize, Serialize};

/// One append-only ledger entry under `earnings/{userId}/{pushId}`.
/// The id is the store-generated push key, not part of the stored value.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Earning {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: i64,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditOutcome {
    pub earning: Earning,
    pub new_balance: i64,
}
