use serde::{Deserialize, Serialize};

/// Persisted user record at `users/{userId}`. The store predates this
/// service, so field names stay camelCase and every field is optional on
/// read: records created by the mobile clients carry different subsets.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub coins: i64,
    pub tasks_completed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,
    pub whatsapp_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp_connected_at: Option<String>,
    #[serde(rename = "lastWhatsAppEarning", skip_serializing_if = "Option::is_none")]
    pub last_whatsapp_earning: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub full_name: Option<String>,
    pub coins: i64,
    pub tasks_completed: i64,
}
