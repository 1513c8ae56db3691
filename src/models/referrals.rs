use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferredUser {
    pub id: String,
    pub full_name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    pub referral_code: Option<String>,
    pub referrals: Vec<ReferredUser>,
    pub total_referrals: usize,
    pub earned_from_referrals: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralOutcome {
    pub new_user_bonus: i64,
    pub referrer_bonus: i64,
}
