use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Store {
    pub backend: String,
    pub firebase_url: String,
    pub firebase_auth: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rewards {
    pub referral_new_user_bonus: i64,
    pub referral_referrer_bonus: i64,
    pub whatsapp_reward: i64,
    pub allow_repeat_completion: bool,
    pub leaderboard_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub store: Store,
    pub rewards: Rewards,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("store.backend", "memory")?
            .set_default("store.firebase_url", "")?
            .set_default("store.firebase_auth", "")?
            .set_default("rewards.referral_new_user_bonus", 50_i64)?
            .set_default("rewards.referral_referrer_bonus", 100_i64)?
            .set_default("rewards.whatsapp_reward", 50_i64)?
            .set_default("rewards.allow_repeat_completion", true)?
            .set_default("rewards.leaderboard_size", 10_i64)?
            .add_source(File::with_name(path).required(false))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load("does-not-exist").unwrap();
        assert_eq!(settings.store.backend, "memory");
        assert_eq!(settings.rewards.referral_new_user_bonus, 50);
        assert_eq!(settings.rewards.referral_referrer_bonus, 100);
        assert_eq!(settings.rewards.whatsapp_reward, 50);
        assert!(settings.rewards.allow_repeat_completion);
        assert_eq!(settings.rewards.leaderboard_size, 10);
    }
}
