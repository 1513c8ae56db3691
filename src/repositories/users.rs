use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::store::DocumentStore;
use crate::models::users::User;

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        UserRepository { store }
    }

    fn path(user_id: &str) -> String {
        format!("users/{user_id}")
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, anyhow::Error> {
        match self.store.get(&Self::path(user_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Full user listing. A record that fails to deserialize is skipped and
    /// logged; one corrupt record must not take down every bulk operation
    /// that walks the user set.
    pub async fn list_users(&self) -> Result<Vec<(String, User)>, anyhow::Error> {
        let mut users = Vec::new();
        for (id, value) in self.store.list("users").await? {
            match serde_json::from_value(value) {
                Ok(user) => users.push((id, user)),
                Err(e) => log::warn!("Skipping malformed user record {}: {}", id, e),
            }
        }
        Ok(users)
    }

    /// Atomic balance bump; a missing user record starts from zero.
    pub async fn add_coins(&self, user_id: &str, delta: i64) -> Result<i64, anyhow::Error> {
        self.store.increment(&Self::path(user_id), "coins", delta).await
    }

    pub async fn set_balance(&self, user_id: &str, coins: i64) -> Result<(), anyhow::Error> {
        let mut fields = Map::new();
        fields.insert("coins".to_string(), json!(coins));
        self.store.update(&Self::path(user_id), fields).await
    }

    pub async fn increment_tasks_completed(&self, user_id: &str) -> Result<i64, anyhow::Error> {
        self.store
            .increment(&Self::path(user_id), "tasksCompleted", 1)
            .await
    }

    pub async fn update_fields(
        &self,
        user_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), anyhow::Error> {
        self.store.update(&Self::path(user_id), fields).await
    }

    pub async fn connect_whatsapp(&self, user_id: &str, now: &str) -> Result<(), anyhow::Error> {
        let mut fields = Map::new();
        fields.insert("whatsappConnected".to_string(), json!(true));
        fields.insert("whatsappConnectedAt".to_string(), json!(now));
        fields.insert("lastWhatsAppEarning".to_string(), Value::Null);
        self.store.update(&Self::path(user_id), fields).await
    }

    pub async fn stamp_last_whatsapp_earning(
        &self,
        user_id: &str,
        now: &str,
    ) -> Result<(), anyhow::Error> {
        let mut fields = Map::new();
        fields.insert("lastWhatsAppEarning".to_string(), json!(now));
        self.store.update(&Self::path(user_id), fields).await
    }

    pub async fn find_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<(String, User)>, anyhow::Error> {
        let mut matches = self.store.query_equal("users", "referralCode", code).await?;
        if matches.is_empty() {
            return Ok(None);
        }
        // Codes are unique by construction; on a malformed tie the first
        // record wins.
        let (id, value) = matches.remove(0);
        Ok(Some((id, serde_json::from_value(value)?)))
    }

    pub async fn find_referred_by(&self, code: &str) -> Result<Vec<(String, User)>, anyhow::Error> {
        let mut users = Vec::new();
        for (id, value) in self.store.query_equal("users", "referredBy", code).await? {
            users.push((id, serde_json::from_value(value)?));
        }
        Ok(users)
    }

    /// Conditional attribution: returns false when the user was already
    /// referred, without touching the record.
    pub async fn mark_referred_by(&self, user_id: &str, code: &str) -> Result<bool, anyhow::Error> {
        self.store
            .set_if_absent(&Self::path(user_id), "referredBy", json!(code))
            .await
    }

    /// Records a completion under `completions/{userId}`; returns false when
    /// the task was completed before.
    pub async fn mark_task_completed(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<bool, anyhow::Error> {
        self.store
            .set_if_absent(&format!("completions/{user_id}"), task_id, json!(true))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryStore;

    fn repo() -> UserRepository {
        UserRepository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn missing_user_reads_as_none_but_credits_from_zero() {
        let users = repo();
        assert!(users.get_user("ghost").await.unwrap().is_none());
        assert_eq!(users.add_coins("ghost", 25).await.unwrap(), 25);
        assert_eq!(users.get_user("ghost").await.unwrap().unwrap().coins, 25);
    }

    #[tokio::test]
    async fn referral_attribution_is_one_shot() {
        let users = repo();
        assert!(users.mark_referred_by("u1", "AAAA").await.unwrap());
        assert!(!users.mark_referred_by("u1", "BBBB").await.unwrap());

        let user = users.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.referred_by.as_deref(), Some("AAAA"));
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_by_list_users() {
        let store = Arc::new(MemoryStore::new());
        let users = UserRepository::new(store.clone());
        store.set("users/good", json!({"coins": 10})).await.unwrap();
        store.set("users/bad", json!({"coins": "5"})).await.unwrap();

        let listed = users.list_users().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "good");
    }

    #[tokio::test]
    async fn connect_whatsapp_sets_flags_and_clears_last_earning() {
        let users = repo();
        users
            .stamp_last_whatsapp_earning("u1", "2026-01-01T00:00:00.000Z")
            .await
            .unwrap();
        users.connect_whatsapp("u1", "2026-02-01T00:00:00.000Z").await.unwrap();

        let user = users.get_user("u1").await.unwrap().unwrap();
        assert!(user.whatsapp_connected);
        assert_eq!(
            user.whatsapp_connected_at.as_deref(),
            Some("2026-02-01T00:00:00.000Z")
        );
        assert!(user.last_whatsapp_earning.is_none());
    }
}
