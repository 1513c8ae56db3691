use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{LeaderboardEntry, User};
use crate::repositories::store::{now_rfc3339, DocumentStore};
use crate::repositories::users::UserRepository;

pub enum UsersRequest {
    Get {
        user_id: String,
        response: oneshot::Sender<Result<Option<User>, ServiceError>>,
    },
    UpdateProfile {
        user_id: String,
        full_name: Option<String>,
        phone: Option<String>,
        response: oneshot::Sender<Result<Map<String, Value>, ServiceError>>,
    },
    ConnectWhatsapp {
        user_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    Leaderboard {
        response: oneshot::Sender<Result<Vec<LeaderboardEntry>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UsersRequestHandler {
    users: UserRepository,
    leaderboard_size: usize,
}

impl UsersRequestHandler {
    pub fn new(store: Arc<dyn DocumentStore>, leaderboard_size: usize) -> Self {
        UsersRequestHandler {
            users: UserRepository::new(store),
            leaderboard_size,
        }
    }

    async fn get(&self, user_id: &str) -> Result<Option<User>, ServiceError> {
        self.users
            .get_user(user_id)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    /// Applies the provided subset and echoes exactly what was written.
    async fn update_profile(
        &self,
        user_id: &str,
        full_name: Option<String>,
        phone: Option<String>,
    ) -> Result<Map<String, Value>, ServiceError> {
        let mut updates = Map::new();
        if let Some(full_name) = full_name {
            updates.insert("fullName".to_string(), json!(full_name));
        }
        if let Some(phone) = phone {
            updates.insert("phone".to_string(), json!(phone));
        }
        if updates.is_empty() {
            return Err(ServiceError::Validation(
                "No valid fields to update".to_string(),
            ));
        }

        self.users
            .update_fields(user_id, updates.clone())
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        Ok(updates)
    }

    async fn connect_whatsapp(&self, user_id: &str) -> Result<(), ServiceError> {
        self.users
            .connect_whatsapp(user_id, &now_rfc3339())
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        let mut users = self
            .users
            .list_users()
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        users.sort_by(|a, b| b.1.coins.cmp(&a.1.coins));

        Ok(users
            .into_iter()
            .take(self.leaderboard_size)
            .map(|(id, user)| LeaderboardEntry {
                id,
                full_name: user.full_name,
                coins: user.coins,
                tasks_completed: user.tasks_completed,
            })
            .collect())
    }
}

#[async_trait]
impl RequestHandler<UsersRequest> for UsersRequestHandler {
    async fn handle_request(&self, request: UsersRequest) {
        match request {
            UsersRequest::Get { user_id, response } => {
                let result = self.get(&user_id).await;
                let _ = response.send(result);
            }
            UsersRequest::UpdateProfile {
                user_id,
                full_name,
                phone,
                response,
            } => {
                let result = self.update_profile(&user_id, full_name, phone).await;
                let _ = response.send(result);
            }
            UsersRequest::ConnectWhatsapp { user_id, response } => {
                let result = self.connect_whatsapp(&user_id).await;
                let _ = response.send(result);
            }
            UsersRequest::Leaderboard { response } => {
                let result = self.leaderboard().await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct UsersService;

impl UsersService {
    pub fn new() -> Self {
        UsersService {}
    }
}

#[async_trait]
impl Service<UsersRequest, UsersRequestHandler> for UsersService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    fn handler(store: Arc<dyn DocumentStore>) -> UsersRequestHandler {
        UsersRequestHandler::new(store, 10)
    }

    #[tokio::test]
    async fn leaderboard_orders_by_balance_descending() {
        let store = testing::memory_store();
        store.set("users/a", json!({"coins": 10, "fullName": "A"})).await.unwrap();
        store.set("users/b", json!({"coins": 50, "fullName": "B"})).await.unwrap();
        store.set("users/c", json!({"coins": 5, "fullName": "C"})).await.unwrap();

        let board = handler(store).leaderboard().await.unwrap();
        let coins: Vec<i64> = board.iter().map(|entry| entry.coins).collect();
        assert_eq!(coins, [50, 10, 5]);
        assert_eq!(board[0].id, "b");
    }

    #[tokio::test]
    async fn leaderboard_is_truncated_to_configured_size() {
        let store = testing::memory_store();
        for i in 0..15 {
            store
                .set(&format!("users/u{i}"), json!({"coins": i}))
                .await
                .unwrap();
        }

        let board = UsersRequestHandler::new(store, 10).leaderboard().await.unwrap();
        assert_eq!(board.len(), 10);
        assert_eq!(board[0].coins, 14);
    }

    #[tokio::test]
    async fn profile_update_echoes_applied_fields_only() {
        let store = testing::memory_store();
        let users = handler(store);

        let applied = users
            .update_profile("u1", Some("Ada Lovelace".to_string()), None)
            .await
            .unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied["fullName"], json!("Ada Lovelace"));

        let user = users.get("u1").await.unwrap().unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Ada Lovelace"));
        assert!(user.phone.is_none());
    }

    #[tokio::test]
    async fn profile_update_with_no_fields_is_a_validation_error() {
        let store = testing::memory_store();
        let error = handler(store)
            .update_profile("u1", None, None)
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn connect_whatsapp_marks_the_user_connected() {
        let store = testing::memory_store();
        let users = handler(store);

        users.connect_whatsapp("u1").await.unwrap();
        let user = users.get("u1").await.unwrap().unwrap();
        assert!(user.whatsapp_connected);
        assert!(user.whatsapp_connected_at.is_some());
    }
}
