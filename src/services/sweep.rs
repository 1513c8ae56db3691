use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};

use super::earnings::EarningsRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::repositories::store::{now_rfc3339, DocumentStore};
use crate::repositories::users::UserRepository;

pub enum SweepRequest {
    Run {
        response: oneshot::Sender<Result<usize, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct SweepRequestHandler {
    users: UserRepository,
    earnings_channel: mpsc::Sender<EarningsRequest>,
    reward: i64,
}

impl SweepRequestHandler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        earnings_channel: mpsc::Sender<EarningsRequest>,
        reward: i64,
    ) -> Self {
        SweepRequestHandler {
            users: UserRepository::new(store),
            earnings_channel,
            reward,
        }
    }

    /// One pass over the full user set. Per-user credits run concurrently
    /// and independently; a failed credit is logged and skipped, never
    /// aborting the rest. Returns the number of users credited. Re-running
    /// credits everyone again; overlap discipline belongs to the scheduler.
    async fn run_sweep(&self) -> Result<usize, ServiceError> {
        let users = self
            .users
            .list_users()
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        let credits = users
            .into_iter()
            .filter(|(_, user)| user.whatsapp_connected)
            .map(|(user_id, _)| self.credit_user(user_id));

        let results = join_all(credits).await;
        let processed = results.iter().filter(|result| result.is_ok()).count();
        for error in results.iter().filter_map(|result| result.as_ref().err()) {
            log::warn!("Sweep credit failed: {}", error);
        }

        log::info!("WhatsApp earnings processed for {} users", processed);
        Ok(processed)
    }

    async fn credit_user(&self, user_id: String) -> Result<(), ServiceError> {
        let (credit_tx, credit_rx) = oneshot::channel();
        self.earnings_channel
            .send(EarningsRequest::Credit {
                user_id: user_id.clone(),
                amount: self.reward,
                kind: "WhatsApp Earnings".to_string(),
                task_id: None,
                response: credit_tx,
            })
            .await
            .map_err(|e| ServiceError::Communication("Sweep => Earnings".to_string(), e.to_string()))?;
        credit_rx
            .await
            .map_err(|e| ServiceError::Communication("Earnings => Sweep".to_string(), e.to_string()))??;

        self.users
            .stamp_last_whatsapp_earning(&user_id, &now_rfc3339())
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl RequestHandler<SweepRequest> for SweepRequestHandler {
    async fn handle_request(&self, request: SweepRequest) {
        match request {
            SweepRequest::Run { response } => {
                let result = self.run_sweep().await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct SweepService;

impl SweepService {
    pub fn new() -> Self {
        SweepService {}
    }
}

#[async_trait]
impl Service<SweepRequest, SweepRequestHandler> for SweepService {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::repositories::earnings::EarningRepository;
    use crate::services::testing;

    #[tokio::test]
    async fn sweep_credits_only_connected_users() {
        let store = testing::memory_store();
        store
            .set("users/a", json!({"whatsappConnected": true, "coins": 0}))
            .await
            .unwrap();
        store
            .set("users/b", json!({"whatsappConnected": true, "coins": 10}))
            .await
            .unwrap();
        store
            .set("users/c", json!({"whatsappConnected": false, "coins": 5}))
            .await
            .unwrap();

        let earnings_tx = testing::spawn_earnings(store.clone());
        let sweep = SweepRequestHandler::new(store.clone(), earnings_tx, 50);

        let processed = sweep.run_sweep().await.unwrap();
        assert_eq!(processed, 2);

        let a = sweep.users.get_user("a").await.unwrap().unwrap();
        let b = sweep.users.get_user("b").await.unwrap().unwrap();
        let c = sweep.users.get_user("c").await.unwrap().unwrap();
        assert_eq!(a.coins, 50);
        assert_eq!(b.coins, 60);
        assert_eq!(c.coins, 5);
        assert!(a.last_whatsapp_earning.is_some());
        assert!(c.last_whatsapp_earning.is_none());

        let ledger = EarningRepository::new(store.clone());
        assert_eq!(ledger.list("a").await.unwrap().len(), 1);
        assert_eq!(ledger.list("a").await.unwrap()[0].kind, "WhatsApp Earnings");
        assert!(ledger.list("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_user_record_costs_only_that_user() {
        let store = testing::memory_store();
        store
            .set("users/good", json!({"whatsappConnected": true, "coins": 0}))
            .await
            .unwrap();
        // coins as a string does not deserialize; the record is skipped.
        store
            .set("users/bad", json!({"whatsappConnected": true, "coins": "5"}))
            .await
            .unwrap();

        let earnings_tx = testing::spawn_earnings(store.clone());
        let sweep = SweepRequestHandler::new(store, earnings_tx, 50);

        let processed = sweep.run_sweep().await.unwrap();
        assert_eq!(processed, 1);

        let good = sweep.users.get_user("good").await.unwrap().unwrap();
        assert_eq!(good.coins, 50);
    }

    #[tokio::test]
    async fn empty_user_set_processes_zero() {
        let store = testing::memory_store();
        let earnings_tx = testing::spawn_earnings(store.clone());
        let sweep = SweepRequestHandler::new(store, earnings_tx, 50);

        assert_eq!(sweep.run_sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rerunning_the_sweep_credits_again() {
        let store = testing::memory_store();
        store
            .set("users/a", json!({"whatsappConnected": true}))
            .await
            .unwrap();

        let earnings_tx = testing::spawn_earnings(store.clone());
        let sweep = SweepRequestHandler::new(store, earnings_tx, 50);

        sweep.run_sweep().await.unwrap();
        sweep.run_sweep().await.unwrap();

        let a = sweep.users.get_user("a").await.unwrap().unwrap();
        assert_eq!(a.coins, 100);
    }
}
