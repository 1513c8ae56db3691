use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::earnings::{CreditOutcome, Earning};
use crate::repositories::earnings::EarningRepository;
use crate::repositories::store::DocumentStore;
use crate::repositories::users::UserRepository;

pub enum EarningsRequest {
    Credit {
        user_id: String,
        amount: i64,
        kind: String,
        task_id: Option<String>,
        response: oneshot::Sender<Result<CreditOutcome, ServiceError>>,
    },
    ListEarnings {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Earning>, ServiceError>>,
    },
    Reconcile {
        user_id: String,
        response: oneshot::Sender<Result<i64, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct EarningsRequestHandler {
    earnings: EarningRepository,
    users: UserRepository,
}

impl EarningsRequestHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        EarningsRequestHandler {
            earnings: EarningRepository::new(store.clone()),
            users: UserRepository::new(store),
        }
    }

    /// The one balance-mutation path in the system: append the ledger entry,
    /// then bump the balance with an atomic increment. The entry goes first
    /// so a balance bump without a matching entry is never observable; the
    /// increment means a racing credit can never drop this update.
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        kind: &str,
        task_id: Option<&str>,
    ) -> Result<CreditOutcome, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation(
                "Amount must be a positive integer".to_string(),
            ));
        }

        let earning = self
            .earnings
            .append(user_id, kind, amount, task_id)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        let new_balance = self
            .users
            .add_coins(user_id, amount)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        log::info!("Credited {} to {} ({})", amount, user_id, kind);
        Ok(CreditOutcome { earning, new_balance })
    }

    async fn list_earnings(&self, user_id: &str) -> Result<Vec<Earning>, ServiceError> {
        self.earnings
            .list(user_id)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    /// Recovery pass for a credit that failed between its two writes: the
    /// ledger is the source of truth, so the balance is rewritten as the sum
    /// of all entries. Meant to run while the user is quiescent.
    async fn reconcile(&self, user_id: &str) -> Result<i64, ServiceError> {
        let total = self
            .earnings
            .total(user_id)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        self.users
            .set_balance(user_id, total)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        log::info!("Reconciled balance for {} to {}", user_id, total);
        Ok(total)
    }
}

#[async_trait]
impl RequestHandler<EarningsRequest> for EarningsRequestHandler {
    async fn handle_request(&self, request: EarningsRequest) {
        match request {
            EarningsRequest::Credit {
                user_id,
                amount,
                kind,
                task_id,
                response,
            } => {
                let result = self
                    .credit(&user_id, amount, &kind, task_id.as_deref())
                    .await;
                let _ = response.send(result);
            }
            EarningsRequest::ListEarnings { user_id, response } => {
                let result = self.list_earnings(&user_id).await;
                let _ = response.send(result);
            }
            EarningsRequest::Reconcile { user_id, response } => {
                let result = self.reconcile(&user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct EarningsService;

impl EarningsService {
    pub fn new() -> Self {
        EarningsService {}
    }
}

#[async_trait]
impl Service<EarningsRequest, EarningsRequestHandler> for EarningsService {}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;
    use crate::services::testing;

    #[tokio::test]
    async fn credit_appends_ledger_entry_and_updates_balance() {
        let store = testing::memory_store();
        let handler = EarningsRequestHandler::new(store);

        let amounts = [10, 20, 30];
        for amount in amounts {
            handler.credit("u1", amount, "Task: Watch Video", None).await.unwrap();
        }

        let ledger = handler.list_earnings("u1").await.unwrap();
        assert_eq!(ledger.len(), amounts.len());

        let balance = handler.users.get_user("u1").await.unwrap().unwrap().coins;
        assert_eq!(balance, amounts.iter().sum::<i64>());
    }

    #[tokio::test]
    async fn concurrent_credits_do_not_lose_updates() {
        let store = testing::memory_store();
        let earnings_tx = testing::spawn_earnings(store.clone());

        // Both credits are in flight before either completes; the atomic
        // increment must still net exactly A + B.
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        earnings_tx
            .send(EarningsRequest::Credit {
                user_id: "u1".to_string(),
                amount: 70,
                kind: "Task: Download App B".to_string(),
                task_id: None,
                response: tx_a,
            })
            .await
            .unwrap();
        earnings_tx
            .send(EarningsRequest::Credit {
                user_id: "u1".to_string(),
                amount: 50,
                kind: "WhatsApp Earnings".to_string(),
                task_id: None,
                response: tx_b,
            })
            .await
            .unwrap();

        rx_a.await.unwrap().unwrap();
        rx_b.await.unwrap().unwrap();

        let handler = EarningsRequestHandler::new(store);
        let balance = handler.users.get_user("u1").await.unwrap().unwrap().coins;
        assert_eq!(balance, 120);
        assert_eq!(handler.list_earnings("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn credit_rejects_non_positive_amounts_before_any_write() {
        let store = testing::memory_store();
        let handler = EarningsRequestHandler::new(store);

        for amount in [0, -5] {
            let error = handler.credit("u1", amount, "Bonus", None).await.unwrap_err();
            assert!(matches!(error, ServiceError::Validation(_)));
        }

        assert!(handler.list_earnings("u1").await.unwrap().is_empty());
        assert!(handler.users.get_user("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credit_defaults_missing_user_balance_to_zero() {
        let store = testing::memory_store();
        let handler = EarningsRequestHandler::new(store);

        let outcome = handler.credit("fresh", 25, "Signup Bonus", None).await.unwrap();
        assert_eq!(outcome.new_balance, 25);
    }

    #[tokio::test]
    async fn list_earnings_is_newest_first() {
        let store = testing::memory_store();
        let handler = EarningsRequestHandler::new(store);

        handler.credit("u1", 10, "first", None).await.unwrap();
        handler.credit("u1", 20, "second", None).await.unwrap();

        let ledger = handler.list_earnings("u1").await.unwrap();
        assert_eq!(ledger[0].kind, "second");
        assert_eq!(ledger[1].kind, "first");
    }

    #[tokio::test]
    async fn reconcile_rewrites_drifted_balance_to_ledger_sum() {
        let store = testing::memory_store();
        let handler = EarningsRequestHandler::new(store);

        handler.credit("u1", 40, "Task: Complete Survey", None).await.unwrap();
        handler.credit("u1", 60, "Referral Bonus", None).await.unwrap();

        // Simulate a partially failed credit leaving the balance behind.
        handler.users.set_balance("u1", 5).await.unwrap();

        let reconciled = handler.reconcile("u1").await.unwrap();
        assert_eq!(reconciled, 100);
        assert_eq!(handler.users.get_user("u1").await.unwrap().unwrap().coins, 100);
    }
}
