use std::sync::Arc;

use serde_json::json;

use super::store::{now_rfc3339, DocumentStore};
use crate::models::earnings::Earning;

#[derive(Clone)]
pub struct EarningRepository {
    store: Arc<dyn DocumentStore>,
}

impl EarningRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        EarningRepository { store }
    }

    fn path(user_id: &str) -> String {
        format!("earnings/{user_id}")
    }

    /// Appends one immutable ledger entry and returns it with the generated
    /// key. The entry is never updated or deleted afterwards.
    pub async fn append(
        &self,
        user_id: &str,
        kind: &str,
        amount: i64,
        task_id: Option<&str>,
    ) -> Result<Earning, anyhow::Error> {
        let timestamp = now_rfc3339();
        let mut record = json!({
            "type": kind,
            "amount": amount,
            "timestamp": timestamp,
        });
        if let Some(task_id) = task_id {
            record["taskId"] = json!(task_id);
        }

        let id = self.store.push(&Self::path(user_id), record).await?;

        Ok(Earning {
            id,
            kind: kind.to_string(),
            amount,
            timestamp,
            task_id: task_id.map(str::to_string),
        })
    }

    /// Full ledger for a user, newest first. Push keys break timestamp ties
    /// in creation order.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Earning>, anyhow::Error> {
        let mut earnings = Vec::new();
        for (id, value) in self.store.list(&Self::path(user_id)).await? {
            let mut earning: Earning = serde_json::from_value(value)?;
            earning.id = id;
            earnings.push(earning);
        }
        earnings.sort_by(|a, b| (&b.timestamp, &b.id).cmp(&(&a.timestamp, &a.id)));
        Ok(earnings)
    }

    pub async fn total(&self, user_id: &str) -> Result<i64, anyhow::Error> {
        let children = self.store.list(&Self::path(user_id)).await?;
        Ok(children
            .iter()
            .map(|(_, value)| value.get("amount").and_then(serde_json::Value::as_i64).unwrap_or(0))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryStore;

    fn repo() -> EarningRepository {
        EarningRepository::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn append_then_list_returns_newest_first() {
        let earnings = repo();
        let first = earnings.append("u1", "Task: Watch Video", 20, Some("task3")).await.unwrap();
        let second = earnings.append("u1", "Referral Bonus", 100, None).await.unwrap();

        let ledger = earnings.list("u1").await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].id, second.id);
        assert_eq!(ledger[1].id, first.id);
        assert_eq!(ledger[1].task_id.as_deref(), Some("task3"));
    }

    #[tokio::test]
    async fn total_sums_all_amounts() {
        let earnings = repo();
        for amount in [10, 20, 30] {
            earnings.append("u1", "Task: Complete Survey", amount, None).await.unwrap();
        }
        assert_eq!(earnings.total("u1").await.unwrap(), 60);
        assert_eq!(earnings.total("nobody").await.unwrap(), 0);
    }
}
