use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::store::DocumentStore;
use crate::settings::Settings;

pub mod earnings;
pub mod http;
pub mod referrals;
pub mod sweep;
pub mod tasks;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

/// Engine loop: one task per request, so operations against the same user
/// run concurrently and never serialize in-process. The store's per-record
/// primitives are the only synchronization.
#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Spawns every engine and returns the channel set the HTTP layer talks to.
pub fn spawn_engines(store: Arc<dyn DocumentStore>, settings: &Settings) -> http::Channels {
    let (earnings_tx, mut earnings_rx) = mpsc::channel(512);
    let (tasks_tx, mut tasks_rx) = mpsc::channel(512);
    let (referrals_tx, mut referrals_rx) = mpsc::channel(512);
    let (sweep_tx, mut sweep_rx) = mpsc::channel(512);
    let (users_tx, mut users_rx) = mpsc::channel(512);

    log::info!("Starting earnings service.");
    let mut earnings_service = earnings::EarningsService::new();
    let earnings_handler = earnings::EarningsRequestHandler::new(store.clone());
    tokio::spawn(async move {
        earnings_service.run(earnings_handler, &mut earnings_rx).await;
    });

    log::info!("Starting tasks service.");
    let mut tasks_service = tasks::TasksService::new();
    let tasks_handler = tasks::TasksRequestHandler::new(
        store.clone(),
        earnings_tx.clone(),
        settings.rewards.allow_repeat_completion,
    );
    tokio::spawn(async move {
        tasks_service.run(tasks_handler, &mut tasks_rx).await;
    });

    log::info!("Starting referrals service.");
    let mut referrals_service = referrals::ReferralsService::new();
    let referrals_handler = referrals::ReferralsRequestHandler::new(
        store.clone(),
        earnings_tx.clone(),
        settings.rewards.referral_new_user_bonus,
        settings.rewards.referral_referrer_bonus,
    );
    tokio::spawn(async move {
        referrals_service.run(referrals_handler, &mut referrals_rx).await;
    });

    log::info!("Starting sweep service.");
    let mut sweep_service = sweep::SweepService::new();
    let sweep_handler = sweep::SweepRequestHandler::new(
        store.clone(),
        earnings_tx.clone(),
        settings.rewards.whatsapp_reward,
    );
    tokio::spawn(async move {
        sweep_service.run(sweep_handler, &mut sweep_rx).await;
    });

    log::info!("Starting users service.");
    let mut users_service = users::UsersService::new();
    let users_handler =
        users::UsersRequestHandler::new(store, settings.rewards.leaderboard_size);
    tokio::spawn(async move {
        users_service.run(users_handler, &mut users_rx).await;
    });

    http::Channels {
        earnings: earnings_tx,
        tasks: tasks_tx,
        referrals: referrals_tx,
        sweep: sweep_tx,
        users: users_tx,
    }
}

pub async fn start_services(
    store: Arc<dyn DocumentStore>,
    settings: Settings,
    listen: &str,
) -> Result<(), anyhow::Error> {
    let channels = spawn_engines(store, &settings);

    log::info!("Starting HTTP server.");
    http::start_http_server(listen, channels).await
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::earnings::{EarningsRequest, EarningsRequestHandler, EarningsService};
    use super::Service;
    use crate::repositories::memory::MemoryStore;
    use crate::repositories::store::DocumentStore;
    use crate::settings::{Rewards, Settings, Store};

    pub fn memory_store() -> Arc<dyn DocumentStore> {
        Arc::new(MemoryStore::new())
    }

    pub fn test_settings() -> Settings {
        Settings {
            store: Store {
                backend: "memory".to_string(),
                firebase_url: String::new(),
                firebase_auth: String::new(),
            },
            rewards: Rewards {
                referral_new_user_bonus: 50,
                referral_referrer_bonus: 100,
                whatsapp_reward: 50,
                allow_repeat_completion: true,
                leaderboard_size: 10,
            },
        }
    }

    pub fn spawn_earnings(store: Arc<dyn DocumentStore>) -> mpsc::Sender<EarningsRequest> {
        let (tx, mut rx) = mpsc::channel(64);
        let mut service = EarningsService::new();
        let handler = EarningsRequestHandler::new(store);
        tokio::spawn(async move {
            service.run(handler, &mut rx).await;
        });
        tx
    }
}
