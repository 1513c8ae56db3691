use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::earnings::EarningsRequest;
use super::{RequestHandler, Service, ServiceError};
use crate::models::referrals::{ReferralOutcome, ReferralSummary, ReferredUser};
use crate::repositories::store::DocumentStore;
use crate::repositories::users::UserRepository;

pub enum ReferralsRequest {
    Apply {
        referral_code: String,
        new_user_id: String,
        response: oneshot::Sender<Result<ReferralOutcome, ServiceError>>,
    },
    Summary {
        user_id: String,
        response: oneshot::Sender<Result<ReferralSummary, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ReferralsRequestHandler {
    users: UserRepository,
    earnings_channel: mpsc::Sender<EarningsRequest>,
    new_user_bonus: i64,
    referrer_bonus: i64,
}

impl ReferralsRequestHandler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        earnings_channel: mpsc::Sender<EarningsRequest>,
        new_user_bonus: i64,
        referrer_bonus: i64,
    ) -> Self {
        ReferralsRequestHandler {
            users: UserRepository::new(store),
            earnings_channel,
            new_user_bonus,
            referrer_bonus,
        }
    }

    /// Credits both sides of a referral exactly once per new user. The
    /// conditional `referredBy` write is the idempotency guard: it happens
    /// atomically with the check, before any coin moves, so a resubmitted
    /// code cannot re-credit either party.
    async fn apply(
        &self,
        referral_code: &str,
        new_user_id: &str,
    ) -> Result<ReferralOutcome, ServiceError> {
        let (referrer_id, _referrer) = self
            .users
            .find_by_referral_code(referral_code)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("Referral code".to_string()))?;

        let attributed = self
            .users
            .mark_referred_by(new_user_id, referral_code)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        if !attributed {
            return Err(ServiceError::Validation(
                "Referral already applied for this user".to_string(),
            ));
        }

        self.users
            .add_coins(new_user_id, self.new_user_bonus)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        let (credit_tx, credit_rx) = oneshot::channel();
        self.earnings_channel
            .send(EarningsRequest::Credit {
                user_id: referrer_id.clone(),
                amount: self.referrer_bonus,
                kind: "Referral Bonus".to_string(),
                task_id: None,
                response: credit_tx,
            })
            .await
            .map_err(|e| {
                ServiceError::Communication("Referrals => Earnings".to_string(), e.to_string())
            })?;
        credit_rx
            .await
            .map_err(|e| {
                ServiceError::Communication("Earnings => Referrals".to_string(), e.to_string())
            })??;

        log::info!("Referral {} applied: {} referred {}", referral_code, referrer_id, new_user_id);
        Ok(ReferralOutcome {
            new_user_bonus: self.new_user_bonus,
            referrer_bonus: self.referrer_bonus,
        })
    }

    async fn summary(&self, user_id: &str) -> Result<ReferralSummary, ServiceError> {
        let user = self
            .users
            .get_user(user_id)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        let Some(code) = user.and_then(|u| u.referral_code) else {
            // Users without a code simply have no referrals yet.
            return Ok(ReferralSummary::default());
        };

        let referred = self
            .users
            .find_referred_by(&code)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        let referrals: Vec<ReferredUser> = referred
            .into_iter()
            .map(|(id, user)| ReferredUser {
                id,
                full_name: user.full_name,
            })
            .collect();
        let total_referrals = referrals.len();

        Ok(ReferralSummary {
            referral_code: Some(code),
            referrals,
            total_referrals,
            earned_from_referrals: total_referrals as i64 * self.referrer_bonus,
        })
    }
}

#[async_trait]
impl RequestHandler<ReferralsRequest> for ReferralsRequestHandler {
    async fn handle_request(&self, request: ReferralsRequest) {
        match request {
            ReferralsRequest::Apply {
                referral_code,
                new_user_id,
                response,
            } => {
                let result = self.apply(&referral_code, &new_user_id).await;
                let _ = response.send(result);
            }
            ReferralsRequest::Summary { user_id, response } => {
                let result = self.summary(&user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct ReferralsService;

impl ReferralsService {
    pub fn new() -> Self {
        ReferralsService {}
    }
}

#[async_trait]
impl Service<ReferralsRequest, ReferralsRequestHandler> for ReferralsService {}
