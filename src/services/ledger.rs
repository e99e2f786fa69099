use std::sync::Arc;

use crate::config::validate_extension_days;
use crate::error::{AppError, Result};
use crate::models::{LedgerEntry, SpendResult, Subscription, SubscriptionStatus, SubscriptionView};
use crate::store::{MAX_CAS_ATTEMPTS, Store};
use crate::util::{SubscriptionWindow, now, require_id};

use super::accounts::{BalanceChange, apply_balance_change};

/// Guardian credit balances and the learner subscriptions they pay for.
#[derive(Clone)]
pub struct SubscriptionLedger {
    store: Arc<dyn Store>,
    extension_days: i64,
}

impl SubscriptionLedger {
    pub fn new(store: Arc<dyn Store>, extension_days: i64) -> Result<Self> {
        validate_extension_days(extension_days)?;
        Ok(Self {
            store,
            extension_days,
        })
    }

    pub fn extension_days(&self) -> i64 {
        self.extension_days
    }

    /// Spend one of the guardian's credits on a learner's subscription.
    pub fn spend(&self, learner_id: &str, guardian_user_id: &str) -> Result<SpendResult> {
        self.spend_at(learner_id, guardian_user_id, now())
    }

    /// `spend` against an explicit clock reading.
    pub fn spend_at(&self, learner_id: &str, guardian_user_id: &str, now: i64) -> Result<SpendResult> {
        require_id(learner_id, "learner_id")?;
        require_id(guardian_user_id, "guardian_user_id")?;

        let balance = apply_balance_change(
            self.store.as_ref(),
            guardian_user_id,
            BalanceChange::Debit { learner_id },
            now,
        )
        .inspect_err(|e| {
            if let AppError::InsufficientCredit { balance } = e {
                tracing::warn!(
                    "Guardian {} cannot fund learner {}: balance {}",
                    guardian_user_id,
                    learner_id,
                    balance
                );
            }
        })?;

        let subscription = match self.extend(learner_id, guardian_user_id, now) {
            Ok(sub) => sub,
            Err(e) => {
                tracing::error!(
                    "Extending subscription for learner {} failed, refunding {}: {}",
                    learner_id,
                    guardian_user_id,
                    e
                );
                if let Err(refund_err) = apply_balance_change(
                    self.store.as_ref(),
                    guardian_user_id,
                    BalanceChange::Refund { learner_id },
                    now,
                ) {
                    tracing::error!(
                        "Refund to {} for learner {} failed: {} (extension error: {})",
                        guardian_user_id,
                        learner_id,
                        refund_err,
                        e
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Guardian {} extended learner {} until {} (balance {})",
            guardian_user_id,
            learner_id,
            subscription.end_date,
            balance
        );

        Ok(SpendResult {
            learner_id: subscription.learner_id,
            guardian_user_id: guardian_user_id.to_string(),
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            status: SubscriptionStatus::Active,
            balance,
        })
    }

    fn extend(&self, learner_id: &str, guardian_user_id: &str, now: i64) -> Result<Subscription> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.store.get_subscription(learner_id)?;
            let window = SubscriptionWindow::extend(
                current.as_ref().map(|v| &v.record),
                now,
                self.extension_days,
            )?;

            let subscription = Subscription {
                learner_id: learner_id.to_string(),
                funded_by: guardian_user_id.to_string(),
                start_date: window.start_date,
                end_date: window.end_date,
                created_at: current.as_ref().map_or(now, |v| v.record.created_at),
                updated_at: now,
            };

            if self
                .store
                .compare_and_set_subscription(current.map(|v| v.version), &subscription)?
            {
                return Ok(subscription);
            }

            tracing::debug!(
                "Subscription for learner {} changed concurrently (attempt {})",
                learner_id,
                attempt
            );
        }

        Err(AppError::Conflict(format!(
            "Subscription for learner {} is busy, try again",
            learner_id
        )))
    }

    pub fn status_of(&self, learner_id: &str) -> Result<SubscriptionStatus> {
        self.status_at(learner_id, now())
    }

    pub fn status_at(&self, learner_id: &str, now: i64) -> Result<SubscriptionStatus> {
        Ok(self.subscription_at(learner_id, now)?.status)
    }

    pub fn subscription_of(&self, learner_id: &str) -> Result<SubscriptionView> {
        self.subscription_at(learner_id, now())
    }

    pub fn subscription_at(&self, learner_id: &str, now: i64) -> Result<SubscriptionView> {
        require_id(learner_id, "learner_id")?;
        let record = self.store.get_subscription(learner_id)?;
        Ok(SubscriptionView::from_record(
            learner_id,
            record.as_ref().map(|v| &v.record),
            now,
        ))
    }

    pub fn balance_of(&self, user_id: &str) -> Result<i64> {
        require_id(user_id, "user_id")?;
        Ok(self
            .store
            .get_account(user_id)?
            .map_or(0, |v| v.record.balance))
    }

    /// Ledger entries for a user, newest first.
    pub fn history(&self, user_id: &str) -> Result<Vec<LedgerEntry>> {
        require_id(user_id, "user_id")?;
        self.store.list_ledger_entries(user_id)
    }
}
