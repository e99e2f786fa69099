use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    NotSubscribed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub learner_id: String,
    /// Guardian whose credit most recently funded the window
    pub funded_by: String,
    pub start_date: i64,
    pub end_date: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    /// Status is never stored; it falls out of `end_date` at read time.
    pub fn status_at(&self, now: i64) -> SubscriptionStatus {
        if now < self.end_date {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Expired
        }
    }
}

/// Status of a single learner, including learners with no record at all.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub learner_id: String,
    pub status: SubscriptionStatus,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
}

impl SubscriptionView {
    pub fn from_record(learner_id: &str, record: Option<&Subscription>, now: i64) -> Self {
        match record {
            Some(sub) => Self {
                learner_id: learner_id.to_string(),
                status: sub.status_at(now),
                start_date: Some(sub.start_date),
                end_date: Some(sub.end_date),
            },
            None => Self {
                learner_id: learner_id.to_string(),
                status: SubscriptionStatus::NotSubscribed,
                start_date: None,
                end_date: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendResult {
    pub learner_id: String,
    pub guardian_user_id: String,
    pub start_date: i64,
    pub end_date: i64,
    pub status: SubscriptionStatus,
    /// Guardian's balance after the spend
    pub balance: i64,
}
