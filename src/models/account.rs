use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Spendable credits held by a guardian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: String,
    pub balance: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    Redeem,
    Spend,
    Refund,
}

/// One balance change. Written in the same atomic step as the account update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub kind: EntryKind,
    /// Signed change: positive for redemptions and refunds, -1 for spends
    pub amount: i64,
    pub balance_after: i64,
    pub voucher_id: Option<String>,
    pub learner_id: Option<String>,
    pub created_at: i64,
}
