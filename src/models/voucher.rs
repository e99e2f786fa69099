use serde::{Deserialize, Serialize};

use crate::crypto::format_code;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voucher {
    pub id: String,
    /// Salted SHA-256 of the code; the plaintext is never stored
    #[serde(skip_serializing)]
    pub code_hash: String,
    #[serde(skip_serializing)]
    pub salt: String,
    #[serde(skip_serializing)]
    pub lookup_key: String,
    pub denomination: i64,
    /// Number of learners this voucher is meant to cover
    pub learner_count: i64,
    pub issued_by_user_id: String,
    pub institution_id: String,
    pub is_redeemed: bool,
    pub redeemed_by: Option<String>,
    pub redeemed_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVoucher {
    pub denomination: i64,
    pub learner_count: i64,
    pub issued_by_user_id: String,
    pub institution_id: String,
}

/// A freshly issued voucher. The only place the plaintext code ever leaves
/// the issuer.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedVoucher {
    #[serde(flatten)]
    pub voucher: Voucher,
    pub code: String,
}

impl IssuedVoucher {
    /// Code grouped as `XXXX-XXXX` for printing on a voucher slip.
    pub fn display_code(&self) -> String {
        format_code(&self.code)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionResult {
    pub voucher_id: String,
    pub credits_granted: i64,
    pub balance: i64,
    pub redeemed_at: i64,
}
