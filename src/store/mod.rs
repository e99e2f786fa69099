//! Storage abstraction for vouchers, credit accounts and subscriptions.
//!
//! Every mutable record carries a version. Writers read a record, check their
//! precondition, then call `compare_and_set_*` with the version they read; the
//! write only lands if nobody else wrote in between. Passing `None` as the
//! expected version means "create, but only if absent".

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::models::{CreditAccount, LedgerEntry, Subscription, Voucher};

/// Upper bound on optimistic retries before giving up with a conflict.
pub const MAX_CAS_ATTEMPTS: usize = 64;

/// How a combined redemption write ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemWrite {
    /// Voucher, account and ledger entry all landed
    Committed,
    /// The voucher moved past the expected version; nothing was written
    VoucherChanged,
    /// The account moved past the expected version; nothing was written
    AccountChanged,
}

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: i64,
    pub record: T,
}

pub trait Store: Send + Sync {
    /// Persist a new voucher at version 1. Fails if the id already exists.
    fn insert_voucher(&self, voucher: &Voucher) -> Result<()>;

    fn get_voucher(&self, id: &str) -> Result<Option<Versioned<Voucher>>>;

    /// All vouchers sharing a lookup bucket, redeemed or not.
    fn find_vouchers_by_lookup_key(&self, lookup_key: &str) -> Result<Vec<Versioned<Voucher>>>;

    /// Vouchers issued for an institution, newest first.
    fn list_vouchers_for_institution(&self, institution_id: &str) -> Result<Vec<Voucher>>;

    /// Mark a voucher redeemed and credit the redeeming account in one
    /// atomic step. Both versions are checked first; if either moved, or any
    /// write fails, neither record changes. Only the voucher's redemption
    /// fields are written.
    fn redeem_voucher(
        &self,
        expected_voucher_version: i64,
        voucher: &Voucher,
        expected_account_version: Option<i64>,
        account: &CreditAccount,
        entry: &LedgerEntry,
    ) -> Result<RedeemWrite>;

    fn get_account(&self, user_id: &str) -> Result<Option<Versioned<CreditAccount>>>;

    /// Write an account and its ledger entry as one atomic step.
    fn compare_and_set_account(
        &self,
        expected_version: Option<i64>,
        account: &CreditAccount,
        entry: &LedgerEntry,
    ) -> Result<bool>;

    /// Ledger entries for a user, newest first.
    fn list_ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>>;

    fn get_subscription(&self, learner_id: &str) -> Result<Option<Versioned<Subscription>>>;

    fn compare_and_set_subscription(
        &self,
        expected_version: Option<i64>,
        subscription: &Subscription,
    ) -> Result<bool>;
}
