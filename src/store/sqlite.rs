use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::models::{CreditAccount, LedgerEntry, Subscription, Voucher};

use super::{RedeemWrite, Store, Versioned};

/// Store backed by a pooled SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Store for SqliteStore {
    fn insert_voucher(&self, voucher: &Voucher) -> Result<()> {
        let conn = self.pool.get()?;
        queries::insert_voucher(&conn, voucher)
    }

    fn get_voucher(&self, id: &str) -> Result<Option<Versioned<Voucher>>> {
        let conn = self.pool.get()?;
        queries::get_voucher_by_id(&conn, id)
    }

    fn find_vouchers_by_lookup_key(&self, lookup_key: &str) -> Result<Vec<Versioned<Voucher>>> {
        let conn = self.pool.get()?;
        queries::get_vouchers_by_lookup_key(&conn, lookup_key)
    }

    fn list_vouchers_for_institution(&self, institution_id: &str) -> Result<Vec<Voucher>> {
        let conn = self.pool.get()?;
        queries::list_vouchers_for_institution(&conn, institution_id)
    }

    fn redeem_voucher(
        &self,
        expected_voucher_version: i64,
        voucher: &Voucher,
        expected_account_version: Option<i64>,
        account: &CreditAccount,
        entry: &LedgerEntry,
    ) -> Result<RedeemWrite> {
        let mut conn = self.pool.get()?;
        queries::redeem_voucher(
            &mut conn,
            expected_voucher_version,
            voucher,
            expected_account_version,
            account,
            entry,
        )
    }

    fn get_account(&self, user_id: &str) -> Result<Option<Versioned<CreditAccount>>> {
        let conn = self.pool.get()?;
        queries::get_account(&conn, user_id)
    }

    fn compare_and_set_account(
        &self,
        expected_version: Option<i64>,
        account: &CreditAccount,
        entry: &LedgerEntry,
    ) -> Result<bool> {
        let mut conn = self.pool.get()?;
        queries::compare_and_set_account(&mut conn, expected_version, account, entry)
    }

    fn list_ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>> {
        let conn = self.pool.get()?;
        queries::list_ledger_entries(&conn, user_id)
    }

    fn get_subscription(&self, learner_id: &str) -> Result<Option<Versioned<Subscription>>> {
        let conn = self.pool.get()?;
        queries::get_subscription(&conn, learner_id)
    }

    fn compare_and_set_subscription(
        &self,
        expected_version: Option<i64>,
        subscription: &Subscription,
    ) -> Result<bool> {
        let conn = self.pool.get()?;
        queries::compare_and_set_subscription(&conn, expected_version, subscription)
    }
}
