use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{AppError, Result};
use crate::models::{CreditAccount, LedgerEntry, Subscription, Voucher};

use super::{RedeemWrite, Store, Versioned};

#[derive(Default)]
struct Tables {
    vouchers: HashMap<String, Versioned<Voucher>>,
    accounts: HashMap<String, Versioned<CreditAccount>>,
    ledger: Vec<LedgerEntry>,
    subscriptions: HashMap<String, Versioned<Subscription>>,
}

/// Process-local store. A single lock covers the version check and the write,
/// which is what makes compare-and-set atomic here.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".into()))
    }
}

/// Whether `key` is at `expected_version` (`None` meaning absent).
fn version_matches<T>(
    map: &HashMap<String, Versioned<T>>,
    key: &str,
    expected_version: Option<i64>,
) -> bool {
    map.get(key).map(|v| v.version) == expected_version
}

/// Shared compare-and-set over a versioned map.
fn cas_entry<T: Clone>(
    map: &mut HashMap<String, Versioned<T>>,
    key: &str,
    expected_version: Option<i64>,
    record: &T,
) -> bool {
    match expected_version {
        None => {
            if map.contains_key(key) {
                return false;
            }
            map.insert(
                key.to_string(),
                Versioned {
                    version: 1,
                    record: record.clone(),
                },
            );
            true
        }
        Some(expected) => match map.get_mut(key) {
            Some(current) if current.version == expected => {
                current.version += 1;
                current.record = record.clone();
                true
            }
            _ => false,
        },
    }
}

impl Store for MemoryStore {
    fn insert_voucher(&self, voucher: &Voucher) -> Result<()> {
        let mut tables = self.lock()?;
        if tables.vouchers.contains_key(&voucher.id) {
            return Err(AppError::Conflict(format!("Voucher {} already exists", voucher.id)));
        }
        tables.vouchers.insert(
            voucher.id.clone(),
            Versioned {
                version: 1,
                record: voucher.clone(),
            },
        );
        Ok(())
    }

    fn get_voucher(&self, id: &str) -> Result<Option<Versioned<Voucher>>> {
        Ok(self.lock()?.vouchers.get(id).cloned())
    }

    fn find_vouchers_by_lookup_key(&self, lookup_key: &str) -> Result<Vec<Versioned<Voucher>>> {
        Ok(self
            .lock()?
            .vouchers
            .values()
            .filter(|v| v.record.lookup_key == lookup_key)
            .cloned()
            .collect())
    }

    fn list_vouchers_for_institution(&self, institution_id: &str) -> Result<Vec<Voucher>> {
        let mut vouchers: Vec<Voucher> = self
            .lock()?
            .vouchers
            .values()
            .filter(|v| v.record.institution_id == institution_id)
            .map(|v| v.record.clone())
            .collect();
        vouchers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(vouchers)
    }

    fn redeem_voucher(
        &self,
        expected_voucher_version: i64,
        voucher: &Voucher,
        expected_account_version: Option<i64>,
        account: &CreditAccount,
        entry: &LedgerEntry,
    ) -> Result<RedeemWrite> {
        if account.balance < 0 {
            return Err(AppError::Internal("Refusing to store a negative balance".into()));
        }
        let mut tables = self.lock()?;

        if !version_matches(&tables.vouchers, &voucher.id, Some(expected_voucher_version)) {
            return Ok(RedeemWrite::VoucherChanged);
        }
        if !version_matches(&tables.accounts, &account.user_id, expected_account_version) {
            return Ok(RedeemWrite::AccountChanged);
        }

        if let Some(current) = tables.vouchers.get_mut(&voucher.id) {
            current.version += 1;
            current.record.is_redeemed = voucher.is_redeemed;
            current.record.redeemed_by = voucher.redeemed_by.clone();
            current.record.redeemed_at = voucher.redeemed_at;
        }
        cas_entry(&mut tables.accounts, &account.user_id, expected_account_version, account);
        tables.ledger.push(entry.clone());
        Ok(RedeemWrite::Committed)
    }

    fn get_account(&self, user_id: &str) -> Result<Option<Versioned<CreditAccount>>> {
        Ok(self.lock()?.accounts.get(user_id).cloned())
    }

    fn compare_and_set_account(
        &self,
        expected_version: Option<i64>,
        account: &CreditAccount,
        entry: &LedgerEntry,
    ) -> Result<bool> {
        if account.balance < 0 {
            return Err(AppError::Internal("Refusing to store a negative balance".into()));
        }
        let mut tables = self.lock()?;
        if !cas_entry(&mut tables.accounts, &account.user_id, expected_version, account) {
            return Ok(false);
        }
        tables.ledger.push(entry.clone());
        Ok(true)
    }

    fn list_ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .lock()?
            .ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    fn get_subscription(&self, learner_id: &str) -> Result<Option<Versioned<Subscription>>> {
        Ok(self.lock()?.subscriptions.get(learner_id).cloned())
    }

    fn compare_and_set_subscription(
        &self,
        expected_version: Option<i64>,
        subscription: &Subscription,
    ) -> Result<bool> {
        let mut tables = self.lock()?;
        Ok(cas_entry(
            &mut tables.subscriptions,
            &subscription.learner_id,
            expected_version,
            subscription,
        ))
    }
}
