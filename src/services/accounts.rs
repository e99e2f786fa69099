//! Balance changes shared by redemption and spending.

use crate::error::{AppError, Result};
use crate::models::{CreditAccount, EntryKind, LedgerEntry};
use crate::store::{MAX_CAS_ATTEMPTS, Store, Versioned};
use crate::util::gen_id;

#[derive(Debug, Clone, Copy)]
pub(crate) enum BalanceChange<'a> {
    /// Credits granted by a redeemed voucher
    Credit { amount: i64, voucher_id: &'a str },
    /// One credit spent on a learner
    Debit { learner_id: &'a str },
    /// A debit handed back because the subscription could not be extended
    Refund { learner_id: &'a str },
}

impl BalanceChange<'_> {
    fn amount(&self) -> i64 {
        match *self {
            BalanceChange::Credit { amount, .. } => amount,
            BalanceChange::Debit { .. } => -1,
            BalanceChange::Refund { .. } => 1,
        }
    }

    fn entry(&self, user_id: &str, balance_after: i64, now: i64) -> LedgerEntry {
        let (kind, voucher_id, learner_id) = match *self {
            BalanceChange::Credit { voucher_id, .. } => {
                (EntryKind::Redeem, Some(voucher_id.to_string()), None)
            }
            BalanceChange::Debit { learner_id } => {
                (EntryKind::Spend, None, Some(learner_id.to_string()))
            }
            BalanceChange::Refund { learner_id } => {
                (EntryKind::Refund, None, Some(learner_id.to_string()))
            }
        };
        LedgerEntry {
            id: gen_id(),
            user_id: user_id.to_string(),
            kind,
            amount: self.amount(),
            balance_after,
            voucher_id,
            learner_id,
            created_at: now,
        }
    }
}

/// The write a balance change turns into, read against one account version.
pub(crate) struct PendingChange {
    pub expected_version: Option<i64>,
    pub account: CreditAccount,
    pub entry: LedgerEntry,
}

/// Compute the next account state and its ledger entry from `current`.
///
/// A missing account counts as balance 0 and is created by the write.
pub(crate) fn prepare_change(
    current: Option<&Versioned<CreditAccount>>,
    user_id: &str,
    change: BalanceChange<'_>,
    now: i64,
) -> Result<PendingChange> {
    let (expected_version, balance) = match current {
        Some(v) => (Some(v.version), v.record.balance),
        None => (None, 0),
    };

    let new_balance = balance
        .checked_add(change.amount())
        .ok_or_else(|| AppError::Internal(format!("Balance overflow for account {}", user_id)))?;
    if new_balance < 0 {
        return Err(AppError::InsufficientCredit { balance });
    }

    Ok(PendingChange {
        expected_version,
        account: CreditAccount {
            user_id: user_id.to_string(),
            balance: new_balance,
            updated_at: now,
        },
        entry: change.entry(user_id, new_balance, now),
    })
}

/// Apply a balance change with optimistic retries, returning the new balance.
///
/// The balance check is repeated on every attempt, so two racing debits can
/// never both pass against a single remaining credit.
pub(crate) fn apply_balance_change(
    store: &dyn Store,
    user_id: &str,
    change: BalanceChange<'_>,
    now: i64,
) -> Result<i64> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = store.get_account(user_id)?;
        let pending = prepare_change(current.as_ref(), user_id, change, now)?;

        if store.compare_and_set_account(pending.expected_version, &pending.account, &pending.entry)? {
            return Ok(pending.account.balance);
        }

        tracing::debug!("Account {} changed concurrently (attempt {})", user_id, attempt);
    }

    tracing::warn!("Gave up updating account {} after {} attempts", user_id, MAX_CAS_ATTEMPTS);
    Err(AppError::Conflict(format!(
        "Account {} is busy, try again",
        user_id
    )))
}
