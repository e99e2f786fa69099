use rusqlite::{Connection, TransactionBehavior, params};

use crate::error::{AppError, Result};
use crate::models::*;
use crate::store::{RedeemWrite, Versioned};

use super::from_row::{
    ACCOUNT_COLS, LEDGER_ENTRY_COLS, SUBSCRIPTION_COLS, VOUCHER_COLS, query_all, query_one,
};

// ============ Vouchers ============

pub fn insert_voucher(conn: &Connection, voucher: &Voucher) -> Result<()> {
    conn.execute(
        "INSERT INTO vouchers (id, code_hash, salt, lookup_key, denomination, learner_count, issued_by_user_id, institution_id, is_redeemed, redeemed_by, redeemed_at, created_at, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1)",
        params![
            &voucher.id,
            &voucher.code_hash,
            &voucher.salt,
            &voucher.lookup_key,
            voucher.denomination,
            voucher.learner_count,
            &voucher.issued_by_user_id,
            &voucher.institution_id,
            voucher.is_redeemed as i32,
            &voucher.redeemed_by,
            voucher.redeemed_at,
            voucher.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_voucher_by_id(conn: &Connection, id: &str) -> Result<Option<Versioned<Voucher>>> {
    query_one(
        conn,
        &format!("SELECT {} FROM vouchers WHERE id = ?1", VOUCHER_COLS),
        &[&id],
    )
}

pub fn get_vouchers_by_lookup_key(
    conn: &Connection,
    lookup_key: &str,
) -> Result<Vec<Versioned<Voucher>>> {
    query_all(
        conn,
        &format!("SELECT {} FROM vouchers WHERE lookup_key = ?1", VOUCHER_COLS),
        &[&lookup_key],
    )
}

pub fn list_vouchers_for_institution(conn: &Connection, institution_id: &str) -> Result<Vec<Voucher>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM vouchers WHERE institution_id = ?1 ORDER BY created_at DESC, id ASC",
            VOUCHER_COLS
        ),
        &[&institution_id],
    )
}

/// Redeem a voucher and credit the redeeming account together.
///
/// One IMMEDIATE transaction covers the voucher version check, the account
/// version check, the balance write and the ledger insert. Only
/// `is_redeemed`, `redeemed_by` and `redeemed_at` are written on the voucher.
pub fn redeem_voucher(
    conn: &mut Connection,
    expected_voucher_version: i64,
    voucher: &Voucher,
    expected_account_version: Option<i64>,
    account: &CreditAccount,
    entry: &LedgerEntry,
) -> Result<RedeemWrite> {
    if account.balance < 0 {
        return Err(AppError::Internal("Refusing to store a negative balance".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let claimed = tx.execute(
        "UPDATE vouchers SET is_redeemed = ?1, redeemed_by = ?2, redeemed_at = ?3, version = version + 1
         WHERE id = ?4 AND version = ?5",
        params![
            voucher.is_redeemed as i32,
            &voucher.redeemed_by,
            voucher.redeemed_at,
            &voucher.id,
            expected_voucher_version,
        ],
    )?;
    if claimed == 0 {
        return Ok(RedeemWrite::VoucherChanged);
    }

    if write_account(&tx, expected_account_version, account)? == 0 {
        // Dropping the transaction rolls the voucher claim back too
        return Ok(RedeemWrite::AccountChanged);
    }

    insert_ledger_entry(&tx, entry)?;
    tx.commit()?;
    Ok(RedeemWrite::Committed)
}

// ============ Credit Accounts ============

pub fn get_account(conn: &Connection, user_id: &str) -> Result<Option<Versioned<CreditAccount>>> {
    query_one(
        conn,
        &format!("SELECT {} FROM credit_accounts WHERE user_id = ?1", ACCOUNT_COLS),
        &[&user_id],
    )
}

/// Atomically write an account balance and its ledger entry.
///
/// Runs in an IMMEDIATE transaction so the version check, the balance write
/// and the ledger insert commit together or not at all. With
/// `expected_version = None` the account is created only if absent.
pub fn compare_and_set_account(
    conn: &mut Connection,
    expected_version: Option<i64>,
    account: &CreditAccount,
    entry: &LedgerEntry,
) -> Result<bool> {
    // INSERT OR IGNORE would swallow the CHECK constraint, so reject up front
    if account.balance < 0 {
        return Err(AppError::Internal("Refusing to store a negative balance".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if write_account(&tx, expected_version, account)? == 0 {
        // Lost the race; dropping the transaction rolls back
        return Ok(false);
    }

    insert_ledger_entry(&tx, entry)?;
    tx.commit()?;
    Ok(true)
}

/// Insert-if-absent or version-checked update; returns rows affected.
fn write_account(
    conn: &Connection,
    expected_version: Option<i64>,
    account: &CreditAccount,
) -> Result<usize> {
    let affected = match expected_version {
        None => conn.execute(
            "INSERT OR IGNORE INTO credit_accounts (user_id, balance, updated_at, version)
             VALUES (?1, ?2, ?3, 1)",
            params![&account.user_id, account.balance, account.updated_at],
        )?,
        Some(expected) => conn.execute(
            "UPDATE credit_accounts SET balance = ?1, updated_at = ?2, version = version + 1
             WHERE user_id = ?3 AND version = ?4",
            params![account.balance, account.updated_at, &account.user_id, expected],
        )?,
    };
    Ok(affected)
}

// ============ Ledger ============

fn insert_ledger_entry(conn: &Connection, entry: &LedgerEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO ledger_entries (id, user_id, kind, amount, balance_after, voucher_id, learner_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &entry.id,
            &entry.user_id,
            entry.kind.as_ref(),
            entry.amount,
            entry.balance_after,
            &entry.voucher_id,
            &entry.learner_id,
            entry.created_at,
        ],
    )?;
    Ok(())
}

pub fn list_ledger_entries(conn: &Connection, user_id: &str) -> Result<Vec<LedgerEntry>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM ledger_entries WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            LEDGER_ENTRY_COLS
        ),
        &[&user_id],
    )
}

// ============ Subscriptions ============

pub fn get_subscription(conn: &Connection, learner_id: &str) -> Result<Option<Versioned<Subscription>>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE learner_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&learner_id],
    )
}

pub fn compare_and_set_subscription(
    conn: &Connection,
    expected_version: Option<i64>,
    subscription: &Subscription,
) -> Result<bool> {
    let affected = match expected_version {
        None => conn.execute(
            "INSERT OR IGNORE INTO subscriptions (learner_id, funded_by, start_date, end_date, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![
                &subscription.learner_id,
                &subscription.funded_by,
                subscription.start_date,
                subscription.end_date,
                subscription.created_at,
                subscription.updated_at,
            ],
        )?,
        Some(expected) => conn.execute(
            "UPDATE subscriptions SET funded_by = ?1, start_date = ?2, end_date = ?3, updated_at = ?4, version = version + 1
             WHERE learner_id = ?5 AND version = ?6",
            params![
                &subscription.funded_by,
                subscription.start_date,
                subscription.end_date,
                subscription.updated_at,
                &subscription.learner_id,
                expected,
            ],
        )?,
    };
    Ok(affected > 0)
}
