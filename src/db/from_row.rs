//! Row mapping for the typed query helpers.

use std::str::FromStr;

use rusqlite::{Connection, Row, ToSql, types::Type};

use crate::error::Result;
use crate::models::{CreditAccount, EntryKind, LedgerEntry, Subscription, Voucher};
use crate::store::Versioned;

pub const VOUCHER_COLS: &str = "id, code_hash, salt, lookup_key, denomination, learner_count, issued_by_user_id, institution_id, is_redeemed, redeemed_by, redeemed_at, created_at, version";

pub const ACCOUNT_COLS: &str = "user_id, balance, updated_at, version";

pub const LEDGER_ENTRY_COLS: &str =
    "id, user_id, kind, amount, balance_after, voucher_id, learner_id, created_at";

pub const SUBSCRIPTION_COLS: &str =
    "learner_id, funded_by, start_date, end_date, created_at, updated_at, version";

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

impl FromRow for Voucher {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Voucher {
            id: row.get(0)?,
            code_hash: row.get(1)?,
            salt: row.get(2)?,
            lookup_key: row.get(3)?,
            denomination: row.get(4)?,
            learner_count: row.get(5)?,
            issued_by_user_id: row.get(6)?,
            institution_id: row.get(7)?,
            is_redeemed: row.get::<_, i32>(8)? != 0,
            redeemed_by: row.get(9)?,
            redeemed_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

impl FromRow for Versioned<Voucher> {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Versioned {
            record: Voucher::from_row(row)?,
            version: row.get(12)?,
        })
    }
}

impl FromRow for Versioned<CreditAccount> {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Versioned {
            record: CreditAccount {
                user_id: row.get(0)?,
                balance: row.get(1)?,
                updated_at: row.get(2)?,
            },
            version: row.get(3)?,
        })
    }
}

impl FromRow for LedgerEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind: String = row.get(2)?;
        let kind = EntryKind::from_str(&kind).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
        })?;
        Ok(LedgerEntry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind,
            amount: row.get(3)?,
            balance_after: row.get(4)?,
            voucher_id: row.get(5)?,
            learner_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for Versioned<Subscription> {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Versioned {
            record: Subscription {
                learner_id: row.get(0)?,
                funded_by: row.get(1)?,
                start_date: row.get(2)?,
                end_date: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            },
            version: row.get(6)?,
        })
    }
}

pub fn query_one<T: FromRow>(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Option<T>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(T::from_row(row)?)),
        None => Ok(None),
    }
}

pub fn query_all<T: FromRow>(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| T::from_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
