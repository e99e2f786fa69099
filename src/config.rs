use std::env;
use std::str::FromStr;

use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};
use crate::models::Voucher;

pub const DEFAULT_DENOMINATIONS: [i64; 9] = [5, 10, 15, 20, 25, 30, 35, 40, 45];
pub const DEFAULT_MAX_LEARNERS: i64 = 100;
pub const DEFAULT_EXTENSION_DAYS: i64 = 30;
/// Longest extension a single spend may grant (about ten years).
pub const MAX_EXTENSION_DAYS: i64 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum CreditPolicyKind {
    Flat,
    Learners,
    Denomination,
}

/// How many credits a redeemed voucher is worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditPolicy {
    /// Fixed number of credits per voucher, regardless of denomination
    Flat(i64),
    /// One credit per learner the voucher covers
    Learners,
    /// Denomination divided by the price of one credit (at least 1)
    Denomination { unit_price: i64 },
}

impl Default for CreditPolicy {
    fn default() -> Self {
        CreditPolicy::Flat(1)
    }
}

impl CreditPolicy {
    pub fn credits_for(&self, voucher: &Voucher) -> i64 {
        match *self {
            CreditPolicy::Flat(credits) => credits,
            CreditPolicy::Learners => voucher.learner_count,
            CreditPolicy::Denomination { unit_price } => (voucher.denomination / unit_price).max(1),
        }
    }

    /// Reject policies that would grant no credit or divide by zero.
    pub fn validate(&self) -> Result<()> {
        match *self {
            CreditPolicy::Flat(credits) if credits < 1 => Err(AppError::Validation(format!(
                "Credits per voucher must be at least 1 (got {})",
                credits
            ))),
            CreditPolicy::Denomination { unit_price } if unit_price < 1 => {
                Err(AppError::Validation(format!(
                    "Credit unit price must be at least 1 (got {})",
                    unit_price
                )))
            }
            _ => Ok(()),
        }
    }

    fn from_parts(kind: CreditPolicyKind, per_voucher: i64, unit_price: i64) -> Self {
        match kind {
            CreditPolicyKind::Flat => CreditPolicy::Flat(per_voucher),
            CreditPolicyKind::Learners => CreditPolicy::Learners,
            CreditPolicyKind::Denomination => CreditPolicy::Denomination { unit_price },
        }
    }
}

/// Limits applied when issuing vouchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherPolicy {
    pub denominations: Vec<i64>,
    pub max_learners: i64,
}

impl Default for VoucherPolicy {
    fn default() -> Self {
        Self {
            denominations: DEFAULT_DENOMINATIONS.to_vec(),
            max_learners: DEFAULT_MAX_LEARNERS,
        }
    }
}

impl VoucherPolicy {
    pub fn allows_denomination(&self, denomination: i64) -> bool {
        self.denominations.contains(&denomination)
    }

    pub fn validate(&self) -> Result<()> {
        if self.denominations.is_empty() || self.denominations.iter().any(|d| *d < 1) {
            return Err(AppError::Validation(
                "Denominations must be a non-empty list of positive amounts".into(),
            ));
        }
        if self.max_learners < 1 {
            return Err(AppError::Validation("Max learners must be at least 1".into()));
        }
        Ok(())
    }
}

/// Reject extension lengths that are empty or large enough to overflow dates.
pub fn validate_extension_days(days: i64) -> Result<()> {
    if !(1..=MAX_EXTENSION_DAYS).contains(&days) {
        return Err(AppError::Validation(format!(
            "Extension days must be between 1 and {} (got {})",
            MAX_EXTENSION_DAYS, days
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub vouchers: VoucherPolicy,
    pub credit_policy: CreditPolicy,
    /// Days added to a learner's subscription per credit spent
    pub extension_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "learnpass.db".to_string(),
            vouchers: VoucherPolicy::default(),
            credit_policy: CreditPolicy::default(),
            extension_days: DEFAULT_EXTENSION_DAYS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Missing or
    /// unparseable values fall back to defaults.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let denominations = match var("VOUCHER_DENOMINATIONS") {
            Some(raw) => match parse_denominations(&raw) {
                Some(list) => list,
                None => {
                    tracing::warn!("Ignoring invalid VOUCHER_DENOMINATIONS: {}", raw);
                    defaults.vouchers.denominations.clone()
                }
            },
            None => defaults.vouchers.denominations.clone(),
        };

        let max_learners =
            parse_bounded(&var, "VOUCHER_MAX_LEARNERS", DEFAULT_MAX_LEARNERS, i64::MAX);
        let extension_days = parse_bounded(
            &var,
            "SUBSCRIPTION_EXTENSION_DAYS",
            DEFAULT_EXTENSION_DAYS,
            MAX_EXTENSION_DAYS,
        );
        let per_voucher = parse_bounded(&var, "CREDITS_PER_VOUCHER", 1, i64::MAX);
        let unit_price = parse_bounded(&var, "CREDIT_UNIT_PRICE", 5, i64::MAX);

        let kind = var("CREDIT_POLICY")
            .and_then(|raw| match CreditPolicyKind::from_str(raw.trim()) {
                Ok(kind) => Some(kind),
                Err(_) => {
                    tracing::warn!("Ignoring unknown CREDIT_POLICY: {}", raw);
                    None
                }
            })
            .unwrap_or(CreditPolicyKind::Flat);

        Self {
            database_path: var("DATABASE_PATH").unwrap_or(defaults.database_path),
            vouchers: VoucherPolicy {
                denominations,
                max_learners,
            },
            credit_policy: CreditPolicy::from_parts(kind, per_voucher, unit_price),
            extension_days,
        }
    }
}

/// Parse a value in `1..=max`, falling back to `default` otherwise.
fn parse_bounded<F>(var: &F, key: &str, default: i64, max: i64) -> i64
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(v) if (1..=max).contains(&v) => v,
            _ => {
                tracing::warn!("Ignoring invalid {}: {}", key, raw);
                default
            }
        },
        None => default,
    }
}

fn parse_denominations(raw: &str) -> Option<Vec<i64>> {
    let mut list = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<i64>() {
            Ok(v) if v > 0 => list.push(v),
            _ => return None,
        }
    }
    if list.is_empty() {
        return None;
    }
    list.sort_unstable();
    list.dedup();
    Some(list)
}
