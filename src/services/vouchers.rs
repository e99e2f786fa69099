use std::sync::Arc;

use crate::config::{CreditPolicy, VoucherPolicy};
use crate::crypto::{generate_code, generate_salt, hash_code, lookup_key, normalize_code, verify_code};
use crate::error::{AppError, Result};
use crate::models::{CreateVoucher, IssuedVoucher, RedemptionResult, Voucher};
use crate::store::{MAX_CAS_ATTEMPTS, RedeemWrite, Store, Versioned};
use crate::util::{gen_id, now, require_id};

use super::accounts::{BalanceChange, prepare_change};

/// Fresh codes drawn before giving up on finding an unused one.
const MAX_CODE_ATTEMPTS: usize = 8;

/// Largest number of vouchers issued in one batch.
pub const MAX_BATCH_SIZE: i64 = 100;

/// Issues vouchers and redeems their codes for credit.
#[derive(Clone)]
pub struct VoucherService {
    store: Arc<dyn Store>,
    policy: VoucherPolicy,
    credit_policy: CreditPolicy,
}

impl VoucherService {
    pub fn new(
        store: Arc<dyn Store>,
        policy: VoucherPolicy,
        credit_policy: CreditPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        credit_policy.validate()?;
        Ok(Self {
            store,
            policy,
            credit_policy,
        })
    }

    fn validate(&self, input: &CreateVoucher) -> Result<()> {
        if !self.policy.allows_denomination(input.denomination) {
            return Err(AppError::Validation(format!(
                "Denomination {} is not allowed (allowed: {:?})",
                input.denomination, self.policy.denominations
            )));
        }
        if input.learner_count < 1 || input.learner_count > self.policy.max_learners {
            return Err(AppError::Validation(format!(
                "Learner count must be between 1 and {}",
                self.policy.max_learners
            )));
        }
        require_id(&input.issued_by_user_id, "issued_by_user_id")?;
        require_id(&input.institution_id, "institution_id")?;
        Ok(())
    }

    /// Issue a single voucher. The returned code is the only copy in existence.
    pub fn create(&self, input: &CreateVoucher) -> Result<IssuedVoucher> {
        self.validate(input)?;
        let issued = self.issue(input)?;

        tracing::info!(
            "Issued voucher {} (denomination {}, {} learner(s)) for institution {}",
            issued.voucher.id,
            issued.voucher.denomination,
            issued.voucher.learner_count,
            issued.voucher.institution_id
        );

        Ok(issued)
    }

    /// Issue `count` identical vouchers, validating the parameters once.
    pub fn create_batch(&self, input: &CreateVoucher, count: i64) -> Result<Vec<IssuedVoucher>> {
        if count < 1 || count > MAX_BATCH_SIZE {
            return Err(AppError::Validation(format!(
                "Count must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        self.validate(input)?;

        let mut issued = Vec::with_capacity(count as usize);
        for _ in 0..count {
            issued.push(self.issue(input)?);
        }

        tracing::info!(
            "Issued {} voucher(s) (denomination {}) for institution {}",
            issued.len(),
            input.denomination,
            input.institution_id
        );

        Ok(issued)
    }

    fn issue(&self, input: &CreateVoucher) -> Result<IssuedVoucher> {
        let code = self.unused_code()?;
        let salt = generate_salt();

        let voucher = Voucher {
            id: gen_id(),
            code_hash: hash_code(&salt, &code),
            salt,
            lookup_key: lookup_key(&code),
            denomination: input.denomination,
            learner_count: input.learner_count,
            issued_by_user_id: input.issued_by_user_id.clone(),
            institution_id: input.institution_id.clone(),
            is_redeemed: false,
            redeemed_by: None,
            redeemed_at: None,
            created_at: now(),
        };

        self.store.insert_voucher(&voucher)?;
        Ok(IssuedVoucher { voucher, code })
    }

    /// Draw codes until one matches no existing voucher, redeemed or not.
    fn unused_code(&self) -> Result<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_code();
            let taken = self
                .store
                .find_vouchers_by_lookup_key(&lookup_key(&code))?
                .iter()
                .any(|c| verify_code(&c.record.salt, &code, &c.record.code_hash));
            if !taken {
                return Ok(code);
            }
            tracing::debug!("Generated voucher code collided, drawing another");
        }
        Err(AppError::Internal(
            "Could not generate an unused voucher code".into(),
        ))
    }

    /// Redeem a code for `redeeming_user_id`, crediting their account.
    ///
    /// The voucher is marked redeemed in the same store write that grants the
    /// credit, so a failure leaves it redeemable.
    pub fn redeem(&self, submitted_code: &str, redeeming_user_id: &str) -> Result<RedemptionResult> {
        let code = normalize_code(submitted_code)?;
        require_id(redeeming_user_id, "redeeming_user_id")?;

        let matches: Vec<Versioned<Voucher>> = self
            .store
            .find_vouchers_by_lookup_key(&lookup_key(&code))?
            .into_iter()
            .filter(|c| verify_code(&c.record.salt, &code, &c.record.code_hash))
            .collect();

        let Some(found) = matches
            .iter()
            .find(|c| !c.record.is_redeemed)
            .or_else(|| matches.first())
            .cloned()
        else {
            tracing::warn!("Rejected redemption by {}: unknown code", redeeming_user_id);
            return Err(AppError::NotFound("Voucher code not found".into()));
        };

        if found.record.is_redeemed {
            tracing::warn!(
                "Rejected redemption of voucher {} by {}: already redeemed",
                found.record.id,
                redeeming_user_id
            );
            return Err(AppError::AlreadyRedeemed);
        }

        let redeemed_at = now();
        let redeemed = Voucher {
            is_redeemed: true,
            redeemed_by: Some(redeeming_user_id.to_string()),
            redeemed_at: Some(redeemed_at),
            ..found.record
        };
        let credits = self.credit_policy.credits_for(&redeemed);
        let change = BalanceChange::Credit {
            amount: credits,
            voucher_id: &redeemed.id,
        };

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let account = self.store.get_account(redeeming_user_id)?;
            let pending = prepare_change(account.as_ref(), redeeming_user_id, change, redeemed_at)?;

            match self.store.redeem_voucher(
                found.version,
                &redeemed,
                pending.expected_version,
                &pending.account,
                &pending.entry,
            )? {
                RedeemWrite::Committed => {
                    tracing::info!(
                        "Voucher {} redeemed by {} for {} credit(s)",
                        redeemed.id,
                        redeeming_user_id,
                        credits
                    );
                    return Ok(RedemptionResult {
                        voucher_id: redeemed.id.clone(),
                        credits_granted: credits,
                        balance: pending.account.balance,
                        redeemed_at,
                    });
                }
                // Redemption is the only write a voucher ever sees, so a moved
                // version means someone else redeemed it.
                RedeemWrite::VoucherChanged => {
                    tracing::warn!(
                        "Rejected redemption of voucher {} by {}: redeemed concurrently",
                        redeemed.id,
                        redeeming_user_id
                    );
                    return Err(AppError::AlreadyRedeemed);
                }
                RedeemWrite::AccountChanged => {
                    tracing::debug!(
                        "Account {} changed during redemption (attempt {})",
                        redeeming_user_id,
                        attempt
                    );
                }
            }
        }

        tracing::warn!(
            "Gave up redeeming voucher {} for {} after {} attempts",
            redeemed.id,
            redeeming_user_id,
            MAX_CAS_ATTEMPTS
        );
        Err(AppError::Conflict(format!(
            "Account {} is busy, try again",
            redeeming_user_id
        )))
    }

    pub fn get(&self, voucher_id: &str) -> Result<Voucher> {
        self.store
            .get_voucher(voucher_id)?
            .map(|v| v.record)
            .ok_or_else(|| AppError::NotFound("Voucher not found".into()))
    }

    pub fn list_for_institution(&self, institution_id: &str) -> Result<Vec<Voucher>> {
        require_id(institution_id, "institution_id")?;
        self.store.list_vouchers_for_institution(institution_id)
    }
}
