mod accounts;
pub mod ledger;
pub mod vouchers;

pub use ledger::SubscriptionLedger;
pub use vouchers::VoucherService;

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::store::Store;

/// Both services wired to one store.
#[derive(Clone)]
pub struct Services {
    pub vouchers: VoucherService,
    pub ledger: SubscriptionLedger,
}

impl Services {
    /// Fails with a validation error if the config cannot be served.
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Result<Self> {
        Ok(Self {
            vouchers: VoucherService::new(
                store.clone(),
                config.vouchers.clone(),
                config.credit_policy,
            )?,
            ledger: SubscriptionLedger::new(store, config.extension_days)?,
        })
    }
}
