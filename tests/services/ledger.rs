use crate::common::*;

const THIRTY_DAYS: i64 = 30 * SECONDS_PER_DAY;

#[test]
fn test_spend_activates_then_runs_out_of_credit() {
    let services = memory_services();
    fund_guardian(&services, "G1", 1);

    let result = services.ledger.spend_at("L1", "G1", NOW).unwrap();
    assert_eq!(result.balance, 0);
    assert_eq!(result.start_date, NOW);
    assert_eq!(result.end_date, NOW + THIRTY_DAYS);
    assert_eq!(result.status, SubscriptionStatus::Active);
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 0);

    let second = services.ledger.spend_at("L1", "G1", NOW);
    assert!(matches!(second, Err(AppError::InsufficientCredit { balance: 0 })));

    // The failed spend left the window alone
    let view = services.ledger.subscription_at("L1", NOW).unwrap();
    assert_eq!(view.end_date, Some(NOW + THIRTY_DAYS));
}

#[test]
fn test_spend_without_account_is_insufficient() {
    let services = memory_services();

    let result = services.ledger.spend_at("L1", "nobody", NOW);
    assert!(matches!(result, Err(AppError::InsufficientCredit { balance: 0 })));
    assert_eq!(
        services.ledger.status_at("L1", NOW).unwrap(),
        SubscriptionStatus::NotSubscribed
    );
}

#[test]
fn test_insufficient_credit_reports_balance_in_message() {
    let err = AppError::InsufficientCredit { balance: 0 };
    assert!(err.to_string().contains("balance: 0"));
    assert_eq!(err.code(), "INSUFFICIENT_CREDIT");
}

#[test]
fn test_spend_extends_active_window_from_its_end() {
    let services = memory_services();
    fund_guardian(&services, "G1", 2);

    services.ledger.spend_at("L1", "G1", NOW).unwrap();
    let later = NOW + 10 * SECONDS_PER_DAY;
    let result = services.ledger.spend_at("L1", "G1", later).unwrap();

    assert_eq!(result.end_date, NOW + 2 * THIRTY_DAYS);
    assert_eq!(result.start_date, NOW);
    assert_eq!(result.balance, 0);
}

#[test]
fn test_spend_restarts_expired_window_at_now() {
    let services = memory_services();
    fund_guardian(&services, "G1", 2);

    services.ledger.spend_at("L1", "G1", NOW).unwrap();
    let later = NOW + 40 * SECONDS_PER_DAY;
    assert_eq!(
        services.ledger.status_at("L1", later).unwrap(),
        SubscriptionStatus::Expired
    );

    let result = services.ledger.spend_at("L1", "G1", later).unwrap();
    assert_eq!(result.start_date, later);
    assert_eq!(result.end_date, later + THIRTY_DAYS);
}

#[test]
fn test_status_is_derived_at_read_time() {
    let services = memory_services();
    fund_guardian(&services, "G1", 1);

    assert_eq!(
        services.ledger.status_at("L1", NOW).unwrap(),
        SubscriptionStatus::NotSubscribed
    );

    services.ledger.spend_at("L1", "G1", NOW).unwrap();
    let end = NOW + THIRTY_DAYS;

    assert_eq!(services.ledger.status_at("L1", NOW).unwrap(), SubscriptionStatus::Active);
    assert_eq!(services.ledger.status_at("L1", end - 1).unwrap(), SubscriptionStatus::Active);
    assert_eq!(services.ledger.status_at("L1", end).unwrap(), SubscriptionStatus::Expired);
    assert_eq!(services.ledger.status_at("L1", end + 1).unwrap(), SubscriptionStatus::Expired);
}

#[test]
fn test_status_of_uses_wall_clock() {
    let services = memory_services();
    fund_guardian(&services, "G1", 1);

    assert_eq!(
        services.ledger.status_of("L1").unwrap(),
        SubscriptionStatus::NotSubscribed
    );
    services.ledger.spend("L1", "G1").unwrap();
    assert_eq!(services.ledger.status_of("L1").unwrap(), SubscriptionStatus::Active);
}

#[test]
fn test_subscription_view_serializes_status() {
    let services = memory_services();

    let view = services.ledger.subscription_at("L9", NOW).unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["status"], "not_subscribed");
    assert!(json["end_date"].is_null());
}

#[test]
fn test_any_guardian_can_fund_a_learner() {
    let (store, services) = memory_services_with(&Config::default());
    fund_guardian(&services, "G1", 1);
    fund_guardian(&services, "G2", 1);

    services.ledger.spend_at("L1", "G1", NOW).unwrap();
    let result = services.ledger.spend_at("L1", "G2", NOW).unwrap();
    assert_eq!(result.end_date, NOW + 2 * THIRTY_DAYS);

    let stored = store.get_subscription("L1").unwrap().unwrap();
    assert_eq!(stored.record.funded_by, "G2");
    assert_eq!(stored.version, 2);
}

#[test]
fn test_spend_requires_ids() {
    let services = memory_services();
    fund_guardian(&services, "G1", 1);

    assert!(matches!(
        services.ledger.spend_at("", "G1", NOW),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        services.ledger.spend_at("L1", " ", NOW),
        Err(AppError::Validation(_))
    ));
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 1);
}

#[test]
fn test_configured_extension_window() {
    let config = Config {
        extension_days: 7,
        ..Config::default()
    };
    let (_store, services) = memory_services_with(&config);
    fund_guardian(&services, "G1", 1);

    let result = services.ledger.spend_at("L1", "G1", NOW).unwrap();
    assert_eq!(result.end_date, NOW + 7 * SECONDS_PER_DAY);
    assert_eq!(services.ledger.extension_days(), 7);
}

#[test]
fn test_history_mirrors_balance_changes() {
    let services = memory_services();
    let issued = issue_voucher(&services);
    services.vouchers.redeem(&issued.code, "G1").unwrap();
    services.ledger.spend("L1", "G1").unwrap();

    let history = services.ledger.history("G1").unwrap();
    assert_eq!(history.len(), 2);

    let spend = &history[0];
    assert_eq!(spend.kind, EntryKind::Spend);
    assert_eq!(spend.amount, -1);
    assert_eq!(spend.balance_after, 0);
    assert_eq!(spend.learner_id.as_deref(), Some("L1"));
    assert!(spend.voucher_id.is_none());

    let redeem = &history[1];
    assert_eq!(redeem.kind, EntryKind::Redeem);
    assert_eq!(redeem.amount, 1);
    assert_eq!(redeem.balance_after, 1);
    assert_eq!(redeem.voucher_id.as_deref(), Some(issued.voucher.id.as_str()));

    assert!(services.ledger.history("G2").unwrap().is_empty());
}

#[test]
fn test_ledger_against_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let services = sqlite_services(&dir);
    fund_guardian(&services, "G1", 2);

    services.ledger.spend_at("L1", "G1", NOW).unwrap();
    let result = services.ledger.spend_at("L1", "G1", NOW).unwrap();
    assert_eq!(result.end_date, NOW + 2 * THIRTY_DAYS);
    assert_eq!(result.balance, 0);

    assert!(matches!(
        services.ledger.spend_at("L1", "G1", NOW),
        Err(AppError::InsufficientCredit { balance: 0 })
    ));

    let history = services.ledger.history("G1").unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(
        history.iter().filter(|e| e.kind == EntryKind::Spend).count(),
        2
    );
}

#[test]
fn test_failed_extension_refunds_the_credit() {
    let (store, services) = faulty_services();
    fund_guardian(&services, "G1", 1);

    store.set_faults(Faults {
        subscription_error: true,
        ..Faults::default()
    });
    let result = services.ledger.spend_at("L1", "G1", NOW);
    assert!(matches!(result, Err(AppError::Internal(_))));

    assert_eq!(services.ledger.balance_of("G1").unwrap(), 1);
    assert_eq!(
        services.ledger.status_at("L1", NOW).unwrap(),
        SubscriptionStatus::NotSubscribed
    );

    let history = services.ledger.history("G1").unwrap();
    let kinds: Vec<EntryKind> = history.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EntryKind::Refund, EntryKind::Spend, EntryKind::Redeem]);
    assert_eq!(history[0].amount, 1);
    assert_eq!(history[0].balance_after, 1);
    assert_eq!(history[0].learner_id.as_deref(), Some("L1"));
}

#[test]
fn test_extension_conflict_refunds_the_credit() {
    let (store, services) = faulty_services();
    fund_guardian(&services, "G1", 1);

    store.set_faults(Faults {
        stale_subscriptions: true,
        ..Faults::default()
    });
    let result = services.ledger.spend_at("L1", "G1", NOW);
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 1);
}

#[test]
fn test_failed_refund_reports_the_extension_error() {
    let (store, services) = faulty_services();
    fund_guardian(&services, "G1", 1);

    store.set_faults(Faults {
        subscription_error: true,
        refund_error: true,
        ..Faults::default()
    });
    let err = services.ledger.spend_at("L1", "G1", NOW).unwrap_err();
    assert!(err.to_string().contains("subscription write failed"), "{}", err);
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 0);
}

#[test]
fn test_spend_gives_up_when_account_keeps_changing() {
    let (store, services) = faulty_services();
    fund_guardian(&services, "G1", 1);

    store.set_faults(Faults {
        stale_accounts: true,
        ..Faults::default()
    });
    let result = services.ledger.spend_at("L1", "G1", NOW);
    assert!(matches!(result, Err(AppError::Conflict(_))));

    store.set_faults(Faults::default());
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 1);
    assert_eq!(
        services.ledger.status_at("L1", NOW).unwrap(),
        SubscriptionStatus::NotSubscribed
    );
}

#[test]
fn test_out_of_range_extension_days_are_rejected() {
    for extension_days in [0, -7, learnpass::config::MAX_EXTENSION_DAYS + 1] {
        let config = Config {
            extension_days,
            ..Config::default()
        };
        let result = Services::new(std::sync::Arc::new(MemoryStore::new()), &config);
        assert!(matches!(result, Err(AppError::Validation(_))), "{}", extension_days);
    }
}
