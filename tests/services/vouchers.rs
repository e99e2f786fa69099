use learnpass::config::DEFAULT_DENOMINATIONS;
use learnpass::crypto::{CODE_ALPHABET, CODE_LENGTH, format_code, verify_code};

use crate::common::*;

#[test]
fn test_create_returns_unredeemed_voucher_for_every_valid_input() {
    let services = memory_services();

    for denomination in DEFAULT_DENOMINATIONS {
        for learner_count in [1, 2, 50, 100] {
            let issued = services
                .vouchers
                .create(&voucher_input(denomination, learner_count))
                .expect("valid voucher should be issued");

            assert!(!issued.voucher.is_redeemed);
            assert!(issued.voucher.redeemed_by.is_none());
            assert!(issued.voucher.redeemed_at.is_none());
            assert_eq!(issued.voucher.denomination, denomination);
            assert_eq!(issued.voucher.learner_count, learner_count);
            assert_eq!(issued.code.len(), CODE_LENGTH);
            assert!(issued.code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }
}

#[test]
fn test_create_rejects_denominations_outside_allowed_set() {
    let services = memory_services();

    for denomination in [0, -5, 7, 50, 100] {
        let result = services.vouchers.create(&voucher_input(denomination, 1));
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "denomination {} should be rejected",
            denomination
        );
    }
}

#[test]
fn test_create_rejects_learner_count_out_of_range() {
    let services = memory_services();

    for learner_count in [0, -1, 101] {
        let result = services.vouchers.create(&voucher_input(10, learner_count));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

#[test]
fn test_create_rejects_blank_provenance() {
    let services = memory_services();

    let mut input = voucher_input(10, 1);
    input.issued_by_user_id = "  ".to_string();
    assert!(matches!(services.vouchers.create(&input), Err(AppError::Validation(_))));

    let mut input = voucher_input(10, 1);
    input.institution_id = String::new();
    assert!(matches!(services.vouchers.create(&input), Err(AppError::Validation(_))));
}

#[test]
fn test_custom_denominations_are_honoured() {
    let config = Config {
        vouchers: VoucherPolicy {
            denominations: vec![50, 100],
            max_learners: 10,
        },
        ..Config::default()
    };
    let (_store, services) = memory_services_with(&config);

    assert!(services.vouchers.create(&voucher_input(50, 10)).is_ok());
    assert!(matches!(
        services.vouchers.create(&voucher_input(10, 1)),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        services.vouchers.create(&voucher_input(50, 11)),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn test_plaintext_code_is_not_stored() {
    let (store, services) = memory_services_with(&Config::default());
    let issued = issue_voucher(&services);

    let stored = store
        .get_voucher(&issued.voucher.id)
        .unwrap()
        .expect("voucher should be stored");

    assert_ne!(stored.record.code_hash, issued.code);
    assert!(!stored.record.code_hash.contains(&issued.code));
    assert_eq!(stored.record.salt.len(), 32);
    assert!(verify_code(&stored.record.salt, &issued.code, &stored.record.code_hash));

    // Serialized summaries never carry secrets
    let json = serde_json::to_value(&stored.record).unwrap();
    assert!(json.get("code_hash").is_none());
    assert!(json.get("salt").is_none());
    assert!(json.get("lookup_key").is_none());
    assert!(json.get("code").is_none());
}

#[test]
fn test_issued_voucher_display_code() {
    let services = memory_services();
    let issued = issue_voucher(&services);

    assert_eq!(issued.display_code(), format_code(&issued.code));
    assert_eq!(issued.display_code().len(), CODE_LENGTH + 1);
    assert_eq!(&issued.display_code()[4..5], "-");
}

#[test]
fn test_redeem_once_then_already_redeemed() {
    let services = memory_services();
    let issued = services
        .vouchers
        .create(&voucher_input(10, 2))
        .unwrap();

    let result = services.vouchers.redeem(&issued.code, "G1").unwrap();
    assert_eq!(result.voucher_id, issued.voucher.id);
    assert_eq!(result.credits_granted, 1);
    assert_eq!(result.balance, 1);
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 1);

    let second = services.vouchers.redeem(&issued.code, "G2");
    assert!(matches!(second, Err(AppError::AlreadyRedeemed)));
    assert_eq!(services.ledger.balance_of("G2").unwrap(), 0);
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 1);
}

#[test]
fn test_redeem_records_redeemer() {
    let services = memory_services();
    let issued = issue_voucher(&services);

    let result = services.vouchers.redeem(&issued.code, "G1").unwrap();
    let voucher = services.vouchers.get(&issued.voucher.id).unwrap();

    assert!(voucher.is_redeemed);
    assert_eq!(voucher.redeemed_by.as_deref(), Some("G1"));
    assert_eq!(voucher.redeemed_at, Some(result.redeemed_at));
    assert_eq!(voucher.denomination, issued.voucher.denomination);
}

#[test]
fn test_redeem_accepts_display_format_and_lowercase() {
    let services = memory_services();
    let issued = issue_voucher(&services);

    let submitted = format_code(&issued.code).to_lowercase();
    let result = services.vouchers.redeem(&submitted, "G1").unwrap();
    assert_eq!(result.voucher_id, issued.voucher.id);
}

#[test]
fn test_redeem_unknown_code_mutates_nothing() {
    let (store, services) = memory_services_with(&Config::default());
    let issued = issue_voucher(&services);

    // Flip one character so the code is well-formed but unknown
    let mut unknown: Vec<u8> = issued.code.clone().into_bytes();
    unknown[0] = if unknown[0] == b'A' { b'B' } else { b'A' };
    let unknown = String::from_utf8(unknown).unwrap();

    let before = store.get_voucher(&issued.voucher.id).unwrap().unwrap();
    let result = services.vouchers.redeem(&unknown, "G1");
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let after = store.get_voucher(&issued.voucher.id).unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 0);
    assert!(services.ledger.history("G1").unwrap().is_empty());
    assert!(store.get_account("G1").unwrap().is_none());
}

#[test]
fn test_redeem_rejects_malformed_codes() {
    let services = memory_services();

    for code in ["", "ABC", "ABCDEFGHI", "ABCD-EFG!", "ÄBCDEFGH"] {
        let result = services.vouchers.redeem(code, "G1");
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "code {:?} should be rejected as malformed",
            code
        );
    }
}

#[test]
fn test_redeem_requires_user() {
    let services = memory_services();
    let issued = issue_voucher(&services);

    let result = services.vouchers.redeem(&issued.code, " ");
    assert!(matches!(result, Err(AppError::Validation(_))));

    // The voucher is still redeemable afterwards
    assert!(services.vouchers.redeem(&issued.code, "G1").is_ok());
}

#[test]
fn test_learners_credit_policy() {
    let config = Config {
        credit_policy: CreditPolicy::Learners,
        ..Config::default()
    };
    let (_store, services) = memory_services_with(&config);
    let issued = services.vouchers.create(&voucher_input(10, 3)).unwrap();

    let result = services.vouchers.redeem(&issued.code, "G1").unwrap();
    assert_eq!(result.credits_granted, 3);
    assert_eq!(result.balance, 3);
}

#[test]
fn test_denomination_credit_policy() {
    let config = Config {
        credit_policy: CreditPolicy::Denomination { unit_price: 10 },
        ..Config::default()
    };
    let (_store, services) = memory_services_with(&config);

    let big = services.vouchers.create(&voucher_input(45, 1)).unwrap();
    let small = services.vouchers.create(&voucher_input(5, 1)).unwrap();

    assert_eq!(services.vouchers.redeem(&big.code, "G1").unwrap().credits_granted, 4);
    // Below one unit still buys one credit
    assert_eq!(services.vouchers.redeem(&small.code, "G1").unwrap().credits_granted, 1);
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 5);
}

#[test]
fn test_create_batch_issues_distinct_codes() {
    let services = memory_services();

    let issued = services
        .vouchers
        .create_batch(&voucher_input(20, 1), 25)
        .unwrap();
    assert_eq!(issued.len(), 25);

    let mut codes: Vec<&str> = issued.iter().map(|v| v.code.as_str()).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), 25);
}

#[test]
fn test_create_batch_rejects_bad_count() {
    let services = memory_services();

    for count in [0, -1, 101] {
        let result = services.vouchers.create_batch(&voucher_input(20, 1), count);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
    assert!(services.vouchers.list_for_institution("I1").unwrap().is_empty());
}

#[test]
fn test_list_for_institution_is_scoped() {
    let services = memory_services();

    services.vouchers.create_batch(&voucher_input(10, 1), 3).unwrap();
    let mut other = voucher_input(10, 1);
    other.institution_id = "I2".to_string();
    services.vouchers.create(&other).unwrap();

    let listed = services.vouchers.list_for_institution("I1").unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|v| v.institution_id == "I1"));
    assert_eq!(services.vouchers.list_for_institution("I2").unwrap().len(), 1);
    assert!(services.vouchers.list_for_institution("I3").unwrap().is_empty());
}

#[test]
fn test_get_unknown_voucher() {
    let services = memory_services();
    assert!(matches!(
        services.vouchers.get("missing"),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn test_redeem_against_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let services = sqlite_services(&dir);
    let issued = issue_voucher(&services);

    let result = services.vouchers.redeem(&issued.code, "G1").unwrap();
    assert_eq!(result.balance, 1);
    assert!(matches!(
        services.vouchers.redeem(&issued.code, "G2"),
        Err(AppError::AlreadyRedeemed)
    ));

    let voucher = services.vouchers.get(&issued.voucher.id).unwrap();
    assert!(voucher.is_redeemed);
    assert_eq!(voucher.redeemed_by.as_deref(), Some("G1"));
}

#[test]
fn test_failed_credit_leaves_voucher_redeemable() {
    let (store, services) = faulty_services();
    let issued = issue_voucher(&services);

    store.set_faults(Faults {
        account_error: true,
        ..Faults::default()
    });
    let result = services.vouchers.redeem(&issued.code, "G1");
    assert!(matches!(result, Err(AppError::Internal(_))));

    let voucher = services.vouchers.get(&issued.voucher.id).unwrap();
    assert!(!voucher.is_redeemed);
    assert!(voucher.redeemed_by.is_none());
    assert_eq!(services.ledger.balance_of("G1").unwrap(), 0);
    assert!(services.ledger.history("G1").unwrap().is_empty());

    store.set_faults(Faults::default());
    let retry = services.vouchers.redeem(&issued.code, "G1").unwrap();
    assert_eq!(retry.balance, 1);
    assert!(services.vouchers.get(&issued.voucher.id).unwrap().is_redeemed);
}

#[test]
fn test_redeem_gives_up_when_account_keeps_changing() {
    let (store, services) = faulty_services();
    let issued = issue_voucher(&services);

    store.set_faults(Faults {
        stale_accounts: true,
        ..Faults::default()
    });
    let result = services.vouchers.redeem(&issued.code, "G1");
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(result.unwrap_err().code(), "CONFLICT");
    assert!(!services.vouchers.get(&issued.voucher.id).unwrap().is_redeemed);
}

#[test]
fn test_unusable_credit_policies_are_rejected_up_front() {
    for credit_policy in [
        CreditPolicy::Flat(0),
        CreditPolicy::Flat(-1),
        CreditPolicy::Denomination { unit_price: 0 },
    ] {
        let config = Config {
            credit_policy,
            ..Config::default()
        };
        let result = Services::new(std::sync::Arc::new(MemoryStore::new()), &config);
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "{:?} should be rejected",
            credit_policy
        );
    }
}
