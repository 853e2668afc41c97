mod common;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::{assert_state, funded_service, test_service_with, FRIEND, USER};
use mia_wallet::application::{AppError, WalletService};
use mia_wallet::config::WalletConfig;
use mia_wallet::domain::{
    prepare_transaction, referral_bonus, Balances, Currency, ReferralCode, TransactionKind,
};
use mia_wallet::storage::{CommitOutcome, PendingEntry, Repository};

#[tokio::test]
async fn test_referral_code_from_user_id() -> Result<()> {
    let (service, _temp) = funded_service(0, 0).await?;

    assert_eq!(service.referral_code(USER)?.as_str(), "MIA-USER-123");
    assert_eq!(service.referral_code("ana")?.as_str(), "MIA-ANA");
    Ok(())
}

#[tokio::test]
async fn test_redeem_credits_bonus_once() -> Result<()> {
    let (service, _temp) = funded_service(0, 0).await?;

    let result = service.redeem_referral(USER, "mia-ana").await?;
    assert_eq!(result.bonus.kind, TransactionKind::ReferralBonus);
    assert_eq!(result.bonus.amount_cents, 200);
    assert_eq!(result.bonus.currency, Currency::Usdt);
    // No local account owns MIA-ANA
    assert!(result.referrer.is_none());

    assert!(matches!(
        service.redeem_referral(USER, "MIA-JUAN").await,
        Err(AppError::ReferralAlreadyRedeemed(_))
    ));
    assert_state(&service, USER, Balances::new(200, 0), 1).await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_and_own_codes_are_rejected() -> Result<()> {
    let (service, _temp) = funded_service(0, 0).await?;

    for code in ["", "ABC-123", "MIA-", "MIA-USER-123"] {
        assert!(
            matches!(
                service.redeem_referral(USER, code).await,
                Err(AppError::InvalidInput(_))
            ),
            "{code} should be rejected"
        );
    }
    assert_state(&service, USER, Balances::new(0, 0), 0).await?;
    Ok(())
}

#[tokio::test]
async fn test_bonus_amount_comes_from_config() -> Result<()> {
    let config = WalletConfig {
        referral_bonus_cents: 500,
        ..WalletConfig::default()
    };
    let (service, _temp) = test_service_with(config).await?;
    service.open_account(USER, Balances::new(0, 0)).await?;

    service.redeem_referral(USER, "MIA-ANA").await?;
    assert_eq!(service.balances(USER).await?, Balances::new(500, 0));
    Ok(())
}

#[tokio::test]
async fn test_referrer_earns_bonus_in_same_write() -> Result<()> {
    let (service, _temp) = funded_service(0, 0).await?;
    service.open_account(FRIEND, Balances::new(100, 0)).await?;

    let code = service.referral_code(FRIEND)?;
    let result = service.redeem_referral(USER, code.as_str()).await?;

    let earned = result.referrer.expect("code owner should be credited");
    assert_eq!(earned.kind, TransactionKind::ReferralEarned);
    assert_eq!(earned.amount_cents, 200);
    assert_state(&service, USER, Balances::new(200, 0), 1).await?;
    assert_state(&service, FRIEND, Balances::new(300, 0), 1).await?;

    // The owner earns again for every new redeemer
    service.open_account("luis", Balances::new(0, 0)).await?;
    service.redeem_referral("luis", "mia-ana").await?;
    assert_state(&service, FRIEND, Balances::new(500, 0), 2).await?;

    // Earning does not use up the owner's own redemption
    service.redeem_referral(FRIEND, "MIA-LUIS").await?;
    assert_state(&service, FRIEND, Balances::new(700, 0), 3).await?;
    assert_state(&service, "luis", Balances::new(400, 0), 2).await?;
    assert!(service.check_integrity(FRIEND).await?.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_second_bonus_is_rejected_by_the_store() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let db_path = temp.path().join("wallet.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let service = WalletService::init(db_path.to_str().unwrap(), WalletConfig::default()).await?;
    service.open_account(USER, Balances::new(0, 0)).await?;
    service.redeem_referral(USER, "MIA-ANA").await?;

    // A writer that missed the first redemption tries to credit another bonus
    let repo = Repository::connect(&db_url, Duration::from_millis(500)).await?;
    let read = repo.get_account(USER).await?.unwrap().balances;
    let code = ReferralCode::parse("MIA-JUAN")?;
    let transaction = prepare_transaction(read, referral_bonus(read, &code, 200)?, Utc::now())?;

    let outcome = repo
        .commit(&[PendingEntry {
            user_id: USER.to_string(),
            expected: read,
            transaction,
        }])
        .await?;
    assert!(matches!(
        outcome,
        CommitOutcome::Duplicate { ref user_id, kind: TransactionKind::ReferralBonus } if user_id == USER
    ));
    assert_state(&service, USER, Balances::new(200, 0), 1).await?;
    Ok(())
}
