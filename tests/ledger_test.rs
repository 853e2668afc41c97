mod common;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::{funded_service, test_service, USER};
use mia_wallet::application::{AppError, WalletService};
use mia_wallet::config::WalletConfig;
use mia_wallet::domain::{
    card_charge, prepare_transaction, Balances, Biller, Rate, DEMO_BALANCES, DEMO_OPENING,
};
use mia_wallet::io::Exporter;
use mia_wallet::storage::{CommitOutcome, PendingEntry, Repository};

#[tokio::test]
async fn test_demo_seed_is_consistent() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let account = service.seed_demo(USER).await?;
    assert_eq!(account.opening, DEMO_OPENING);
    assert_eq!(account.balances, DEMO_BALANCES);

    let history = service.history(USER, None).await?;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].sequence, 4);
    assert_eq!(history[0].description, "From Juan Pérez");

    let report = service.check_integrity(USER).await?;
    assert!(report.is_ok(), "issues: {:?}", report.issues);
    assert_eq!(report.expected, Some(DEMO_BALANCES));
    Ok(())
}

#[tokio::test]
async fn test_accounts_are_unique() -> Result<()> {
    let (service, _temp) = funded_service(0, 0).await?;

    assert!(matches!(
        service.open_account(USER, Balances::new(1, 1)).await,
        Err(AppError::AccountAlreadyExists(_))
    ));
    assert!(matches!(
        service.seed_demo(USER).await,
        Err(AppError::AccountAlreadyExists(_))
    ));
    assert!(matches!(
        service.open_account("bad id", Balances::new(0, 0)).await,
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        service.open_account("ana", Balances::new(-1, 0)).await,
        Err(AppError::InvalidInput(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_history_limit_and_receipts() -> Result<()> {
    let (service, _temp) = funded_service(10000, 10000).await?;
    assert!(service.last_transaction(USER).await?.is_none());

    let first = service.top_up(USER, "Banesco", "1", 100).await?;
    let second = service.pay_bill(USER, Biller::Water, "2", 100).await?;

    let latest = service.history(USER, Some(1)).await?;
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, second.id);
    assert_eq!(service.last_transaction(USER).await?, Some(second));
    assert_eq!(service.get_transaction(USER, first.id).await?, first);

    assert!(matches!(
        service.get_transaction(USER, uuid::Uuid::new_v4()).await,
        Err(AppError::TransactionNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_state_survives_reconnect() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let db_path = temp.path().join("wallet.db");
    let db_path = db_path.to_str().unwrap();

    {
        let service = WalletService::init(db_path, WalletConfig::default()).await?;
        service.open_account(USER, Balances::new(10000, 0)).await?;
        service.pay_bill(USER, Biller::Electricity, "1", 5000).await?;
    }

    let service = WalletService::connect(db_path, WalletConfig::default()).await?;
    assert_eq!(service.balances(USER).await?, Balances::new(9863, 0));
    assert_eq!(service.history(USER, None).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_stale_balances_are_not_overwritten() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let db_path = temp.path().join("wallet.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let service = WalletService::init(db_path.to_str().unwrap(), WalletConfig::default()).await?;
    service.open_account(USER, Balances::new(10000, 0)).await?;

    // A second writer computes a charge from the balances it read...
    let repo = Repository::connect(&db_url, Duration::from_millis(500)).await?;
    let read = repo.get_account(USER).await?.unwrap().balances;
    let proposal = card_charge(read, "Shop", 3650, Rate::DEFAULT_REFERENCE)?;
    let transaction = prepare_transaction(read, proposal, Utc::now())?;

    // ...but the account changes before it writes
    service.top_up(USER, "Banesco", "1", 100).await?;

    let outcome = repo
        .commit(&[PendingEntry {
            user_id: USER.to_string(),
            expected: read,
            transaction,
        }])
        .await?;
    assert!(matches!(outcome, CommitOutcome::Stale(ref user) if user == USER));

    assert_eq!(service.balances(USER).await?, Balances::new(10000, 100));
    assert_eq!(service.history(USER, None).await?.len(), 1);
    assert!(service.check_integrity(USER).await?.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_stale_counterparty_rolls_back_both_sides() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let db_path = temp.path().join("wallet.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let service = WalletService::init(db_path.to_str().unwrap(), WalletConfig::default()).await?;
    service.open_account(USER, Balances::new(10000, 0)).await?;
    service.open_account("ana", Balances::new(0, 0)).await?;

    let repo = Repository::connect(&db_url, Duration::from_millis(500)).await?;
    let payer = repo.get_account(USER).await?.unwrap().balances;
    let sent = prepare_transaction(
        payer,
        card_charge(payer, "Shop", 3650, Rate::DEFAULT_REFERENCE)?,
        Utc::now(),
    )?;
    let stale_recipient = PendingEntry {
        user_id: "ana".to_string(),
        expected: Balances::new(1, 1),
        transaction: sent.clone(),
    };

    let outcome = repo
        .commit(&[
            PendingEntry {
                user_id: USER.to_string(),
                expected: payer,
                transaction: sent,
            },
            stale_recipient,
        ])
        .await?;
    assert!(matches!(outcome, CommitOutcome::Stale(ref user) if user == "ana"));

    // The payer's update was rolled back with the rest
    assert_eq!(service.balances(USER).await?, Balances::new(10000, 0));
    assert!(service.history(USER, None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_export_history_and_snapshot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.seed_demo(USER).await?;
    let exporter = Exporter::new(&service);

    let mut csv = Vec::new();
    let count = exporter.export_history_csv(USER, &mut csv).await?;
    assert_eq!(count, 4);
    let csv = String::from_utf8(csv)?;
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("id,sequence,timestamp,type"));
    assert!(lines.next().unwrap().contains("remittance_received"));

    let mut json = Vec::new();
    let snapshot = exporter.export_snapshot_json(USER, &mut json).await?;
    assert_eq!(snapshot.transactions.len(), 4);
    assert!(snapshot.integrity.is_ok());

    let value: serde_json::Value = serde_json::from_slice(&json)?;
    assert_eq!(value["account"]["user_id"], USER);
    assert_eq!(value["account"]["balances"]["stable"], 150075);
    Ok(())
}
