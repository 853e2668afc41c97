// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use mia_wallet::application::WalletService;
use mia_wallet::config::WalletConfig;
use mia_wallet::domain::{Balances, Transaction};
use tempfile::TempDir;

pub const USER: &str = "mia-user-123";
pub const FRIEND: &str = "ana";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(WalletService, TempDir)> {
    test_service_with(WalletConfig::default()).await
}

pub async fn test_service_with(config: WalletConfig) -> Result<(WalletService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = WalletService::init(db_path.to_str().unwrap(), config).await?;
    Ok((service, temp_dir))
}

/// Service with one account holding the given balances (in cents)
pub async fn funded_service(stable: i64, fiat: i64) -> Result<(WalletService, TempDir)> {
    let (service, temp) = test_service().await?;
    service
        .open_account(USER, Balances::new(stable, fiat))
        .await?;
    Ok((service, temp))
}

/// Assert the account still holds `balances` and has exactly `count` transactions
pub async fn assert_state(
    service: &WalletService,
    user: &str,
    balances: Balances,
    count: usize,
) -> Result<Vec<Transaction>> {
    assert_eq!(service.balances(user).await?, balances);
    let history = service.history(user, None).await?;
    assert_eq!(history.len(), count);
    Ok(history)
}
