use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::WalletService;
use crate::domain::{format_cents, Account, IntegrityReport, Transaction};

/// Full account snapshot for JSON export
#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub account: Account,
    /// Newest first
    pub transactions: Vec<Transaction>,
    pub integrity: IntegrityReport,
}

/// Exporter for converting wallet data to various formats
pub struct Exporter<'a> {
    service: &'a WalletService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a WalletService) -> Self {
        Self { service }
    }

    /// Export an account's history to CSV, newest first
    pub async fn export_history_csv<W: Write>(&self, user_id: &str, writer: W) -> Result<usize> {
        let transactions = self.service.history(user_id, None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "type",
            "description",
            "amount",
            "currency",
            "usdt_used",
            "delta_stable",
            "delta_fiat",
        ])?;

        for txn in &transactions {
            csv_writer.write_record([
                txn.id.to_string(),
                txn.sequence.to_string(),
                txn.timestamp.to_rfc3339(),
                txn.kind.as_str().to_string(),
                txn.description.clone(),
                format_cents(txn.amount_cents),
                txn.currency.to_string(),
                txn.usdt_used.map(format_cents).unwrap_or_default(),
                txn.delta.stable.to_string(),
                txn.delta.fiat.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export account, history and integrity report as a JSON snapshot
    pub async fn export_snapshot_json<W: Write>(
        &self,
        user_id: &str,
        mut writer: W,
    ) -> Result<AccountSnapshot> {
        let account = self.service.account(user_id).await?;
        let transactions = self.service.history(user_id, None).await?;
        let integrity = self.service.check_integrity(user_id).await?;

        let snapshot = AccountSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            account,
            transactions,
            integrity,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
