//! Expense analysis collaborator. The wallet hands its history to an
//! [`ExpenseAnalyzer`] and shows back a summary and recommendations.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{format_amount, Cents, Currency, Transaction, TransactionId, TransactionKind};

/// One history entry as seen by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEntry {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub description: String,
    pub amount_cents: Cents,
    pub date: DateTime<Utc>,
    pub currency: Currency,
}

impl From<&Transaction> for AnalysisEntry {
    fn from(txn: &Transaction) -> Self {
        Self {
            id: txn.id,
            kind: txn.kind,
            description: txn.description.clone(),
            amount_cents: txn.amount_cents,
            date: txn.timestamp,
            currency: txn.currency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseAnalysis {
    pub summary: String,
    pub recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The analyzer refused this input.
    PolicyRejection(String),
    /// The analyzer could not produce a result.
    Unavailable(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::PolicyRejection(reason) => write!(f, "analysis refused: {}", reason),
            AnalysisError::Unavailable(reason) => write!(f, "analysis unavailable: {}", reason),
        }
    }
}

impl std::error::Error for AnalysisError {}

#[allow(async_fn_in_trait)]
pub trait ExpenseAnalyzer {
    async fn analyze(&self, entries: &[AnalysisEntry]) -> Result<ExpenseAnalysis, AnalysisError>;
}

/// Local rule-based analyzer: totals debits per kind and points at the
/// largest category in each currency.
#[derive(Debug, Clone)]
pub struct SpendingAnalyzer {
    max_entries: usize,
}

impl SpendingAnalyzer {
    pub const DEFAULT_MAX_ENTRIES: usize = 500;

    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }
}

impl Default for SpendingAnalyzer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ENTRIES)
    }
}

impl ExpenseAnalyzer for SpendingAnalyzer {
    async fn analyze(&self, entries: &[AnalysisEntry]) -> Result<ExpenseAnalysis, AnalysisError> {
        if entries.len() > self.max_entries {
            return Err(AnalysisError::PolicyRejection(format!(
                "history has {} entries, at most {} can be analyzed",
                entries.len(),
                self.max_entries
            )));
        }

        let mut totals: BTreeMap<(Currency, &'static str), Cents> = BTreeMap::new();
        let mut spent: BTreeMap<Currency, Cents> = BTreeMap::new();
        let mut debit_count = 0;
        for entry in entries.iter().filter(|e| e.amount_cents < 0) {
            let amount = entry.amount_cents.saturating_neg();
            let total = totals.entry((entry.currency, entry.kind.label())).or_default();
            *total = total.saturating_add(amount);
            let sum = spent.entry(entry.currency).or_default();
            *sum = sum.saturating_add(amount);
            debit_count += 1;
        }

        if debit_count == 0 {
            return Err(AnalysisError::Unavailable(
                "there is no spending to analyze yet".to_string(),
            ));
        }

        let spent_text: Vec<String> = spent
            .iter()
            .map(|(currency, cents)| format_amount(*cents, *currency))
            .collect();
        let summary = format!(
            "You made {} payments totalling {} across {} categories.",
            debit_count,
            spent_text.join(" and "),
            totals.len()
        );

        let mut recommendations = Vec::new();
        for (currency, total) in &spent {
            let largest = totals
                .iter()
                .filter(|((c, _), _)| c == currency)
                .max_by_key(|(_, cents)| **cents);
            if let Some(((_, label), cents)) = largest {
                let share = cents.saturating_mul(100) / (*total).max(1);
                recommendations.push(format!(
                    "{} takes {}% of your {} spending ({}); review it first to save.",
                    label,
                    share,
                    currency,
                    format_amount(*cents, *currency)
                ));
            }
        }

        Ok(ExpenseAnalysis {
            summary,
            recommendations: recommendations.join("\n"),
        })
    }
}
