use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{format_cents, Cents, Currency, Transaction, TransactionDetails, TransactionKind};

/// The two balances of a wallet, in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Balances {
    /// Stable unit (USDT)
    pub stable: Cents,
    /// Fiat unit (BS)
    pub fiat: Cents,
}

impl Balances {
    pub const fn new(stable: Cents, fiat: Cents) -> Self {
        Self { stable, fiat }
    }

    pub fn get(&self, currency: Currency) -> Cents {
        match currency {
            Currency::Usdt => self.stable,
            Currency::Bs => self.fiat,
        }
    }

    pub fn is_non_negative(&self) -> bool {
        self.stable >= 0 && self.fiat >= 0
    }

    pub fn checked_add(self, other: Balances) -> Option<Balances> {
        Some(Balances {
            stable: self.stable.checked_add(other.stable)?,
            fiat: self.fiat.checked_add(other.fiat)?,
        })
    }

    pub fn checked_sub(self, other: Balances) -> Option<Balances> {
        Some(Balances {
            stable: self.stable.checked_sub(other.stable)?,
            fiat: self.fiat.checked_sub(other.fiat)?,
        })
    }
}

impl fmt::Display for Balances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} USDT / {} BS",
            format_cents(self.stable),
            format_cents(self.fiat)
        )
    }
}

/// A proposed balance pair plus the transaction that explains it.
/// Produced by the feature operations, consumed by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub proposed: Balances,
    pub details: TransactionDetails,
}

impl Proposal {
    pub fn new(proposed_stable: Cents, proposed_fiat: Cents, details: TransactionDetails) -> Self {
        Self {
            proposed: Balances::new(proposed_stable, proposed_fiat),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A proposed balance would be negative.
    InsufficientFunds {
        currency: Currency,
        available: Cents,
        required: Cents,
    },
    NegativeOpening(Balances),
    /// Stored history does not replay cleanly from the opening balances.
    InconsistentHistory { sequence: i64 },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InsufficientFunds {
                currency,
                available,
                required,
            } => write!(
                f,
                "Insufficient {} balance: available {}, required {}",
                currency,
                format_cents(*available),
                format_cents(*required)
            ),
            LedgerError::NegativeOpening(balances) => {
                write!(f, "Opening balances cannot be negative: {}", balances)
            }
            LedgerError::InconsistentHistory { sequence } => {
                write!(f, "History is inconsistent at transaction #{}", sequence)
            }
        }
    }
}

impl std::error::Error for LedgerError {}

/// Validate a proposal against the current balances and build the transaction
/// that records it. Does not mutate anything; the caller applies the result.
pub fn prepare_transaction(
    current: Balances,
    proposal: Proposal,
    timestamp: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let proposed = proposal.proposed;
    for currency in [Currency::Usdt, Currency::Bs] {
        let target = proposed.get(currency);
        if target < 0 {
            let available = current.get(currency);
            return Err(LedgerError::InsufficientFunds {
                currency,
                available,
                required: available.saturating_sub(target),
            });
        }
    }

    // Both sides are non-negative here, so the difference cannot overflow
    let delta = Balances::new(
        proposed.stable - current.stable,
        proposed.fiat - current.fiat,
    );
    Ok(Transaction::new(proposal.details, delta, timestamp))
}

/// Compute balances by replaying deltas on top of the opening balances.
/// Returns `None` on arithmetic overflow.
pub fn compute_balances(opening: Balances, transactions: &[Transaction]) -> Option<Balances> {
    transactions
        .iter()
        .try_fold(opening, |balances, txn| balances.checked_add(txn.delta))
}

/// In-memory ledger store: the balances of one wallet plus its history.
/// All mutation goes through [`Ledger::process`].
#[derive(Debug, Clone)]
pub struct Ledger {
    opening: Balances,
    balances: Balances,
    /// Oldest first; exposed newest first
    history: Vec<Transaction>,
}

impl Ledger {
    pub fn new(opening: Balances) -> Result<Self, LedgerError> {
        if !opening.is_non_negative() {
            return Err(LedgerError::NegativeOpening(opening));
        }
        Ok(Self {
            opening,
            balances: opening,
            history: Vec::new(),
        })
    }

    /// Rebuild a ledger from opening balances and stored history.
    /// Every intermediate state must be non-negative.
    pub fn replay(opening: Balances, mut history: Vec<Transaction>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(opening)?;
        history.sort_by_key(|t| t.sequence);

        for txn in &history {
            ledger.balances = ledger
                .balances
                .checked_add(txn.delta)
                .filter(Balances::is_non_negative)
                .ok_or(LedgerError::InconsistentHistory {
                    sequence: txn.sequence,
                })?;
        }
        ledger.history = history;
        Ok(ledger)
    }

    /// Session seeded with the demo balances and history.
    pub fn demo() -> Self {
        let history = demo_history();
        Self {
            opening: DEMO_OPENING,
            balances: DEMO_BALANCES,
            history,
        }
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    pub fn opening(&self) -> Balances {
        self.opening
    }

    /// Transaction history, newest first.
    pub fn history(&self) -> impl Iterator<Item = &Transaction> {
        self.history.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last_transaction(&self) -> Option<&Transaction> {
        self.history.last()
    }

    /// Apply a proposal: both balances and the new transaction become visible
    /// together, or nothing changes.
    pub fn process(&mut self, proposal: Proposal) -> Result<Transaction, LedgerError> {
        let proposed = proposal.proposed;
        let mut txn = prepare_transaction(self.balances, proposal, Utc::now())?;
        txn.sequence = self.next_sequence();

        self.balances = proposed;
        self.history.push(txn.clone());
        Ok(txn)
    }

    pub fn check_integrity(&self) -> IntegrityReport {
        build_integrity_report(self.opening, self.balances, &self.history)
    }

    fn next_sequence(&self) -> i64 {
        self.history.last().map(|t| t.sequence + 1).unwrap_or(1)
    }
}

/// Result of checking that balances and history agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub transaction_count: usize,
    pub expected: Option<Balances>,
    pub actual: Balances,
    pub has_sequence_gaps: bool,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(
    opening: Balances,
    actual: Balances,
    history: &[Transaction],
) -> IntegrityReport {
    let mut issues = Vec::new();

    let mut sorted: Vec<&Transaction> = history.iter().collect();
    sorted.sort_by_key(|t| t.sequence);
    let has_sequence_gaps = sorted
        .iter()
        .enumerate()
        .any(|(i, t)| t.sequence != i as i64 + 1);
    if has_sequence_gaps {
        issues.push("Transaction sequence has gaps or duplicates".to_string());
    }

    if !opening.is_non_negative() {
        issues.push(format!("Opening balances are negative: {}", opening));
    }
    if !actual.is_non_negative() {
        issues.push(format!("Current balances are negative: {}", actual));
    }

    let expected = compute_balances(opening, history);
    match expected {
        Some(expected) if expected != actual => issues.push(format!(
            "Balances do not match history: expected {}, found {}",
            expected, actual
        )),
        Some(_) => {}
        None => issues.push("Replaying history overflows".to_string()),
    }

    for txn in history {
        let recorded = txn.delta.get(txn.currency);
        let matches = match txn.usdt_used {
            // Fiat covered what it could, the stable side covered the rest
            Some(usdt) => txn.delta.stable == -usdt && recorded >= txn.amount_cents,
            None => recorded == txn.amount_cents,
        };
        if !matches {
            issues.push(format!(
                "Transaction #{} amount {} {} does not match its balance change",
                txn.sequence,
                format_cents(txn.amount_cents),
                txn.currency
            ));
        }
    }

    IntegrityReport {
        transaction_count: history.len(),
        expected,
        actual,
        has_sequence_gaps,
        issues,
    }
}

/// Balances of the demo session.
pub const DEMO_BALANCES: Balances = Balances::new(150075, 25000000);

/// Opening balances that, with [`demo_history`], produce [`DEMO_BALANCES`].
pub const DEMO_OPENING: Balances = Balances::new(95075, 25549750);

/// Four historical transactions of the demo session, oldest first.
pub fn demo_history() -> Vec<Transaction> {
    let seed = |sequence: i64,
                day: u32,
                kind: TransactionKind,
                description: &str,
                amount_cents: Cents,
                currency: Currency,
                delta: Balances| Transaction {
        id: Uuid::new_v4(),
        sequence,
        kind,
        description: description.to_string(),
        amount_cents,
        currency,
        usdt_used: None,
        delta,
        timestamp: Utc
            .with_ymd_and_hms(2025, 8, day, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
    };

    vec![
        seed(
            1,
            8,
            TransactionKind::UsdtPurchase,
            "M.I.A. auction at 36.50 BS/USDT",
            5000,
            Currency::Usdt,
            Balances::new(5000, -182500),
        ),
        seed(
            2,
            9,
            TransactionKind::CardPurchase,
            "Central Supermarket",
            -274600,
            Currency::Bs,
            Balances::new(0, -274600),
        ),
        seed(
            3,
            10,
            TransactionKind::BillPayment,
            "Electricity",
            -92650,
            Currency::Bs,
            Balances::new(0, -92650),
        ),
        seed(
            4,
            11,
            TransactionKind::RemittanceReceived,
            "From Juan Pérez",
            50000,
            Currency::Usdt,
            Balances::new(50000, 0),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(kind: TransactionKind, amount: Cents, currency: Currency) -> TransactionDetails {
        TransactionDetails::new(kind, "test", amount, currency).unwrap()
    }

    #[test]
    fn test_process_applies_balances_and_history_together() {
        let mut ledger = Ledger::new(Balances::new(10000, 0)).unwrap();
        let proposal = Proposal::new(
            9863,
            0,
            details(TransactionKind::CardPurchase, -137, Currency::Usdt),
        );

        let txn = ledger.process(proposal).unwrap();

        assert_eq!(ledger.balances(), Balances::new(9863, 0));
        assert_eq!(ledger.len(), 1);
        assert_eq!(txn.sequence, 1);
        assert_eq!(txn.delta, Balances::new(-137, 0));
        assert_eq!(ledger.last_transaction(), Some(&txn));
    }

    #[test]
    fn test_negative_proposal_leaves_state_unchanged() {
        let mut ledger = Ledger::new(Balances::new(100, 500)).unwrap();
        let proposal = Proposal::new(
            -1,
            500,
            details(TransactionKind::CardPurchase, -101, Currency::Usdt),
        );

        let result = ledger.process(proposal);

        assert_eq!(
            result,
            Err(LedgerError::InsufficientFunds {
                currency: Currency::Usdt,
                available: 100,
                required: 101,
            })
        );
        assert_eq!(ledger.balances(), Balances::new(100, 500));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_negative_fiat_is_rejected() {
        let mut ledger = Ledger::new(Balances::new(100, 500)).unwrap();
        let proposal = Proposal::new(
            200,
            -1000,
            details(TransactionKind::UsdtPurchase, 100, Currency::Usdt),
        );

        assert!(matches!(
            ledger.process(proposal),
            Err(LedgerError::InsufficientFunds {
                currency: Currency::Bs,
                ..
            })
        ));
        assert_eq!(ledger.balances(), Balances::new(100, 500));
    }

    #[test]
    fn test_history_is_newest_first() {
        let mut ledger = Ledger::new(Balances::new(0, 0)).unwrap();
        ledger
            .process(Proposal::new(
                0,
                1000,
                details(TransactionKind::TopUp, 1000, Currency::Bs),
            ))
            .unwrap();
        ledger
            .process(Proposal::new(
                0,
                3000,
                details(TransactionKind::TopUp, 2000, Currency::Bs),
            ))
            .unwrap();

        let sequences: Vec<i64> = ledger.history().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![2, 1]);
    }

    #[test]
    fn test_negative_opening_rejected() {
        assert!(matches!(
            Ledger::new(Balances::new(-1, 0)),
            Err(LedgerError::NegativeOpening(_))
        ));
    }

    #[test]
    fn test_demo_is_consistent() {
        let ledger = Ledger::demo();
        assert_eq!(ledger.balances(), DEMO_BALANCES);
        assert_eq!(ledger.len(), 4);
        assert_eq!(
            ledger.history().next().map(|t| t.kind),
            Some(TransactionKind::RemittanceReceived)
        );

        let report = ledger.check_integrity();
        assert!(report.is_ok(), "{:?}", report.issues);

        let replayed = Ledger::replay(DEMO_OPENING, demo_history()).unwrap();
        assert_eq!(replayed.balances(), DEMO_BALANCES);
    }

    #[test]
    fn test_replay_rejects_negative_intermediate_state() {
        let mut history = demo_history();
        history[1].delta = Balances::new(0, -30_000_000);

        assert_eq!(
            Ledger::replay(DEMO_OPENING, history).unwrap_err(),
            LedgerError::InconsistentHistory { sequence: 2 }
        );
    }

    #[test]
    fn test_integrity_detects_balance_mismatch() {
        let history = demo_history();
        let report = build_integrity_report(DEMO_OPENING, Balances::new(1, 1), &history);

        assert!(!report.is_ok());
        assert_eq!(report.expected, Some(DEMO_BALANCES));
    }

    #[test]
    fn test_integrity_detects_sequence_gaps() {
        let mut history = demo_history();
        history.remove(1);
        let actual = compute_balances(DEMO_OPENING, &history).unwrap();
        let report = build_integrity_report(DEMO_OPENING, actual, &history);

        assert!(report.has_sequence_gaps);
        assert!(!report.is_ok());
    }

    #[test]
    fn test_compute_balances() {
        let history = demo_history();
        assert_eq!(compute_balances(DEMO_OPENING, &history), Some(DEMO_BALANCES));
        assert_eq!(compute_balances(DEMO_OPENING, &[]), Some(DEMO_OPENING));
    }
}
