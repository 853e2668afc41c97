use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Balances, Cents, Currency};

pub type TransactionId = Uuid;

/// Closed set of operations that can appear in a wallet's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    CardPurchase,
    BillPayment,
    RemittanceSent,
    RemittanceReceived,
    UsdtPurchase,
    UsdtSale,
    TopUp,
    QrPaymentSent,
    QrPaymentReceived,
    ReferralBonus,
    ReferralEarned,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 11] = [
        TransactionKind::CardPurchase,
        TransactionKind::BillPayment,
        TransactionKind::RemittanceSent,
        TransactionKind::RemittanceReceived,
        TransactionKind::UsdtPurchase,
        TransactionKind::UsdtSale,
        TransactionKind::TopUp,
        TransactionKind::QrPaymentSent,
        TransactionKind::QrPaymentReceived,
        TransactionKind::ReferralBonus,
        TransactionKind::ReferralEarned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::CardPurchase => "card_purchase",
            TransactionKind::BillPayment => "bill_payment",
            TransactionKind::RemittanceSent => "remittance_sent",
            TransactionKind::RemittanceReceived => "remittance_received",
            TransactionKind::UsdtPurchase => "usdt_purchase",
            TransactionKind::UsdtSale => "usdt_sale",
            TransactionKind::TopUp => "top_up",
            TransactionKind::QrPaymentSent => "qr_payment_sent",
            TransactionKind::QrPaymentReceived => "qr_payment_received",
            TransactionKind::ReferralBonus => "referral_bonus",
            TransactionKind::ReferralEarned => "referral_earned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Category label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::CardPurchase => "Card purchase",
            TransactionKind::BillPayment => "Bill payment",
            TransactionKind::RemittanceSent => "Remittance sent",
            TransactionKind::RemittanceReceived => "Remittance received",
            TransactionKind::UsdtPurchase => "USDT purchase",
            TransactionKind::UsdtSale => "USDT sale",
            TransactionKind::TopUp => "Top-up",
            TransactionKind::QrPaymentSent => "QR payment sent",
            TransactionKind::QrPaymentReceived => "QR payment received",
            TransactionKind::ReferralBonus => "Referral bonus",
            TransactionKind::ReferralEarned => "Referral earned",
        }
    }

    /// Credits record a positive amount, everything else a negative one.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::RemittanceReceived
                | TransactionKind::UsdtPurchase
                | TransactionKind::TopUp
                | TransactionKind::QrPaymentReceived
                | TransactionKind::ReferralBonus
                | TransactionKind::ReferralEarned
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What a caller asks the ledger to record. Validated on construction, so a
/// `TransactionDetails` value is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    kind: TransactionKind,
    description: String,
    amount_cents: Cents,
    currency: Currency,
    usdt_used: Option<Cents>,
}

impl TransactionDetails {
    pub fn new(
        kind: TransactionKind,
        description: impl Into<String>,
        amount_cents: Cents,
        currency: Currency,
    ) -> Result<Self, DetailsError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(DetailsError::MissingDescription);
        }
        if amount_cents == 0 {
            return Err(DetailsError::ZeroAmount);
        }
        if kind.is_credit() != (amount_cents > 0) {
            return Err(DetailsError::WrongSign { kind, amount_cents });
        }
        Ok(Self {
            kind,
            description,
            amount_cents,
            currency,
            usdt_used: None,
        })
    }

    /// Record the stable amount converted to cover a BS shortfall.
    pub fn with_usdt_used(mut self, usdt_cents: Cents) -> Result<Self, DetailsError> {
        if self.currency != Currency::Bs {
            return Err(DetailsError::UsdtUsedOnStable);
        }
        if usdt_cents <= 0 {
            return Err(DetailsError::NonPositiveUsdtUsed(usdt_cents));
        }
        self.usdt_used = Some(usdt_cents);
        Ok(self)
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount_cents(&self) -> Cents {
        self.amount_cents
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn usdt_used(&self) -> Option<Cents> {
        self.usdt_used
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsError {
    MissingDescription,
    ZeroAmount,
    WrongSign {
        kind: TransactionKind,
        amount_cents: Cents,
    },
    UsdtUsedOnStable,
    NonPositiveUsdtUsed(Cents),
}

impl fmt::Display for DetailsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailsError::MissingDescription => write!(f, "transaction description is required"),
            DetailsError::ZeroAmount => write!(f, "transaction amount cannot be zero"),
            DetailsError::WrongSign { kind, amount_cents } => write!(
                f,
                "{} must be recorded as a {} amount, got {} cents",
                kind,
                if kind.is_credit() {
                    "positive"
                } else {
                    "negative"
                },
                amount_cents
            ),
            DetailsError::UsdtUsedOnStable => {
                write!(f, "USDT conversion can only be recorded on BS transactions")
            }
            DetailsError::NonPositiveUsdtUsed(cents) => {
                write!(f, "USDT used must be positive, got {} cents", cents)
            }
        }
    }
}

impl std::error::Error for DetailsError {}

/// A committed ledger entry. Transactions are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Per-account sequence number, starting at 1
    pub sequence: i64,
    pub kind: TransactionKind,
    pub description: String,
    /// Signed amount in `currency`, as shown to the user
    pub amount_cents: Cents,
    pub currency: Currency,
    /// Stable cents converted to cover part of a BS payment
    pub usdt_used: Option<Cents>,
    /// Exact change applied to both balances
    pub delta: Balances,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction. Sequence number must be assigned by the store.
    pub fn new(details: TransactionDetails, delta: Balances, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            kind: details.kind,
            description: details.description,
            amount_cents: details.amount_cents,
            currency: details.currency,
            usdt_used: details.usdt_used,
            delta,
            timestamp,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.amount_cents > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in TransactionKind::ALL {
            assert_eq!(TransactionKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(TransactionKind::from_str("transfer"), None);
    }

    #[test]
    fn test_details_require_description() {
        let result =
            TransactionDetails::new(TransactionKind::TopUp, "  ", 1000, Currency::Bs);
        assert_eq!(result, Err(DetailsError::MissingDescription));
    }

    #[test]
    fn test_details_sign_follows_kind() {
        assert!(
            TransactionDetails::new(TransactionKind::TopUp, "From bank", 1000, Currency::Bs)
                .is_ok()
        );
        assert!(matches!(
            TransactionDetails::new(TransactionKind::TopUp, "From bank", -1000, Currency::Bs),
            Err(DetailsError::WrongSign { .. })
        ));
        assert!(matches!(
            TransactionDetails::new(TransactionKind::CardPurchase, "Shop", 137, Currency::Usdt),
            Err(DetailsError::WrongSign { .. })
        ));
        assert_eq!(
            TransactionDetails::new(TransactionKind::CardPurchase, "Shop", 0, Currency::Usdt),
            Err(DetailsError::ZeroAmount)
        );
    }

    #[test]
    fn test_usdt_used_only_on_bs() {
        let bill =
            TransactionDetails::new(TransactionKind::BillPayment, "Water", -5000, Currency::Bs)
                .unwrap()
                .with_usdt_used(137)
                .unwrap();
        assert_eq!(bill.usdt_used(), Some(137));

        let card =
            TransactionDetails::new(TransactionKind::CardPurchase, "Shop", -137, Currency::Usdt)
                .unwrap();
        assert_eq!(
            card.with_usdt_used(137),
            Err(DetailsError::UsdtUsedOnStable)
        );
    }

    #[test]
    fn test_transaction_copies_details() {
        let details =
            TransactionDetails::new(TransactionKind::TopUp, "From Banesco", 50000, Currency::Bs)
                .unwrap();
        let delta = Balances::new(0, 50000);
        let txn = Transaction::new(details, delta, Utc::now());

        assert_eq!(txn.sequence, 0);
        assert_eq!(txn.kind, TransactionKind::TopUp);
        assert_eq!(txn.description, "From Banesco");
        assert_eq!(txn.amount_cents, 50000);
        assert_eq!(txn.currency, Currency::Bs);
        assert_eq!(txn.usdt_used, None);
        assert_eq!(txn.delta, delta);
        assert!(txn.is_credit());
    }
}
