//! Feature operations. Each one is a pure function of the current balances and
//! the user's input, producing a [`Proposal`] for the ledger processor.
//! None of them checks sufficiency: a proposal with a negative balance is
//! rejected by the processor, which leaves the ledger untouched.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::{
    format_cents, Balances, Cents, Currency, DetailsError, Proposal, QrPayload, Rate, RateBand,
    ReferralCode, Rounding, TransactionDetails, TransactionKind,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Amount is zero or negative.
    InvalidAmount(Cents),
    /// Amount converts to less than one cent on the other side.
    AmountTooSmall(Cents),
    AmountTooLarge,
    MissingField(&'static str),
    RateOutOfBand { rate: Rate, band: RateBand },
    MethodUnavailable(PaymentMethod),
    Details(DetailsError),
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::InvalidAmount(cents) => {
                write!(f, "Amount must be positive, got {}", format_cents(*cents))
            }
            OperationError::AmountTooSmall(cents) => write!(
                f,
                "Amount {} is too small to convert at this rate",
                format_cents(*cents)
            ),
            OperationError::AmountTooLarge => write!(f, "Amount is too large"),
            OperationError::MissingField(field) => write!(f, "Missing required field: {}", field),
            OperationError::RateOutOfBand { rate, band } => write!(
                f,
                "Rate {} is outside the allowed range ({})",
                rate, band
            ),
            OperationError::MethodUnavailable(method) => {
                write!(f, "Payment method '{}' is not available", method.label())
            }
            OperationError::Details(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for OperationError {}

impl From<DetailsError> for OperationError {
    fn from(err: DetailsError) -> Self {
        OperationError::Details(err)
    }
}

fn require_positive(amount: Cents) -> Result<(), OperationError> {
    if amount <= 0 {
        return Err(OperationError::InvalidAmount(amount));
    }
    Ok(())
}

fn require_field<'a>(value: &'a str, field: &'static str) -> Result<&'a str, OperationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(OperationError::MissingField(field));
    }
    Ok(value)
}

fn debit(balance: Cents, amount: Cents) -> Result<Cents, OperationError> {
    balance
        .checked_sub(amount)
        .ok_or(OperationError::AmountTooLarge)
}

fn credit(balance: Cents, amount: Cents) -> Result<Cents, OperationError> {
    balance
        .checked_add(amount)
        .ok_or(OperationError::AmountTooLarge)
}

// ========================
// Card
// ========================

/// Card purchase priced in BS, debited from the stable balance at `rate`.
pub fn card_charge(
    current: Balances,
    merchant: &str,
    fiat_amount: Cents,
    rate: Rate,
) -> Result<Proposal, OperationError> {
    require_positive(fiat_amount)?;
    let merchant = match merchant.trim() {
        "" => "local merchant",
        name => name,
    };

    let stable_cost = rate.fiat_to_stable(fiat_amount, Rounding::Up);
    let details = TransactionDetails::new(
        TransactionKind::CardPurchase,
        format!(
            "Payment at {} (Bs {} at {})",
            merchant,
            format_cents(fiat_amount),
            rate
        ),
        -stable_cost,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        debit(current.stable, stable_cost)?,
        current.fiat,
        details,
    ))
}

// ========================
// Bills
// ========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biller {
    Electricity,
    Water,
    Gas,
    Telephone,
    Internet,
    MunicipalTaxes,
}

impl Biller {
    pub const ALL: [Biller; 6] = [
        Biller::Electricity,
        Biller::Water,
        Biller::Gas,
        Biller::Telephone,
        Biller::Internet,
        Biller::MunicipalTaxes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Biller::Electricity => "electricity",
            Biller::Water => "water",
            Biller::Gas => "gas",
            Biller::Telephone => "telephone",
            Biller::Internet => "internet",
            Biller::MunicipalTaxes => "municipal_taxes",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|b| b.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Biller::Electricity => "Electricity",
            Biller::Water => "Water",
            Biller::Gas => "Gas",
            Biller::Telephone => "Telephone",
            Biller::Internet => "Internet",
            Biller::MunicipalTaxes => "Municipal taxes",
        }
    }
}

/// Bill priced in BS. The fiat balance pays first; a shortfall is converted
/// from the stable balance at `rate` and recorded as `usdt_used`.
pub fn bill_payment(
    current: Balances,
    biller: Biller,
    reference: &str,
    amount: Cents,
    rate: Rate,
) -> Result<Proposal, OperationError> {
    require_positive(amount)?;
    let reference = require_field(reference, "reference")?;
    let description = format!("{} bill | Ref: {}", biller.label(), reference);

    if amount <= current.fiat {
        let details =
            TransactionDetails::new(TransactionKind::BillPayment, description, -amount, Currency::Bs)?;
        return Ok(Proposal::new(
            current.stable,
            current.fiat - amount,
            details,
        ));
    }

    // A negative fiat balance is left as is so the processor rejects it
    let shortfall = amount - current.fiat.max(0);
    let usdt_required = rate.fiat_to_stable(shortfall, Rounding::Up);
    let details = TransactionDetails::new(
        TransactionKind::BillPayment,
        format!("{} (converted from USDT)", description),
        -amount,
        Currency::Bs,
    )?
    .with_usdt_used(usdt_required)?;

    Ok(Proposal::new(
        debit(current.stable, usdt_required)?,
        current.fiat.min(0),
        details,
    ))
}

// ========================
// Remittances
// ========================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    /// Wallet balance, no commission
    AppBalance,
    Card,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::AppBalance => "app-balance",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank-transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "app-balance" | "app_balance" | "balance" => Some(PaymentMethod::AppBalance),
            "card" => Some(PaymentMethod::Card),
            "bank-transfer" | "bank_transfer" | "bank" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::AppBalance => "App balance",
            PaymentMethod::Card => "Credit/debit card",
            PaymentMethod::BankTransfer => "Bank transfer",
        }
    }

    /// Commission as a fraction of the amount sent.
    pub fn commission_rate(&self) -> Decimal {
        match self {
            PaymentMethod::AppBalance => Decimal::ZERO,
            PaymentMethod::Card | PaymentMethod::BankTransfer => Decimal::new(1, 2),
        }
    }

    /// Only the wallet balance can fund a remittance for now.
    pub fn is_available(&self) -> bool {
        matches!(self, PaymentMethod::AppBalance)
    }
}

/// What the user filled in on the transfer form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemittanceDraft {
    pub recipient: String,
    pub amount_cents: Cents,
    pub method: PaymentMethod,
}

/// Figures shown on the confirmation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemittanceQuote {
    pub amount_sent: Cents,
    pub commission: Cents,
    pub amount_received: Cents,
}

pub fn quote_remittance(draft: &RemittanceDraft) -> Result<RemittanceQuote, OperationError> {
    require_field(&draft.recipient, "recipient")?;
    require_positive(draft.amount_cents)?;
    if !draft.method.is_available() {
        return Err(OperationError::MethodUnavailable(draft.method));
    }

    let commission = (Decimal::from(draft.amount_cents) * draft.method.commission_rate())
        .round_dp_with_strategy(0, RoundingStrategy::AwayFromZero)
        .to_i64()
        .ok_or(OperationError::AmountTooLarge)?;

    Ok(RemittanceQuote {
        amount_sent: draft.amount_cents,
        commission,
        amount_received: draft.amount_cents - commission,
    })
}

/// Sender side of a remittance: the full amount leaves the stable balance.
pub fn remittance(current: Balances, draft: &RemittanceDraft) -> Result<Proposal, OperationError> {
    quote_remittance(draft)?;
    let details = TransactionDetails::new(
        TransactionKind::RemittanceSent,
        format!(
            "To {} | Method: {}",
            draft.recipient.trim(),
            draft.method.label()
        ),
        -draft.amount_cents,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        debit(current.stable, draft.amount_cents)?,
        current.fiat,
        details,
    ))
}

/// Recipient side of a remittance.
pub fn remittance_received(
    current: Balances,
    sender: &str,
    amount: Cents,
) -> Result<Proposal, OperationError> {
    require_positive(amount)?;
    let details = TransactionDetails::new(
        TransactionKind::RemittanceReceived,
        format!("From {}", require_field(sender, "sender")?),
        amount,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        credit(current.stable, amount)?,
        current.fiat,
        details,
    ))
}

// ========================
// Exchange auction
// ========================

fn require_in_band(rate: Rate, band: RateBand) -> Result<(), OperationError> {
    if !band.contains(rate) {
        return Err(OperationError::RateOutOfBand { rate, band });
    }
    Ok(())
}

/// Buy USDT with BS at an auction rate inside `band`.
pub fn exchange_buy(
    current: Balances,
    fiat_amount: Cents,
    rate: Rate,
    band: RateBand,
) -> Result<Proposal, OperationError> {
    require_in_band(rate, band)?;
    require_positive(fiat_amount)?;

    let stable_credit = rate.fiat_to_stable(fiat_amount, Rounding::Down);
    if stable_credit == 0 {
        return Err(OperationError::AmountTooSmall(fiat_amount));
    }
    let details = TransactionDetails::new(
        TransactionKind::UsdtPurchase,
        format!("Auction at {} BS/USDT", rate),
        stable_credit,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        credit(current.stable, stable_credit)?,
        debit(current.fiat, fiat_amount)?,
        details,
    ))
}

/// Sell USDT for BS at an auction rate inside `band`.
pub fn exchange_sell(
    current: Balances,
    stable_amount: Cents,
    rate: Rate,
    band: RateBand,
) -> Result<Proposal, OperationError> {
    require_in_band(rate, band)?;
    require_positive(stable_amount)?;

    let fiat_credit = rate.stable_to_fiat(stable_amount, Rounding::Down);
    if fiat_credit == 0 {
        return Err(OperationError::AmountTooSmall(stable_amount));
    }
    let details = TransactionDetails::new(
        TransactionKind::UsdtSale,
        format!(
            "Auction at {} BS/USDT (Bs {})",
            rate,
            format_cents(fiat_credit)
        ),
        -stable_amount,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        debit(current.stable, stable_amount)?,
        credit(current.fiat, fiat_credit)?,
        details,
    ))
}

// ========================
// Top-ups
// ========================

/// National bank transfer reported by the user, credited to the fiat balance.
pub fn top_up(
    current: Balances,
    bank: &str,
    reference: &str,
    amount: Cents,
) -> Result<Proposal, OperationError> {
    require_positive(amount)?;
    let bank = require_field(bank, "bank")?;
    let reference = require_field(reference, "reference")?;

    let details = TransactionDetails::new(
        TransactionKind::TopUp,
        format!("From {} | Ref: {}", bank, reference),
        amount,
        Currency::Bs,
    )?;

    Ok(Proposal::new(
        current.stable,
        credit(current.fiat, amount)?,
        details,
    ))
}

// ========================
// QR payments
// ========================

/// Payer side of a scanned QR code.
pub fn qr_payment(current: Balances, payload: &QrPayload) -> Result<Proposal, OperationError> {
    require_positive(payload.amount_cents)?;
    let details = TransactionDetails::new(
        TransactionKind::QrPaymentSent,
        format!("To user {}", require_field(&payload.user_id, "user id")?),
        -payload.amount_cents,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        debit(current.stable, payload.amount_cents)?,
        current.fiat,
        details,
    ))
}

/// Recipient side of a QR payment.
pub fn qr_payment_received(
    current: Balances,
    payer: &str,
    amount: Cents,
) -> Result<Proposal, OperationError> {
    require_positive(amount)?;
    let details = TransactionDetails::new(
        TransactionKind::QrPaymentReceived,
        format!("From user {}", require_field(payer, "payer")?),
        amount,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        credit(current.stable, amount)?,
        current.fiat,
        details,
    ))
}

// ========================
// Referrals
// ========================

/// Welcome bonus credited when a referral code is redeemed.
pub fn referral_bonus(
    current: Balances,
    code: &ReferralCode,
    bonus: Cents,
) -> Result<Proposal, OperationError> {
    require_positive(bonus)?;
    let details = TransactionDetails::new(
        TransactionKind::ReferralBonus,
        format!("Welcome bonus for code {}", code),
        bonus,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        credit(current.stable, bonus)?,
        current.fiat,
        details,
    ))
}

/// Credit for the owner of a referral code when someone redeems it.
pub fn referral_earned(
    current: Balances,
    referee: &str,
    bonus: Cents,
) -> Result<Proposal, OperationError> {
    require_positive(bonus)?;
    let details = TransactionDetails::new(
        TransactionKind::ReferralEarned,
        format!("Referral of {}", require_field(referee, "referee")?),
        bonus,
        Currency::Usdt,
    )?;

    Ok(Proposal::new(
        credit(current.stable, bonus)?,
        current.fiat,
        details,
    ))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{Ledger, LedgerError};

    fn rate() -> Rate {
        Rate::new(dec!(36.5)).unwrap()
    }

    fn band() -> RateBand {
        RateBand::around(rate(), dec!(0.10)).unwrap()
    }

    #[test]
    fn test_card_charge_debits_stable_only() {
        let current = Balances::new(10000, 50000);
        let proposal = card_charge(current, "Central", 5000, rate()).unwrap();

        assert_eq!(proposal.proposed, Balances::new(9863, 50000));
        assert_eq!(proposal.details.amount_cents(), -137);
        assert_eq!(proposal.details.currency(), Currency::Usdt);
        assert_eq!(proposal.details.kind(), TransactionKind::CardPurchase);
    }

    #[test]
    fn test_card_charge_defaults_merchant() {
        let proposal = card_charge(Balances::new(10000, 0), " ", 5000, rate()).unwrap();
        assert!(proposal.details.description().contains("local merchant"));
    }

    #[test]
    fn test_card_charge_rejects_non_positive_amount() {
        assert_eq!(
            card_charge(Balances::new(10000, 0), "Shop", 0, rate()),
            Err(OperationError::InvalidAmount(0))
        );
    }

    #[test]
    fn test_bill_paid_from_fiat_when_sufficient() {
        let current = Balances::new(10000, 8000);
        let proposal = bill_payment(current, Biller::Water, "123", 5000, rate()).unwrap();

        assert_eq!(proposal.proposed, Balances::new(10000, 3000));
        assert_eq!(proposal.details.usdt_used(), None);
        assert_eq!(proposal.details.amount_cents(), -5000);
    }

    #[test]
    fn test_bill_converts_shortfall_from_stable() {
        // Fiat 0, stable 100.00, bill of Bs 50.00 at 36.5
        let current = Balances::new(10000, 0);
        let proposal = bill_payment(current, Biller::Electricity, "987", 5000, rate()).unwrap();

        assert_eq!(proposal.proposed, Balances::new(9863, 0));
        assert_eq!(proposal.details.usdt_used(), Some(137));
        assert_eq!(proposal.details.currency(), Currency::Bs);
        assert_eq!(proposal.details.amount_cents(), -5000);
    }

    #[test]
    fn test_bill_partial_fiat_then_stable() {
        let current = Balances::new(10000, 1350);
        let proposal = bill_payment(current, Biller::Gas, "1", 5000, rate()).unwrap();

        // Shortfall Bs 36.50 = 1.00 USDT
        assert_eq!(proposal.proposed, Balances::new(9900, 0));
        assert_eq!(proposal.details.usdt_used(), Some(100));
    }

    #[test]
    fn test_bill_rejected_when_combined_value_insufficient() {
        let mut ledger = Ledger::new(Balances::new(100, 1000)).unwrap();
        // Shortfall Bs 49.90 needs 1.37 USDT, only 1.00 available
        let proposal =
            bill_payment(ledger.balances(), Biller::Internet, "1", 5990, rate()).unwrap();

        assert!(matches!(
            ledger.process(proposal),
            Err(LedgerError::InsufficientFunds {
                currency: Currency::Usdt,
                ..
            })
        ));
        assert_eq!(ledger.balances(), Balances::new(100, 1000));
    }

    #[test]
    fn test_bill_requires_reference() {
        assert_eq!(
            bill_payment(Balances::new(0, 10000), Biller::Water, "  ", 100, rate()),
            Err(OperationError::MissingField("reference"))
        );
    }

    #[test]
    fn test_remittance_quote_and_proposal() {
        let draft = RemittanceDraft {
            recipient: "ana".into(),
            amount_cents: 10000,
            method: PaymentMethod::AppBalance,
        };
        let quote = quote_remittance(&draft).unwrap();
        assert_eq!(quote.commission, 0);
        assert_eq!(quote.amount_received, 10000);

        let proposal = remittance(Balances::new(15000, 7), &draft).unwrap();
        assert_eq!(proposal.proposed, Balances::new(5000, 7));
        assert_eq!(proposal.details.kind(), TransactionKind::RemittanceSent);
    }

    #[test]
    fn test_remittance_placeholder_methods_unavailable() {
        for method in [PaymentMethod::Card, PaymentMethod::BankTransfer] {
            let draft = RemittanceDraft {
                recipient: "ana".into(),
                amount_cents: 10000,
                method,
            };
            assert_eq!(
                remittance(Balances::new(15000, 0), &draft),
                Err(OperationError::MethodUnavailable(method))
            );
        }
    }

    #[test]
    fn test_exchange_buy_credits_fiat_over_rate() {
        let current = Balances::new(0, 100000);
        let proposal = exchange_buy(current, 100000, rate(), band()).unwrap();

        // Bs 1000.00 / 36.5 = 27.397... USDT
        assert_eq!(proposal.proposed, Balances::new(2739, 0));
        assert_eq!(proposal.details.amount_cents(), 2739);
    }

    #[test]
    fn test_exchange_rejects_rate_outside_band() {
        let current = Balances::new(100000, 100000);
        let high = Rate::new(dec!(41)).unwrap();
        let low = Rate::new(dec!(30)).unwrap();

        assert!(matches!(
            exchange_buy(current, 1, high, band()),
            Err(OperationError::RateOutOfBand { .. })
        ));
        assert!(matches!(
            exchange_sell(current, 1, low, band()),
            Err(OperationError::RateOutOfBand { .. })
        ));
    }

    #[test]
    fn test_exchange_sell_credits_fiat() {
        let current = Balances::new(5000, 0);
        let proposal = exchange_sell(current, 5000, rate(), band()).unwrap();

        assert_eq!(proposal.proposed, Balances::new(0, 182500));
        assert_eq!(proposal.details.amount_cents(), -5000);
    }

    #[test]
    fn test_exchange_buy_too_small() {
        assert_eq!(
            exchange_buy(Balances::new(0, 100), 10, rate(), band()),
            Err(OperationError::AmountTooSmall(10))
        );
    }

    #[test]
    fn test_exchange_sell_too_small() {
        let low_rate = Rate::new(dec!(0.5)).unwrap();
        let low_band = RateBand::around(low_rate, dec!(0.10)).unwrap();
        assert_eq!(
            exchange_sell(Balances::new(100, 0), 1, low_rate, low_band),
            Err(OperationError::AmountTooSmall(1))
        );
        assert!(exchange_sell(Balances::new(100, 0), 2, low_rate, low_band).is_ok());
    }

    #[test]
    fn test_top_up_credits_fiat_only() {
        let proposal = top_up(Balances::new(42, 0), "Banesco", "0012", 50000).unwrap();
        assert_eq!(proposal.proposed, Balances::new(42, 50000));
        assert_eq!(
            top_up(Balances::new(42, 0), "", "0012", 50000),
            Err(OperationError::MissingField("bank"))
        );
    }

    #[test]
    fn test_qr_payment_debits_stable() {
        let payload = QrPayload::new("u1", 2500);
        let proposal = qr_payment(Balances::new(10000, 0), &payload).unwrap();

        assert_eq!(proposal.proposed, Balances::new(7500, 0));
        assert_eq!(proposal.details.kind(), TransactionKind::QrPaymentSent);
    }

    #[test]
    fn test_referral_bonus_credits_stable() {
        let code = ReferralCode::parse("mia-friend").unwrap();
        let proposal = referral_bonus(Balances::new(0, 0), &code, 200).unwrap();
        assert_eq!(proposal.proposed, Balances::new(200, 0));
    }

    #[test]
    fn test_referral_earned_credits_owner() {
        let proposal = referral_earned(Balances::new(50, 7), "mia-user-123", 200).unwrap();
        assert_eq!(proposal.proposed, Balances::new(250, 7));
        assert_eq!(proposal.details.kind(), TransactionKind::ReferralEarned);
        assert_eq!(proposal.details.description(), "Referral of mia-user-123");
    }

    #[test]
    fn test_biller_and_method_parsing() {
        assert_eq!(Biller::from_str("municipal-taxes"), Some(Biller::MunicipalTaxes));
        assert_eq!(Biller::from_str("rent"), None);
        assert_eq!(PaymentMethod::from_str("bank"), Some(PaymentMethod::BankTransfer));
    }
}
