use thiserror::Error;

use crate::domain::{
    format_cents, AccountError, AnalysisError, Cents, Currency, DecodeError, FlowError,
    InvalidReferralCode, LedgerError, OperationError, ParseCentsError, RateError,
};

/// Every failure a wallet operation can report. The message is what the user sees.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(
        "Insufficient {currency} balance: available {}, required {}",
        format_cents(*.available),
        format_cents(*.required)
    )]
    InsufficientFunds {
        currency: Currency,
        available: Cents,
        required: Cents,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid QR code: {0}")]
    Decode(#[from] DecodeError),

    #[error("Could not save the operation, nothing was changed: {0}")]
    RemoteWrite(#[from] anyhow::Error),

    #[error("The expense analysis was declined: {0}")]
    PolicyRejection(String),

    #[error("The expense analysis is not available right now: {0}")]
    AnalysisUnavailable(String),

    #[error("Balance of {0} changed during the operation, please try again")]
    StaleBalance(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("A referral code has already been redeemed for {0}")]
    ReferralAlreadyRedeemed(String),

    #[error("{0}")]
    InvalidTransition(#[from] FlowError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                currency,
                available,
                required,
            } => AppError::InsufficientFunds {
                currency,
                available,
                required,
            },
            LedgerError::NegativeOpening(_) => AppError::InvalidInput(err.to_string()),
            LedgerError::InconsistentHistory { .. } => {
                AppError::RemoteWrite(anyhow::anyhow!(err.to_string()))
            }
        }
    }
}

impl From<OperationError> for AppError {
    fn from(err: OperationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<InvalidReferralCode> for AppError {
    fn from(err: InvalidReferralCode) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<RateError> for AppError {
    fn from(err: RateError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<ParseCentsError> for AppError {
    fn from(err: ParseCentsError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::PolicyRejection(reason) => AppError::PolicyRejection(reason),
            AnalysisError::Unavailable(reason) => AppError::AnalysisUnavailable(reason),
        }
    }
}
