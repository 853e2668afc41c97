use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Balances, ReferralCode};

pub type UserId = String;

const MAX_USER_ID_LEN: usize = 64;

/// A wallet owner's account: opening balances plus the current ones.
/// The current balances only change through the transaction processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub opening: Balances,
    pub balances: Balances,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: &str, opening: Balances) -> Result<Self, AccountError> {
        let user_id = validate_user_id(user_id)?;
        if !opening.is_non_negative() {
            return Err(AccountError::NegativeOpening(opening));
        }
        Ok(Self {
            user_id,
            opening,
            balances: opening,
            created_at: Utc::now(),
        })
    }

    /// The code other users redeem to credit this account's referral.
    pub fn referral_code(&self) -> ReferralCode {
        ReferralCode::for_user(&self.user_id)
    }
}

pub fn validate_user_id(user_id: &str) -> Result<UserId, AccountError> {
    let user_id = user_id.trim();
    let valid = !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if !valid {
        return Err(AccountError::InvalidUserId(user_id.to_string()));
    }
    Ok(user_id.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    InvalidUserId(String),
    NegativeOpening(Balances),
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountError::InvalidUserId(id) => write!(f, "Invalid user id '{}'", id),
            AccountError::NegativeOpening(balances) => {
                write!(f, "Opening balances cannot be negative: {}", balances)
            }
        }
    }
}

impl std::error::Error for AccountError {}
