use std::fmt;

use serde::{Deserialize, Serialize};

const PREFIX: &str = "MIA-";

/// A referral code of the form `MIA-<suffix>`, stored upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferralCode(String);

impl ReferralCode {
    pub fn parse(input: &str) -> Result<Self, InvalidReferralCode> {
        let code = input.trim().to_uppercase();
        let valid = code
            .strip_prefix(PREFIX)
            .is_some_and(|suffix| {
                !suffix.is_empty()
                    && suffix
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-')
            });
        if !valid {
            return Err(InvalidReferralCode(input.trim().to_string()));
        }
        Ok(Self(code))
    }

    /// Code owned by a user: `mia-user-123` -> `MIA-USER-123`, `ana` -> `MIA-ANA`.
    pub fn for_user(user_id: &str) -> Self {
        let normalized: String = user_id
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        if normalized.starts_with(PREFIX) {
            Self(normalized)
        } else {
            Self(format!("{}{}", PREFIX, normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidReferralCode(pub String);

impl fmt::Display for InvalidReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid referral code '{}'", self.0)
    }
}

impl std::error::Error for InvalidReferralCode {}
