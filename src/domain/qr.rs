use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use super::{parse_cents, Cents};

/// Payment request carried by a QR code: who gets paid and how much (USDT).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub user_id: String,
    pub amount_cents: Cents,
}

/// JSON shape inside the code: `{ "userId": string, "amount": number }`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    user_id: String,
    amount: serde_json::Number,
}

impl QrPayload {
    pub fn new(user_id: impl Into<String>, amount_cents: Cents) -> Self {
        Self {
            user_id: user_id.into(),
            amount_cents,
        }
    }

    /// Encode as base64 of the UTF-8 JSON payload.
    pub fn encode(&self) -> Result<String, DecodeError> {
        if self.user_id.trim().is_empty() {
            return Err(DecodeError::MissingUserId);
        }
        if self.amount_cents <= 0 {
            return Err(DecodeError::InvalidAmount(self.amount_cents.to_string()));
        }

        let amount = if self.amount_cents % 100 == 0 {
            serde_json::Number::from(self.amount_cents / 100)
        } else {
            serde_json::Number::from_f64(self.amount_cents as f64 / 100.0)
                .ok_or_else(|| DecodeError::InvalidAmount(self.amount_cents.to_string()))?
        };
        let wire = WirePayload {
            user_id: self.user_id.clone(),
            amount,
        };
        let json = serde_json::to_string(&wire).map_err(|e| DecodeError::Json(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a scanned code. Any malformation is a [`DecodeError`].
    pub fn decode(encoded: &str) -> Result<Self, DecodeError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| DecodeError::Base64)?;
        let json = String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)?;
        let wire: WirePayload =
            serde_json::from_str(&json).map_err(|e| DecodeError::Json(e.to_string()))?;

        let user_id = wire.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(DecodeError::MissingUserId);
        }

        let raw_amount = wire.amount.to_string();
        let amount_cents =
            parse_cents(&raw_amount).map_err(|_| DecodeError::InvalidAmount(raw_amount.clone()))?;
        if amount_cents <= 0 {
            return Err(DecodeError::InvalidAmount(raw_amount));
        }

        Ok(Self {
            user_id,
            amount_cents,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Base64,
    Utf8,
    Json(String),
    MissingUserId,
    InvalidAmount(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Base64 => write!(f, "QR code is not valid base64"),
            DecodeError::Utf8 => write!(f, "QR code is not valid UTF-8"),
            DecodeError::Json(err) => write!(f, "QR code payload is not valid JSON: {}", err),
            DecodeError::MissingUserId => write!(f, "QR code has no recipient"),
            DecodeError::InvalidAmount(raw) => write!(f, "QR code has an invalid amount: {}", raw),
        }
    }
}

impl std::error::Error for DecodeError {}
