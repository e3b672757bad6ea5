//! Payment Aggregate
//!
//! An order may accumulate several attempts; at most one ever reaches `Settled`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;
use crate::domain::aggregates::order::PaymentSignal;
use crate::{EcommerceError, Result};

/// All a client is told about a payment that did not go through.
pub const PAYMENT_NOT_VERIFIED: &str = "payment could not be verified";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState { Pending, Authorized, Settled, Failed }

/// Status as reported by the gateway for one transaction reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus { Pending, Authorized, Settled, Failed }

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Authorized => "AUTHORIZED", Self::Settled => "SETTLED", Self::Failed => "FAILED" }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Settled | Self::Failed) }
    pub fn is_open(&self) -> bool { !self.is_terminal() }

    /// Next state for a reported status, or `None` when the report changes nothing.
    pub fn advance(self, reported: GatewayStatus) -> Option<PaymentState> {
        match (self, reported) {
            (Self::Pending, GatewayStatus::Authorized) => Some(Self::Authorized),
            (Self::Pending | Self::Authorized, GatewayStatus::Settled) => Some(Self::Settled),
            (Self::Pending | Self::Authorized, GatewayStatus::Failed) => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn signal(&self) -> PaymentSignal {
        match self {
            Self::Pending => PaymentSignal::Initiated,
            Self::Authorized => PaymentSignal::Authorized,
            Self::Settled => PaymentSignal::Settled,
            Self::Failed => PaymentSignal::Failed,
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentState {
    type Err = EcommerceError;
    fn from_str(s: &str) -> Result<Self> {
        [Self::Pending, Self::Authorized, Self::Settled, Self::Failed]
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| EcommerceError::StorageError(format!("unknown payment state {s}")))
    }
}

impl GatewayStatus {
    /// Maps the loose vocabulary gateways use onto the four statuses we act on.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "ongoing" | "processing" | "queued" => Some(Self::Pending),
            "authorized" | "authorised" => Some(Self::Authorized),
            "settled" | "success" | "successful" | "paid" | "completed" => Some(Self::Settled),
            "failed" | "declined" | "abandoned" | "reversed" | "cancelled" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: String,
    pub amount: Decimal,
    pub state: PaymentState,
    pub transaction_id: Option<String>,
    /// Merchant-side reference handed to the gateway; the reconciliation key.
    pub gateway_ref: String,
    /// Raw gateway payload and failure detail: audit only, never serialized to clients.
    #[serde(skip)]
    pub metadata: serde_json::Value,
    #[serde(skip)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn initiate(order_id: Uuid, method: impl Into<String>, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), order_id, method: method.into(), amount, state: PaymentState::Pending,
            transaction_id: None, gateway_ref: format!("PAY-{}", Uuid::new_v4().simple()),
            metadata: serde_json::Value::Object(Default::default()), error_message: None, created_at: now, updated_at: now,
        }
    }
}

/// One applied payment transition, kept with the gateway's raw payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentAudit {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub gateway_ref: String,
    pub from_state: PaymentState,
    pub to_state: PaymentState,
    pub raw_payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
