//! HTTP client for the payment gateway's transaction-verification endpoint.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{instrument, warn};
use crate::domain::aggregates::GatewayStatus;
use crate::services::ports::{GatewayVerification, PaymentGateway};
use crate::{EcommerceError, Result};

#[derive(Debug, Deserialize)]
struct TransactionBody {
    status: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default, alias = "id")]
    transaction_id: Option<String>,
}

/// Reads `{status, amount?, transaction_id?}`; anything unreadable is treated as the gateway being unavailable.
fn interpret(raw: serde_json::Value) -> Result<GatewayVerification> {
    let body: TransactionBody = serde_json::from_value(raw.clone())
        .map_err(|e| EcommerceError::GatewayUnavailable(format!("unreadable gateway response: {e}")))?;
    let status = GatewayStatus::parse_loose(&body.status)
        .ok_or_else(|| EcommerceError::GatewayUnavailable(format!("unknown gateway status {}", body.status)))?;
    Ok(GatewayVerification { status, amount: body.amount, transaction_id: body.transaction_id, raw })
}

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[instrument(skip(self))]
    async fn verify(&self, gateway_ref: &str) -> Result<GatewayVerification> {
        let url = format!("{}/transactions/{}", self.base_url, gateway_ref);
        let unavailable = |e: reqwest::Error| {
            warn!(error = %e, "gateway request failed");
            EcommerceError::GatewayUnavailable(e.to_string())
        };
        let response = self.client.get(&url).send().await.map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "gateway refused verification");
            return Err(EcommerceError::GatewayUnavailable(format!("gateway answered {status}")));
        }
        let raw: serde_json::Value = response.json().await.map_err(unavailable)?;
        interpret(raw)
    }
}

/// Stand-in used when no gateway URL is configured: every verification is retryable-unavailable.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn verify(&self, _gateway_ref: &str) -> Result<GatewayVerification> {
        Err(EcommerceError::GatewayUnavailable("no payment gateway configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_interpret_success() {
        let v = interpret(json!({"status": "success", "amount": "1430.00", "id": "T-9"})).unwrap();
        assert_eq!(v.status, GatewayStatus::Settled);
        assert_eq!(v.amount, Some(dec!(1430)));
        assert_eq!(v.transaction_id.as_deref(), Some("T-9"));
        assert_eq!(v.raw["id"], "T-9");
    }

    #[test]
    fn test_interpret_rejects_unknown_status() {
        assert!(matches!(interpret(json!({"status": "mystery"})), Err(EcommerceError::GatewayUnavailable(_))));
        assert!(matches!(interpret(json!({"amount": 1})), Err(EcommerceError::GatewayUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_is_retryable() {
        let err = UnconfiguredGateway.verify("PAY-1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
