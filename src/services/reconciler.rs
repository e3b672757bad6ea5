//! Payment Reconciler: applies gateway-reported status to payments and orders.
//!
//! Deliveries may repeat or race (webhook plus client poll). Every delivery is
//! serialized per order, the terminal-state check runs under that lock, and the
//! final write is guarded by the states it was decided from, so the same
//! report never produces two transitions.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{GatewayStatus, OrderState, Payment, PaymentState, PAYMENT_NOT_VERIFIED};
use crate::services::ledger::{OrderLedger, PaymentOutcome};
use crate::services::ports::{OrderRepository, PaymentGateway};
use crate::{EcommerceError, Result};

const AMOUNT_MISMATCH: &str = "amount mismatch";

/// One status report for a gateway reference, from a webhook or a verify-now call.
#[derive(Clone, Debug)]
pub struct VerificationEvent {
    pub gateway_ref: String,
    pub order_id: Uuid,
    pub reported_status: GatewayStatus,
    pub reported_amount: Option<Decimal>,
    pub transaction_id: Option<String>,
    pub raw_payload: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The payment (and order) moved.
    Applied,
    /// The payment was already terminal; nothing changed.
    Duplicate,
    /// The report did not advance the payment.
    Unchanged,
    /// The payment settled but its order was already closed; the order is
    /// untouched and the amount has to go back to the customer.
    RefundDue,
}

/// What the caller of a verification is told. Gateway detail stays in the
/// audit trail; a failed payment only carries the generic message.
#[derive(Clone, Debug, Serialize)]
pub struct ReconcileOutcome {
    pub disposition: Disposition,
    pub payment: Payment,
    pub order_state: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl ReconcileOutcome {
    fn new(disposition: Disposition, payment: Payment, order_state: OrderState) -> Self {
        let message = (payment.state == PaymentState::Failed).then_some(PAYMENT_NOT_VERIFIED);
        Self { disposition, payment, order_state, message }
    }
}

pub struct PaymentReconciler {
    repo: Arc<dyn OrderRepository>,
    ledger: Arc<OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl PaymentReconciler {
    pub fn new(repo: Arc<dyn OrderRepository>, ledger: Arc<OrderLedger>, gateway: Arc<dyn PaymentGateway>, gateway_timeout: Duration) -> Self {
        Self { repo, ledger, gateway, gateway_timeout }
    }

    #[instrument(skip(self, event), fields(gateway_ref = %event.gateway_ref, status = ?event.reported_status))]
    pub async fn reconcile(&self, event: VerificationEvent) -> Result<ReconcileOutcome> {
        self.payment_for(&event.gateway_ref, event.order_id).await?;
        let _guard = self.ledger.lock_order(event.order_id).await;
        let payment = self.payment_for(&event.gateway_ref, event.order_id).await?;

        if payment.state.is_terminal() {
            info!(state = %payment.state, "duplicate payment delivery acknowledged");
            return self.outcome(Disposition::Duplicate, payment).await;
        }

        let mismatch = matches!(event.reported_status, GatewayStatus::Authorized | GatewayStatus::Settled)
            && event.reported_amount.is_some_and(|amount| amount != payment.amount);
        let (next, error_message) = if mismatch {
            warn!(expected = %payment.amount, reported = ?event.reported_amount, "gateway amount does not match payment");
            (PaymentState::Failed, Some(AMOUNT_MISMATCH.to_string()))
        } else {
            match payment.state.advance(event.reported_status) {
                Some(PaymentState::Failed) => (PaymentState::Failed, Some(format!("gateway reported {:?}", event.reported_status))),
                Some(next) => (next, None),
                None => return self.outcome(Disposition::Unchanged, payment).await,
            }
        };

        let outcome = PaymentOutcome { next, transaction_id: event.transaction_id, error_message, raw_payload: event.raw_payload };
        let (payment, order) = self.ledger.apply_payment_outcome(&payment, outcome).await?;
        let disposition = if order.state().is_terminal() && payment.state == PaymentState::Settled {
            Disposition::RefundDue
        } else {
            Disposition::Applied
        };
        Ok(ReconcileOutcome::new(disposition, payment, order.state()))
    }

    /// Asks the gateway for the current status and reconciles it. A gateway
    /// that cannot be reached or answers too slowly leaves everything as it was.
    #[instrument(skip(self))]
    pub async fn verify_now(&self, order_id: Uuid, gateway_ref: &str) -> Result<ReconcileOutcome> {
        let payment = self.payment_for(gateway_ref, order_id).await?;
        if payment.state.is_terminal() {
            return self.outcome(Disposition::Duplicate, payment).await;
        }

        let verification = match tokio::time::timeout(self.gateway_timeout, self.gateway.verify(gateway_ref)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?self.gateway_timeout, "gateway verification timed out");
                return Err(EcommerceError::GatewayUnavailable(format!("no answer within {:?}", self.gateway_timeout)));
            }
        };
        self.reconcile(VerificationEvent {
            gateway_ref: gateway_ref.to_string(),
            order_id,
            reported_status: verification.status,
            reported_amount: verification.amount,
            transaction_id: verification.transaction_id,
            raw_payload: verification.raw,
        }).await
    }

    async fn payment_for(&self, gateway_ref: &str, order_id: Uuid) -> Result<Payment> {
        let payment = self.repo.payment_by_ref(gateway_ref).await?
            .ok_or_else(|| EcommerceError::NotFound(format!("Payment {gateway_ref}")))?;
        if payment.order_id != order_id {
            return Err(EcommerceError::Validation(format!("payment {gateway_ref} does not belong to order {order_id}")));
        }
        Ok(payment)
    }

    async fn outcome(&self, disposition: Disposition, payment: Payment) -> Result<ReconcileOutcome> {
        let order_state = self.ledger.order(payment.order_id).await?.state();
        Ok(ReconcileOutcome::new(disposition, payment, order_state))
    }
}
