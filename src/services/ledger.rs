//! Order Ledger: persists priced orders and owns every order state transition.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{Address, NewOrder, Order, OrderLine, OrderState, Payment, PaymentAudit, PaymentSignal, PaymentState};
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::infrastructure::{EventBus, KeyGuard, KeyedLocks};
use crate::services::checkout::OrderDraft;
use crate::services::ports::{OrderRepository, OrderWrite, ReconciliationWrite};
use crate::{EcommerceError, Result};

const CODE_ATTEMPTS: u32 = 5;

fn order_code() -> String {
    format!("ORD-{:08}", rand::thread_rng().gen_range(0..100_000_000u32))
}

/// An order together with everything frozen alongside it.
#[derive(Clone, Debug, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<Payment>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
}

/// Gateway-side facts applied to one payment.
#[derive(Clone, Debug)]
pub(crate) struct PaymentOutcome {
    pub next: PaymentState,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
    pub raw_payload: serde_json::Value,
}

pub struct OrderLedger {
    repo: Arc<dyn OrderRepository>,
    locks: KeyedLocks<Uuid>,
    events: EventBus,
}

impl OrderLedger {
    pub fn new(repo: Arc<dyn OrderRepository>, events: EventBus) -> Self {
        Self { repo, locks: KeyedLocks::new(), events }
    }

    /// Writes order, lines, addresses and coupon redemption in one atomic write.
    /// A colliding order code is retried with a fresh one.
    #[instrument(skip_all, fields(customer = %draft.customer, total = %draft.totals.total))]
    pub async fn create_order(&self, draft: OrderDraft) -> Result<OrderDetails> {
        let shipping_address_id = Uuid::new_v4();
        let billing_address_id = if draft.billing_address == draft.shipping_address { shipping_address_id } else { Uuid::new_v4() };
        let mut addresses = vec![(shipping_address_id, draft.shipping_address.clone())];
        if billing_address_id != shipping_address_id {
            addresses.push((billing_address_id, draft.billing_address.clone()));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut order = Order::place(NewOrder {
                code: order_code(),
                customer: draft.customer.clone(),
                contact_email: draft.contact_email.clone(),
                totals: draft.totals.clone(),
                coupon_code: draft.coupon_code.clone(),
                shipping_address_id,
                billing_address_id,
                shipping_method: draft.shipping_method,
            });
            let lines: Vec<OrderLine> = draft.lines.iter().map(|l| OrderLine {
                id: Uuid::new_v4(),
                order_id: order.id(),
                product_id: l.product_id.clone(),
                variant_id: l.variant_id.clone(),
                quantity: l.quantity,
                line_price_at_purchase: l.unit_price,
                line_total: l.line_total,
            }).collect();

            let events = order.take_events();
            let write = OrderWrite {
                order: order.clone(),
                lines: lines.clone(),
                addresses: addresses.clone(),
                redeem_coupon: draft.coupon_code.clone(),
            };
            match self.repo.insert_order(write).await {
                Ok(()) => {
                    info!(order = %order.code(), "order created");
                    self.events.publish_all(events).await;
                    return Ok(OrderDetails {
                        order,
                        lines,
                        payments: vec![],
                        shipping_address: Some(draft.shipping_address),
                        billing_address: Some(draft.billing_address),
                    });
                }
                Err(EcommerceError::Conflict(reason)) if attempt < CODE_ATTEMPTS => {
                    debug!(attempt, %reason, "order code collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn order(&self, id: Uuid) -> Result<Order> {
        self.repo.order(id).await?.ok_or_else(|| EcommerceError::NotFound(format!("Order {id}")))
    }

    pub async fn details(&self, id: Uuid) -> Result<OrderDetails> {
        let order = self.order(id).await?;
        let lines = self.repo.order_lines(id).await?;
        let payments = self.repo.payments_for_order(id).await?;
        let shipping_address = self.repo.address(order.shipping_address_id()).await?;
        let billing_address = self.repo.address(order.billing_address_id()).await?;
        Ok(OrderDetails { order, lines, payments, shipping_address, billing_address })
    }

    pub async fn audits(&self, payment_id: Uuid) -> Result<Vec<PaymentAudit>> {
        self.repo.audits_for_payment(payment_id).await
    }

    /// Moves the order along one edge of the state graph.
    #[instrument(skip(self))]
    pub async fn transition(&self, id: Uuid, to: OrderState) -> Result<Order> {
        let _guard = self.locks.lock(&id).await;
        let mut order = self.order(id).await?;
        let from = order.state();
        if let Err(e) = order.transition_to(to) {
            error!(order = %order.code(), %from, %to, "illegal order transition requested");
            return Err(e);
        }
        if !self.repo.update_order_state(id, from, to).await? {
            return Err(EcommerceError::Conflict(format!("order {id} changed concurrently")));
        }
        info!(order = %order.code(), %from, %to, "order state changed");
        self.events.publish_all(order.take_events()).await;
        Ok(order)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Order> { self.transition(id, OrderState::Cancelled).await }
    pub async fn mark_shipped(&self, id: Uuid) -> Result<Order> { self.transition(id, OrderState::Shipped).await }
    pub async fn mark_delivered(&self, id: Uuid) -> Result<Order> { self.transition(id, OrderState::Delivered).await }

    /// Opens a payment attempt for the full order total and moves the order to `PAYMENT_PENDING`.
    #[instrument(skip(self))]
    pub async fn begin_payment(&self, order_id: Uuid, method: &str) -> Result<Payment> {
        let _guard = self.locks.lock(&order_id).await;
        let mut order = self.order(order_id).await?;
        let existing = self.repo.payments_for_order(order_id).await?;
        if existing.iter().any(|p| p.state == PaymentState::Settled) {
            return Err(EcommerceError::Conflict(format!("order {} is already paid", order.code())));
        }
        if let Some(open) = existing.iter().find(|p| p.state.is_open()) {
            return Err(EcommerceError::Conflict(format!("payment {} is still open for order {}", open.gateway_ref, order.code())));
        }

        let from = order.state();
        let to = order.apply_payment(PaymentSignal::Initiated)?;
        let payment = Payment::initiate(order_id, method, order.total());
        if !self.repo.insert_payment(&payment, from, to).await? {
            return Err(EcommerceError::Conflict(format!("order {order_id} changed concurrently")));
        }
        info!(order = %order.code(), gateway_ref = %payment.gateway_ref, "payment initiated");

        let mut events = order.take_events();
        events.push(DomainEvent::Payment(PaymentEvent::Initiated {
            payment_id: payment.id, order_id, gateway_ref: payment.gateway_ref.clone(), amount: payment.amount,
        }));
        self.events.publish_all(events).await;
        Ok(payment)
    }

    /// Sum of order totals that count as revenue, optionally for one currency.
    pub async fn revenue(&self, currency: Option<&str>) -> Result<Decimal> {
        let states: Vec<OrderState> = OrderState::ALL.into_iter().filter(OrderState::counts_as_revenue).collect();
        let orders = self.repo.orders_in_states(&states).await?;
        Ok(orders
            .iter()
            .filter(|o| currency.map_or(true, |c| o.totals().currency == c))
            .map(Order::total)
            .sum())
    }

    pub(crate) async fn lock_order(&self, id: Uuid) -> KeyGuard<'_, Uuid> {
        self.locks.lock(&id).await
    }

    /// Applies a payment transition and the order transition it implies, with
    /// one audit record, as a single write. Caller holds the order lock.
    ///
    /// An order that is already closed (cancelled by an expiry sweep, say)
    /// keeps its state; the payment and audit are still recorded, and a
    /// settlement on it raises `RefundDue`.
    pub(crate) async fn apply_payment_outcome(&self, payment: &Payment, outcome: PaymentOutcome) -> Result<(Payment, Order)> {
        let mut order = self.order(payment.order_id).await?;
        let from_order = order.state();
        let closed = from_order.is_terminal();
        if closed {
            warn!(order = %order.code(), state = %from_order, gateway_ref = %payment.gateway_ref, payment = %outcome.next, "payment report for a closed order");
        } else if let Err(e) = order.apply_payment(outcome.next.signal()) {
            error!(order = %order.code(), gateway_ref = %payment.gateway_ref, payment = %outcome.next, "payment outcome not applicable to order");
            return Err(e);
        }

        let now = Utc::now();
        let mut updated = payment.clone();
        updated.state = outcome.next;
        updated.transaction_id = outcome.transaction_id.or_else(|| payment.transaction_id.clone());
        updated.error_message = outcome.error_message;
        updated.metadata = outcome.raw_payload.clone();
        updated.updated_at = now;

        let audit = PaymentAudit {
            id: Uuid::new_v4(),
            payment_id: payment.id,
            order_id: payment.order_id,
            gateway_ref: payment.gateway_ref.clone(),
            from_state: payment.state,
            to_state: outcome.next,
            raw_payload: outcome.raw_payload,
            recorded_at: now,
        };
        let write = ReconciliationWrite {
            payment: updated.clone(),
            expected_payment_state: payment.state,
            order_id: payment.order_id,
            expected_order_state: from_order,
            order_state: order.state(),
            audit,
        };
        if !self.repo.apply_reconciliation(write).await? {
            return Err(EcommerceError::Conflict(format!("payment {} changed concurrently", payment.gateway_ref)));
        }
        info!(order = %order.code(), gateway_ref = %payment.gateway_ref, from = %payment.state, to = %outcome.next, "payment reconciled");

        let mut events = order.take_events();
        events.push(DomainEvent::Payment(PaymentEvent::Reconciled {
            payment_id: payment.id, order_id: payment.order_id, from: payment.state, to: outcome.next,
        }));
        if closed && outcome.next == PaymentState::Settled {
            warn!(order = %order.code(), gateway_ref = %payment.gateway_ref, amount = %payment.amount, "settled payment on a closed order, refund due");
            events.push(DomainEvent::Payment(PaymentEvent::RefundDue {
                payment_id: payment.id, order_id: payment.order_id, gateway_ref: payment.gateway_ref.clone(), amount: payment.amount,
            }));
        }
        self.events.publish_all(events).await;
        Ok((updated, order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderTotals, ShippingMethod};
    use crate::domain::value_objects::CartOwner;
    use crate::infrastructure::MemoryStore;
    use crate::services::checkout::PricedLine;
    use rust_decimal_macros::dec;

    fn ledger() -> OrderLedger {
        OrderLedger::new(Arc::new(MemoryStore::new()), EventBus::disabled())
    }

    fn draft(total: Decimal) -> OrderDraft {
        let address = Address { name: "A".into(), street1: "S".into(), city: "C".into(), region: "R".into(), country: "KE".into(), ..Default::default() };
        OrderDraft {
            customer: CartOwner::guest("g").unwrap(),
            contact_email: Some("a@b.co".into()),
            lines: vec![PricedLine {
                cart_line_id: Uuid::new_v4(), product_id: "X".into(), variant_id: None, quantity: 1, unit_price: total, line_total: total,
            }],
            totals: OrderTotals { sub_total: total, shipping: dec!(0), tax: dec!(0), discount: dec!(0), total, currency: "KES".into() },
            shipping_method: ShippingMethod::Standard,
            fallback_shipping: false,
            coupon_code: None,
            shipping_address: address.clone(),
            billing_address: address,
        }
    }

    #[test]
    fn test_order_code_format() {
        let code = order_code();
        assert_eq!(code.len(), 12);
        assert!(code.starts_with("ORD-"));
        assert!(code[4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_create_order_shares_identical_addresses() {
        let ledger = ledger();
        let placed = ledger.create_order(draft(dec!(100))).await.unwrap();
        assert_eq!(placed.order.shipping_address_id(), placed.order.billing_address_id());
        let details = ledger.details(placed.order.id()).await.unwrap();
        assert_eq!(details.lines.len(), 1);
        assert!(details.shipping_address.is_some());
    }

    #[tokio::test]
    async fn test_happy_path_and_illegal_transition() {
        let ledger = ledger();
        let id = ledger.create_order(draft(dec!(100))).await.unwrap().order.id();
        let payment = ledger.begin_payment(id, "card").await.unwrap();
        assert_eq!(payment.amount, dec!(100));
        assert_eq!(ledger.order(id).await.unwrap().state(), OrderState::PaymentPending);

        let _guard = ledger.lock_order(id).await;
        let outcome = PaymentOutcome { next: PaymentState::Settled, transaction_id: None, error_message: None, raw_payload: serde_json::json!({}) };
        ledger.apply_payment_outcome(&payment, outcome).await.unwrap();
        drop(_guard);

        ledger.mark_shipped(id).await.unwrap();
        ledger.mark_delivered(id).await.unwrap();
        let err = ledger.transition(id, OrderState::PaymentPending).await.unwrap_err();
        assert!(matches!(err, EcommerceError::IllegalStateTransition { from: OrderState::Delivered, to: OrderState::PaymentPending }));
        assert_eq!(ledger.order(id).await.unwrap().state(), OrderState::Delivered);
        assert_eq!(ledger.revenue(Some("KES")).await.unwrap(), dec!(100));
        assert!(ledger.revenue(Some("USD")).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_begin_payment_refuses_open_attempt_and_cancelled_order() {
        let ledger = ledger();
        let id = ledger.create_order(draft(dec!(50))).await.unwrap().order.id();
        ledger.begin_payment(id, "card").await.unwrap();
        assert!(matches!(ledger.begin_payment(id, "card").await, Err(EcommerceError::Conflict(_))));

        let other = ledger.create_order(draft(dec!(50))).await.unwrap().order.id();
        ledger.cancel(other).await.unwrap();
        assert!(matches!(ledger.begin_payment(other, "card").await, Err(EcommerceError::IllegalStateTransition { .. })));
        assert!(matches!(ledger.cancel(other).await, Err(EcommerceError::IllegalStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_pipeline_is_not_revenue() {
        let ledger = ledger();
        let id = ledger.create_order(draft(dec!(70))).await.unwrap().order.id();
        ledger.begin_payment(id, "mpesa").await.unwrap();
        assert!(ledger.revenue(None).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_unknown_order() {
        assert!(matches!(ledger().order(Uuid::new_v4()).await, Err(EcommerceError::NotFound(_))));
    }
}
