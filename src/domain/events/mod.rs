//! Domain events
use crate::domain::aggregates::{OrderState, PaymentState};
use crate::domain::value_objects::CartOwner;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
    Payment(PaymentEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CartEvent {
    Merged { guest: CartOwner, account: CartOwner, lines: usize },
    Cleared { owner: CartOwner },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, code: String, total: Decimal },
    StateChanged { order_id: Uuid, from: OrderState, to: OrderState },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    Initiated { payment_id: Uuid, order_id: Uuid, gateway_ref: String, amount: Decimal },
    Reconciled { payment_id: Uuid, order_id: Uuid, from: PaymentState, to: PaymentState },
    /// Money was captured for an order that had already been closed.
    RefundDue { payment_id: Uuid, order_id: Uuid, gateway_ref: String, amount: Decimal },
}

impl DomainEvent {
    /// NATS subject, e.g. `ecommerce.order.state_changed`.
    pub fn subject(&self) -> String {
        let (kind, name) = match self {
            Self::Cart(CartEvent::Merged { .. }) => ("cart", "merged"),
            Self::Cart(CartEvent::Cleared { .. }) => ("cart", "cleared"),
            Self::Order(OrderEvent::Created { .. }) => ("order", "created"),
            Self::Order(OrderEvent::StateChanged { .. }) => ("order", "state_changed"),
            Self::Payment(PaymentEvent::Initiated { .. }) => ("payment", "initiated"),
            Self::Payment(PaymentEvent::Reconciled { .. }) => ("payment", "reconciled"),
            Self::Payment(PaymentEvent::RefundDue { .. }) => ("payment", "refund_due"),
        };
        format!("ecommerce.{kind}.{name}")
    }
}
