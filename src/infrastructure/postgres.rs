//! PostgreSQL implementations of the storage ports (schema in `migrations/`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPool, FromRow, Postgres, Transaction};
use uuid::Uuid;
use crate::domain::aggregates::{
    Address, CartLine, CatalogEntry, Coupon, CouponKind, CouponRejection, Order, OrderLine, OrderState, OrderTotals,
    Payment, PaymentAudit, ShippingCity, ShippingZone,
};
use crate::domain::value_objects::{CartOwner, CouponCode, Quantity};
use crate::services::ports::{
    CartRepository, CatalogLookup, CouponStore, OrderRepository, OrderWrite, ReconciliationWrite, ZoneSource,
};
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> EcommerceError {
    EcommerceError::StorageError(format!("invalid {what} in storage: {value}"))
}

fn to_i32(n: u32, what: &str) -> Result<i32> { i32::try_from(n).map_err(|_| corrupt(what, n)) }
fn to_u32(n: i32, what: &str) -> Result<u32> { u32::try_from(n).map_err(|_| corrupt(what, n)) }

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct CartLineRow {
    id: Uuid,
    owner_key: String,
    product_id: String,
    variant_id: Option<String>,
    quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CartLineRow {
    fn into_line(self) -> Result<CartLine> {
        let owner = self.owner_key.parse::<CartOwner>().map_err(|_| corrupt("cart owner", &self.owner_key))?;
        let quantity = Quantity::new(to_u32(self.quantity, "quantity")?).ok_or_else(|| corrupt("quantity", self.quantity))?;
        Ok(CartLine { id: self.id, owner, product_id: self.product_id, variant_id: self.variant_id, quantity, created_at: self.created_at, updated_at: self.updated_at })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    code: String,
    customer_id: String,
    contact_email: Option<String>,
    state: String,
    sub_total: Decimal,
    shipping: Decimal,
    tax: Decimal,
    discount: Decimal,
    total: Decimal,
    currency: String,
    coupon_code: Option<String>,
    shipping_address_id: Uuid,
    billing_address_id: Uuid,
    shipping_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        Ok(Order {
            id: self.id, code: self.code, customer_id: self.customer_id, contact_email: self.contact_email,
            state: self.state.parse()?,
            totals: OrderTotals { sub_total: self.sub_total, shipping: self.shipping, tax: self.tax, discount: self.discount, total: self.total, currency: self.currency },
            coupon_code: self.coupon_code.map(CouponCode::new).transpose().map_err(|e| corrupt("coupon code", e))?,
            shipping_address_id: self.shipping_address_id, billing_address_id: self.billing_address_id,
            shipping_method: self.shipping_method.parse().map_err(|_| corrupt("shipping method", &self.shipping_method))?,
            created_at: self.created_at, updated_at: self.updated_at, events: vec![],
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderLineRow {
    id: Uuid,
    order_id: Uuid,
    product_id: String,
    variant_id: Option<String>,
    quantity: i32,
    line_price_at_purchase: Decimal,
    line_total: Decimal,
}

#[derive(Debug, FromRow)]
struct AddressRow {
    name: String,
    street1: String,
    street2: Option<String>,
    city: String,
    region: String,
    zip: Option<String>,
    country: String,
    phone: Option<String>,
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    method: String,
    amount: Decimal,
    state: String,
    transaction_id: Option<String>,
    gateway_ref: String,
    metadata: serde_json::Value,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment> {
        Ok(Payment {
            id: self.id, order_id: self.order_id, method: self.method, amount: self.amount, state: self.state.parse()?,
            transaction_id: self.transaction_id, gateway_ref: self.gateway_ref, metadata: self.metadata,
            error_message: self.error_message, created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    payment_id: Uuid,
    order_id: Uuid,
    gateway_ref: String,
    from_state: String,
    to_state: String,
    raw_payload: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CouponRow {
    code: String,
    kind: String,
    value: Decimal,
    min_order_value: Decimal,
    enabled: bool,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    used_count: i32,
}

impl CouponRow {
    fn into_coupon(self) -> Result<Coupon> {
        let kind = match self.kind.as_str() {
            "percentage" => CouponKind::Percentage,
            "fixed" => CouponKind::Fixed,
            other => return Err(corrupt("coupon kind", other)),
        };
        Ok(Coupon {
            code: CouponCode::new(self.code).map_err(|e| corrupt("coupon code", e))?,
            kind, value: self.value, min_order_value: self.min_order_value, enabled: self.enabled,
            start_date: self.start_date, end_date: self.end_date,
            usage_limit: self.usage_limit.map(|l| to_u32(l, "usage limit")).transpose()?,
            used_count: to_u32(self.used_count, "used count")?,
        })
    }
}

#[derive(Debug, FromRow)]
struct ZoneCityRow {
    region: String,
    locality: Option<String>,
    standard_price: Option<Decimal>,
    express_price: Option<Decimal>,
}

const CART_COLUMNS: &str = "id, owner_key, product_id, variant_id, quantity, created_at, updated_at";
const UPSERT_CONFLICT: &str = "ON CONFLICT (owner_key, product_id, (COALESCE(variant_id, ''))) DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity, updated_at = NOW()";

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl CatalogLookup for PgStore {
    async fn resolve(&self, product_id: &str, variant_id: Option<&str>) -> Result<Option<CatalogEntry>> {
        let row: Option<(Decimal, i32, bool, String)> = match variant_id {
            None => sqlx::query_as("SELECT price, stock_on_hand, TRUE, status FROM products WHERE id = $1")
                .bind(product_id).fetch_optional(&self.pool).await?,
            Some(vid) => sqlx::query_as("SELECT v.price, v.stock_on_hand, v.enabled, p.status FROM product_variants v JOIN products p ON p.id = v.product_id WHERE v.id = $1 AND v.product_id = $2")
                .bind(vid).bind(product_id).fetch_optional(&self.pool).await?,
        };
        row.map(|(price, stock, enabled, status)| -> Result<CatalogEntry> {
            let product_enabled = status == "active";
            Ok(CatalogEntry { price, stock_on_hand: to_u32(stock, "stock")?, enabled: if variant_id.is_some() { enabled } else { product_enabled }, product_enabled })
        }).transpose()
    }
}

// =============================================================================
// Carts
// =============================================================================

#[async_trait]
impl CartRepository for PgStore {
    async fn lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartLineRow>(&format!("SELECT {CART_COLUMNS} FROM cart_lines WHERE owner_key = $1 ORDER BY created_at"))
            .bind(owner.key()).fetch_all(&self.pool).await?;
        rows.into_iter().map(CartLineRow::into_line).collect()
    }

    async fn upsert_line(&self, owner: &CartOwner, product_id: &str, variant_id: Option<&str>, quantity: Quantity) -> Result<CartLine> {
        let sql = format!("INSERT INTO cart_lines ({CART_COLUMNS}) VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) {UPSERT_CONFLICT} RETURNING {CART_COLUMNS}");
        sqlx::query_as::<_, CartLineRow>(&sql)
            .bind(Uuid::new_v4()).bind(owner.key()).bind(product_id).bind(variant_id).bind(to_i32(quantity.value(), "quantity")?)
            .fetch_one(&self.pool).await?.into_line()
    }

    async fn set_quantity(&self, owner: &CartOwner, line_id: Uuid, quantity: Quantity) -> Result<bool> {
        let res = sqlx::query("UPDATE cart_lines SET quantity = $3, updated_at = NOW() WHERE id = $1 AND owner_key = $2")
            .bind(line_id).bind(owner.key()).bind(to_i32(quantity.value(), "quantity")?).execute(&self.pool).await?;
        Ok(res.rows_affected() == 1)
    }

    async fn remove_line(&self, owner: &CartOwner, line_id: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND owner_key = $2").bind(line_id).bind(owner.key()).execute(&self.pool).await?;
        Ok(res.rows_affected() == 1)
    }

    async fn clear(&self, owner: &CartOwner) -> Result<u64> {
        Ok(sqlx::query("DELETE FROM cart_lines WHERE owner_key = $1").bind(owner.key()).execute(&self.pool).await?.rows_affected())
    }

    async fn is_tombstoned(&self, owner: &CartOwner) -> Result<bool> {
        let found: Option<(String,)> = sqlx::query_as("SELECT owner_key FROM cart_tombstones WHERE owner_key = $1").bind(owner.key()).fetch_optional(&self.pool).await?;
        Ok(found.is_some())
    }

    async fn merge_guest(&self, guest: &CartOwner, account: &CartOwner) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let marked = sqlx::query("INSERT INTO cart_tombstones (owner_key, merged_into, created_at) VALUES ($1, $2, NOW()) ON CONFLICT (owner_key) DO NOTHING")
            .bind(guest.key()).bind(account.key()).execute(&mut *tx).await?.rows_affected();
        if marked != 1 {
            return Err(EcommerceError::Conflict(format!("{guest} has already been merged")));
        }
        let sql = format!(
            "INSERT INTO cart_lines ({CART_COLUMNS}) SELECT gen_random_uuid(), $2, product_id, variant_id, quantity, NOW(), NOW() FROM cart_lines WHERE owner_key = $1 {UPSERT_CONFLICT}"
        );
        sqlx::query(&sql).bind(guest.key()).bind(account.key()).execute(&mut *tx).await?;
        let moved = sqlx::query("DELETE FROM cart_lines WHERE owner_key = $1").bind(guest.key()).execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;
        usize::try_from(moved).map_err(|_| corrupt("merged line count", moved))
    }
}

// =============================================================================
// Orders & payments
// =============================================================================

const ORDER_COLUMNS: &str = "id, code, customer_id, contact_email, state, sub_total, shipping, tax, discount, total, currency, coupon_code, shipping_address_id, billing_address_id, shipping_method, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, order_id, method, amount, state, transaction_id, gateway_ref, metadata, error_message, created_at, updated_at";

async fn redeem_coupon(tx: &mut Transaction<'_, Postgres>, code: &CouponCode) -> Result<()> {
    let redeemed = sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE code = $1 AND enabled AND (usage_limit IS NULL OR used_count < usage_limit)")
        .bind(code.as_str()).execute(&mut **tx).await?.rows_affected();
    if redeemed == 1 { return Ok(()); }
    let enabled: Option<(bool,)> = sqlx::query_as("SELECT enabled FROM coupons WHERE code = $1").bind(code.as_str()).fetch_optional(&mut **tx).await?;
    let reason = match enabled {
        None => CouponRejection::UnknownCode,
        Some((false,)) => CouponRejection::Disabled,
        Some((true,)) => CouponRejection::LimitReached,
    };
    Err(EcommerceError::CouponRejected(reason))
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, write: OrderWrite) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if let Some(code) = &write.redeem_coupon {
            redeem_coupon(&mut tx, code).await?;
        }
        for (id, a) in &write.addresses {
            sqlx::query("INSERT INTO addresses (id, name, street1, street2, city, region, zip, country, phone) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
                .bind(id).bind(&a.name).bind(&a.street1).bind(&a.street2).bind(&a.city).bind(&a.region).bind(&a.zip).bind(&a.country).bind(&a.phone)
                .execute(&mut *tx).await?;
        }
        let o = &write.order;
        let t = &o.totals;
        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"))
            .bind(o.id).bind(&o.code).bind(&o.customer_id).bind(&o.contact_email).bind(o.state.as_str())
            .bind(t.sub_total).bind(t.shipping).bind(t.tax).bind(t.discount).bind(t.total).bind(&t.currency)
            .bind(o.coupon_code.as_ref().map(CouponCode::as_str)).bind(o.shipping_address_id).bind(o.billing_address_id)
            .bind(o.shipping_method.as_str()).bind(o.created_at).bind(o.updated_at)
            .execute(&mut *tx).await?;
        for line in &write.lines {
            sqlx::query("INSERT INTO order_lines (id, order_id, product_id, variant_id, quantity, line_price_at_purchase, line_total) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(line.id).bind(line.order_id).bind(&line.product_id).bind(&line.variant_id).bind(to_i32(line.quantity, "quantity")?)
                .bind(line.line_price_at_purchase).bind(line.line_total)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?.map(OrderRow::into_order).transpose()
    }

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query_as::<_, OrderLineRow>("SELECT id, order_id, product_id, variant_id, quantity, line_price_at_purchase, line_total FROM order_lines WHERE order_id = $1")
            .bind(order_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| -> Result<OrderLine> { Ok(OrderLine {
            id: r.id, order_id: r.order_id, product_id: r.product_id, variant_id: r.variant_id,
            quantity: to_u32(r.quantity, "quantity")?, line_price_at_purchase: r.line_price_at_purchase, line_total: r.line_total,
        }) }).collect()
    }

    async fn address(&self, id: Uuid) -> Result<Option<Address>> {
        let row = sqlx::query_as::<_, AddressRow>("SELECT name, street1, street2, city, region, zip, country, phone FROM addresses WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| Address { name: r.name, street1: r.street1, street2: r.street2, city: r.city, region: r.region, zip: r.zip, country: r.country, phone: r.phone }))
    }

    async fn orders_in_states(&self, states: &[OrderState]) -> Result<Vec<Order>> {
        let states: Vec<&str> = states.iter().map(OrderState::as_str).collect();
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE state = ANY($1) ORDER BY created_at"))
            .bind(&states).fetch_all(&self.pool).await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn update_order_state(&self, id: Uuid, from: OrderState, to: OrderState) -> Result<bool> {
        let res = sqlx::query("UPDATE orders SET state = $3, updated_at = NOW() WHERE id = $1 AND state = $2")
            .bind(id).bind(from.as_str()).bind(to.as_str()).execute(&self.pool).await?;
        Ok(res.rows_affected() == 1)
    }

    async fn insert_payment(&self, payment: &Payment, from: OrderState, to: OrderState) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let moved = sqlx::query("UPDATE orders SET state = $3, updated_at = NOW() WHERE id = $1 AND state = $2")
            .bind(payment.order_id).bind(from.as_str()).bind(to.as_str()).execute(&mut *tx).await?.rows_affected();
        if moved != 1 { return Ok(false); }
        sqlx::query(&format!("INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"))
            .bind(payment.id).bind(payment.order_id).bind(&payment.method).bind(payment.amount).bind(payment.state.as_str())
            .bind(&payment.transaction_id).bind(&payment.gateway_ref).bind(&payment.metadata).bind(&payment.error_message)
            .bind(payment.created_at).bind(payment.updated_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at"))
            .bind(order_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    async fn payment_by_ref(&self, gateway_ref: &str) -> Result<Option<Payment>> {
        sqlx::query_as::<_, PaymentRow>(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_ref = $1"))
            .bind(gateway_ref).fetch_optional(&self.pool).await?.map(PaymentRow::into_payment).transpose()
    }

    async fn apply_reconciliation(&self, write: ReconciliationWrite) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let p = &write.payment;
        let updated = sqlx::query("UPDATE payments SET state = $2, transaction_id = $3, metadata = $4, error_message = $5, updated_at = $6 WHERE id = $1 AND state = $7")
            .bind(p.id).bind(p.state.as_str()).bind(&p.transaction_id).bind(&p.metadata).bind(&p.error_message).bind(p.updated_at)
            .bind(write.expected_payment_state.as_str())
            .execute(&mut *tx).await?.rows_affected();
        if updated != 1 { return Ok(false); }
        let moved = sqlx::query("UPDATE orders SET state = $3, updated_at = NOW() WHERE id = $1 AND state = $2")
            .bind(write.order_id).bind(write.expected_order_state.as_str()).bind(write.order_state.as_str())
            .execute(&mut *tx).await?.rows_affected();
        if moved != 1 { return Ok(false); }
        let a = &write.audit;
        sqlx::query("INSERT INTO payment_audits (id, payment_id, order_id, gateway_ref, from_state, to_state, raw_payload, recorded_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(a.id).bind(a.payment_id).bind(a.order_id).bind(&a.gateway_ref).bind(a.from_state.as_str()).bind(a.to_state.as_str())
            .bind(&a.raw_payload).bind(a.recorded_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn audits_for_payment(&self, payment_id: Uuid) -> Result<Vec<PaymentAudit>> {
        let rows = sqlx::query_as::<_, AuditRow>("SELECT id, payment_id, order_id, gateway_ref, from_state, to_state, raw_payload, recorded_at FROM payment_audits WHERE payment_id = $1 ORDER BY recorded_at")
            .bind(payment_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| -> Result<PaymentAudit> { Ok(PaymentAudit {
            id: r.id, payment_id: r.payment_id, order_id: r.order_id, gateway_ref: r.gateway_ref,
            from_state: r.from_state.parse()?, to_state: r.to_state.parse()?, raw_payload: r.raw_payload, recorded_at: r.recorded_at,
        }) }).collect()
    }
}

// =============================================================================
// Reference data
// =============================================================================

#[async_trait]
impl CouponStore for PgStore {
    async fn find_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT code, kind, value, min_order_value, enabled, start_date, end_date, usage_limit, used_count FROM coupons WHERE code = $1")
            .bind(code.as_str()).fetch_optional(&self.pool).await?.map(CouponRow::into_coupon).transpose()
    }
}

#[async_trait]
impl ZoneSource for PgStore {
    async fn load_zones(&self) -> Result<Vec<ShippingZone>> {
        let rows = sqlx::query_as::<_, ZoneCityRow>(
            "SELECT z.region, c.locality, c.standard_price, c.express_price FROM shipping_zones z LEFT JOIN shipping_cities c ON c.zone_id = z.id ORDER BY z.region, c.locality",
        ).fetch_all(&self.pool).await?;
        let mut zones: Vec<ShippingZone> = vec![];
        for row in rows {
            if zones.last().map_or(true, |z| z.region != row.region) {
                zones.push(ShippingZone { region: row.region.clone(), cities: vec![] });
            }
            let (Some(locality), Some(standard_price), Some(express_price)) = (row.locality, row.standard_price, row.express_price) else { continue };
            if let Some(zone) = zones.last_mut() {
                zone.cities.push(ShippingCity { locality, standard_price, express_price });
            }
        }
        Ok(zones)
    }
}
