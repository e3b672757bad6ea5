//! Cart Store: per-owner line sets with dedup-by-product and guest merge.

use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use crate::domain::aggregates::Cart;
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{CartOwner, Quantity};
use crate::infrastructure::{EventBus, KeyGuard, KeyedLocks};
use crate::services::ports::CartRepository;
use crate::{EcommerceError, Result};

/// Product/variant identifiers as stored on a line. A variant id equal to its
/// product id is a display id that leaked through, not a variant.
pub fn check_line_ids(product_id: &str, variant_id: Option<&str>) -> Result<()> {
    if product_id.trim().is_empty() {
        return Err(EcommerceError::Validation("product id is required".into()));
    }
    match variant_id {
        Some(v) if v.trim().is_empty() => Err(EcommerceError::Validation("variant id must not be blank".into())),
        Some(v) if v == product_id => Err(EcommerceError::Validation(format!("variant id {v} equals its product id"))),
        _ => Ok(()),
    }
}

pub struct CartStore {
    repo: Arc<dyn CartRepository>,
    locks: KeyedLocks<CartOwner>,
    events: EventBus,
}

impl CartStore {
    pub fn new(repo: Arc<dyn CartRepository>, events: EventBus) -> Self {
        Self { repo, locks: KeyedLocks::new(), events }
    }

    /// Current cart; a merged-away guest reads as empty.
    pub async fn read(&self, owner: &CartOwner) -> Result<Cart> {
        if self.repo.is_tombstoned(owner).await? {
            return Ok(Cart::empty(owner.clone()));
        }
        let lines = self.repo.lines(owner).await?;
        Ok(Cart::from_lines(owner.clone(), lines))
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn add_line(&self, owner: &CartOwner, product_id: &str, variant_id: Option<&str>, quantity: Quantity) -> Result<Cart> {
        check_line_ids(product_id, variant_id)?;
        let _guard = self.locks.lock(owner).await;
        self.ensure_writable(owner).await?;
        let line = self.repo.upsert_line(owner, product_id, variant_id, quantity).await?;
        debug!(line_id = %line.id, quantity = line.quantity.value(), "cart line upserted");
        self.read(owner).await
    }

    /// A quantity below 1 removes the line.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn set_line_quantity(&self, owner: &CartOwner, line_id: Uuid, quantity: u32) -> Result<Cart> {
        let Some(quantity) = Quantity::new(quantity) else {
            return self.remove_line(owner, line_id).await;
        };
        let _guard = self.locks.lock(owner).await;
        self.ensure_writable(owner).await?;
        if !self.repo.set_quantity(owner, line_id, quantity).await? {
            return Err(line_not_found(line_id));
        }
        self.read(owner).await
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn remove_line(&self, owner: &CartOwner, line_id: Uuid) -> Result<Cart> {
        let _guard = self.locks.lock(owner).await;
        if !self.repo.remove_line(owner, line_id).await? {
            return Err(line_not_found(line_id));
        }
        self.read(owner).await
    }

    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<u64> {
        let _guard = self.locks.lock(owner).await;
        self.clear_held(owner).await
    }

    /// Moves a guest cart into an account cart. The tombstone and the moved
    /// lines commit together: a stale client sees an empty cart from then on,
    /// and a failed merge leaves the guest cart intact for a retry.
    #[instrument(skip(self), fields(guest = %guest, account = %account))]
    pub async fn merge_guest(&self, guest: &CartOwner, account: &CartOwner) -> Result<Cart> {
        if !guest.is_guest() {
            return Err(EcommerceError::Validation(format!("{guest} is not a guest cart")));
        }
        if account.is_guest() {
            return Err(EcommerceError::Validation(format!("{account} is not an account cart")));
        }

        let (first, second) = if guest.key() < account.key() { (guest, account) } else { (account, guest) };
        let _first = self.locks.lock(first).await;
        let _second = self.locks.lock(second).await;

        let moved = self.repo.merge_guest(guest, account).await?;
        info!(moved, "guest cart merged");

        self.events.publish_all(vec![DomainEvent::Cart(CartEvent::Merged {
            guest: guest.clone(), account: account.clone(), lines: moved,
        })]).await;
        self.read(account).await
    }

    /// Exclusive access to one owner's cart for callers outside the store (checkout).
    pub(crate) async fn lock(&self, owner: &CartOwner) -> KeyGuard<'_, CartOwner> {
        self.locks.lock(owner).await
    }

    /// Clear for a caller already holding the owner's lock.
    pub(crate) async fn clear_held(&self, owner: &CartOwner) -> Result<u64> {
        let removed = self.repo.clear(owner).await?;
        if removed > 0 {
            self.events.publish_all(vec![DomainEvent::Cart(CartEvent::Cleared { owner: owner.clone() })]).await;
        }
        Ok(removed)
    }

    async fn ensure_writable(&self, owner: &CartOwner) -> Result<()> {
        if self.repo.is_tombstoned(owner).await? {
            return Err(EcommerceError::Conflict(format!("cart {owner} has been merged into an account")));
        }
        Ok(())
    }
}

fn line_not_found(line_id: Uuid) -> EcommerceError {
    EcommerceError::NotFound(format!("Cart line {line_id}"))
}
