//! Client-session shopping cart.
//!
//! The cart has no server-side representation: it belongs to a single
//! shopper's session and is persisted through a pluggable key-value
//! capability under a fixed namespace key. It is ephemeral input to order
//! creation and is cleared once an order is placed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Fixed namespace key under which the cart blob is persisted.
pub const CART_STORAGE_KEY: &str = "vedic_origins_cart";

/// One product line in the cart. At most one item exists per `product_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub price: Decimal,
    pub qty: i32,
    /// Maintained as `price * qty` on every mutation.
    pub subtotal: Decimal,
}

/// Cart price totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CartTotals {
    /// Sum of `price * qty` over all items.
    pub subtotal: Decimal,
    /// Sum of quantities over all items.
    pub item_count: i32,
}

/// Key-value persistence capability backing a cart.
///
/// Implementations may fail silently on write (the original client storage
/// does); reads that yield garbage are treated as an empty cart.
pub trait CartStorage {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

impl<S: CartStorage + ?Sized> CartStorage for &mut S {
    fn load(&self, key: &str) -> Option<String> {
        (**self).load(key)
    }

    fn store(&mut self, key: &str, value: &str) {
        (**self).store(key, value)
    }

    fn remove(&mut self, key: &str) {
        (**self).remove(key)
    }
}

/// In-memory storage, used by tests and headless sessions.
#[derive(Debug, Default)]
pub struct InMemoryCartStorage {
    entries: HashMap<String, String>,
}

impl InMemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartStorage for InMemoryCartStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn store(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Listener invoked with the cart contents after every persisting mutation
/// (badge counters and the like).
pub type CartListener = Box<dyn Fn(&[CartItem]) + Send + Sync>;

/// Shopping cart over a pluggable storage capability.
///
/// Every mutation persists the whole cart and notifies subscribed
/// listeners. Reads tolerate a missing or corrupted blob by treating it as
/// an empty cart; they never fail.
pub struct CartStore<S: CartStorage> {
    storage: S,
    listeners: Vec<CartListener>,
}

impl<S: CartStorage> CartStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            listeners: Vec::new(),
        }
    }

    /// Registers a cart-changed listener.
    pub fn subscribe(&mut self, listener: impl Fn(&[CartItem]) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Publishes every cart change onto the event bus as a
    /// [`Event::CartChanged`](crate::events::Event::CartChanged).
    pub fn publish_changes(&mut self, sender: crate::events::EventSender) {
        self.subscribe(move |items| {
            let item_count = items.iter().map(|i| i.qty).sum();
            sender.try_send(crate::events::Event::CartChanged { item_count });
        });
    }

    /// Current cart contents. A missing or unparseable blob reads as empty.
    pub fn items(&self) -> Vec<CartItem> {
        let Some(blob) = self.storage.load(CART_STORAGE_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&blob) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "discarding corrupted cart blob");
                Vec::new()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Adds an item, or merges quantities when the product is already in the
    /// cart. Negative quantities are coerced to zero. Returns the resulting
    /// item.
    pub fn add_item(&mut self, product_id: &str, name: &str, price: Decimal, qty: i32) -> CartItem {
        let qty = qty.max(0);
        let mut items = self.items();

        let result = if let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) {
            item.qty += qty;
            item.subtotal = item.price * Decimal::from(item.qty);
            item.clone()
        } else {
            let item = CartItem {
                product_id: product_id.to_string(),
                name: name.to_string(),
                price,
                qty,
                subtotal: price * Decimal::from(qty),
            };
            items.push(item.clone());
            item
        };

        self.save(&items);
        result
    }

    /// Removes the matching item. Returns whether anything was removed.
    pub fn remove_item(&mut self, product_id: &str) -> bool {
        let mut items = self.items();
        let before = items.len();
        items.retain(|i| i.product_id != product_id);

        if items.len() == before {
            return false;
        }
        self.save(&items);
        true
    }

    /// Sets the quantity of an item; a quantity of zero or less removes it.
    /// Returns false (without persisting) when the product is absent.
    pub fn update_qty(&mut self, product_id: &str, qty: i32) -> bool {
        let mut items = self.items();
        let Some(item) = items.iter_mut().find(|i| i.product_id == product_id) else {
            return false;
        };

        if qty <= 0 {
            return self.remove_item(product_id);
        }

        item.qty = qty;
        item.subtotal = item.price * Decimal::from(qty);
        self.save(&items);
        true
    }

    /// Empties the persisted cart and notifies listeners with an empty cart.
    pub fn clear(&mut self) {
        self.storage.remove(CART_STORAGE_KEY);
        self.notify(&[]);
    }

    /// Totals over the current contents. Pure, no side effect.
    pub fn totals(&self) -> CartTotals {
        let items = self.items();
        CartTotals {
            subtotal: items.iter().map(|i| i.price * Decimal::from(i.qty)).sum(),
            item_count: items.iter().map(|i| i.qty).sum(),
        }
    }

    fn save(&mut self, items: &[CartItem]) {
        match serde_json::to_string(items) {
            Ok(blob) => self.storage.store(CART_STORAGE_KEY, &blob),
            Err(e) => warn!(error = %e, "failed to serialize cart"),
        }
        self.notify(items);
    }

    fn notify(&self, items: &[CartItem]) {
        for listener in &self.listeners {
            listener(items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn store() -> CartStore<InMemoryCartStorage> {
        CartStore::new(InMemoryCartStorage::new())
    }

    #[test]
    fn add_item_merges_quantities_for_same_product() {
        let mut cart = store();
        cart.add_item("p1", "Ghee 500ml", dec!(10), 2);
        let merged = cart.add_item("p1", "Ghee 500ml", dec!(10), 3);

        assert_eq!(merged.qty, 5);
        assert_eq!(merged.subtotal, dec!(50));
        assert_eq!(cart.items().len(), 1);
    }

    #[test]
    fn totals_track_surviving_items() {
        let mut cart = store();
        cart.add_item("p1", "Ghee", dec!(450), 2);
        cart.add_item("p2", "Honey", dec!(300), 1);
        cart.add_item("p3", "Incense", dec!(120), 3);
        cart.remove_item("p2");
        cart.update_qty("p3", 1);

        let totals = cart.totals();
        assert_eq!(totals.subtotal, dec!(1020));
        assert_eq!(totals.item_count, 3);
    }

    #[test]
    fn update_qty_zero_removes_item() {
        let mut cart = store();
        cart.add_item("p1", "Ghee", dec!(450), 2);
        assert!(cart.update_qty("p1", 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn update_qty_unknown_product_is_a_noop() {
        let mut cart = store();
        cart.add_item("p1", "Ghee", dec!(450), 2);
        assert!(!cart.update_qty("missing", 4));
        assert_eq!(cart.totals().subtotal, dec!(900));
    }

    #[test]
    fn remove_item_reports_whether_anything_was_removed() {
        let mut cart = store();
        cart.add_item("p1", "Ghee", dec!(450), 1);
        assert!(cart.remove_item("p1"));
        assert!(!cart.remove_item("p1"));
    }

    #[test]
    fn corrupted_blob_reads_as_empty_cart() {
        let mut storage = InMemoryCartStorage::new();
        storage.store(CART_STORAGE_KEY, "{not json");
        let cart = CartStore::new(storage);

        assert!(cart.items().is_empty());
        assert_eq!(cart.totals(), CartTotals::default());
    }

    #[test]
    fn clear_empties_storage_and_notifies() {
        let notified = Arc::new(AtomicUsize::new(0));
        let seen = notified.clone();

        let mut cart = store();
        cart.subscribe(move |items| {
            if items.is_empty() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        cart.add_item("p1", "Ghee", dec!(450), 1);
        cart.clear();

        assert!(cart.is_empty());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mutations_notify_listeners() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let mut cart = store();
        cart.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        cart.add_item("p1", "Ghee", dec!(450), 1);
        cart.update_qty("p1", 3);
        cart.remove_item("p1");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cart_persists_across_store_instances() {
        let mut storage = InMemoryCartStorage::new();
        {
            let mut cart = CartStore::new(&mut storage);
            cart.add_item("p1", "Ghee", dec!(450), 2);
        }
        let cart = CartStore::new(&mut storage);
        assert_eq!(cart.totals().item_count, 2);
    }

    #[tokio::test]
    async fn publish_changes_emits_cart_events() {
        use crate::events::{Event, EventSender};

        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut cart = store();
        cart.publish_changes(EventSender::new(tx));

        cart.add_item("p1", "Ghee", dec!(450), 2);
        cart.add_item("p2", "Honey", dec!(100), 1);

        match rx.recv().await {
            Some(Event::CartChanged { item_count }) => assert_eq!(item_count, 2),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await {
            Some(Event::CartChanged { item_count }) => assert_eq!(item_count, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
