//! In-memory stock ledger with atomic batch decrement.

use std::collections::BTreeMap;

/// Result of applying one sold-item batch: the full post-batch stock
/// snapshot and the human-readable event messages generated for the batch,
/// in application order. The caller appends the events to the audit log.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub snapshot: BTreeMap<String, i64>,
    pub events: Vec<String>,
}

/// Stock levels keyed by SKU. Quantities never go below zero, and an entry
/// is never removed once created. The ledger itself is not thread-safe;
/// the owning service serializes access (one critical section per batch).
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    items: BTreeMap<String, i64>,
}

impl InventoryLedger {
    /// Build a ledger from a seed set. Negative seed quantities are clamped
    /// to zero to uphold the non-negativity invariant from the start.
    pub fn new(seed: BTreeMap<String, i64>) -> Self {
        let items = seed.into_iter().map(|(sku, qty)| (sku, qty.max(0))).collect();
        Self { items }
    }

    /// The built-in seed set used when no seed file is configured.
    pub fn default_seed() -> BTreeMap<String, i64> {
        BTreeMap::from([
            ("apple".to_string(), 100),
            ("banana".to_string(), 150),
            ("orange".to_string(), 120),
        ])
    }

    /// Current quantity for a SKU, if the SKU has ever been referenced.
    pub fn quantity(&self, sku: &str) -> Option<i64> {
        self.items.get(sku).copied()
    }

    /// Full copy of the current stock levels.
    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.items.clone()
    }

    /// Apply one sold-item batch. For each `(sku, qty)` in iteration order:
    ///
    /// - existing SKU: quantity becomes `max(0, current - qty)` — a sale
    ///   larger than the remaining stock clamps at zero rather than going
    ///   negative;
    /// - unknown SKU: inserted with quantity 0 regardless of `qty` (there
    ///   is no stock to subtract from).
    ///
    /// `qty` is deliberately not validated for sign: a negative quantity
    /// increases stock. That matches the deployed behavior and is pinned by
    /// tests; see DESIGN.md before "fixing" it.
    ///
    /// The batch always fully applies — there is no failing validation, so
    /// no partial application is observable.
    pub fn decrement_batch(&mut self, requests: &BTreeMap<String, i64>) -> BatchOutcome {
        let mut events = Vec::with_capacity(requests.len());

        for (sku, &qty) in requests {
            match self.items.get_mut(sku) {
                Some(current) => {
                    let prev = *current;
                    *current = (prev - qty).max(0);
                    events.push(format!(
                        "Sold {qty} {sku}(s): updated from {prev} to {}.",
                        *current
                    ));
                }
                None => {
                    self.items.insert(sku.clone(), 0);
                    events.push(format!(
                        "New item '{sku}' encountered. Set to 0 after selling {qty}."
                    ));
                }
            }
        }

        BatchOutcome {
            snapshot: self.snapshot(),
            events,
        }
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new(Self::default_seed())
    }
}
