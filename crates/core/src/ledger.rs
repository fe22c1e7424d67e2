//! Currency balance, owned buildings and passive income.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    catalog::{BuildableItem, Catalog},
    error::LedgerError,
    matcher::Funds,
};

/// Point-in-time copy of the economy for display and persistence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EconomySnapshot {
    /// Unrounded balance.
    pub currency: f64,
    /// Owned buildings keyed by item id.
    #[serde(default)]
    pub owned_counts: BTreeMap<String, u64>,
}

impl EconomySnapshot {
    /// Balance as shown to the player.
    pub fn display_currency(&self) -> u64 {
        display_amount(self.currency)
    }

    /// Number of owned copies of `id`.
    pub fn owned(&self, id: &str) -> u64 {
        self.owned_counts.get(id).copied().unwrap_or(0)
    }
}

/// Floor a currency amount for display. Negative or NaN amounts show as zero.
pub fn display_amount(amount: f64) -> u64 {
    if amount.is_finite() && amount > 0.0 {
        amount.floor() as u64
    } else {
        0
    }
}

/// Result of a successful purchase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendReceipt {
    /// Balance after paying.
    pub currency: f64,
    /// Owned copies of the item after the purchase.
    pub owned: u64,
}

/// Owns the balance and building counts of one session.
#[derive(Debug, Clone)]
pub struct EconomyLedger {
    catalog: Arc<Catalog>,
    currency: f64,
    owned: BTreeMap<String, u64>,
}

impl EconomyLedger {
    /// Fresh ledger with nothing built.
    pub fn new(catalog: Arc<Catalog>, currency: f64) -> Self {
        Self {
            catalog,
            currency: sanitize_currency(currency),
            owned: BTreeMap::new(),
        }
    }

    /// Rebuild a ledger from a persisted snapshot.
    ///
    /// Counts for ids missing from the catalog are dropped.
    pub fn restore(catalog: Arc<Catalog>, snapshot: EconomySnapshot) -> Self {
        let mut owned = BTreeMap::new();
        for (id, count) in snapshot.owned_counts {
            if catalog.find(&id).is_none() {
                warn!(%id, count, "dropping owned count for item missing from catalog");
                continue;
            }
            if count > 0 {
                owned.insert(id, count);
            }
        }
        if sanitize_currency(snapshot.currency) != snapshot.currency {
            warn!(currency = snapshot.currency, "restored balance was invalid; resetting to zero");
        }
        Self {
            catalog,
            currency: sanitize_currency(snapshot.currency),
            owned,
        }
    }

    /// Pay for `item` and add one to its count.
    pub fn spend(&mut self, item: &BuildableItem) -> Result<SpendReceipt, LedgerError> {
        let known = self
            .catalog
            .find(&item.id)
            .ok_or_else(|| LedgerError::UnknownItem(item.id.clone()))?;
        let cost = known.cost;
        if self.currency < cost {
            return Err(LedgerError::InsufficientFunds {
                item: item.id.clone(),
                cost,
                available: self.currency,
            });
        }

        self.currency -= cost;
        let owned = self.owned.entry(item.id.clone()).or_insert(0);
        *owned += 1;
        Ok(SpendReceipt {
            currency: self.currency,
            owned: *owned,
        })
    }

    /// Credit income for `elapsed_secs` of play and return the new balance.
    pub fn accrue_income(&mut self, elapsed_secs: f64) -> f64 {
        if elapsed_secs.is_finite() && elapsed_secs > 0.0 {
            self.currency += self.income_rate() * elapsed_secs;
        }
        self.currency
    }

    /// Combined income of everything owned, per second.
    pub fn income_rate(&self) -> f64 {
        self.owned
            .iter()
            .filter_map(|(id, count)| {
                self.catalog
                    .find(id)
                    .map(|item| *count as f64 * item.income_per_tick)
            })
            .sum()
    }

    /// Current unrounded balance.
    pub fn currency(&self) -> f64 {
        self.currency
    }

    /// Owned copies of `id`.
    pub fn owned(&self, id: &str) -> u64 {
        self.owned.get(id).copied().unwrap_or(0)
    }

    /// Catalog the ledger prices against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> EconomySnapshot {
        EconomySnapshot {
            currency: self.currency,
            owned_counts: self.owned.clone(),
        }
    }
}

impl Funds for EconomyLedger {
    fn can_afford(&self, cost: f64) -> bool {
        cost <= self.currency
    }
}

fn sanitize_currency(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}
