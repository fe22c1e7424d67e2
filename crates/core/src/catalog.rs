//! Buildable item definitions and the ordered catalog they live in.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// A structure the player can buy by typing its word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildableItem {
    /// Stable identifier used for owned counts and saves (e.g. `cage`).
    pub id: String,
    /// Uppercase word the player must type.
    pub word: String,
    /// Price in currency.
    pub cost: f64,
    /// Currency generated per second for each owned copy.
    #[serde(alias = "income")]
    pub income_per_tick: f64,
}

impl BuildableItem {
    /// Convenience constructor.
    pub fn new(id: impl Into<String>, word: impl Into<String>, cost: f64, income: f64) -> Self {
        Self {
            id: id.into(),
            word: word.into(),
            cost,
            income_per_tick: income,
        }
    }

    /// First character of the word, used to start an attempt.
    pub fn leading_char(&self) -> Option<char> {
        self.word.chars().next()
    }

    /// Character at `index` in the word, if any.
    pub fn char_at(&self, index: usize) -> Option<char> {
        self.word.as_bytes().get(index).map(|byte| char::from(*byte))
    }
}

static DEFAULT_ITEMS: Lazy<Vec<BuildableItem>> = Lazy::new(|| {
    vec![
        BuildableItem::new("cage", "CAGE", 100.0, 1.0),
        BuildableItem::new("habitat", "HABITAT", 250.0, 2.0),
        BuildableItem::new("safari", "SAFARI", 500.0, 5.0),
    ]
});

/// Validated, ordered list of buildable items.
///
/// Declaration order is significant: when several affordable items start with
/// the same letter, the earliest one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    items: Vec<BuildableItem>,
}

impl Catalog {
    /// Validate `items` and build a catalog preserving their order.
    pub fn new(items: Vec<BuildableItem>) -> Result<Self, CatalogError> {
        let mut ids: HashMap<&str, usize> = HashMap::with_capacity(items.len());
        let mut words: HashMap<&str, &str> = HashMap::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            if item.id.trim().is_empty() {
                return Err(CatalogError::EmptyId { index });
            }
            if item.word.is_empty() {
                return Err(CatalogError::EmptyWord {
                    id: item.id.clone(),
                });
            }
            if let Some(ch) = item.word.chars().find(|ch| !ch.is_ascii_uppercase()) {
                return Err(CatalogError::InvalidCharacter {
                    id: item.id.clone(),
                    word: item.word.clone(),
                    ch,
                });
            }
            for (field, value) in [("cost", item.cost), ("income", item.income_per_tick)] {
                if !value.is_finite() || value < 0.0 {
                    return Err(CatalogError::InvalidAmount {
                        id: item.id.clone(),
                        field,
                        value,
                    });
                }
            }
            if ids.insert(item.id.as_str(), index).is_some() {
                return Err(CatalogError::DuplicateId(item.id.clone()));
            }
            if let Some(first) = words.insert(item.word.as_str(), item.id.as_str()) {
                return Err(CatalogError::DuplicateWord {
                    word: item.word.clone(),
                    first: first.to_string(),
                    second: item.id.clone(),
                });
            }
        }

        Ok(Self { items })
    }

    /// The zoo catalog shipped with the game.
    pub fn default_catalog() -> Self {
        Self {
            items: DEFAULT_ITEMS.clone(),
        }
    }

    /// All items in declaration order.
    pub fn items(&self) -> &[BuildableItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the catalog has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at a declaration index.
    pub fn get(&self, index: usize) -> Option<&BuildableItem> {
        self.items.get(index)
    }

    /// Look up an item by id.
    pub fn find(&self, id: &str) -> Option<&BuildableItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Declaration index of the item with the given id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    /// First item, in declaration order, starting with `key` that `can_afford`
    /// accepts. Returns its index alongside the item.
    pub fn select(
        &self,
        key: char,
        can_afford: impl Fn(f64) -> bool,
    ) -> Option<(usize, &BuildableItem)> {
        self.items
            .iter()
            .enumerate()
            .find(|(_, item)| item.leading_char() == Some(key) && can_afford(item.cost))
    }

    /// Items whose cost fits within `currency`, in declaration order.
    pub fn affordable(&self, currency: f64) -> impl Iterator<Item = &BuildableItem> + '_ {
        self.items.iter().filter(move |item| item.cost <= currency)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}
