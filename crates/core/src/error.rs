//! Domain error types for the catalog and the ledger.

use thiserror::Error;

/// Errors raised while validating a catalog definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    /// An entry was declared without an identifier.
    #[error("catalog entry #{index} has an empty id")]
    EmptyId {
        /// Position of the entry in declaration order.
        index: usize,
    },
    /// An entry was declared without a word to type.
    #[error("catalog entry '{id}' has an empty word")]
    EmptyWord {
        /// Identifier of the offending entry.
        id: String,
    },
    /// A word contains something other than `A`–`Z`.
    #[error("catalog entry '{id}' has invalid character {ch:?} in word '{word}'")]
    InvalidCharacter {
        /// Identifier of the offending entry.
        id: String,
        /// The declared word.
        word: String,
        /// First character outside the alphabet.
        ch: char,
    },
    /// Two entries share an identifier.
    #[error("duplicate catalog id '{0}'")]
    DuplicateId(String),
    /// Two entries share a word.
    #[error("duplicate catalog word '{word}' (ids '{first}' and '{second}')")]
    DuplicateWord {
        /// The shared word.
        word: String,
        /// Identifier declared first.
        first: String,
        /// Identifier declared second.
        second: String,
    },
    /// Cost or income is negative, NaN or infinite.
    #[error("catalog entry '{id}' has invalid {field}: {value}")]
    InvalidAmount {
        /// Identifier of the offending entry.
        id: String,
        /// Which field was rejected.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
}

/// Errors raised by ledger transactions. None of them leave partial state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The balance no longer covers the item's cost at commit time.
    #[error("insufficient funds for '{item}': costs {cost}, have {available}")]
    InsufficientFunds {
        /// Identifier of the item being bought.
        item: String,
        /// Its cost.
        cost: f64,
        /// Balance at the time of the attempt.
        available: f64,
    },
    /// The item is not part of the ledger's catalog.
    #[error("unknown item '{0}'")]
    UnknownItem(String),
}
