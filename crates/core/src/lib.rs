#![warn(clippy::all, missing_docs)]

//! Core game logic for Typing Tycoon.
//!
//! This crate hosts the building catalog, the typing state machine,
//! the economy ledger, configuration handling and save persistence
//! used by the terminal UI and any future frontends.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod matcher;
pub mod save;
pub mod session;

pub use catalog::{BuildableItem, Catalog};
pub use config::AppConfig;
pub use error::{CatalogError, LedgerError};
pub use ledger::{EconomyLedger, EconomySnapshot, SpendReceipt};
pub use matcher::{Funds, KeyInput, MatchEvent, MatchState, MismatchPolicy, TypingMatcher};
pub use save::{BackgroundSaver, MemoryStore, Persistence, ProfileStore, SaveManager, SaveState};
pub use session::{GameSession, Hint, KeyOutcome, SessionOptions, StartReport};
