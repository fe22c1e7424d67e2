//! A single game session tying the matcher, the ledger and persistence
//! together.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    catalog::{BuildableItem, Catalog},
    error::LedgerError,
    ledger::{EconomyLedger, EconomySnapshot, SpendReceipt},
    matcher::{KeyInput, MatchEvent, MatchState, MismatchPolicy, TypingMatcher},
    save::{Persistence, SaveState},
};

/// Gameplay options fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Balance when no save exists.
    pub starting_currency: f64,
    /// Behaviour on a wrong letter.
    pub mismatch_policy: MismatchPolicy,
    /// Credit income for time elapsed since the last save.
    pub offline_earnings: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            starting_currency: 100.0,
            mismatch_policy: MismatchPolicy::default(),
            offline_earnings: true,
        }
    }
}

/// How a session came to life.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartReport {
    /// Whether a save was found.
    pub resumed: bool,
    /// Seconds since the save was written (zero for a fresh game).
    pub away_secs: f64,
    /// Income credited for the time away.
    pub offline_earnings: f64,
}

/// Everything a single key press caused.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutcome {
    /// Matcher event for the key.
    pub event: MatchEvent,
    /// Purchase result when the key completed a word.
    pub construction: Option<Result<SpendReceipt, LedgerError>>,
}

impl KeyOutcome {
    /// The item built by this key, if the purchase went through.
    pub fn built(&self) -> Option<&BuildableItem> {
        match (&self.event, &self.construction) {
            (MatchEvent::WordCompleted(item), Some(Ok(_))) => Some(item),
            _ => None,
        }
    }
}

/// Prompt for the player derived from the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    /// An attempt is in progress.
    Attempt {
        /// Word being typed.
        target: String,
        /// Typed prefix.
        progress: String,
        /// Next letter to type.
        next: Option<char>,
        /// Last wrong letter.
        mismatch: Option<char>,
    },
    /// Nothing is being typed; this is the first affordable item.
    Suggest(BuildableItem),
    /// Nothing is affordable yet.
    SaveUp,
}

/// Owns all mutable state of one play session.
pub struct GameSession<P> {
    catalog: Arc<Catalog>,
    matcher: TypingMatcher,
    ledger: EconomyLedger,
    persistence: P,
}

impl<P: Persistence> GameSession<P> {
    /// Start a session, resuming from `persistence` when it has a save.
    pub fn start(
        catalog: Arc<Catalog>,
        options: SessionOptions,
        persistence: P,
        now: DateTime<Utc>,
    ) -> Result<(Self, StartReport)> {
        let saved = persistence.load_initial_state()?;
        let matcher = TypingMatcher::new(catalog.clone(), options.mismatch_policy);

        let (ledger, report) = match saved {
            Some(state) => {
                let away_secs = (now - state.saved_at).num_milliseconds().max(0) as f64 / 1000.0;
                let mut ledger = EconomyLedger::restore(catalog.clone(), state.snapshot());
                let before = ledger.currency();
                if options.offline_earnings {
                    ledger.accrue_income(away_secs);
                }
                let report = StartReport {
                    resumed: true,
                    away_secs,
                    offline_earnings: ledger.currency() - before,
                };
                (ledger, report)
            }
            None => (
                EconomyLedger::new(catalog.clone(), options.starting_currency),
                StartReport {
                    resumed: false,
                    away_secs: 0.0,
                    offline_earnings: 0.0,
                },
            ),
        };

        info!(
            resumed = report.resumed,
            currency = ledger.currency(),
            offline_earnings = report.offline_earnings,
            "Session started"
        );

        let session = Self {
            catalog,
            matcher,
            ledger,
            persistence,
        };
        Ok((session, report))
    }

    /// Feed a key through the matcher and settle any completed word.
    pub fn handle_key(&mut self, key: KeyInput) -> KeyOutcome {
        let event = self.matcher.handle_key(key, &self.ledger);
        let construction = match &event {
            MatchEvent::WordCompleted(item) => Some(self.construct(item)),
            _ => None,
        };
        KeyOutcome {
            event,
            construction,
        }
    }

    /// Credit passive income for `elapsed_secs`; returns the new balance.
    pub fn tick(&mut self, elapsed_secs: f64) -> f64 {
        self.ledger.accrue_income(elapsed_secs)
    }

    /// Drop the current attempt.
    pub fn abandon_attempt(&mut self) {
        self.matcher.abandon();
    }

    /// Hand the current state to persistence.
    pub fn persist_now(&self) {
        self.persistence
            .persist(SaveState::from_snapshot(self.ledger.snapshot(), Utc::now()));
    }

    /// Player prompt for the current state.
    pub fn hint(&self) -> Hint {
        if self.matcher.state() == MatchState::Matching {
            return Hint::Attempt {
                target: self.matcher.target_word().to_string(),
                progress: self.matcher.progress().to_string(),
                next: self.matcher.next_expected(),
                mismatch: self.matcher.last_mismatch(),
            };
        }
        match self.catalog.affordable(self.ledger.currency()).next() {
            Some(item) => Hint::Suggest(item.clone()),
            None => Hint::SaveUp,
        }
    }

    /// Whether `item` could be bought right now.
    pub fn is_affordable(&self, item: &BuildableItem) -> bool {
        item.cost <= self.ledger.currency()
    }

    /// Economy snapshot for display.
    pub fn snapshot(&self) -> EconomySnapshot {
        self.ledger.snapshot()
    }

    /// Combined income per second.
    pub fn income_rate(&self) -> f64 {
        self.ledger.income_rate()
    }

    /// Catalog in play.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Read access to the matcher.
    pub fn matcher(&self) -> &TypingMatcher {
        &self.matcher
    }

    /// Read access to the ledger.
    pub fn ledger(&self) -> &EconomyLedger {
        &self.ledger
    }

    /// Persistence collaborator.
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// End the session, handing back the persistence collaborator.
    pub fn into_persistence(self) -> P {
        self.persistence
    }

    fn construct(&mut self, item: &BuildableItem) -> Result<SpendReceipt, LedgerError> {
        match self.ledger.spend(item) {
            Ok(receipt) => {
                info!(item = %item.id, owned = receipt.owned, currency = receipt.currency, "Constructed");
                self.persist_now();
                Ok(receipt)
            }
            Err(err) => {
                warn!(item = %item.id, %err, "Construction failed");
                Err(err)
            }
        }
    }
}
