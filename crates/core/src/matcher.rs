//! Typing state machine turning key presses into word completions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{BuildableItem, Catalog};

/// A single logical key delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// A typed character. Letters are matched case-insensitively.
    Char(char),
    /// Remove the last typed character of the current attempt.
    Backspace,
}

/// What happens to an attempt when a wrong letter is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Keep the attempt alive so the player can retry the same letter.
    #[default]
    KeepAttempt,
    /// Drop the attempt and return to idle.
    AbortAttempt,
}

/// Observable phase of the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// No attempt in progress.
    Idle,
    /// An attempt is in progress.
    Matching,
}

/// Exactly one of these is produced for every key handed to the matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    /// The key advanced (or, for backspace, rewound) the current attempt.
    KeyAccepted {
        /// Word being typed.
        target: String,
        /// Characters typed so far.
        progress: String,
    },
    /// The key did not match the expected next letter.
    KeyRejected(char),
    /// The key had no effect on the matcher.
    KeyIgnored(KeyInput),
    /// The key completed the word of this item. The matcher is idle again.
    WordCompleted(BuildableItem),
}

impl MatchEvent {
    /// Whether the key was consumed as a correct keystroke.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::KeyAccepted { .. } | Self::WordCompleted(_))
    }
}

/// Affordability check consulted when an attempt starts.
pub trait Funds {
    /// Whether `cost` can currently be paid.
    fn can_afford(&self, cost: f64) -> bool;
}

impl Funds for f64 {
    fn can_afford(&self, cost: f64) -> bool {
        cost <= *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attempt {
    item: usize,
    typed: usize,
}

/// Tracks progress of one attempt against the catalog.
#[derive(Debug, Clone)]
pub struct TypingMatcher {
    catalog: Arc<Catalog>,
    policy: MismatchPolicy,
    attempt: Option<Attempt>,
    last_mismatch: Option<char>,
}

impl TypingMatcher {
    /// Create an idle matcher over `catalog`.
    pub fn new(catalog: Arc<Catalog>, policy: MismatchPolicy) -> Self {
        Self {
            catalog,
            policy,
            attempt: None,
            last_mismatch: None,
        }
    }

    /// Feed one key and report what it did.
    pub fn handle_key(&mut self, key: KeyInput, funds: &impl Funds) -> MatchEvent {
        let event = match key {
            KeyInput::Backspace => self.rewind(key),
            KeyInput::Char(raw) => {
                let ch = raw.to_ascii_uppercase();
                if !ch.is_ascii_uppercase() {
                    MatchEvent::KeyIgnored(key)
                } else if let Some(attempt) = self.attempt {
                    self.advance(attempt, ch)
                } else {
                    self.begin(ch, key, funds)
                }
            }
        };
        debug!(?key, ?event, "key handled");
        event
    }

    /// Abandon the current attempt, if any.
    pub fn abandon(&mut self) {
        self.attempt = None;
        self.last_mismatch = None;
    }

    /// Current phase.
    pub fn state(&self) -> MatchState {
        if self.attempt.is_some() {
            MatchState::Matching
        } else {
            MatchState::Idle
        }
    }

    /// Item targeted by the current attempt.
    pub fn target(&self) -> Option<&BuildableItem> {
        self.attempt.and_then(|attempt| self.catalog.get(attempt.item))
    }

    /// Word being typed, or an empty string when idle.
    pub fn target_word(&self) -> &str {
        self.target().map(|item| item.word.as_str()).unwrap_or("")
    }

    /// Typed prefix of the target word, or an empty string when idle.
    pub fn progress(&self) -> &str {
        match self.attempt {
            Some(attempt) => &self.target_word()[..attempt.typed],
            None => "",
        }
    }

    /// Next letter the player has to type.
    pub fn next_expected(&self) -> Option<char> {
        let attempt = self.attempt?;
        self.catalog.get(attempt.item)?.char_at(attempt.typed)
    }

    /// Most recent wrong letter, cleared by the next accepted key.
    pub fn last_mismatch(&self) -> Option<char> {
        self.last_mismatch
    }

    /// Active mismatch policy.
    pub fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    fn begin(&mut self, ch: char, key: KeyInput, funds: &impl Funds) -> MatchEvent {
        let Some((index, item)) = self.catalog.select(ch, |cost| funds.can_afford(cost)) else {
            return MatchEvent::KeyIgnored(key);
        };
        self.last_mismatch = None;
        if item.word.len() == 1 {
            return MatchEvent::WordCompleted(item.clone());
        }
        self.attempt = Some(Attempt {
            item: index,
            typed: 1,
        });
        self.accepted()
    }

    fn advance(&mut self, mut attempt: Attempt, ch: char) -> MatchEvent {
        let Some(item) = self.catalog.get(attempt.item) else {
            self.abandon();
            return MatchEvent::KeyIgnored(KeyInput::Char(ch));
        };

        if item.char_at(attempt.typed) != Some(ch) {
            self.last_mismatch = Some(ch);
            if self.policy == MismatchPolicy::AbortAttempt {
                self.attempt = None;
            }
            return MatchEvent::KeyRejected(ch);
        }

        self.last_mismatch = None;
        attempt.typed += 1;
        if attempt.typed == item.word.len() {
            let item = item.clone();
            self.attempt = None;
            return MatchEvent::WordCompleted(item);
        }
        self.attempt = Some(attempt);
        self.accepted()
    }

    fn rewind(&mut self, key: KeyInput) -> MatchEvent {
        match self.attempt.as_mut().filter(|attempt| attempt.typed > 0) {
            Some(attempt) => attempt.typed -= 1,
            None => return MatchEvent::KeyIgnored(key),
        }
        self.last_mismatch = None;
        self.accepted()
    }

    fn accepted(&self) -> MatchEvent {
        MatchEvent::KeyAccepted {
            target: self.target_word().to_string(),
            progress: self.progress().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> TypingMatcher {
        TypingMatcher::new(Arc::new(Catalog::default_catalog()), MismatchPolicy::default())
    }

    fn type_word(matcher: &mut TypingMatcher, word: &str, funds: f64) -> Vec<MatchEvent> {
        word.chars()
            .map(|ch| matcher.handle_key(KeyInput::Char(ch), &funds))
            .collect()
    }

    #[test]
    fn typing_a_word_completes_it() {
        let mut matcher = matcher();
        let events = type_word(&mut matcher, "CAGE", 100.0);

        assert_eq!(events.len(), 4);
        assert!(events[..3]
            .iter()
            .all(|event| matches!(event, MatchEvent::KeyAccepted { .. })));
        match &events[3] {
            MatchEvent::WordCompleted(item) => assert_eq!(item.id, "cage"),
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(events.iter().all(MatchEvent::is_accepted));
        assert_eq!(matcher.state(), MatchState::Idle);
        assert_eq!(matcher.target_word(), "");
        assert_eq!(matcher.progress(), "");
    }

    #[test]
    fn unaffordable_leading_key_is_ignored() {
        let mut matcher = matcher();
        let event = matcher.handle_key(KeyInput::Char('C'), &50.0);
        assert_eq!(event, MatchEvent::KeyIgnored(KeyInput::Char('C')));
        assert_eq!(matcher.state(), MatchState::Idle);

        let event = matcher.handle_key(KeyInput::Char('H'), &0.0);
        assert_eq!(event, MatchEvent::KeyIgnored(KeyInput::Char('H')));
    }

    #[test]
    fn mismatch_keeps_attempt_by_default() {
        let mut matcher = matcher();
        type_word(&mut matcher, "CA", 100.0);

        let event = matcher.handle_key(KeyInput::Char('X'), &100.0);
        assert_eq!(event, MatchEvent::KeyRejected('X'));
        assert_eq!(matcher.progress(), "CA");
        assert_eq!(matcher.last_mismatch(), Some('X'));
        assert_eq!(matcher.next_expected(), Some('G'));

        let event = matcher.handle_key(KeyInput::Char('G'), &100.0);
        assert_eq!(
            event,
            MatchEvent::KeyAccepted {
                target: "CAGE".to_string(),
                progress: "CAG".to_string(),
            }
        );
        assert_eq!(matcher.last_mismatch(), None);
    }

    #[test]
    fn mismatch_aborts_attempt_when_configured() {
        let mut matcher = TypingMatcher::new(
            Arc::new(Catalog::default_catalog()),
            MismatchPolicy::AbortAttempt,
        );
        type_word(&mut matcher, "CA", 100.0);

        let event = matcher.handle_key(KeyInput::Char('X'), &100.0);
        assert_eq!(event, MatchEvent::KeyRejected('X'));
        assert_eq!(matcher.state(), MatchState::Idle);
        assert_eq!(matcher.progress(), "");
        assert_eq!(matcher.last_mismatch(), Some('X'));
    }

    #[test]
    fn lowercase_keys_are_normalised_and_symbols_ignored() {
        let mut matcher = matcher();
        let event = matcher.handle_key(KeyInput::Char('c'), &100.0);
        assert!(matches!(event, MatchEvent::KeyAccepted { ref progress, .. } if progress == "C"));

        let event = matcher.handle_key(KeyInput::Char('1'), &100.0);
        assert_eq!(event, MatchEvent::KeyIgnored(KeyInput::Char('1')));
        assert_eq!(matcher.progress(), "C");
    }

    #[test]
    fn backspace_rewinds_without_leaving_the_attempt() {
        let mut matcher = matcher();
        assert_eq!(
            matcher.handle_key(KeyInput::Backspace, &100.0),
            MatchEvent::KeyIgnored(KeyInput::Backspace)
        );

        type_word(&mut matcher, "CAX", 100.0);
        assert!(matcher.handle_key(KeyInput::Backspace, &100.0).is_accepted());
        assert_eq!(matcher.progress(), "C");
        assert_eq!(matcher.last_mismatch(), None);

        assert!(matcher.handle_key(KeyInput::Backspace, &100.0).is_accepted());
        assert_eq!(matcher.progress(), "");
        assert_eq!(matcher.target_word(), "CAGE");
        assert_eq!(
            matcher.handle_key(KeyInput::Backspace, &100.0),
            MatchEvent::KeyIgnored(KeyInput::Backspace)
        );

        let event = matcher.handle_key(KeyInput::Char('C'), &100.0);
        assert!(matches!(event, MatchEvent::KeyAccepted { ref progress, .. } if progress == "C"));
    }

    #[test]
    fn progress_is_always_a_prefix() {
        let mut matcher = matcher();
        for ch in "CQAGXXHEABSAFARI".chars() {
            matcher.handle_key(KeyInput::Char(ch), &1_000.0);
            assert!(matcher.target_word().starts_with(matcher.progress()));
            if matcher.target_word().is_empty() {
                assert!(matcher.progress().is_empty());
            }
        }
    }

    #[test]
    fn selection_is_deterministic() {
        let catalog = Arc::new(
            Catalog::new(vec![
                BuildableItem::new("shed", "SHED", 10.0, 0.1),
                BuildableItem::new("safari", "SAFARI", 500.0, 5.0),
            ])
            .unwrap(),
        );
        for _ in 0..3 {
            let mut matcher = TypingMatcher::new(catalog.clone(), MismatchPolicy::KeepAttempt);
            matcher.handle_key(KeyInput::Char('S'), &600.0);
            assert_eq!(matcher.target_word(), "SHED");
        }
        let mut matcher = TypingMatcher::new(catalog, MismatchPolicy::KeepAttempt);
        matcher.handle_key(KeyInput::Char('S'), &5.0);
        assert_eq!(matcher.state(), MatchState::Idle);
    }

    #[test]
    fn single_letter_words_complete_immediately() {
        let catalog = Arc::new(Catalog::new(vec![BuildableItem::new("tree", "T", 1.0, 0.1)]).unwrap());
        let mut matcher = TypingMatcher::new(catalog, MismatchPolicy::KeepAttempt);
        let event = matcher.handle_key(KeyInput::Char('t'), &1.0);
        assert!(matches!(event, MatchEvent::WordCompleted(ref item) if item.id == "tree"));
        assert_eq!(matcher.state(), MatchState::Idle);
    }
}
