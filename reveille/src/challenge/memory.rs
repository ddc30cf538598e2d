//! Memory match over a shuffled grid of paired symbols.
//!
//! # Phases
//!
//! ```text
//!            memorize window             second tap, mismatch
//!  Memorize ─────────────────► Play ◄──────────────────────► Mismatch
//!  (all up)                     │        flip-back delay
//!                               │ last pair matched
//!                               ▼
//!                             Solved
//! ```
//!
//! Taps are only accepted in `Play`. At most two unmatched cards are face
//! up at once: the second tap either matches (both stay up for good) or
//! starts the flip-back delay, during which further taps are ignored.
//! Time only moves through [`tick`](MemoryMatchChallenge::tick) and the
//! instants passed to it, so the challenge is deterministic under test.

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub pairs: usize,
    pub memorize_ms: u64,
    pub flip_back_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pairs: 6,
            memorize_ms: 3_000,
            flip_back_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPhase {
    Memorize,
    Play,
    Mismatch,
    Solved,
}

/// A card as the UI sees it. `symbol` is hidden while face down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardView {
    pub symbol: Option<u8>,
    pub matched: bool,
}

#[derive(Debug, Clone, Copy)]
struct Card {
    symbol: u8,
    face_up: bool,
    matched: bool,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Memorize { until: Instant },
    Play,
    Mismatch { until: Instant },
    Solved,
}

#[derive(Debug, Clone)]
pub struct MemoryMatchChallenge {
    cards: Vec<Card>,
    revealed: Vec<usize>,
    state: State,
    flip_back: Duration,
}

impl MemoryMatchChallenge {
    pub fn new<R: Rng + ?Sized>(config: MemoryConfig, rng: &mut R, now: Instant) -> Self {
        let pairs = config.pairs.clamp(1, usize::from(u8::MAX));
        let mut symbols: Vec<u8> = (0..pairs as u8).flat_map(|s| [s, s]).collect();
        symbols.shuffle(rng);
        Self::with_symbols(symbols, config, now)
    }

    fn with_symbols(symbols: Vec<u8>, config: MemoryConfig, now: Instant) -> Self {
        let cards = symbols
            .into_iter()
            .map(|symbol| Card {
                symbol,
                face_up: true,
                matched: false,
            })
            .collect();
        Self {
            cards,
            revealed: Vec::with_capacity(2),
            state: State::Memorize {
                until: now + Duration::from_millis(config.memorize_ms),
            },
            flip_back: Duration::from_millis(config.flip_back_ms),
        }
    }

    pub fn phase(&self) -> MemoryPhase {
        match self.state {
            State::Memorize { .. } => MemoryPhase::Memorize,
            State::Play => MemoryPhase::Play,
            State::Mismatch { .. } => MemoryPhase::Mismatch,
            State::Solved => MemoryPhase::Solved,
        }
    }

    pub fn cards(&self) -> Vec<CardView> {
        self.cards
            .iter()
            .map(|card| CardView {
                symbol: card.face_up.then_some(card.symbol),
                matched: card.matched,
            })
            .collect()
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::Memorize { until } | State::Mismatch { until } => Some(until),
            State::Play | State::Solved => None,
        }
    }

    /// Apply timed transitions due at `now`.
    pub fn tick(&mut self, now: Instant) {
        match self.state {
            State::Memorize { until } if now >= until => {
                for card in self.cards.iter_mut().filter(|c| !c.matched) {
                    card.face_up = false;
                }
                self.state = State::Play;
            }
            State::Mismatch { until } if now >= until => {
                for index in self.revealed.drain(..) {
                    self.cards[index].face_up = false;
                }
                self.state = State::Play;
            }
            _ => {}
        }
    }

    /// Turn over the card at `index`.
    ///
    /// Ignored outside `Play`, for out-of-range indices and for cards that
    /// are already face up.
    pub fn tap(&mut self, index: usize, now: Instant) -> Progress {
        self.tick(now);

        match self.state {
            State::Solved => return Progress::Solved,
            State::Play => {}
            _ => return Progress::Pending,
        }
        let Some(card) = self.cards.get_mut(index) else {
            return Progress::Pending;
        };
        if card.face_up {
            return Progress::Pending;
        }

        card.face_up = true;
        self.revealed.push(index);

        if let [first, second] = self.revealed[..] {
            if self.cards[first].symbol == self.cards[second].symbol {
                self.cards[first].matched = true;
                self.cards[second].matched = true;
                self.revealed.clear();
            } else {
                self.state = State::Mismatch {
                    until: now + self.flip_back,
                };
            }
        }

        if self.cards.iter().all(|c| c.matched) {
            self.state = State::Solved;
            Progress::Solved
        } else {
            Progress::Pending
        }
    }
}
