//! Dismissal challenges.
//!
//! An alarm carries an ordered list of challenge tags. The
//! [`DismissalOrchestrator`] walks that list; for each known kind the
//! ringing session starts a [`Challenge`] and feeds it user and sensor
//! input until it reports [`Progress::Solved`]. Tags this version does not
//! recognize are skipped so they can never block dismissal.
//!
//! Tags are matched case-insensitively:
//!
//! | Tag | Challenge |
//! |---|---|
//! | `MATH PROBLEM` | [`ArithmeticChallenge`] |
//! | `SHAKE PHONE` | [`ShakeChallenge`] |
//! | `WALK` | [`StepChallenge`] |
//! | `SCAN CODE` | [`ScanChallenge`] |
//! | `MEMORY MATCH` | [`MemoryMatchChallenge`] |

pub mod arithmetic;
pub mod memory;
pub mod orchestrator;
pub mod scan;
pub mod shake;
pub mod steps;

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::EnumString;
use tokio::time::Instant;

pub use arithmetic::{ArithmeticChallenge, ArithmeticConfig};
pub use memory::{CardView, MemoryConfig, MemoryMatchChallenge, MemoryPhase};
pub use orchestrator::DismissalOrchestrator;
pub use scan::ScanChallenge;
pub use shake::{ShakeChallenge, ShakeConfig};
pub use steps::{StepChallenge, StepsConfig};

/// A challenge kind, parsed from its persisted tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
pub enum ChallengeKind {
    #[strum(serialize = "MATH PROBLEM")]
    Arithmetic,
    #[strum(serialize = "SHAKE PHONE")]
    Shake,
    #[strum(serialize = "WALK")]
    Steps,
    #[strum(serialize = "SCAN CODE")]
    Scan,
    #[strum(serialize = "MEMORY MATCH")]
    MemoryMatch,
    /// A tag this version does not know, kept upper-cased.
    #[strum(default)]
    Unknown(String),
}

impl ChallengeKind {
    pub fn from_tag(tag: &str) -> Self {
        let upper = tag.trim().to_uppercase();
        upper
            .parse()
            .unwrap_or_else(|_| ChallengeKind::Unknown(upper))
    }

    pub fn tag(&self) -> &str {
        match self {
            ChallengeKind::Arithmetic => "MATH PROBLEM",
            ChallengeKind::Shake => "SHAKE PHONE",
            ChallengeKind::Steps => "WALK",
            ChallengeKind::Scan => "SCAN CODE",
            ChallengeKind::MemoryMatch => "MEMORY MATCH",
            ChallengeKind::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ChallengeKind::Unknown(_))
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What a presented challenge eventually reports to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    Solved,
    /// The user left the challenge. It is presented again.
    Abandoned,
}

/// Result of feeding input to a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Solved,
}

impl Progress {
    pub fn is_solved(self) -> bool {
        self == Progress::Solved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChallengeConfig {
    pub arithmetic: ArithmeticConfig,
    pub shake: ShakeConfig,
    pub steps: StepsConfig,
    pub memory: MemoryConfig,
    /// Code a scan must match. Any non-empty code is accepted when unset.
    pub scan_expected: Option<String>,
}

/// A running instance of one challenge kind.
#[derive(Debug, Clone)]
pub enum Challenge {
    Arithmetic(ArithmeticChallenge),
    Shake(ShakeChallenge),
    Steps(StepChallenge),
    Scan(ScanChallenge),
    MemoryMatch(MemoryMatchChallenge),
}

impl Challenge {
    /// Start a challenge of `kind`. Returns `None` for unknown kinds.
    pub fn start<R: Rng + ?Sized>(
        kind: &ChallengeKind,
        config: &ChallengeConfig,
        rng: &mut R,
        now: Instant,
    ) -> Option<Self> {
        let challenge = match kind {
            ChallengeKind::Arithmetic => {
                Challenge::Arithmetic(ArithmeticChallenge::new(&config.arithmetic, rng))
            }
            ChallengeKind::Shake => Challenge::Shake(ShakeChallenge::new(config.shake)),
            ChallengeKind::Steps => Challenge::Steps(StepChallenge::new(config.steps)),
            ChallengeKind::Scan => {
                Challenge::Scan(ScanChallenge::new(config.scan_expected.clone()))
            }
            ChallengeKind::MemoryMatch => {
                Challenge::MemoryMatch(MemoryMatchChallenge::new(config.memory, rng, now))
            }
            ChallengeKind::Unknown(_) => return None,
        };
        Some(challenge)
    }

    pub fn kind(&self) -> ChallengeKind {
        match self {
            Challenge::Arithmetic(_) => ChallengeKind::Arithmetic,
            Challenge::Shake(_) => ChallengeKind::Shake,
            Challenge::Steps(_) => ChallengeKind::Steps,
            Challenge::Scan(_) => ChallengeKind::Scan,
            Challenge::MemoryMatch(_) => ChallengeKind::MemoryMatch,
        }
    }

    /// Next instant at which [`tick`](Self::tick) changes something.
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Challenge::MemoryMatch(memory) => memory.deadline(),
            _ => None,
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Challenge::MemoryMatch(memory) = self {
            memory.tick(now);
        }
    }

    pub fn view(&self) -> ChallengeView {
        match self {
            Challenge::Arithmetic(c) => ChallengeView::Arithmetic {
                left: c.left(),
                right: c.right(),
                error_visible: c.error_visible(),
            },
            Challenge::Shake(c) => ChallengeView::Shake {
                count: c.count(),
                required: c.required(),
            },
            Challenge::Steps(c) => ChallengeView::Steps {
                taken: c.taken(),
                required: c.required(),
                degraded: c.is_degraded(),
            },
            Challenge::Scan(c) => ChallengeView::Scan {
                expects_code: c.expects_code(),
                last_rejected: c.last_rejected(),
            },
            Challenge::MemoryMatch(c) => ChallengeView::MemoryMatch {
                phase: c.phase(),
                cards: c.cards(),
            },
        }
    }
}

/// What the UI needs to render the current challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeView {
    Arithmetic {
        left: u32,
        right: u32,
        error_visible: bool,
    },
    Shake {
        count: u32,
        required: u32,
    },
    Steps {
        taken: u64,
        required: u32,
        degraded: bool,
    },
    Scan {
        expects_code: bool,
        last_rejected: bool,
    },
    MemoryMatch {
        phase: MemoryPhase,
        cards: Vec<CardView>,
    },
}
