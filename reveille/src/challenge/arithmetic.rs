//! Sum of two random operands.

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Progress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArithmeticConfig {
    pub min_operand: u32,
    pub max_operand: u32,
}

impl Default for ArithmeticConfig {
    fn default() -> Self {
        Self {
            min_operand: 10,
            max_operand: 99,
        }
    }
}

impl ArithmeticConfig {
    fn operand_range(&self) -> RangeInclusive<u32> {
        let lo = self.min_operand.min(self.max_operand);
        let hi = self.min_operand.max(self.max_operand);
        lo..=hi
    }
}

/// Retries are unlimited. A wrong answer only shows the error state until
/// the next submission.
#[derive(Debug, Clone)]
pub struct ArithmeticChallenge {
    left: u32,
    right: u32,
    error_visible: bool,
    solved: bool,
}

impl ArithmeticChallenge {
    pub fn new<R: Rng + ?Sized>(config: &ArithmeticConfig, rng: &mut R) -> Self {
        Self::with_operands(
            rng.random_range(config.operand_range()),
            rng.random_range(config.operand_range()),
        )
    }

    pub fn with_operands(left: u32, right: u32) -> Self {
        Self {
            left,
            right,
            error_visible: false,
            solved: false,
        }
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn right(&self) -> u32 {
        self.right
    }

    pub fn error_visible(&self) -> bool {
        self.error_visible
    }

    /// Check a typed answer. Input that is not an integer counts as wrong.
    pub fn submit(&mut self, answer: &str) -> Progress {
        if self.solved {
            return Progress::Solved;
        }
        let expected = u64::from(self.left) + u64::from(self.right);
        match answer.trim().parse::<u64>() {
            Ok(value) if value == expected => {
                self.solved = true;
                self.error_visible = false;
                Progress::Solved
            }
            _ => {
                self.error_visible = true;
                Progress::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn operands_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = ArithmeticConfig::default();
        for _ in 0..200 {
            let c = ArithmeticChallenge::new(&config, &mut rng);
            assert!((10..=99).contains(&c.left()));
            assert!((10..=99).contains(&c.right()));
        }
    }

    #[test]
    fn wrong_answer_shows_error_and_allows_retry() {
        let mut c = ArithmeticChallenge::with_operands(23, 48);

        assert_eq!(c.submit("70"), Progress::Pending);
        assert!(c.error_visible());
        assert_eq!(c.submit("seventy-one"), Progress::Pending);
        assert_eq!(c.submit(""), Progress::Pending);

        assert_eq!(c.submit(" 71 "), Progress::Solved);
        assert!(!c.error_visible());
        assert_eq!(c.submit("0"), Progress::Solved);
    }

    #[test]
    fn inverted_range_is_normalized() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = ArithmeticConfig {
            min_operand: 5,
            max_operand: 2,
        };
        let c = ArithmeticChallenge::new(&config, &mut rng);
        assert!((2..=5).contains(&c.left()));
    }
}
