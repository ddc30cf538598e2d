//! Ordered walk through an alarm's challenges.

use super::{ChallengeKind, ChallengeOutcome};
use crate::tracing::prelude::*;

/// Tracks which challenge is current and whether dismissal is allowed.
///
/// Unknown kinds are skipped as if solved, both at construction and on
/// every advance, so `current()` only ever yields a known kind. An empty
/// list starts terminal.
#[derive(Debug, Clone)]
pub struct DismissalOrchestrator {
    kinds: Vec<ChallengeKind>,
    index: usize,
}

impl DismissalOrchestrator {
    pub fn new<S: AsRef<str>>(tags: &[S]) -> Self {
        Self::from_kinds(tags.iter().map(|t| ChallengeKind::from_tag(t.as_ref())).collect())
    }

    pub fn from_kinds(kinds: Vec<ChallengeKind>) -> Self {
        let mut orchestrator = Self { kinds, index: 0 };
        orchestrator.skip_unknown();
        orchestrator
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.index >= self.kinds.len()
    }

    pub fn current(&self) -> Option<&ChallengeKind> {
        self.kinds.get(self.index)
    }

    /// Challenges left before dismissal is allowed, the current one
    /// included.
    pub fn remaining(&self) -> usize {
        self.kinds.len().saturating_sub(self.index)
    }

    pub fn report(&mut self, outcome: ChallengeOutcome) {
        match outcome {
            ChallengeOutcome::Solved => self.advance(),
            ChallengeOutcome::Abandoned => {
                debug!(index = self.index, "Challenge abandoned, presenting again");
            }
        }
    }

    /// Move past the current challenge. No-op once terminal.
    pub fn advance(&mut self) {
        if self.is_terminal() {
            return;
        }
        info!(index = self.index, kind = %self.kinds[self.index], "Challenge solved");
        self.index += 1;
        self.skip_unknown();
    }

    fn skip_unknown(&mut self) {
        while let Some(kind) = self.current().filter(|k| !k.is_known()) {
            warn!(index = self.index, tag = %kind, "Unknown challenge, skipping");
            self.index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_challenges_in_order() {
        let mut o = DismissalOrchestrator::new(&["MATH PROBLEM", "SHAKE PHONE"]);

        assert!(!o.is_terminal());
        assert_eq!(o.index(), 0);
        assert_eq!(o.current(), Some(&ChallengeKind::Arithmetic));

        o.report(ChallengeOutcome::Solved);
        assert!(!o.is_terminal());
        assert_eq!(o.index(), 1);
        assert_eq!(o.current(), Some(&ChallengeKind::Shake));

        o.report(ChallengeOutcome::Solved);
        assert!(o.is_terminal());
        assert_eq!(o.current(), None);
    }

    #[test]
    fn empty_list_is_terminal() {
        let o = DismissalOrchestrator::new::<&str>(&[]);
        assert!(o.is_terminal());
        assert_eq!(o.remaining(), 0);
    }

    #[test]
    fn abandoned_keeps_state() {
        let mut o = DismissalOrchestrator::new(&["WALK"]);
        o.report(ChallengeOutcome::Abandoned);
        assert_eq!(o.index(), 0);
        assert!(!o.is_terminal());
    }

    #[test]
    fn unknown_tags_auto_advance() {
        let mut o = DismissalOrchestrator::new(&["TELEPORT", "scan code", "Levitate", "FLY"]);

        assert_eq!(o.index(), 1);
        assert_eq!(o.current(), Some(&ChallengeKind::Scan));

        o.advance();
        assert!(o.is_terminal());
        assert_eq!(o.index(), 4);
    }

    #[test]
    fn only_unknown_tags_start_terminal() {
        let o = DismissalOrchestrator::new(&["FUTURE THING"]);
        assert!(o.is_terminal());
    }

    #[test]
    fn advance_after_terminal_is_noop() {
        let mut o = DismissalOrchestrator::new(&["WALK"]);
        o.advance();
        o.advance();
        assert_eq!(o.index(), 1);
    }
}
