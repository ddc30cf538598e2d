//! Scan a barcode or QR code.

use super::Progress;

#[derive(Debug, Clone)]
pub struct ScanChallenge {
    expected: Option<String>,
    solved: bool,
    last_rejected: bool,
}

impl ScanChallenge {
    /// With `expected` set only that exact payload is accepted; otherwise
    /// any non-empty payload is.
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.filter(|code| !code.is_empty()),
            solved: false,
            last_rejected: false,
        }
    }

    pub fn expects_code(&self) -> bool {
        self.expected.is_some()
    }

    pub fn last_rejected(&self) -> bool {
        self.last_rejected
    }

    /// Offer a decoded payload. Once one is accepted further scans are
    /// ignored.
    pub fn on_scan(&mut self, payload: &str) -> Progress {
        if self.solved {
            return Progress::Solved;
        }

        let accepted = match &self.expected {
            Some(expected) => payload == expected,
            None => !payload.trim().is_empty(),
        };
        self.last_rejected = !accepted;
        self.solved = accepted;

        if accepted {
            Progress::Solved
        } else {
            Progress::Pending
        }
    }
}
