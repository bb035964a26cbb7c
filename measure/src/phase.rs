//! Measurement phases

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a measurement run
///
/// A run moves strictly forward through the phases; a fatal error resets it
/// to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Connecting,
    Ping,
    Download,
    Upload,
    Complete,
}

impl Phase {
    /// Phase that follows this one in a successful run
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::Connecting),
            Phase::Connecting => Some(Phase::Ping),
            Phase::Ping => Some(Phase::Download),
            Phase::Download => Some(Phase::Upload),
            Phase::Upload => Some(Phase::Complete),
            Phase::Complete => None,
        }
    }

    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Idle | Phase::Complete)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Connecting => "Connecting",
            Phase::Ping => "Ping",
            Phase::Download => "Download",
            Phase::Upload => "Upload",
            Phase::Complete => "Complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut phase = Phase::Idle;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert!(next > phase);
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(phase, Phase::Complete);
        assert!(Phase::Download.is_active());
        assert!(!Phase::Complete.is_active());
    }
}
