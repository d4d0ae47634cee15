use serde::{Deserialize, Serialize};

/// Musical time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub upper: u8,
    pub lower: u8,
}

impl TimeSignature {
    pub const TWO_FOUR: TimeSignature = TimeSignature { upper: 2, lower: 4 };
    pub const THREE_FOUR: TimeSignature = TimeSignature { upper: 3, lower: 4 };
    pub const FOUR_FOUR: TimeSignature = TimeSignature { upper: 4, lower: 4 };
    pub const FIVE_FOUR: TimeSignature = TimeSignature { upper: 5, lower: 4 };
    pub const SIX_EIGHT: TimeSignature = TimeSignature { upper: 6, lower: 8 };
    pub const TWELVE_EIGHT: TimeSignature = TimeSignature { upper: 12, lower: 8 };

    /// Values are clamped to at least 1.
    pub fn new(upper: u8, lower: u8) -> Self {
        Self {
            upper: upper.max(1),
            lower: lower.max(1),
        }
    }

    /// Number of quarter-note beats in one bar (6/8 -> 3.0, 3/4 -> 3.0).
    pub fn nb_natural_beats(&self) -> f64 {
        self.upper as f64 * 4.0 / self.lower as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FOUR_FOUR
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.upper, self.lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_beats_use_quarter_notes() {
        assert!((TimeSignature::FOUR_FOUR.nb_natural_beats() - 4.0).abs() < 1e-9);
        assert!((TimeSignature::THREE_FOUR.nb_natural_beats() - 3.0).abs() < 1e-9);
        assert!((TimeSignature::SIX_EIGHT.nb_natural_beats() - 3.0).abs() < 1e-9);
        assert!((TimeSignature::new(3, 8).nb_natural_beats() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn zero_values_are_clamped() {
        let ts = TimeSignature::new(0, 0);
        assert_eq!(ts, TimeSignature::new(1, 1));
    }
}
