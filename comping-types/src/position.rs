use serde::{Deserialize, Serialize};

/// A position in a song: bar index and beat offset within that bar.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub bar: i32,
    pub beat: f64,
}

impl Position {
    pub fn new(bar: i32, beat: f64) -> Self {
        Self { bar, beat }
    }

    /// Whole-beat position, useful to detect beat crossings.
    pub fn floor_beat(&self) -> Position {
        Position::new(self.bar, self.beat.floor())
    }

    pub fn is_first_bar_beat(&self) -> bool {
        self.beat.abs() < f64::EPSILON
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(0, 0.0)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.bar, self.beat)
    }
}
