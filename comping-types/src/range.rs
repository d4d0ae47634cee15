//! Bar, beat and tick ranges.

use serde::{Deserialize, Serialize};

/// Inclusive range of integers, used for bar indexes.
///
/// The canonical empty range is [`IntRange::EMPTY`]; every range with
/// `to < from` is considered empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntRange {
    pub from: i32,
    pub to: i32,
}

impl IntRange {
    pub const EMPTY: IntRange = IntRange { from: 0, to: -1 };

    /// Create a range. A reversed pair (`to < from`) gives [`IntRange::EMPTY`].
    pub fn new(from: i32, to: i32) -> Self {
        if to < from {
            return Self::EMPTY;
        }
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    pub fn size(&self) -> i32 {
        if self.is_empty() {
            0
        } else {
            self.to - self.from + 1
        }
    }

    pub fn contains(&self, x: i32) -> bool {
        !self.is_empty() && x >= self.from && x <= self.to
    }

    /// True if `other` is fully inside this range. The empty range is inside every range.
    pub fn contains_range(&self, other: &IntRange) -> bool {
        other.is_empty() || (self.contains(other.from) && self.contains(other.to))
    }

    pub fn intersects(&self, other: &IntRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.from <= other.to && other.from <= self.to
    }

    /// Overlapping part of both ranges, or [`IntRange::EMPTY`].
    pub fn intersection(&self, other: &IntRange) -> IntRange {
        if !self.intersects(other) {
            return IntRange::EMPTY;
        }
        IntRange::new(self.from.max(other.from), self.to.min(other.to))
    }
}

impl std::fmt::Display for IntRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else {
            write!(f, "[{}-{}]", self.from, self.to)
        }
    }
}

/// Beat range `[from, to]`. Whether `to` is inside depends on the caller,
/// see [`FloatRange::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub from: f64,
    pub to: f64,
}

impl FloatRange {
    pub const EMPTY: FloatRange = FloatRange { from: 0.0, to: 0.0 };

    /// A reversed or NaN pair gives [`FloatRange::EMPTY`].
    pub fn new(from: f64, to: f64) -> Self {
        if from.is_nan() || to.is_nan() || to < from {
            return Self::EMPTY;
        }
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    pub fn size(&self) -> f64 {
        self.to - self.from
    }

    pub fn contains(&self, x: f64, exclude_upper_bound: bool) -> bool {
        if exclude_upper_bound {
            x >= self.from && x < self.to
        } else {
            x >= self.from && x <= self.to
        }
    }
}

impl std::fmt::Display for FloatRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.3}-{:.3}]", self.from, self.to)
    }
}

/// Tick range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LongRange {
    pub from: i64,
    pub to: i64,
}

impl LongRange {
    pub const EMPTY: LongRange = LongRange { from: 0, to: 0 };

    /// A reversed pair gives [`LongRange::EMPTY`].
    pub fn new(from: i64, to: i64) -> Self {
        if to < from {
            return Self::EMPTY;
        }
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    pub fn size(&self) -> i64 {
        self.to - self.from
    }

    pub fn contains(&self, x: i64, exclude_upper_bound: bool) -> bool {
        if exclude_upper_bound {
            x >= self.from && x < self.to
        } else {
            x >= self.from && x <= self.to
        }
    }
}

impl std::fmt::Display for LongRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{}]", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_int_range_has_zero_size() {
        assert!(IntRange::EMPTY.is_empty());
        assert_eq!(IntRange::EMPTY.size(), 0);
        assert!(!IntRange::EMPTY.contains(0));
    }

    #[test]
    fn reversed_bounds_give_empty_ranges() {
        assert_eq!(IntRange::new(5, 2), IntRange::EMPTY);
        assert_eq!(FloatRange::new(3.0, 1.0), FloatRange::EMPTY);
        assert_eq!(FloatRange::new(f64::NAN, 1.0), FloatRange::EMPTY);
        assert_eq!(LongRange::new(960, 0), LongRange::EMPTY);
        assert_eq!(IntRange::new(4, 4).size(), 1);
    }

    #[test]
    fn intersection_of_overlapping_ranges() {
        let a = IntRange::new(0, 7);
        let b = IntRange::new(4, 11);
        assert!(a.intersects(&b));
        assert_eq!(a.intersection(&b), IntRange::new(4, 7));
    }

    #[test]
    fn disjoint_ranges_intersect_to_empty() {
        let a = IntRange::new(0, 3);
        let b = IntRange::new(4, 7);
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn contains_range_accepts_empty() {
        let a = IntRange::new(2, 5);
        assert!(a.contains_range(&IntRange::EMPTY));
        assert!(a.contains_range(&IntRange::new(3, 5)));
        assert!(!a.contains_range(&IntRange::new(3, 6)));
    }

    #[test]
    fn float_range_upper_bound_exclusion() {
        let r = FloatRange::new(0.0, 48.0);
        assert!(r.contains(48.0, false));
        assert!(!r.contains(48.0, true));
        assert!(r.contains(0.0, true));
    }
}
