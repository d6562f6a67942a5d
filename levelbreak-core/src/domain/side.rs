use serde::{Deserialize, Serialize};
use std::fmt;

/// Position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for long, -1.0 for short. Multiplying a price difference by the
    /// direction turns "favorable" into "positive" for both sides.
    pub fn direction(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Signed profit of moving from `entry` to `price`, in price units.
    pub fn profit(self, entry: f64, price: f64) -> f64 {
        (price - entry) * self.direction()
    }

    /// Price `distance` away from `from` in the favorable direction.
    pub fn ahead(self, from: f64, distance: f64) -> f64 {
        from + distance * self.direction()
    }

    /// Price `distance` away from `from` in the adverse direction.
    pub fn behind(self, from: f64, distance: f64) -> f64 {
        from - distance * self.direction()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("long"),
            Side::Short => f.write_str("short"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_is_signed_by_side() {
        assert!((Side::Long.profit(1.1000, 1.1010) - 0.0010).abs() < 1e-12);
        assert!((Side::Short.profit(1.1000, 1.1010) + 0.0010).abs() < 1e-12);
    }

    #[test]
    fn ahead_and_behind() {
        assert!((Side::Long.ahead(1.0, 0.5) - 1.5).abs() < 1e-12);
        assert!((Side::Short.ahead(1.0, 0.5) - 0.5).abs() < 1e-12);
        assert!((Side::Long.behind(1.0, 0.5) - 0.5).abs() < 1e-12);
        assert!((Side::Short.behind(1.0, 0.5) - 1.5).abs() < 1e-12);
    }
}
