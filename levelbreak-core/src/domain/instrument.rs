use serde::{Deserialize, Serialize};

/// Instrument metadata: price granularity and lot sizing.
///
/// `pip_size` parameterizes every distance the configuration expresses in
/// pips (touch zone, breakeven, trailing); `tick_size` is the smallest price
/// increment and bounds the minimum stop improvement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub tick_size: f64,
    pub pip_size: f64,
    pub lot_step: f64,
    pub min_lot: f64,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, tick_size: f64, pip_size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            pip_size,
            lot_step: 0.01,
            min_lot: 0.01,
        }
    }

    /// Typical five-digit forex pair: 0.00001 tick, 0.0001 pip.
    pub fn forex(symbol: impl Into<String>) -> Self {
        Self::new(symbol, 0.00001, 0.0001)
    }

    pub fn with_lots(mut self, lot_step: f64, min_lot: f64) -> Self {
        self.lot_step = lot_step;
        self.min_lot = min_lot;
        self
    }

    /// Convert a distance in pips to a price distance.
    pub fn pips(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }

    /// Convert a price distance to pips.
    pub fn to_pips(&self, distance: f64) -> f64 {
        distance / self.pip_size
    }

    /// Round price to the nearest tick.
    pub fn round_price(&self, price: f64) -> f64 {
        (price / self.tick_size).round() * self.tick_size
    }

    /// Round a lot quantity down to the lot step.
    ///
    /// The epsilon keeps `0.3 / 0.1` from flooring to 2 on binary rounding.
    pub fn round_lots(&self, lots: f64) -> f64 {
        ((lots / self.lot_step) + 1e-9).floor() * self.lot_step
    }
}
