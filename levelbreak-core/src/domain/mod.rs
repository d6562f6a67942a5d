//! Domain types shared by the detection, confirmation and exit engines.

pub mod bar;
pub mod instrument;
pub mod side;
pub mod timeframe;

pub use bar::{Bar, Quote};
pub use instrument::Instrument;
pub use side::Side;
pub use timeframe::{Timeframe, TimeframeDefaults};

/// Symbol type alias
pub type Symbol = String;
