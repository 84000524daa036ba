// Price-series math used by the moving-average views
pub mod sma;

pub use sma::{crossovers, simple_moving_average, Crossover, Signal};
