//! Domain core of the progress and certification engine.
//!
//! Everything here is pure: no storage, no clocks beyond the injectable
//! [`Clock`], no I/O.

pub mod aggregator;
pub mod error;
pub mod model;
pub mod resume;
pub mod time;

pub use error::Error;
pub use time::Clock;
