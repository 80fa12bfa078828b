#![warn(
    clippy::unwrap_used,
    clippy::cast_lossless,
    clippy::unimplemented,
    clippy::indexing_slicing,
    clippy::expect_used
)]

mod fetch;
mod plugin;
mod throttler;

pub use fetch::*;
pub use plugin::*;
pub use throttler::*;
