#![warn(
    clippy::unwrap_used,
    clippy::cast_lossless,
    clippy::unimplemented,
    clippy::indexing_slicing,
    clippy::expect_used
)]

mod feature;
mod geodesic;
mod math;
mod placement;
mod projection;
mod rectangle;
mod spatial_index;
mod terrain;

pub use feature::*;
pub use geodesic::*;
pub use math::*;
pub use placement::*;
pub use projection::*;
pub use rectangle::*;
pub use spatial_index::*;
pub use terrain::*;
