//! Method-of-fragments core.
//!
//! For each target day:
//!
//! - `candidates`: collect same-class donor days and apply the variable's admissibility filter
//! - `similarity`: score every admissible donor against the target (continuity-weighted SSIM)
//! - `knn`: rank donors and draw one per simulation run from the top-k
//! - `fragments`: rescale each drawn donor's hourly shape onto the target's daily value
//! - `disaggregate`: the per-day state machine and the batch driver over all days
//! - `sink`: where profiles and candidate diagnostics go

pub mod candidates;
pub mod disaggregate;
pub mod fragments;
pub mod knn;
pub mod similarity;
pub mod sink;

pub use candidates::*;
pub use disaggregate::*;
pub use fragments::*;
pub use knn::*;
pub use similarity::*;
pub use sink::*;
