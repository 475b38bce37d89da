//! Mathematical utilities: structural similarity and series preprocessing.

pub mod preprocess;
pub mod ssim;

pub use preprocess::*;
pub use ssim::*;
