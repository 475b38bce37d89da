//! `mof-disagg` library crate.
//!
//! The binary (`mof`) is a thin wrapper around this library so that:
//!
//! - the disaggregation core is testable without spawning processes
//! - the pipeline can be driven from in-memory series (tests, other front-ends)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod classify;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod mof;
pub mod report;
