//! Export functionality for downstream billing and printing systems.

mod report;

pub use report::*;
