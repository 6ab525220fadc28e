//! File formats.

pub mod fits;
