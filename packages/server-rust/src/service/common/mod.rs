//! Descriptors shared by every service.

pub mod params;
pub mod returns;

pub use params::IndexSlice;
