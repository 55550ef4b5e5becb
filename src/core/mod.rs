//! Core types and constants for the sensing node

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
