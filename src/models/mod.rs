//! Data models for rap rounds.
//!
//! These models are the shared document contract with the admin application;
//! field names serialize in camelCase to match the round document shape.

mod meta;
mod round;
mod vote;
mod word;

pub use meta::*;
pub use round::*;
pub use vote::*;
pub use word::*;
