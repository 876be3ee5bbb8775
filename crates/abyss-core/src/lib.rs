//! # abyss-core
//! Foundation types and traits for the abyss curse engine.

pub mod clock;
pub mod constants;
pub mod error;
pub mod events;
pub mod region;
pub mod traits;
pub mod types;
