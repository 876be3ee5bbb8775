//! # abyss-curse: the curse engine.
//!
//! Pure, synchronous and clock-injected. Every operation takes `now`
//! explicitly and reports side effects through a
//! [`CurseEventSink`](abyss_core::traits::CurseEventSink):
//! - **Rise accumulation**: sliding-window ascent sum, expired oldest-first
//!   and paid off newest-first on descent.
//! - **Region classification**: height bands, Chebyshev chunk containment,
//!   curse arm and exemptions.
//! - **State machine**: trigger, duration scaling by arm, expiry, and the
//!   death, respawn and join interrupts.
//! - **Narehate conversion**: independent exposure stopwatch with an
//!   exponential per-check conversion probability.

pub mod classifier;
pub mod exemption;
pub mod machine;
pub mod narehate;
pub mod rise;
pub mod state;

pub use classifier::RegionClassifier;
pub use exemption::ExemptionRegistry;
pub use machine::{calc_duration, CurseStateMachine, SampleOutcome};
pub use narehate::{conversion_probability, NarehateConverter, NarehateOutcome};
pub use rise::{RiseAccumulator, RiseRecord};
pub use state::EntityCurseState;
