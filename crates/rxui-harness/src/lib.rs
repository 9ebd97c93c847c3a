#![forbid(unsafe_code)]

//! Test harness: deterministic schedulers and fixtures.
//!
//! # Role in rxui
//! `rxui-harness` makes scheduled delivery testable. Every component that
//! delivers on a scheduler accepts one explicitly or captures it from a
//! [`rxui_core::SchedulerContext`]; the harness supplies schedulers whose
//! timing the test controls and scopes that install them.
//!
//! # Contents
//! - [`TestScheduler`]: virtual millisecond clock driven by the test.
//! - [`CountingScheduler`]: counts units scheduled and executed.
//! - [`SchedulerScope`] / [`with_scheduler`]: thread-local slot overrides
//!   that restore on drop.
//! - [`install_test_context`]: test-mode process-wide context.
//! - [`init_test_tracing`]: `RUST_LOG`-filtered tracing output in tests.

pub mod counting;
pub mod logging;
pub mod scope;
pub mod test_scheduler;

pub use counting::CountingScheduler;
pub use logging::init_test_tracing;
pub use scope::{SchedulerScope, install_test_context, with_scheduler, with_slot};
pub use test_scheduler::TestScheduler;
