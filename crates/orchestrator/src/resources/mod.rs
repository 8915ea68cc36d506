//! RAII resource guards for automatic cleanup.
//!
//! - [`RunGuard`] - Reports an aborted run when a build stops early

mod run_guard;

pub use run_guard::RunGuard;
