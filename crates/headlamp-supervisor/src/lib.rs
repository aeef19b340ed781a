//! Dashboard process supervision for headlamp-host
//!
//! This crate launches the Headlamp server binary against a kubeconfig file,
//! forwards its output to the log, and replaces it when the kubeconfig changes.

mod error;
mod output;
mod supervisor;

pub use error::SupervisorError;
pub use output::{OutputLine, OutputStream};
pub use supervisor::{ProcessSupervisor, SupervisorConfig};

// Re-export types used in our public API
pub use headlamp_types::DashboardStatus;
