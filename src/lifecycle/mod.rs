//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → accept loops stop → in-flight connections drain → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
