//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → port conflict? report owner / reclaim → Listening
//!     Bootstrap session in the background
//!
//! Shutdown (manager.rs):
//!     Signal received → Stop accepting → Drain in-flight → hard stop → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - The client-facing port is bound exactly once
//! - A port conflict fails fast unless reclaim is explicitly enabled
//! - Shutdown has a deadline: in-flight work is aborted after the grace period

pub mod manager;
pub mod port_owner;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use manager::{LifecycleManager, ServeHandles};
pub use port_owner::PortOwner;
pub use shutdown::Shutdown;
pub use state::LifecycleState;
