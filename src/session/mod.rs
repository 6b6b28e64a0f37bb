//! Backend session subsystem.
//!
//! # Data Flow
//! ```text
//! env token + static address ─┐
//! session file (watched)  ────┼→ registry.rs set_session (validate, probe, swap)
//! admin PUT /admin/session ───┘
//!
//! request dispatch → registry.get_active_session() → Arc<Session> snapshot
//!                  → credentials.rs build_auth_header (per request)
//! ```

pub mod credentials;
pub mod file;
pub mod registry;
pub mod token;
pub mod watcher;

pub use credentials::{auth_header_value, build_auth_header};
pub use file::{load_session_file, SessionSpec};
pub use registry::{Session, SessionRegistry};
pub use token::Token;
pub use watcher::SessionFileWatcher;
