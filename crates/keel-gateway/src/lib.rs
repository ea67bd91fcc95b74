//! Gateway library surface: state assembly, HTTP routes, and event wiring.
//! The `keel-gateway` binary is a thin shell over these.

pub mod app;
pub mod handlers;
pub mod http;

pub use app::{build_router, AppState};
pub use handlers::{spawn_event_handlers, spawn_heartbeat};
