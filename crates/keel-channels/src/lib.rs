//! Channel abstraction: the `ChannelHandler` seam every messaging platform
//! implements, the webhook transform contract that normalizes inbound
//! payloads, a registry, and the outbound dispatchers.

pub mod dispatch;
pub mod error;
pub mod handler;
pub mod registry;
pub mod transform;

pub use error::ChannelError;
pub use handler::ChannelHandler;
pub use registry::ChannelRegistry;
pub use transform::{ChannelTransform, TransformOutcome};
