//! Built-in pipeline element implementations.

pub mod channel_sink;
pub mod collector;
pub mod fn_transform;
pub mod forward;
pub mod iter_source;

pub use channel_sink::ChannelSink;
pub use collector::{CollectorHandle, CollectorSink};
pub use fn_transform::FnTransform;
pub use forward::ForwardNode;
pub use iter_source::IterSource;
