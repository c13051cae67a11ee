//! Pump/filter/sink dataflow engine.
//!
//! Values flow through typed ports and FIFO links between elements. Each
//! element runs its own worker thread on demand:
//!
//! ```text
//! [Source] ──► [Transform] ──► [Sink]
//!                          └──► [Composite: pump ► ... ► bridge sink]
//! ```
//!
//! # Design
//!
//! - **Notify-driven activation**: a link push notifies its consumer,
//!   which spawns at most one worker once every input is ready.
//! - **Shared fan-out**: one `Arc<Value>` is pushed to every link of an
//!   output port; consumers take ownership copy-on-write.
//! - **Upstream completion**: `is_finished` walks input links back to the
//!   sources and latches once the whole upstream graph has drained.
//! - **Combinators**: [`Composite`] hides a sub-graph behind bridge
//!   elements; [`Loop`] recirculates it until a [`LoopCondition`] fails.

pub mod bridge;
pub mod composite;
pub mod element;
pub mod error;
pub mod executor;
pub mod id;
pub mod link;
pub mod looping;
pub mod nodes;
pub mod parameter;
pub mod port;

pub use bridge::{PipelineEvent, PipelineMonitor};
pub use composite::{Composite, Subgraph};
pub use element::{
    Element, ElementEvent, ElementRole, Lifecycle, Process, ProcessContext, Produce,
    SourceContext, WeakElement, MAIN_PORT,
};
pub use error::{PipelineError, PipelineResult};
pub use executor::{ConnectionInfo, Pipeline};
pub use id::{ElementId, LinkId};
pub use link::{connect, disconnect, Link};
pub use looping::{ConditionFn, IterationBound, Loop, LoopCondition};
pub use parameter::ParameterSet;
pub use port::{Port, PortDescriptor, PortDirection, PortSet};
