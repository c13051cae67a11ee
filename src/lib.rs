//! # pumpflow: a pump/filter/sink dataflow engine
//!
//! Elements exchange typed, unit-aware values over FIFO links. Sources
//! run a production routine on their own thread; sinks and transforms
//! spawn at most one worker on demand once every input holds a value.
//! Composite and loop wrappers package whole sub-graphs as one element.
//!
//! ## Modules
//!
//! - **value**: scalars, quantities with units, records and lists, the
//!   abstract-type registry and the generic tree serialization
//! - **pipeline**: ports, links, element roles, wrappers and the
//!   [`Pipeline`](pipeline::Pipeline) orchestrator
//! - **config**: engine settings stored as JSON
//!
//! ## Example
//!
//! ```ignore
//! use pumpflow::pipeline::nodes::{CollectorSink, IterSource};
//! use pumpflow::pipeline::{Element, Pipeline, MAIN_PORT};
//! use std::time::Duration;
//!
//! let mut pipeline = Pipeline::default();
//! let (collector, results) = CollectorSink::new();
//! pipeline.add_element(IterSource::new([1i64, 2, 3]).into_element("src"))?;
//! pipeline.add_element(Element::sink("sink", collector))?;
//! pipeline.connect("src", MAIN_PORT, "sink", MAIN_PORT)?;
//! pipeline.run_to_completion(Duration::from_secs(1))?;
//! assert_eq!(results.len(), 3);
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod value;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{FlowError, Result, ResultExt};
pub use pipeline::{Composite, Element, Loop, Pipeline, PipelineError};
pub use value::{Record, Value, ValueError};
