//! Event channel between running elements and whoever supervises them.
//!
//! Every element added to a [`Pipeline`](crate::pipeline::Pipeline) gets
//! a hook that forwards its start, stop and error notifications into a
//! bounded crossbeam channel. The receiving half is a [`PipelineMonitor`].
//! When the channel is full, events are dropped rather than blocking a
//! worker.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Notifications published by a running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ElementStarted(String),
    ElementStopped(String),
    /// A routine returned an error or panicked.
    ElementError { element: String, message: String },
    /// `run_to_completion` observed every element finished.
    Finished,
}

/// Create a connected `(sender, monitor)` pair.
pub(crate) fn event_channel(capacity: usize) -> (Sender<PipelineEvent>, PipelineMonitor) {
    let (tx, rx) = bounded(capacity);
    (tx, PipelineMonitor { rx })
}

/// Receiving side of the pipeline event channel.
#[derive(Debug, Clone)]
pub struct PipelineMonitor {
    rx: Receiver<PipelineEvent>,
}

impl PipelineMonitor {
    /// Drain all pending events.
    pub fn drain(&self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Try to receive a single event without blocking.
    pub fn try_recv(&self) -> Option<PipelineEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PipelineEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Errors among the pending events; other events are discarded.
    pub fn drain_errors(&self) -> Vec<(String, String)> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::ElementError { element, message } => Some((element, message)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_order() {
        let (tx, monitor) = event_channel(4);
        tx.send(PipelineEvent::ElementStarted("a".into())).unwrap();
        tx.send(PipelineEvent::Finished).unwrap();
        assert_eq!(
            monitor.drain(),
            [
                PipelineEvent::ElementStarted("a".into()),
                PipelineEvent::Finished
            ]
        );
        assert!(monitor.try_recv().is_none());
    }

    #[test]
    fn test_full_channel_rejects_without_blocking() {
        let (tx, monitor) = event_channel(1);
        tx.try_send(PipelineEvent::Finished).unwrap();
        assert!(tx.try_send(PipelineEvent::Finished).is_err());
        assert_eq!(monitor.drain().len(), 1);
    }

    #[test]
    fn test_drain_errors() {
        let (tx, monitor) = event_channel(4);
        tx.send(PipelineEvent::ElementStopped("a".into())).unwrap();
        tx.send(PipelineEvent::ElementError {
            element: "b".into(),
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(monitor.drain_errors(), [("b".to_string(), "boom".to_string())]);
    }
}
