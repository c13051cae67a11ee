//! ChannelSink: forwards every value over a crossbeam channel.
//!
//! Lets code outside the pipeline observe any output port by connecting
//! it to one of these. A bounded channel applies backpressure to the
//! sink's worker.

use crate::pipeline::element::{Process, ProcessContext};
use crate::value::Value;
use anyhow::anyhow;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::Arc;

pub struct ChannelSink {
    tx: Sender<Arc<Value>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Arc<Value>>) -> Self {
        Self { tx }
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<Arc<Value>>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }

    pub fn unbounded() -> (Self, Receiver<Arc<Value>>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Process for ChannelSink {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        for (port, value) in ctx.take_all() {
            self.tx
                .send(value)
                .map_err(|_| anyhow!("receiver for port '{}' disconnected", port))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::element::{Element, ElementEvent, MAIN_PORT};
    use crate::pipeline::link::connect;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[test]
    fn test_values_reach_receiver() {
        let (sink, rx) = ChannelSink::unbounded();
        let pump = Element::pump("p");
        let plug = Element::sink("plug", sink);
        connect(&pump, MAIN_PORT, &plug, MAIN_PORT).unwrap();
        pump.emit(MAIN_PORT, 1.5).unwrap();
        pump.emit(MAIN_PORT, 2.5).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.as_f64(), Some(1.5));
        assert_eq!(second.as_f64(), Some(2.5));
    }

    #[test]
    fn test_dropped_receiver_reports_error() {
        let (sink, rx) = ChannelSink::bounded(1);
        drop(rx);
        let pump = Element::pump("p");
        let plug = Element::sink("plug", sink);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        plug.on_event(move |e| {
            if let ElementEvent::Error { message, .. } = e {
                seen.lock().push(message.clone());
            }
        });
        connect(&pump, MAIN_PORT, &plug, MAIN_PORT).unwrap();
        pump.emit(MAIN_PORT, 1i64).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while errors.lock().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(errors.lock()[0].contains("disconnected"));
    }
}
