//! Async event producers feeding the session channel.
//!
//! Each source owns one background task. A source must stop promptly once
//! `tx.send(..).await` fails, which means the loop has gone away.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{CHANNEL_SEND_FAILURES, Event, FRAME_TICKS, decode_ui_event};

/// Trait implemented by any async event producer.
pub trait AsyncEventSource: Send + 'static {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources spawned together at startup.
#[derive(Default)]
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    /// Spawn all registered sources. Each receives its own sender clone; the
    /// registry is drained so a second call spawns nothing. During shutdown
    /// the caller drops its last sender before awaiting the handles.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Emits [`Event::FrameTick`] every interval.
pub struct FrameTickSource {
    interval: Duration,
}

impl FrameTickSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for FrameTickSource {
    fn name(&self) -> &'static str {
        "frame_tick"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(Event::FrameTick).await.is_err() {
                    break;
                }
                FRAME_TICKS.fetch_add(1, Ordering::Relaxed);
            }
        })
    }
}

/// Reads newline-delimited JSON UI events and forwards them as
/// [`Event::Ui`]. Blank lines and lines starting with `#` are skipped;
/// undecodable lines are logged and skipped. End of input sends
/// [`Event::Shutdown`].
pub struct JsonLinesSource<R> {
    reader: R,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R> AsyncEventSource for JsonLinesSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "json_lines"
    }

    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let reader = self.reader;
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut line_no = 0usize;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(target: "runtime.events", error = %e, "ui_input_read_failed");
                        break;
                    }
                };
                line_no += 1;
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                match decode_ui_event(trimmed) {
                    Ok(ev) => {
                        debug!(target: "runtime.events", line_no, op = ev.op_name(), "ui_event");
                        if tx.send(Event::Ui(ev)).await.is_err() {
                            CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(target: "runtime.events", line_no, error = %e, "ui_event_rejected");
                    }
                }
            }
            if tx.send(Event::Shutdown).await.is_err() {
                CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
            }
        })
    }
}
