// Event channel between the background download and the UI context
//
// Unbounded FIFO: the producer never blocks and nothing is dropped. The
// receiver is drained on the UI context only, once per loop iteration.

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::models::{JobOutcome, LogLevel, LogLine, ProgressEvent};

pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer side, cloned into the background unit
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<ProgressEvent>,
}

impl EventSender {
    pub fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            // Receiver gone means the UI shut down; nothing left to inform.
            tracing::debug!("[events] receiver dropped, event discarded");
        }
    }

    pub fn progress(&self, percent: f32) {
        self.send(ProgressEvent::Progress(percent));
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.send(ProgressEvent::LogLine(LogLine {
            level,
            message: message.into(),
        }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn done(&self, outcome: JobOutcome) {
        self.send(ProgressEvent::Done(outcome));
    }
}

/// Consumer side, owned by the UI context
#[derive(Debug)]
pub struct EventReceiver {
    rx: UnboundedReceiver<ProgressEvent>,
}

impl EventReceiver {
    /// Take every event queued so far, in production order. Never blocks.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Wait for the next event. For async front-ends and tests.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}
