use serde_json::Value;
use shopmate_core::FunctionName;
use tokio::sync::mpsc;
use tracing::debug;

use crate::runtime::StopReason;

/// Progress of one turn sequence, in the order it happened.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    PartialText { text: String },
    FunctionCallRequested { name: String, arguments: Value },
    FunctionResult { name: String, success: bool },
    ProgressUpdate { step: u32, max_steps: u32, detail: String },
    AuthenticationRequired {
        function_name: FunctionName,
        reason_code: &'static str,
        user_message: String,
    },
    SequenceEnded { reason: StopReason },
}

/// Producer half of a sequence's event stream.
///
/// Delivery is best-effort: a dropped receiver never fails the sequence, and a
/// consumer may keep reading events after the step they describe has finished.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<TurnEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<TurnEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TurnEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn emit(&self, event: TurnEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).await.is_err() {
            debug!(event_name = "agent.events.receiver_closed", "turn event dropped");
        }
    }

    pub async fn partial_text(&self, text: impl Into<String>) {
        self.emit(TurnEvent::PartialText { text: text.into() }).await;
    }
}
