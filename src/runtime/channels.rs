//! Channel type definitions for engine communication
//!
//! Two channel types are used:
//! - **Event channel** (broadcast): multi-consumer stream of [`EngineEvent`]s for UI subscribers
//! - **Progress channel** (mpsc): bounded per-tool stream of [`ExecutionEvent`]s to the coordinator

use futures::Stream;
use tokio::sync::{broadcast, mpsc};

use crate::core::EngineEvent;
use crate::tools::ExecutionEvent;

/// Default buffer size for the event broadcast channel
pub const EVENT_CHANNEL_SIZE: usize = 256;

/// Default buffer size for each tool's progress channel
pub const PROGRESS_CHANNEL_SIZE: usize = 32;

// ============================================================================
// Channel Type Aliases
// ============================================================================

/// Sender half of the event broadcast channel (used by the coordinator)
pub type EventSender = broadcast::Sender<EngineEvent>;

/// Receiver half of the event broadcast channel (used by subscribers)
pub type EventReceiver = broadcast::Receiver<EngineEvent>;

/// Sender half of a tool's progress channel
pub type ProgressSender = mpsc::Sender<ExecutionEvent>;

/// Receiver half of a tool's progress channel
pub type ProgressReceiver = mpsc::Receiver<ExecutionEvent>;

// ============================================================================
// Channel Creation
// ============================================================================

/// Create a new event broadcast channel
///
/// Returns the sender. Receivers are created by calling `sender.subscribe()`.
pub fn create_event_channel(capacity: usize) -> EventSender {
    let (tx, _) = broadcast::channel(capacity.max(1));
    tx
}

/// Create a new bounded progress channel pair
pub fn create_progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Turn a broadcast receiver into a stream
///
/// Lagged receivers skip what they missed and keep going; the stream ends
/// when the sender is dropped.
pub fn event_stream(mut rx: EventReceiver) -> impl Stream<Item = EngineEvent> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => yield event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RequestState;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = create_progress_channel(PROGRESS_CHANNEL_SIZE);

        tx.send(ExecutionEvent::Progress("Hello".into())).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ExecutionEvent::Progress(s) if s == "Hello"));
    }

    #[tokio::test]
    async fn test_event_broadcast() {
        let tx = create_event_channel(EVENT_CHANNEL_SIZE);

        // Create multiple subscribers
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        tx.send(EngineEvent::progress("toolu_1", "Hi")).unwrap();

        // Both receivers get the message
        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        assert!(matches!(e1, EngineEvent::ToolProgress { content, .. } if content == "Hi"));
        assert!(matches!(e2, EngineEvent::ToolProgress { content, .. } if content == "Hi"));
    }

    #[tokio::test]
    async fn test_progress_channel_close() {
        let (tx, mut rx) = create_progress_channel(4);

        // Drop sender
        drop(tx);

        // Receiver should get None
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_messages() {
        let tx = create_event_channel(EVENT_CHANNEL_SIZE);

        // First subscriber gets all messages from this point
        let mut rx_early = tx.subscribe();

        tx.send(EngineEvent::progress("t", "Early")).unwrap();

        // Late subscriber joins after first message
        let mut rx_late = tx.subscribe();

        tx.send(EngineEvent::progress("t", "Late")).unwrap();

        // Early subscriber gets both messages
        let e1 = rx_early.recv().await.unwrap();
        let e2 = rx_early.recv().await.unwrap();
        assert!(matches!(e1, EngineEvent::ToolProgress { content, .. } if content == "Early"));
        assert!(matches!(e2, EngineEvent::ToolProgress { content, .. } if content == "Late"));

        // Late subscriber only gets the second message
        let e = rx_late.recv().await.unwrap();
        assert!(matches!(e, EngineEvent::ToolProgress { content, .. } if content == "Late"));
    }

    #[tokio::test]
    async fn test_send_without_subscribers() {
        let tx = create_event_channel(EVENT_CHANNEL_SIZE);

        // Sending without subscribers returns error (0 receivers)
        let result = tx.send(EngineEvent::progress("t", "Nobody listening"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_event_stream_skips_lag() {
        let tx = create_event_channel(2);
        let rx = tx.subscribe();

        for i in 0..4 {
            tx.send(EngineEvent::state_change(format!("t{}", i), RequestState::Pending))
                .unwrap();
        }
        drop(tx);

        let ids: Vec<String> = event_stream(rx)
            .map(|e| e.tool_use_id().unwrap_or_default().to_string())
            .collect()
            .await;
        // Only the newest two survive in a channel of capacity 2
        assert_eq!(ids, vec!["t2", "t3"]);
    }
}
