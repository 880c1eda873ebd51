//! Single-slot handle for exclusive interactive UI takeover
//!
//! A tool that needs a form (or any blocking interaction) acquires the slot,
//! the UI layer observes the occupant through a watch channel and answers
//! with [`CustomUiSlot::respond`]. Dropping the lease clears the slot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::error::{EngineError, EngineResult};

/// What a tool asks the UI to show while it holds the slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomUiRequest {
    /// Tool use ID of the occupant
    pub owner: String,
    /// Tool-defined payload (e.g. form questions)
    pub payload: Value,
    /// Whether the regular prompt input should be hidden meanwhile
    pub hide_prompt_input: bool,
}

impl CustomUiRequest {
    pub fn new(owner: impl Into<String>, payload: Value) -> Self {
        Self {
            owner: owner.into(),
            payload,
            hide_prompt_input: true,
        }
    }
}

struct Occupant {
    owner: String,
    responder: Option<oneshot::Sender<Value>>,
}

struct SlotInner {
    occupant: Mutex<Option<Occupant>>,
    watch_tx: watch::Sender<Option<CustomUiRequest>>,
}

/// Session-scoped single-occupant UI slot
#[derive(Clone)]
pub struct CustomUiSlot {
    inner: Arc<SlotInner>,
}

impl CustomUiSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(SlotInner {
                occupant: Mutex::new(None),
                watch_tx,
            }),
        }
    }

    /// Subscribe to occupant changes (used by the UI layer)
    pub fn subscribe(&self) -> watch::Receiver<Option<CustomUiRequest>> {
        self.inner.watch_tx.subscribe()
    }

    /// Current occupant, if any
    pub fn current(&self) -> Option<CustomUiRequest> {
        self.inner.watch_tx.borrow().clone()
    }

    /// Check whether the slot is taken
    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }

    /// Take the slot, failing immediately if it is occupied
    pub fn try_acquire(&self, request: CustomUiRequest) -> EngineResult<SlotLease> {
        let mut occupant = self.lock();
        if let Some(existing) = occupant.as_ref() {
            return Err(EngineError::SlotOccupied(existing.owner.clone()));
        }

        let (tx, rx) = oneshot::channel();
        let owner = request.owner.clone();
        *occupant = Some(Occupant {
            owner: owner.clone(),
            responder: Some(tx),
        });
        self.inner.watch_tx.send_replace(Some(request));
        tracing::debug!("[CustomUiSlot] Acquired by {}", owner);

        Ok(SlotLease {
            slot: self.clone(),
            owner,
            answer_rx: Some(rx),
        })
    }

    /// Take the slot, waiting for the current occupant to leave
    pub async fn acquire(
        &self,
        request: CustomUiRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<SlotLease> {
        let mut changes = self.subscribe();
        loop {
            match self.try_acquire(request.clone()) {
                Err(EngineError::SlotOccupied(owner)) => {
                    tracing::debug!(
                        "[CustomUiSlot] {} waiting for {} to release",
                        request.owner,
                        owner
                    );
                }
                other => return other,
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Interrupted),
                changed = changes.changed() => {
                    changed.map_err(|_| EngineError::ChannelClosed)?;
                }
            }
        }
    }

    /// Deliver the UI's answer to the current occupant
    pub fn respond(&self, owner: &str, value: Value) -> EngineResult<()> {
        let mut occupant = self.lock();
        match occupant.as_mut() {
            Some(current) if current.owner == owner => {
                let responder = current.responder.take().ok_or(EngineError::ChannelClosed)?;
                responder.send(value).map_err(|_| EngineError::ChannelClosed)
            }
            Some(current) => Err(EngineError::SlotOccupied(current.owner.clone())),
            None => Err(EngineError::ChannelClosed),
        }
    }

    fn release(&self, owner: &str) {
        let mut occupant = self.lock();
        if occupant.as_ref().is_some_and(|o| o.owner == owner) {
            *occupant = None;
            self.inner.watch_tx.send_replace(None);
            tracing::debug!("[CustomUiSlot] Released by {}", owner);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Occupant>> {
        self.inner
            .occupant
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CustomUiSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CustomUiSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomUiSlot")
            .field("current", &self.current().map(|r| r.owner))
            .finish()
    }
}

/// Exclusive hold on the slot; releases it on drop
pub struct SlotLease {
    slot: CustomUiSlot,
    owner: String,
    answer_rx: Option<oneshot::Receiver<Value>>,
}

impl SlotLease {
    /// Owner of this lease
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Wait for the UI's answer
    pub async fn answer(&mut self) -> EngineResult<Value> {
        let rx = self.answer_rx.take().ok_or(EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.slot.release(&self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_single_occupant() {
        let slot = CustomUiSlot::new();
        let lease = slot
            .try_acquire(CustomUiRequest::new("a", json!({})))
            .unwrap();
        assert!(slot.is_occupied());
        assert_eq!(slot.current().unwrap().owner, "a");

        let second = slot.try_acquire(CustomUiRequest::new("b", json!({})));
        assert!(matches!(second, Err(EngineError::SlotOccupied(owner)) if owner == "a"));

        drop(lease);
        assert!(!slot.is_occupied());
        assert!(slot.current().is_none());
    }

    #[tokio::test]
    async fn test_respond_delivers_answer() {
        let slot = CustomUiSlot::new();
        let mut lease = slot
            .try_acquire(CustomUiRequest::new("form", json!({"q": 1})))
            .unwrap();

        slot.respond("form", json!({"answer": "yes"})).unwrap();
        let answer = lease.answer().await.unwrap();
        assert_eq!(answer, json!({"answer": "yes"}));

        // Wrong owner is refused
        assert!(slot.respond("other", json!(null)).is_err());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let slot = CustomUiSlot::new();
        let cancel = CancellationToken::new();
        let first = slot
            .try_acquire(CustomUiRequest::new("first", json!({})))
            .unwrap();

        let waiter = {
            let slot = slot.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                slot.acquire(CustomUiRequest::new("second", json!({})), &cancel)
                    .await
                    .map(|lease| lease.owner().to_string())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);

        let owner = waiter.await.unwrap().unwrap();
        assert_eq!(owner, "second");
    }

    #[tokio::test]
    async fn test_acquire_cancelled() {
        let slot = CustomUiSlot::new();
        let cancel = CancellationToken::new();
        let _first = slot
            .try_acquire(CustomUiRequest::new("first", json!({})))
            .unwrap();

        cancel.cancel();
        let result = slot
            .acquire(CustomUiRequest::new("second", json!({})), &cancel)
            .await;
        assert!(matches!(result, Err(EngineError::Interrupted)));
    }
}
