//! Turn scheduling primitives
//!
//! - [`plan_execution`] picks concurrent or serial execution for a turn
//! - [`PromptSequencer`] hands out prompt turns in request order
//! - [`ExclusionMonitor`] checks at runtime that mutating requests run alone

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

use crate::core::{EngineError, EngineResult};

/// How the requests of one turn are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Every request is read-only; all run at once
    Concurrent,
    /// At least one request mutates; one at a time, in request order
    Serial,
}

/// Decide the execution mode from each request's read-only flag
///
/// Unknown tools count as read-only since they never run.
pub fn plan_execution(read_only: &[bool]) -> ExecutionMode {
    if read_only.iter().all(|r| *r) {
        ExecutionMode::Concurrent
    } else {
        ExecutionMode::Serial
    }
}

// ============================================================================
// Prompt ordering
// ============================================================================

struct SequencerState {
    /// Lowest index that has not released its ticket
    next: usize,
    /// Released indices above `next`
    released: BTreeSet<usize>,
}

/// Orders permission prompts by request index
///
/// Every request holds a [`PromptTicket`] while it is gating. A request may
/// prompt once every earlier request has released its ticket, so prompts are
/// shown one at a time in request order while requests that need no prompt
/// proceed freely.
pub struct PromptSequencer {
    state: Mutex<SequencerState>,
    watermark: watch::Sender<usize>,
}

impl PromptSequencer {
    pub fn new() -> Self {
        let (watermark, _) = watch::channel(0);
        Self {
            state: Mutex::new(SequencerState {
                next: 0,
                released: BTreeSet::new(),
            }),
            watermark,
        }
    }

    /// Ticket for the request at `index`; released when dropped
    pub fn ticket(&self, index: usize) -> PromptTicket<'_> {
        PromptTicket {
            sequencer: self,
            index,
        }
    }

    /// Lowest index still holding its ticket
    pub fn watermark(&self) -> usize {
        *self.watermark.borrow()
    }

    fn release(&self, index: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.released.insert(index);
        let mut next = state.next;
        while state.released.remove(&next) {
            next += 1;
        }
        state.next = next;
        self.watermark.send_replace(next);
    }
}

impl Default for PromptSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// A request's place in the prompt order
pub struct PromptTicket<'a> {
    sequencer: &'a PromptSequencer,
    index: usize,
}

impl PromptTicket<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait until every earlier request has released its ticket
    pub async fn wait_turn(&self) -> EngineResult<()> {
        let mut rx = self.sequencer.watermark.subscribe();
        rx.wait_for(|next| *next >= self.index)
            .await
            .map(|_| ())
            .map_err(|_| EngineError::ChannelClosed)
    }
}

impl Drop for PromptTicket<'_> {
    fn drop(&mut self) {
        self.sequencer.release(self.index);
    }
}

// ============================================================================
// Mutual exclusion check
// ============================================================================

#[derive(Default)]
struct ExclusionState {
    active: usize,
    mutating: bool,
}

/// Runtime check that no mutating request overlaps any other request
///
/// This does not schedule anything; the coordinator's serial mode already
/// guarantees exclusion. Entering in violation is an invariant error.
#[derive(Default)]
pub struct ExclusionMonitor {
    state: Mutex<ExclusionState>,
}

impl ExclusionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a request as running until the guard is dropped
    pub fn enter(&self, tool_use_id: &str, mutating: bool) -> EngineResult<ExclusionGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.mutating || (mutating && state.active > 0) {
            tracing::error!(
                "[Coordinator] {} would overlap a mutating request ({} active)",
                tool_use_id,
                state.active
            );
            return Err(EngineError::invariant(format!(
                "{} started while {} other request(s) were running with a mutating request involved",
                tool_use_id, state.active
            )));
        }
        state.active += 1;
        state.mutating = mutating;
        Ok(ExclusionGuard { monitor: self })
    }

    /// Number of requests currently running
    pub fn active(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
    }
}

/// Running request; leaves the monitor on drop
pub struct ExclusionGuard<'a> {
    monitor: &'a ExclusionMonitor,
}

impl Drop for ExclusionGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .monitor
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.active = state.active.saturating_sub(1);
        if state.active == 0 {
            state.mutating = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_plan_execution() {
        assert_eq!(plan_execution(&[]), ExecutionMode::Concurrent);
        assert_eq!(plan_execution(&[true, true]), ExecutionMode::Concurrent);
        assert_eq!(plan_execution(&[true, false, true]), ExecutionMode::Serial);
    }

    #[tokio::test]
    async fn test_sequencer_waits_for_earlier_tickets() {
        let sequencer = PromptSequencer::new();
        let first = sequencer.ticket(0);
        let second = sequencer.ticket(1);

        // The first request may prompt right away
        first.wait_turn().await.unwrap();

        // The second waits until the first is released
        let blocked = tokio::time::timeout(Duration::from_millis(20), second.wait_turn()).await;
        assert!(blocked.is_err());

        drop(first);
        second.wait_turn().await.unwrap();
        assert_eq!(sequencer.watermark(), 1);
    }

    #[test]
    fn test_sequencer_out_of_order_release() {
        let sequencer = PromptSequencer::new();
        let t0 = sequencer.ticket(0);
        let t1 = sequencer.ticket(1);
        let t2 = sequencer.ticket(2);

        drop(t2);
        assert_eq!(sequencer.watermark(), 0);
        drop(t0);
        assert_eq!(sequencer.watermark(), 1);
        drop(t1);
        assert_eq!(sequencer.watermark(), 3);
    }

    #[test]
    fn test_exclusion_allows_parallel_read_only() {
        let monitor = ExclusionMonitor::new();
        let a = monitor.enter("a", false).unwrap();
        let b = monitor.enter("b", false).unwrap();
        assert_eq!(monitor.active(), 2);
        drop(a);
        drop(b);
        assert_eq!(monitor.active(), 0);
    }

    #[test]
    fn test_exclusion_rejects_overlap_with_mutating() {
        let monitor = ExclusionMonitor::new();

        let reader = monitor.enter("r", false).unwrap();
        let err = monitor.enter("w", true).err().unwrap();
        assert!(err.is_fatal());
        drop(reader);

        let writer = monitor.enter("w", true).unwrap();
        assert!(monitor.enter("r", false).is_err());
        drop(writer);

        assert!(monitor.enter("r", false).is_ok());
    }
}
