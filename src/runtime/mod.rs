//! Turn execution
//!
//! - `ExecutionCoordinator` - gates, runs and projects a turn's tool uses
//! - `schedule` - concurrency plan, prompt ordering and the exclusion check
//! - Channel types for engine events and tool progress
//!
//! Tools run on their own tokio tasks and report through a bounded progress
//! channel; the coordinator republishes everything on a broadcast channel
//! that any number of UI subscribers can follow.

pub mod channels;
pub mod coordinator;
pub mod schedule;

mod outcome;

pub use channels::{EventReceiver, EventSender, ProgressReceiver, ProgressSender};
pub use coordinator::ExecutionCoordinator;
pub use outcome::{ExecutionOutcome, RejectReason, RequestOutcome, ToolUseRequest, TurnOutcome};
pub use schedule::{plan_execution, ExclusionMonitor, ExecutionMode, PromptSequencer};
