//! ExecutionCoordinator - runs one model turn worth of tool uses
//!
//! For every request the coordinator:
//! 1. Looks the tool up (unknown or disabled tools are rejected)
//! 2. Validates the input against the schema, then semantically
//! 3. Asks the permission gate, prompting the user if needed
//! 4. Runs the tool on its own task and forwards progress as events
//! 5. Projects the outcome into a model result block
//!
//! A turn with only read-only requests runs them concurrently. Any mutating
//! request makes the whole turn run one request at a time, in order.

use futures::future::try_join_all;
use futures::Stream;
use serde_json::Value;
use std::sync::Arc;

use super::channels::{
    create_event_channel, event_stream, EventReceiver, EventSender, EVENT_CHANNEL_SIZE,
    PROGRESS_CHANNEL_SIZE,
};
use super::outcome::{ExecutionOutcome, RejectReason, RequestOutcome, ToolUseRequest, TurnOutcome};
use super::schedule::{plan_execution, ExclusionMonitor, ExecutionMode, PromptSequencer, PromptTicket};
use crate::config::EngineConfig;
use crate::core::{EngineError, EngineEvent, EngineResult, RequestState, ToolError, ToolUseContext};
use crate::permissions::{
    AllowReason, CommandClassifier, GrantScope, PermissionDecision, PermissionGate,
    PermissionGrant, PermissionPrompt, PermissionPrompter, PermissionStore, PromptAnswer,
    RiskClass,
};
use crate::tools::{BuiltinTool, ExecutionEvent, Presentation, ToolInput};

/// Shared per-turn scheduling state
struct TurnState {
    prompts: PromptSequencer,
    exclusion: ExclusionMonitor,
}

/// How a permission prompt ended
enum PromptResult {
    Approved(Option<PermissionGrant>),
    Rejected(Option<String>),
    Cancelled,
}

/// Tracks one request's lifecycle and publishes every transition
struct StateTracker<'a> {
    id: &'a str,
    state: RequestState,
    events: &'a EventSender,
}

impl<'a> StateTracker<'a> {
    fn new(id: &'a str, events: &'a EventSender) -> Self {
        Self {
            id,
            state: RequestState::Pending,
            events,
        }
    }

    fn transition(&mut self, next: RequestState) -> EngineResult<()> {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                "[Coordinator] Illegal transition for {}: {} -> {}",
                self.id,
                self.state,
                next
            );
            return Err(EngineError::invariant(format!(
                "illegal transition {} -> {} for {}",
                self.state, next, self.id
            )));
        }
        tracing::debug!("[Coordinator] {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.events
            .send(EngineEvent::state_change(self.id, next))
            .unwrap_or(0);
        Ok(())
    }
}

/// Drives tool-use requests through gating and execution
pub struct ExecutionCoordinator {
    gate: PermissionGate,
    prompter: Option<Arc<dyn PermissionPrompter>>,
    events: EventSender,
    progress_buffer: usize,
}

impl ExecutionCoordinator {
    /// Coordinator without a prompter; requests that need approval are denied
    pub fn new(store: Arc<PermissionStore>) -> Self {
        Self {
            gate: PermissionGate::new(store),
            prompter: None,
            events: create_event_channel(EVENT_CHANNEL_SIZE),
            progress_buffer: PROGRESS_CHANNEL_SIZE,
        }
    }

    /// Coordinator with the config's channel sizes
    pub fn from_config(config: &EngineConfig, store: Arc<PermissionStore>) -> Self {
        Self {
            gate: PermissionGate::new(store),
            prompter: None,
            events: create_event_channel(config.event_channel_size),
            progress_buffer: config.progress_channel_size,
        }
    }

    /// Set the UI collaborator that answers permission prompts
    pub fn with_prompter(mut self, prompter: Arc<dyn PermissionPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Use a different command classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn CommandClassifier>) -> Self {
        self.gate = self.gate.with_classifier(classifier);
        self
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Engine events as a stream
    pub fn event_stream(&self) -> impl Stream<Item = EngineEvent> {
        event_stream(self.subscribe())
    }

    fn emit(&self, event: EngineEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Run every request of one model turn
    ///
    /// Returns one outcome per request and the result blocks in request
    /// order. Per-request failures are outcomes; only invariant violations
    /// return `Err`, after cancelling the turn.
    pub async fn run_turn(
        &self,
        ctx: &ToolUseContext,
        requests: Vec<ToolUseRequest>,
    ) -> EngineResult<TurnOutcome> {
        let read_only: Vec<bool> = requests
            .iter()
            .map(|r| ctx.tools.get(&r.name).map_or(true, BuiltinTool::is_read_only))
            .collect();
        let mode = plan_execution(&read_only);
        tracing::info!(
            "[Coordinator] Turn with {} request(s), mode: {:?}",
            requests.len(),
            mode
        );

        for request in &requests {
            self.emit(EngineEvent::ToolQueued {
                id: request.id.clone(),
                name: request.name.clone(),
            });
        }

        let turn = TurnState {
            prompts: PromptSequencer::new(),
            exclusion: ExclusionMonitor::new(),
        };

        let result = match mode {
            ExecutionMode::Concurrent => {
                try_join_all(
                    requests
                        .iter()
                        .enumerate()
                        .map(|(index, request)| self.run_request(ctx, &turn, index, request)),
                )
                .await
            }
            ExecutionMode::Serial => {
                let mut outcomes = Vec::with_capacity(requests.len());
                let mut failure = None;
                for (index, request) in requests.iter().enumerate() {
                    match self.run_request(ctx, &turn, index, request).await {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                match failure {
                    Some(e) => Err(e),
                    None => Ok(outcomes),
                }
            }
        };

        let outcomes = match result {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::error!("[Coordinator] Turn aborted: {}", e);
                ctx.cancel();
                return Err(e);
            }
        };

        let results = outcomes.iter().filter_map(|o| o.result.clone()).collect();
        let turn = TurnOutcome { outcomes, results };

        tracing::info!(
            "[Coordinator] Turn complete: {} completed, {} interrupted",
            turn.completed(),
            turn.interrupted()
        );
        self.emit(EngineEvent::TurnComplete {
            completed: turn.completed(),
            interrupted: turn.interrupted(),
        });
        Ok(turn)
    }

    async fn run_request(
        &self,
        ctx: &ToolUseContext,
        turn: &TurnState,
        index: usize,
        request: &ToolUseRequest,
    ) -> EngineResult<RequestOutcome> {
        let ctx = ctx.with_tool_use_id(&request.id);
        let mut tracker = StateTracker::new(&request.id, &self.events);
        let ticket = turn.prompts.ticket(index);

        if ctx.is_cancelled() {
            tracing::info!("[Coordinator] {} not started: turn cancelled", request.id);
            let outcome = ExecutionOutcome::NotStarted;
            return self.finish(&ctx, &mut tracker, request, None, None, RiskClass::Safe, None, outcome);
        }
        tracker.transition(RequestState::Gating)?;

        let Some(tool) = ctx.tools.get(&request.name).cloned() else {
            tracing::info!("[Coordinator] Unknown tool: {}", request.name);
            let outcome = ExecutionOutcome::Rejected(RejectReason::UnknownTool(request.name.clone()));
            return self.finish(&ctx, &mut tracker, request, None, None, RiskClass::Safe, None, outcome);
        };

        let input = match tool.validate_schema(&request.input) {
            Ok(input) => input,
            Err(e) => {
                tracing::info!("[Coordinator] {} schema error: {}", request.id, e);
                let outcome = ExecutionOutcome::Rejected(RejectReason::Schema(e.message));
                return self.finish(&ctx, &mut tracker, request, Some(&tool), None, RiskClass::Safe, None, outcome);
            }
        };
        tracing::debug!("[Coordinator] {} input: {}", request.id, request.input);

        let risk = self.gate.assess(&tool, &input)?;

        if let Err(failure) = tool.validate_input(&input, &ctx).await? {
            tracing::info!("[Coordinator] {} failed validation: {}", request.id, failure);
            let outcome = ExecutionOutcome::Rejected(RejectReason::Validation(failure.message));
            return self.finish(&ctx, &mut tracker, request, Some(&tool), Some(&input), risk, None, outcome);
        }

        let decision = self
            .gate
            .decide(&tool, &input, risk, &ctx, self.prompter.is_some())
            .await?;

        let decision = match decision {
            PermissionDecision::Allow { .. } => decision,
            PermissionDecision::Deny { reason } => {
                let outcome = ExecutionOutcome::Rejected(RejectReason::PolicyDenied(reason.clone()));
                let decision = Some(PermissionDecision::Deny { reason });
                return self.finish(&ctx, &mut tracker, request, Some(&tool), Some(&input), risk, decision, outcome);
            }
            PermissionDecision::Prompt { risk, remember } => {
                let asked = PermissionDecision::Prompt {
                    risk,
                    remember: remember.clone(),
                };
                match self
                    .ask_user(&ctx, &ticket, request, &tool, &input, risk, remember)
                    .await?
                {
                    PromptResult::Approved(grant) => {
                        let approved = PermissionDecision::Allow {
                            grant,
                            reason: AllowReason::UserApproved,
                        };
                        // The filesystem may have moved on while the prompt was open
                        if let Err(failure) = tool.validate_input(&input, &ctx).await? {
                            tracing::info!(
                                "[Coordinator] {} no longer valid after approval: {}",
                                request.id,
                                failure
                            );
                            let outcome =
                                ExecutionOutcome::Rejected(RejectReason::Validation(failure.message));
                            return self.finish(&ctx, &mut tracker, request, Some(&tool), Some(&input), risk, Some(approved), outcome);
                        }
                        approved
                    }
                    PromptResult::Rejected(message) => {
                        let outcome =
                            ExecutionOutcome::Rejected(RejectReason::PermissionDenied { message });
                        return self.finish(&ctx, &mut tracker, request, Some(&tool), Some(&input), risk, Some(asked), outcome);
                    }
                    PromptResult::Cancelled => {
                        let outcome = ExecutionOutcome::Interrupted;
                        return self.finish(&ctx, &mut tracker, request, Some(&tool), Some(&input), risk, Some(asked), outcome);
                    }
                }
            }
        };
        drop(ticket);

        if ctx.is_cancelled() {
            let outcome = ExecutionOutcome::Interrupted;
            return self.finish(&ctx, &mut tracker, request, Some(&tool), Some(&input), risk, Some(decision), outcome);
        }

        tracker.transition(RequestState::Running)?;
        let outcome = self
            .execute(&ctx, turn, &tool, input.clone(), &request.input)
            .await?;
        self.finish(&ctx, &mut tracker, request, Some(&tool), Some(&input), risk, Some(decision), outcome)
    }

    /// Ask the user once, in request order
    #[allow(clippy::too_many_arguments)]
    async fn ask_user(
        &self,
        ctx: &ToolUseContext,
        ticket: &PromptTicket<'_>,
        request: &ToolUseRequest,
        tool: &BuiltinTool,
        input: &ToolInput,
        risk: RiskClass,
        remember: Option<GrantScope>,
    ) -> EngineResult<PromptResult> {
        let Some(prompter) = &self.prompter else {
            return Err(EngineError::invariant(format!(
                "{} needs a prompt but no prompter is set",
                request.id
            )));
        };

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(PromptResult::Cancelled),
            turn = ticket.wait_turn() => turn?,
        }

        let summary = tool.render_tool_use(input, ctx.options.verbose)?;
        let prompt = PermissionPrompt {
            tool_use_id: request.id.clone(),
            tool_name: tool.name().to_string(),
            user_facing_name: tool.user_facing_name().to_string(),
            summary: summary.clone(),
            risk,
            remember: remember.clone(),
            cwd: ctx.cwd.clone(),
        };
        self.emit(EngineEvent::PermissionRequested {
            id: request.id.clone(),
            tool_name: tool.user_facing_name().to_string(),
            summary,
            risk,
        });
        tracing::info!("[Coordinator] Asking user for permission: {} ({})", tool.name(), request.id);

        let answer = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(PromptResult::Cancelled),
            answer = prompter.ask(prompt) => answer,
        };

        match answer {
            PromptAnswer::AllowOnce => {
                tracing::info!("[Coordinator] User allowed {} once", tool.name());
                Ok(PromptResult::Approved(None))
            }
            PromptAnswer::AllowAndRemember => match remember {
                Some(scope) => {
                    tracing::info!(
                        "[Coordinator] User allowed {} and remembered {}",
                        tool.name(),
                        scope.describe()
                    );
                    Ok(PromptResult::Approved(
                        self.gate.remember(tool.name(), scope, ctx).await,
                    ))
                }
                None => {
                    tracing::warn!(
                        "[Coordinator] No scope can be remembered for {}, allowing once",
                        request.id
                    );
                    Ok(PromptResult::Approved(None))
                }
            },
            PromptAnswer::Reject { message } => {
                tracing::info!("[Coordinator] User rejected {}", tool.name());
                Ok(PromptResult::Rejected(message))
            }
        }
    }

    /// Run an allowed request and wait for its terminal event
    async fn execute(
        &self,
        ctx: &ToolUseContext,
        turn: &TurnState,
        tool: &BuiltinTool,
        input: ToolInput,
        raw_input: &Value,
    ) -> EngineResult<ExecutionOutcome> {
        let id = ctx.tool_use_id.clone().unwrap_or_default();
        let _running = turn.exclusion.enter(&id, !tool.is_read_only())?;

        self.emit(EngineEvent::ToolStart {
            id: id.clone(),
            name: tool.name().to_string(),
            input: raw_input.clone(),
        });
        tracing::info!("[Coordinator] Executing {} ({})", tool.name(), id);

        let (mut rx, handle) = tool.spawn_call(input, ctx.clone(), self.progress_buffer)?;

        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            match event {
                ExecutionEvent::Progress(content) => {
                    self.emit(EngineEvent::progress(&id, content));
                }
                ExecutionEvent::Result(output) => {
                    terminal = Some(Ok(output));
                    break;
                }
                ExecutionEvent::Error(e) => {
                    terminal = Some(Err(e));
                    break;
                }
            }
        }
        let joined = handle.await;

        let outcome = match terminal {
            Some(Ok(output)) => {
                if let Some((path, mtime)) = tool.observed_file(&output)? {
                    ctx.file_timestamps.record(path, mtime);
                }
                ExecutionOutcome::Completed(output)
            }
            Some(Err(ToolError::Interrupted)) => ExecutionOutcome::Interrupted,
            Some(Err(e)) if ctx.is_cancelled() => {
                tracing::debug!("[Coordinator] {} failed after cancel: {}", id, e);
                ExecutionOutcome::Interrupted
            }
            Some(Err(e)) => {
                tracing::info!("[Coordinator] {} failed: {}", tool.name(), e);
                ExecutionOutcome::Failed(e.to_string())
            }
            None => match joined {
                Err(join) if join.is_panic() => {
                    tracing::error!("[Coordinator] {} panicked", tool.name());
                    ExecutionOutcome::Failed(format!("{} tool panicked", tool.name()))
                }
                _ => {
                    return Err(EngineError::invariant(format!(
                        "{} ended without a result",
                        id
                    )))
                }
            },
        };
        Ok(outcome)
    }

    /// Move to the terminal state, publish it and build the result block
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        ctx: &ToolUseContext,
        tracker: &mut StateTracker<'_>,
        request: &ToolUseRequest,
        tool: Option<&BuiltinTool>,
        input: Option<&ToolInput>,
        risk: RiskClass,
        decision: Option<PermissionDecision>,
        outcome: ExecutionOutcome,
    ) -> EngineResult<RequestOutcome> {
        let state = outcome.state();
        tracker.transition(state)?;

        let presentation = match (&outcome, tool, input) {
            (ExecutionOutcome::Completed(output), Some(tool), _) => {
                tool.render_result(output, ctx.options.verbose)?
            }
            (
                ExecutionOutcome::Rejected(RejectReason::PermissionDenied { .. }),
                Some(tool),
                Some(input),
            ) => tool.render_rejected(input, ctx)?,
            (ExecutionOutcome::Rejected(reason), _, _) => Presentation::error(reason.model_message()),
            (ExecutionOutcome::Failed(message), _, _) => Presentation::error(message.as_str()),
            (ExecutionOutcome::Interrupted, _, _) => Presentation::error("Interrupted by user"),
            (ExecutionOutcome::NotStarted, _, _) => Presentation::new("Not started"),
            (ExecutionOutcome::Completed(_), None, _) => {
                return Err(EngineError::invariant(format!(
                    "{} completed without a registered tool",
                    request.id
                )))
            }
        };

        let result = outcome.to_result_block(&request.id, tool)?;
        self.emit(EngineEvent::ToolEnd {
            id: request.id.clone(),
            state,
            presentation,
        });
        tracing::info!("[Coordinator] {} ({}) -> {}", request.id, request.name, state);

        Ok(RequestOutcome {
            tool_use_id: request.id.clone(),
            tool_name: request.name.clone(),
            risk,
            decision,
            outcome,
            result,
        })
    }
}

impl std::fmt::Debug for ExecutionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCoordinator")
            .field("gate", &self.gate)
            .field("has_prompter", &self.prompter.is_some())
            .field("progress_buffer", &self.progress_buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionContext;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    fn coordinator() -> ExecutionCoordinator {
        ExecutionCoordinator::new(Arc::new(PermissionStore::in_memory()))
    }

    #[tokio::test]
    async fn test_unknown_tool_is_rejected() {
        let ctx = SessionContext::new("/work").begin_turn(Arc::new(ToolRegistry::with_builtins(1000)));
        let turn = coordinator()
            .run_turn(&ctx, vec![ToolUseRequest::new("t1", "Nope", json!({}))])
            .await
            .unwrap();

        assert_eq!(turn.results.len(), 1);
        assert!(turn.results[0].is_error);
        assert_eq!(turn.results[0].text(), "Error: No such tool available: Nope");
        assert_eq!(turn.outcomes[0].outcome.state(), RequestState::Rejected);
    }

    #[tokio::test]
    async fn test_schema_error_is_rejected() {
        let ctx = SessionContext::new("/work").begin_turn(Arc::new(ToolRegistry::with_builtins(1000)));
        let turn = coordinator()
            .run_turn(
                &ctx,
                vec![ToolUseRequest::new("t1", "Glob", json!({"pattern": "*", "bogus": 1}))],
            )
            .await
            .unwrap();

        assert!(turn.results[0].text().starts_with("InputValidationError: "));
    }

    #[tokio::test]
    async fn test_events_for_completed_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        let ctx = SessionContext::new(dir.path()).begin_turn(Arc::new(ToolRegistry::with_builtins(1000)));

        let coordinator = coordinator();
        let mut events = coordinator.subscribe();
        let turn = coordinator
            .run_turn(&ctx, vec![ToolUseRequest::new("t1", "Read", json!({"file_path": "a.txt"}))])
            .await
            .unwrap();
        assert!(turn.outcomes[0].outcome.is_completed());

        let mut states = Vec::new();
        let mut saw_start = false;
        loop {
            match events.recv().await.unwrap() {
                EngineEvent::StateChange { state, .. } => states.push(state),
                EngineEvent::ToolStart { name, .. } => saw_start = name == "Read",
                EngineEvent::TurnComplete { completed, .. } => {
                    assert_eq!(completed, 1);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_start);
        assert_eq!(
            states,
            vec![RequestState::Gating, RequestState::Running, RequestState::Completed]
        );
    }

    #[tokio::test]
    async fn test_read_records_file_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        let session = SessionContext::new(dir.path());
        let ctx = session.begin_turn(Arc::new(ToolRegistry::with_builtins(1000)));

        coordinator()
            .run_turn(&ctx, vec![ToolUseRequest::new("t1", "Read", json!({"file_path": "a.txt"}))])
            .await
            .unwrap();

        assert!(session.file_timestamps.get(&dir.path().join("a.txt")).is_some());
    }
}
