//! Console Renderer - Subscribes to engine events and renders them to the terminal
//!
//! The `ConsoleRenderer` is an opt-in component that:
//! - Follows the coordinator's event stream
//! - Prints tool starts, streamed progress and final presentations
//! - Answers custom UI forms (AskUserQuestion) with each question's first option
//!
//! This can be replaced with other renderers (Tauri UI, Web UI, etc.)

use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast::error::RecvError;

use crate::core::{CustomUiRequest, CustomUiSlot, EngineEvent, RequestState};
use crate::runtime::EventReceiver;
use crate::tools::common::ask_user_question::UserQuestion;

use super::console::Console;

#[derive(Deserialize)]
struct QuestionForm {
    questions: Vec<UserQuestion>,
}

/// Console renderer for one engine
///
/// # Example
///
/// ```ignore
/// let renderer = ConsoleRenderer::new(coordinator.subscribe());
/// tokio::spawn(renderer.run());
/// ```
pub struct ConsoleRenderer {
    events: EventReceiver,
    console: Console,
    /// Whether to show streamed tool output
    show_progress: bool,
}

impl ConsoleRenderer {
    /// Create a new console renderer for an event subscription
    pub fn new(events: EventReceiver) -> Self {
        Self {
            events,
            console: Console::new(),
            show_progress: true,
        }
    }

    /// Create a renderer with a custom console
    pub fn with_console(events: EventReceiver, console: Console) -> Self {
        Self {
            events,
            console,
            show_progress: true,
        }
    }

    /// Set whether to show streamed tool output
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Render events until the turn completes or the engine goes away
    pub async fn run(mut self) {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    let done = event.is_terminal();
                    self.render(event);
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Renderer lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn render(&self, event: EngineEvent) {
        match event {
            EngineEvent::ToolQueued { id, name } => {
                tracing::debug!("Queued {} ({})", name, id);
            }
            EngineEvent::StateChange { id, state } => {
                tracing::debug!("{} -> {}", id, state);
            }
            EngineEvent::PermissionRequested { tool_name, .. } => {
                tracing::debug!("Waiting for permission: {}", tool_name);
            }
            EngineEvent::ToolStart { name, .. } => {
                self.console.print_tool_action(&name, "executing...");
            }
            EngineEvent::ToolProgress { content, .. } => {
                if self.show_progress {
                    self.console.print_progress(&content);
                }
            }
            EngineEvent::ToolEnd {
                state,
                presentation,
                ..
            } => {
                let is_error = !matches!(state, RequestState::Completed);
                self.console.print_presentation(&presentation, is_error);
            }
            EngineEvent::TurnComplete {
                completed,
                interrupted,
            } => {
                self.console.print_separator();
                self.console.print_system(&format!(
                    "{} completed, {} interrupted",
                    completed, interrupted
                ));
            }
        }
    }
}

/// Answer every form posted to the slot with each question's first option
///
/// Keeps a handle to the slot, so it only returns if the watch channel fails;
/// spawn it next to the renderer.
pub async fn answer_forms_with_defaults(slot: CustomUiSlot, console: Console) {
    let mut changes = slot.subscribe();
    loop {
        let current = changes.borrow_and_update().clone();
        if let Some(request) = current {
            answer_form(&slot, &console, request);
        }
        if changes.changed().await.is_err() {
            break;
        }
    }
}

fn answer_form(slot: &CustomUiSlot, console: &Console, request: CustomUiRequest) {
    let form: QuestionForm = match serde_json::from_value(request.payload) {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!("Unsupported custom UI payload from {}: {}", request.owner, e);
            return;
        }
    };

    let mut answers = BTreeMap::new();
    for q in &form.questions {
        console.print_system(&format!("[{}] {}", q.header, q.question));
        for (i, opt) in q.options.iter().enumerate() {
            console.print_system(&format!("  {}. {} - {}", i + 1, opt.label, opt.description));
        }
        if let Some(first_option) = q.options.first() {
            answers.insert(q.header.clone(), first_option.label.clone());
        }
    }

    let answers = match serde_json::to_value(answers) {
        Ok(answers) => answers,
        Err(e) => {
            tracing::warn!("Failed to encode answers: {}", e);
            return;
        }
    };
    if let Err(e) = slot.respond(&request.owner, answers) {
        tracing::debug!("Form from {} not answered: {}", request.owner, e);
    }
}
