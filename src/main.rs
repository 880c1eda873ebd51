use std::sync::Arc;

use shadow_tool_engine::cli::{
    answer_forms_with_defaults, read_requests, Console, ConsolePrompter, ConsoleRenderer,
};
use shadow_tool_engine::logging;
use shadow_tool_engine::permissions::{JsonGrantStorage, PermissionStore};
use shadow_tool_engine::{
    EngineConfig, ExecutionCoordinator, SessionContext, ToolRegistry,
};

/// Runs one turn of tool uses read as a JSON array from a file (first
/// argument) or stdin, then prints the result blocks as JSON.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;

    // Keep the guard alive so the file appender flushes on exit
    let _guard = logging::init_logging(&config.logging)?;

    tracing::info!("=== Tool Engine Starting ===");

    let (requests, stdin_free) = match std::env::args().nth(1) {
        Some(path) => (read_requests(tokio::fs::File::open(&path).await?).await?, true),
        None => (read_requests(tokio::io::stdin()).await?, false),
    };
    tracing::info!("Loaded {} tool use request(s)", requests.len());

    let store = match (&config.global_grants_path, &config.project_grants_path) {
        (Some(global), Some(project)) => {
            PermissionStore::new(JsonGrantStorage::new(global.clone(), project.clone())).await?
        }
        _ => PermissionStore::in_memory(),
    };

    let registry = Arc::new(ToolRegistry::from_config(&config));
    tracing::info!("Registered {} tools", registry.len());

    let session = SessionContext::from_config(&config);
    let mut coordinator = ExecutionCoordinator::from_config(&config, Arc::new(store));
    if stdin_free {
        coordinator = coordinator.with_prompter(Arc::new(ConsolePrompter::new()));
    } else {
        tracing::info!("Requests read from stdin, permission prompts are unavailable");
    }

    let renderer = tokio::spawn(ConsoleRenderer::new(coordinator.subscribe()).run());
    tokio::spawn(answer_forms_with_defaults(session.ui_slot.clone(), Console::new()));

    let ctx = session.begin_turn(registry);
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling turn");
            cancel.cancel();
        }
    });

    let turn = coordinator.run_turn(&ctx, requests).await?;
    if let Err(e) = renderer.await {
        tracing::warn!("Renderer task failed: {}", e);
    }

    println!("{}", serde_json::to_string_pretty(&turn.results)?);

    tracing::info!("=== Tool Engine Shutting Down ===");

    Ok(())
}
