//! Serve the streaming page over HTTP.

use anyhow::{Context as _, Result};
use tokio::net::TcpListener;
use tracing::info;

use super::ServeArgs;
use crate::context::Context;

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let state = args.stream.apply(ctx.app_state())?;
    let listen = args
        .listen
        .unwrap_or_else(|| ctx.config.server.listen.clone());

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    let addr = listener.local_addr()?;

    ctx.output.success(&format!("Serving on http://{}/", addr));
    ctx.output.kv("items", &state.defaults.items.to_string());
    ctx.output.kv("delay", &format!("{:?}", state.defaults.delay));
    ctx.output.kv("flush", &state.defaults.flush_threshold.to_string());
    ctx.output.kv("execution", &state.execution.to_string());

    info!(
        %addr,
        items = state.defaults.items,
        delay = ?state.defaults.delay,
        execution = %state.execution,
        "server starting"
    );

    let router = shadow_dom_streaming::router(state);

    // Graceful shutdown on Ctrl-C. In-flight streams see their transport
    // close and end as disconnected.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
        })
        .await
        .context("Server error")?;

    info!("server stopped");
    Ok(())
}
