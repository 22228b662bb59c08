//! Render the streaming page to stdout.

use anyhow::{bail, Context as _, Result};
use edge_sdk::prelude::*;
use futures::sink;
use tokio::io::AsyncWriteExt;

use super::RenderArgs;
use crate::context::Context;

/// Run the render command.
pub async fn run(args: RenderArgs, ctx: &Context) -> Result<()> {
    let state = args.stream.apply(ctx.app_state())?;
    let execution = state.execution;
    let session = state.session(state.defaults.clone(), execution, RequestId::generate())?;

    // Stdout carries the document; everything else goes to stderr.
    let output = ctx.output.on_stderr();
    output.debug(&format!(
        "rendering {} items ({}, flush {})",
        state.defaults.items, execution, state.defaults.flush_threshold
    ));

    let report = match execution {
        ExecutionModel::Cooperative => {
            let stdout = sink::unfold(tokio::io::stdout(), |mut out, bytes: Vec<u8>| async move {
                out.write_all(&bytes).await?;
                out.flush().await?;
                Ok::<_, std::io::Error>(out)
            });
            session.run(Box::pin(stdout)).await
        }
        ExecutionModel::Blocking => {
            tokio::task::spawn_blocking(move || session.run_blocking(std::io::stdout().lock()))
                .await
                .context("Render thread panicked")?
        }
    };

    if !args.quiet {
        if output.is_json() {
            output.json(&report.metrics);
        } else {
            output.text(&report.metrics.to_summary());
        }
    }

    if let Some(err) = report.error {
        if err.is_client_termination() {
            // stdout closed early, e.g. piped into `head`.
            return Ok(());
        }
        bail!("Render failed: {}", err);
    }

    Ok(())
}
