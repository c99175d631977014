//! Terminal front-end: interactive chat, one-shot questions and the
//! parameter catalog.

use anyhow::Result;
use futures::StreamExt;
use hivemind_core::swarm::{Coordinator, ParameterCatalog, ParameterOverrides, PipelineResult};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const QUIT: &str = "quit";

/// Read queries line by line until `quit` or end of input. Failed queries
/// are reported and the loop carries on.
pub async fn chat<R, W>(
    coordinator: &Coordinator,
    user_id: &str,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let overrides = ParameterOverrides::new();

    writeln!(out, "Welcome to Hivemind!")?;
    writeln!(out, "Please enter your query (or '{}' to exit):", QUIT)?;

    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.eq_ignore_ascii_case(QUIT) {
            break;
        }
        if query.is_empty() {
            continue;
        }

        match coordinator.ask(query, user_id, &overrides).await {
            Ok(answer) => writeln!(out, "\n{}", answer)?,
            Err(e) => {
                tracing::warn!(error = %e, "Query failed");
                writeln!(out, "\nError: {}", e)?;
                writeln!(out, "Please try again or type '{}' to exit.", QUIT)?;
            }
        }
        writeln!(out, "\n-----------------------------------")?;
    }

    Ok(())
}

/// Answer a single query. With `details`, every stage's output is printed
/// before the answer.
pub async fn ask<W: Write>(
    coordinator: &Coordinator,
    query: &str,
    user_id: &str,
    details: bool,
    out: &mut W,
) -> Result<()> {
    let result = coordinator
        .run(query, user_id, &ParameterOverrides::new())
        .await?;
    if details {
        print_details(&result, out)?;
    }
    writeln!(out, "{}", result.final_text)?;
    out.flush()?;
    Ok(())
}

fn print_details<W: Write>(result: &PipelineResult, out: &mut W) -> Result<()> {
    for output in &result.stage_outputs {
        writeln!(out, "[{}]", output.stage_name)?;
        writeln!(out, "{}\n", output.text)?;
    }
    if result.is_simple {
        writeln!(out, "(answered directly by triage)\n")?;
    }
    Ok(())
}

/// Print fragments as they arrive, with a header whenever the stage changes
pub async fn ask_streaming<W: Write>(
    coordinator: &Coordinator,
    query: &str,
    user_id: &str,
    out: &mut W,
) -> Result<()> {
    let mut events = coordinator.run_streaming(query, user_id, &ParameterOverrides::new())?;
    let mut current_stage = String::new();

    while let Some(event) = events.next().await {
        let event = event?;
        if event.stage_id != current_stage {
            if !current_stage.is_empty() {
                writeln!(out)?;
            }
            writeln!(out, "\n[{}]", event.stage_name)?;
            current_stage = event.stage_id.clone();
        }
        write!(out, "{}", event.fragment)?;
        out.flush()?;
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Pretty-printed parameter catalog
pub fn parameters<W: Write>(catalog: &ParameterCatalog, out: &mut W) -> Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(catalog)?)?;
    out.flush()?;
    Ok(())
}
