//! `tinyrag ask` — Answer one question, streaming tokens to stdout.
//!
//! Answer text goes to stdout; metadata, retrieval traces and tool activity
//! go to stderr so the answer can be piped.

use std::io::Write;
use tokio::sync::mpsc;

use tinyrag_agent::{Session, SessionEvent, SessionOutcome, SessionRequest};
use tinyrag_gateway::AppState;

pub async fn run(request: SessionRequest) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::open_state().await?;
    let outcome = answer(&state, request).await?;
    eprintln!("  chat: {}", outcome.chat_id);
    Ok(())
}

/// Run one session against `state`, printing events as they arrive.
pub(crate) async fn answer(
    state: &AppState,
    request: SessionRequest,
) -> Result<SessionOutcome, Box<dyn std::error::Error>> {
    let session = Session::new(
        state.provider.current(),
        state.store.clone(),
        state.chats.clone(),
        state.settings.snapshot(),
    )
    .with_retrieval(state.config.retrieval.clone())
    .with_tools(state.config.tools.clone());

    let (tx, mut rx) = mpsc::channel::<SessionEvent>(64);
    let printer = tokio::spawn(async move {
        let mut out = std::io::stdout();
        let mut err = std::io::stderr();
        while let Some(event) = rx.recv().await {
            if let Err(e) = render(&event, &mut out, &mut err) {
                tracing::debug!(error = %e, "Output closed, stopping");
                break;
            }
        }
    });

    let outcome = session.run(request, &tx).await;
    drop(tx);
    let _ = printer.await;
    Ok(outcome?)
}

/// Print one event. Tokens are flushed immediately.
pub(crate) fn render(event: &SessionEvent, out: &mut dyn Write, err: &mut dyn Write) -> std::io::Result<()> {
    match event {
        SessionEvent::Meta(meta) => {
            writeln!(
                err,
                "  [{}] {} · k={} of {} chunks · persona {}",
                meta.mode.as_str(),
                meta.models.chat_model,
                meta.k,
                meta.total_chunks,
                meta.persona_name
            )?;
        }
        SessionEvent::Debug(info) => {
            let trace = &info.retrieval;
            writeln!(
                err,
                "  retrieval: {} (embed {} ms, search {} ms, context {} chars)",
                trace.decision, trace.embed_ms, trace.search_ms, info.context_chars
            )?;
            for chunk in &trace.chunks {
                let marker = if chunk.is_neighbor { " (neighbor)" } else { "" };
                writeln!(
                    err,
                    "    {:.3}  {}#{}{marker}",
                    chunk.score, chunk.article, chunk.chunk_idx
                )?;
            }
        }
        SessionEvent::Token { content } => {
            write!(out, "{content}")?;
            out.flush()?;
        }
        SessionEvent::ToolRequest { tool, query } => {
            writeln!(err)?;
            writeln!(err, "  [tool] {tool}: {query}")?;
        }
        SessionEvent::ToolResult(result) => match (&result.source, &result.error) {
            (Some(source), None) => {
                let chars = result.output.as_deref().map_or(0, str::len);
                writeln!(err, "  [tool] {source}: {chars} chars added")?;
            }
            (_, Some(error)) if result.allowed == Some(false) => {
                writeln!(err, "  [tool] {} denied: {error}", result.tool)?;
            }
            (_, error) => {
                writeln!(
                    err,
                    "  [tool] {} failed: {}",
                    result.tool,
                    error.as_deref().unwrap_or("unknown error")
                )?;
            }
        },
        SessionEvent::Error { message } => {
            writeln!(err)?;
            writeln!(err, "  [Error] {message}")?;
        }
        SessionEvent::Done => {
            writeln!(out)?;
            out.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyrag_agent::ToolResultEvent;

    fn rendered(events: &[SessionEvent]) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        for event in events {
            render(event, &mut out, &mut err).unwrap();
        }
        (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
    }

    #[test]
    fn tokens_go_to_stdout() {
        let (out, err) = rendered(&[
            SessionEvent::token("Mars ist "),
            SessionEvent::token("rot."),
            SessionEvent::Done,
        ]);
        assert_eq!(out, "Mars ist rot.\n");
        assert!(err.is_empty());
    }

    #[test]
    fn tool_activity_goes_to_stderr() {
        let (out, err) = rendered(&[
            SessionEvent::ToolRequest {
                tool: "sandbox".into(),
                query: "print(1)".into(),
            },
            SessionEvent::ToolResult(ToolResultEvent::denied("sandbox", "print(1)", "disabled")),
            SessionEvent::ToolResult(ToolResultEvent::succeeded("calculate", "6*7", "calc:6*7", "6*7 = 42")),
            SessionEvent::ToolResult(ToolResultEvent::failed("wikipedia", "Mars", "HTTP 500")),
        ]);
        assert!(out.is_empty());
        assert!(err.contains("[tool] sandbox: print(1)"));
        assert!(err.contains("[tool] sandbox denied: disabled"));
        assert!(err.contains("[tool] calc:6*7: 8 chars added"));
        assert!(err.contains("[tool] wikipedia failed: HTTP 500"));
    }

    #[test]
    fn errors_are_reported() {
        let (_, err) = rendered(&[SessionEvent::Error {
            message: "LLM-Fehler: refused".into(),
        }]);
        assert!(err.contains("[Error] LLM-Fehler: refused"));
    }
}
