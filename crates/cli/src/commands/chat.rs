//! `tinyrag chat` — Interactive questions within one conversation.

use tokio::io::{AsyncBufReadExt, BufReader};

use tinyrag_agent::SessionRequest;

pub async fn run(
    chat_id: Option<String>,
    persona_id: Option<String>,
    deep: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = super::open_state().await?;
    let settings = state.settings.snapshot();

    println!();
    println!("  tinyRAG — Interactive Mode");
    println!();
    println!("  Backend:   {}", settings.base_url);
    println!("  Model:     {}", settings.chat_model);
    println!("  Chunks:    {}", state.store.count_all().await?);
    if deep {
        println!("  Mode:      deep research");
    }
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut chat_id = chat_id;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if matches!(question, "exit" | "quit") {
            break;
        }
        if question.is_empty() {
            prompt()?;
            continue;
        }

        let mut request = SessionRequest::new(question);
        request.chat_id = chat_id.clone();
        request.persona_id = persona_id.clone();
        request.deep = deep;

        println!();
        match super::ask::answer(&state, request).await {
            Ok(outcome) => chat_id = Some(outcome.chat_id),
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
        prompt()?;
    }

    println!();
    if let Some(id) = chat_id {
        println!("  Conversation saved as {id}");
    }
    println!();

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("  You > ");
    std::io::stdout().flush()
}
