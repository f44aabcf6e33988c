//! System prompt construction.
//!
//! Layout: persona preamble, assistant instructions, the tool catalog with
//! the request format, an optional deep-research block and finally the
//! retrieved context. When the whole prompt grows past the ceiling only the
//! context is shortened.

use std::fmt::Write as _;
use tinyrag_core::tool::ToolDescriptor;

use crate::tool_protocol::ToolRequestGrammar;

pub const TRUNCATION_MARKER: &str = "\n[... Kontext gekürzt ...]";

const DEEP_RESEARCH_BLOCK: &str = "\n--- DEEP-RESEARCH MODE ---\nGib eine strukturierte, gut durchdachte Antwort basierend auf dem Kontext:\n1) Kurze Zusammenfassung der Erkenntnisse\n2) Quellenangaben: relevante Chunks und Artikel\n3) Konfidenzlevel und alternative Interpretationen\n4) Finale prägnante Antwort\nZeige keine interne Logik; nur Analyse und Ergebnis.\n";

/// Inputs for one system prompt.
pub struct PromptParts<'a> {
    pub context: &'a str,
    pub tools: &'a [ToolDescriptor],
    pub grammar: &'a dyn ToolRequestGrammar,
    pub persona_prompt: &'a str,
    pub deep: bool,
}

/// A finished prompt and the context that ended up in it.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemPrompt {
    pub text: String,
    pub context_chars: usize,
    pub truncated: bool,
}

/// Build the prompt, cutting the context to `truncated_context` chars when
/// the prompt exceeds `ceiling` chars and the context is longer than that.
pub fn build_system_prompt(parts: &PromptParts<'_>, ceiling: usize, truncated_context: usize) -> SystemPrompt {
    let text = render(parts, parts.context);
    let context_chars = parts.context.chars().count();

    if text.chars().count() > ceiling && context_chars > truncated_context {
        tracing::warn!(
            prompt_chars = text.chars().count(),
            context_chars,
            "System prompt too long, truncating context"
        );
        let mut cut: String = parts.context.chars().take(truncated_context).collect();
        cut.push_str(TRUNCATION_MARKER);
        return SystemPrompt {
            text: render(parts, &cut),
            context_chars: cut.chars().count(),
            truncated: true,
        };
    }

    SystemPrompt {
        text,
        context_chars,
        truncated: false,
    }
}

fn render(parts: &PromptParts<'_>, context: &str) -> String {
    let mut sb = String::with_capacity(context.len() + 2048);
    if !parts.persona_prompt.is_empty() {
        sb.push_str(parts.persona_prompt);
        sb.push_str("\n\n");
    }
    sb.push_str("Du bist ein hilfreicher Assistent. Beantworte Fragen basierend auf dem bereitgestellten Kontext.\n\n");
    sb.push_str("## Verfügbare Such-APIs\n");
    sb.push_str("Wenn der Kontext NICHT genügend Informationen enthält, um die Frage zuverlässig zu beantworten, ");
    sb.push_str("kannst du dem Nutzer vorschlagen, eine der folgenden Suchfunktionen zu verwenden. ");
    sb.push_str("Schreibe dazu am ENDE deiner Antwort einen Tool-Request in exakt diesem Format:\n\n");
    sb.push_str(&parts.grammar.describe());
    sb.push_str("\n\nVerfügbare Tools:\n");
    for tool in parts.tools {
        let _ = writeln!(sb, "- **{}**: {} (Parameter: {})", tool.name, tool.description, tool.param_hint);
    }
    sb.push_str("\nWichtig:\n");
    sb.push_str("- Schlage nur EIN Tool pro Antwort vor.\n");
    sb.push_str("- Gib trotzdem eine kurze Antwort mit dem was du weißt, bevor du den Tool-Request anfügst.\n");
    sb.push_str("- Wenn der Kontext ausreicht, antworte normal OHNE Tool-Request.\n");
    let _ = writeln!(sb, "- Der Tool-Request muss EXAKT das Format {} haben.\n", parts.grammar.describe());
    if parts.deep {
        sb.push_str(DEEP_RESEARCH_BLOCK);
        sb.push('\n');
    }
    sb.push_str("Kontext:\n");
    sb.push_str(context);
    sb
}
