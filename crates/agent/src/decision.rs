//! Retrieval arbitration: ask the chat model whether more context is needed.

use tinyrag_core::error::ProviderError;
use tinyrag_core::message::ChatMessage;
use tinyrag_core::provider::{ChatRequest, Provider};
use tinyrag_core::retrieval::{RetrievalAction, RetrievalDecision};
use tinyrag_core::store::ChunkHit;

pub const ARBITRATION_PROMPT: &str = r#"You are an analysis agent. Given a user question and a short summary of retrieval candidates, decide whether the assistant can answer directly or needs more retrieval.

Return ONLY a single JSON object and nothing else (no explanation, no extra text). Examples:
	{"action":"ANSWER_DIRECT"}
	{"action":"RETRIEVE_MORE","k":10,"threshold":0.6,"query":"Ettling"}

Deutsch:
Du bist ein Analyse-Agent. Gegeben eine Nutzerfrage und eine kurze Zusammenfassung der Retrieval-Kandidaten entscheide, ob der Assistent direkt antworten soll oder zusätzliche Kontextsuche benötigt.

Gib AUSSCHLIESSLICH ein einzelnes JSON-Objekt zurück (keine Erklärungen oder zusätzlichen Text). Beispiele:
	{"action":"ANSWER_DIRECT"}
	{"action":"RETRIEVE_MORE","k":10,"threshold":0.6,"query":"Ettling"}
"#;

/// `"Mars (score=0.8123); Venus (score=0.7001)"` for the first `n` hits.
pub fn summarize_candidates(hits: &[ChunkHit], n: usize) -> String {
    hits.iter()
        .take(n)
        .map(|h| format!("{} (score={:.4})", h.article, h.score))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ask `provider` for a decision about `question`.
///
/// Backend failures and unparseable replies are both errors; the caller
/// degrades to its relaxed fallback either way.
pub async fn analyze_question(
    provider: &dyn Provider,
    question: &str,
    summary: &str,
    default_k: usize,
    default_threshold: f32,
) -> Result<RetrievalDecision, ProviderError> {
    let request = ChatRequest::new(
        ARBITRATION_PROMPT,
        vec![ChatMessage::user(format!("Question: {question}\n\nCandidates: {summary}"))],
    );
    let reply = provider.complete(request).await?;
    parse_decision(&reply, default_k, default_threshold)
}

/// Parse an arbitration reply.
///
/// The first JSON object in the reply is used. A reply without any object
/// is read as a bare keyword: `ANSWER_DIRECT` anywhere in it means answer
/// directly, anything else means retrieve with the defaults.
pub fn parse_decision(
    reply: &str,
    default_k: usize,
    default_threshold: f32,
) -> Result<RetrievalDecision, ProviderError> {
    let retrieve_defaults = RetrievalDecision {
        action: RetrievalAction::RetrieveMore,
        k: default_k,
        threshold: default_threshold,
        query: String::new(),
    };

    let Some(start) = reply.find('{') else {
        if reply.to_uppercase().contains("ANSWER_DIRECT") {
            return Ok(RetrievalDecision {
                action: RetrievalAction::AnswerDirect,
                ..retrieve_defaults
            });
        }
        return Ok(retrieve_defaults);
    };

    let value: serde_json::Value = serde_json::Deserializer::from_str(&reply[start..])
        .into_iter::<serde_json::Value>()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("empty decision".into()))?
        .map_err(|e| ProviderError::InvalidResponse(format!("decision is not JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::InvalidResponse("decision is not an object".into()))?;

    let action = object.get("action").and_then(|v| v.as_str()).unwrap_or_default();
    if action.eq_ignore_ascii_case("ANSWER_DIRECT") {
        return Ok(RetrievalDecision {
            action: RetrievalAction::AnswerDirect,
            ..retrieve_defaults
        });
    }

    let k = object
        .get("k")
        .and_then(|v| v.as_f64())
        .filter(|k| *k >= 1.0)
        .map_or(default_k, |k| k as usize);
    let threshold = object
        .get("threshold")
        .and_then(|v| v.as_f64())
        .map_or(default_threshold, |t| t as f32);
    let query = object
        .get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    Ok(RetrievalDecision {
        action: RetrievalAction::RetrieveMore,
        k,
        threshold,
        query,
    })
}
