//! The streaming session pipeline.
//!
//! One [`Session`] answers one question: it resolves the conversation and
//! persona, assembles context, streams the completion, honours at most one
//! tool request with a continuation, and records the final answer. Progress
//! is reported as [`SessionEvent`]s over a bounded channel; when the receiver
//! goes away the session stops and the in-flight backend stream is dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tinyrag_config::{Persona, RetrievalConfig, Settings, ToolsConfig};
use tinyrag_core::error::{MemoryError, ProviderError, ToolError};
use tinyrag_core::message::{ChatMessage, Role};
use tinyrag_core::provider::{ChatRequest, Provider};
use tinyrag_core::retrieval::{DecisionTag, RetrievalTrace};
use tinyrag_core::store::{ChunkStore, InsertOutcome};
use tinyrag_core::tool::{ToolRegistry, ToolRequest};
use tinyrag_memory::{ChatStore, chunk_text};
use tinyrag_tools::{SandboxLimits, build_registry};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::{ContextAssembler, PromptParts, RetrievalPolicy, build_system_prompt};
use crate::gate::ExecutionGate;
use crate::stream_event::{DebugInfo, SessionEvent, SessionMeta, SessionMode, ToolResultEvent};
use crate::tool_protocol::{MarkerGrammar, ToolRequestGrammar};

pub const OFFLINE_BANNER: &str =
    "📚 **Offline Mode** (no LLM)\n\nBased auf den verfügbaren Dokumenten:\n\n";

/// A question as received from the HTTP API or the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    pub question: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub persona_id: Option<String>,
    /// Overrides the `k` from the settings
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub deep: bool,
    #[serde(default)]
    pub offline: bool,
}

impl SessionRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SessionMode {
        SessionMode::from_flags(self.deep, self.offline)
    }
}

/// What a finished session recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub request_id: String,
    pub chat_id: String,
    /// The answer as stored in the conversation
    pub answer: String,
    pub decision: Option<DecisionTag>,
    pub tool: Option<ToolResultEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("event receiver closed")]
    Disconnected,

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Everything one question needs, captured at request start.
///
/// The provider and settings are snapshots: a backend swap during the
/// session does not affect it.
pub struct Session {
    provider: Arc<dyn Provider>,
    store: Arc<dyn ChunkStore>,
    chats: Arc<ChatStore>,
    settings: Settings,
    retrieval: RetrievalConfig,
    tools: ToolsConfig,
    grammar: Arc<dyn ToolRequestGrammar>,
    registry: Option<ToolRegistry>,
}

impl Session {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn ChunkStore>,
        chats: Arc<ChatStore>,
        settings: Settings,
    ) -> Self {
        Self {
            provider,
            store,
            chats,
            settings,
            retrieval: RetrievalConfig::default(),
            tools: ToolsConfig::default(),
            grammar: Arc::new(MarkerGrammar),
            registry: None,
        }
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_tools(mut self, tools: ToolsConfig) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_grammar(mut self, grammar: Arc<dyn ToolRequestGrammar>) -> Self {
        self.grammar = grammar;
        self
    }

    /// Use a fixed tool catalog instead of building one from the settings.
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Answer `request`, reporting progress on `tx`.
    ///
    /// Backend and tool failures are reported as events and still produce
    /// an outcome. Only store failures and a closed receiver end the session
    /// with an error.
    pub async fn run(
        &self,
        request: SessionRequest,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> Result<SessionOutcome, SessionError> {
        let request_id = new_request_id();
        let question = request.question.trim().to_string();
        let mode = request.mode();
        info!(request_id = %request_id, mode = mode.as_str(), "Session started");

        let (chat_id, persona) = self.resolve_conversation(&request).await?;
        self.chats.append(&chat_id, Role::User, &question).await?;
        let conversation = self
            .chats
            .get(&chat_id)
            .await
            .ok_or_else(|| MemoryError::Storage(format!("conversation {chat_id} disappeared")))?;

        let total_chunks = self.store.count_all().await?;
        let base_k = request.k.filter(|k| *k > 0).unwrap_or_else(|| self.settings.k());
        let used_k = if mode == SessionMode::Deep {
            deep_k(base_k, total_chunks, &self.retrieval)
        } else {
            base_k
        };
        let models = self.provider.models();

        emit(
            tx,
            SessionEvent::Meta(Box::new(SessionMeta {
                chat_id: chat_id.clone(),
                title: conversation.title.clone(),
                request_id: request_id.clone(),
                mode,
                k: used_k,
                base_k,
                chunk_size: self.settings.chunk_size(),
                total_chunks,
                debug: request.debug,
                deep: request.deep,
                offline: request.offline,
                message_count: conversation.messages.len(),
                created: conversation.created,
                updated: conversation.updated,
                persona_id: persona.id.clone(),
                persona_name: persona.name.clone(),
                models: models.clone(),
            })),
        )
        .await?;

        let outcome = |answer: String, decision: Option<DecisionTag>, tool: Option<ToolResultEvent>| SessionOutcome {
            request_id: request_id.clone(),
            chat_id: chat_id.clone(),
            answer,
            decision,
            tool,
        };

        let assembler = ContextAssembler::new(self.store.clone(), RetrievalPolicy::from(&self.retrieval));
        let assembled = match assembler.assemble(self.provider.as_ref(), &question, used_k).await {
            Ok(assembled) => assembled,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Context retrieval failed");
                let message = format!("Fehler beim Kontext-Abruf: {e}");
                self.finish(tx, &chat_id, &message, Some(&message)).await?;
                return Ok(outcome(message, None, None));
            }
        };
        let decision = Some(assembled.decision());

        let debug_info = |trace: &RetrievalTrace, context_chars: usize, system_prompt_chars: usize, history: usize| {
            DebugInfo {
                request_id: request_id.clone(),
                mode,
                question: question.clone(),
                used_k,
                base_k,
                chunk_size: self.settings.chunk_size(),
                total_chunks,
                context_chars,
                system_prompt_chars,
                history_messages: history,
                models: models.clone(),
                retrieval: trace.clone(),
                persona_id: persona.id.clone(),
                persona_name: persona.name.clone(),
                persona_prompt_chars: persona.prompt.chars().count(),
            }
        };

        if mode == SessionMode::Offline {
            if request.debug {
                let info = debug_info(&assembled.trace, assembled.context.chars().count(), 0, 0);
                emit(tx, SessionEvent::Debug(Box::new(info))).await?;
            }
            emit(tx, SessionEvent::token(OFFLINE_BANNER)).await?;
            emit(tx, SessionEvent::token(assembled.context.clone())).await?;
            let answer = format!("{OFFLINE_BANNER}{}", assembled.context);
            self.finish(tx, &chat_id, &answer, None).await?;
            return Ok(outcome(answer, decision, None));
        }

        let built;
        let registry = match &self.registry {
            Some(registry) => registry,
            None => {
                built = build_registry(&self.settings, &self.tools, self.provider.clone())?;
                &built
            }
        };
        let descriptors = registry.descriptors();
        let prompt = build_system_prompt(
            &PromptParts {
                context: &assembled.context,
                tools: &descriptors,
                grammar: self.grammar.as_ref(),
                persona_prompt: &persona.prompt,
                deep: mode == SessionMode::Deep,
            },
            self.retrieval.prompt_ceiling,
            self.retrieval.truncated_context,
        );

        let mut messages = conversation.history_before_last(self.retrieval.history_turns);
        messages.push(ChatMessage::user(question.clone()));

        if request.debug {
            let info = debug_info(&assembled.trace, prompt.context_chars, prompt.text.chars().count(), messages.len());
            emit(tx, SessionEvent::Debug(Box::new(info))).await?;
        }

        let mut answer = String::new();
        let failure = self
            .relay(ChatRequest::new(prompt.text.clone(), messages.clone()), tx, &mut answer)
            .await?;

        if let Some(err) = failure {
            warn!(request_id = %request_id, error = %err, partial_chars = answer.len(), "Generation failed");
            let message = format!("LLM-Fehler: {err}");
            if answer.trim().is_empty() {
                self.finish(tx, &chat_id, &message, Some(&message)).await?;
                return Ok(outcome(message, decision, None));
            }
            // A request in a truncated answer is reported but never run.
            if let Some(call) = self.grammar.find_first(&answer) {
                emit(tx, tool_request_event(&call)).await?;
            }
            let stored = self.grammar.strip_all(&answer);
            self.finish(tx, &chat_id, &stored, Some(&message)).await?;
            return Ok(outcome(stored, decision, None));
        }

        let mut tool = None;
        let mut continuation = String::new();
        if let Some(call) = self.grammar.find_first(&answer) {
            info!(request_id = %request_id, tool = %call.tool, query = %call.query, "Answer requested a tool");
            emit(tx, tool_request_event(&call)).await?;

            let gate = ExecutionGate::from_settings(&self.settings, SandboxLimits::from_config(&self.tools));
            let result = match gate.run(registry, &call).await {
                Ok(output) => ToolResultEvent::succeeded(&call.tool, &call.query, &output.source, &output.text),
                Err(ToolError::PermissionDenied { reason, .. }) => {
                    ToolResultEvent::denied(&call.tool, &call.query, reason)
                }
                Err(e) => {
                    warn!(request_id = %request_id, tool = %call.tool, error = %e, "Tool failed");
                    ToolResultEvent::failed(&call.tool, &call.query, e)
                }
            };
            emit(tx, SessionEvent::ToolResult(result.clone())).await?;

            if let (Some(source), Some(text)) = (&result.source, &result.output) {
                self.ingest_tool_output(&request_id, source, text).await;

                let mut follow_up = messages;
                follow_up.push(ChatMessage::assistant(self.grammar.strip_all(&answer)));
                follow_up.push(ChatMessage::user(format!(
                    "Tool {} returned:\n{}\n\nPlease continue the answer using this information.",
                    call.tool, text
                )));
                if let Some(err) = self
                    .relay(ChatRequest::new(prompt.text, follow_up), tx, &mut continuation)
                    .await?
                {
                    warn!(request_id = %request_id, error = %err, "Continuation failed");
                }
            }
            tool = Some(result);
        }

        let mut stored = self.grammar.strip_all(&answer);
        let continuation = self.grammar.strip_all(&continuation);
        if !continuation.is_empty() {
            if !stored.is_empty() {
                stored.push_str("\n\n");
            }
            stored.push_str(&continuation);
        }
        self.finish(tx, &chat_id, &stored, None).await?;
        info!(request_id = %request_id, answer_chars = stored.len(), "Session finished");
        Ok(outcome(stored, decision, tool))
    }

    /// Persona precedence: request, then conversation, then the global default.
    async fn resolve_conversation(&self, request: &SessionRequest) -> Result<(String, Persona), SessionError> {
        let existing = match request.chat_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => self.chats.get(id).await,
            None => None,
        };

        let persona = request
            .persona_id
            .as_deref()
            .and_then(|id| self.settings.persona(id))
            .or_else(|| {
                existing
                    .as_ref()
                    .and_then(|c| c.persona_id.as_deref())
                    .and_then(|id| self.settings.persona(id))
            })
            .or_else(|| self.settings.default_persona())
            .cloned()
            .unwrap_or_else(Persona::standard);

        let chat_id = match existing {
            Some(conv) => {
                if conv.persona_id.as_deref() != Some(persona.id.as_str()) {
                    self.chats.set_persona(&conv.id, &persona.id).await?;
                }
                conv.id
            }
            None => {
                let conv = self.chats.create(Some(persona.id.clone())).await?;
                debug!(chat_id = %conv.id, "Conversation created");
                conv.id
            }
        };
        Ok((chat_id, persona))
    }

    /// Forward tokens of one completion to `tx`, accumulating them in `answer`.
    ///
    /// Returns the backend error that ended the stream early, if any.
    async fn relay(
        &self,
        request: ChatRequest,
        tx: &mpsc::Sender<SessionEvent>,
        answer: &mut String,
    ) -> Result<Option<ProviderError>, SessionError> {
        let mut stream = match self.provider.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => return Ok(Some(e)),
        };
        while let Some(item) = stream.recv().await {
            match item {
                Ok(token) if token.is_empty() => {}
                Ok(token) => {
                    answer.push_str(&token);
                    emit(tx, SessionEvent::Token { content: token }).await?;
                }
                Err(e) => return Ok(Some(e)),
            }
        }
        Ok(None)
    }

    /// Make a tool result retrievable by later questions. Failures are logged only.
    async fn ingest_tool_output(&self, request_id: &str, source: &str, text: &str) {
        let chunks = chunk_text(text, self.settings.chunk_size());
        if chunks.is_empty() {
            return;
        }
        match self.store.insert(self.provider.as_ref(), source, &chunks).await {
            Ok(InsertOutcome::Inserted { chunks }) => {
                info!(request_id = %request_id, article = %source, chunks, "Tool output stored");
            }
            Ok(InsertOutcome::Skipped { existing }) => {
                info!(request_id = %request_id, article = %source, existing, "Tool output already stored");
            }
            Err(e) => {
                warn!(request_id = %request_id, article = %source, error = %e, "Failed to store tool output");
            }
        }
    }

    /// Record the answer, then report the error (if any) and completion.
    async fn finish(
        &self,
        tx: &mpsc::Sender<SessionEvent>,
        chat_id: &str,
        answer: &str,
        error: Option<&str>,
    ) -> Result<(), SessionError> {
        self.chats.append(chat_id, Role::Assistant, answer).await?;
        if let Some(message) = error {
            emit(tx, SessionEvent::Error { message: message.to_string() }).await?;
        }
        emit(tx, SessionEvent::Done).await
    }
}

/// `k` for deep mode: `max(3k, deep_min_k)`, bounded by the chunk count and `deep_max_k`.
pub fn deep_k(base_k: usize, total_chunks: usize, config: &RetrievalConfig) -> usize {
    let mut k = base_k.saturating_mul(3).max(config.deep_min_k);
    if total_chunks > 0 {
        k = k.min(total_chunks);
    }
    k.min(config.deep_max_k).max(1)
}

fn new_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("req-{}", &id[..8])
}

fn tool_request_event(call: &ToolRequest) -> SessionEvent {
    SessionEvent::ToolRequest {
        tool: call.tool.clone(),
        query: call.query.clone(),
    }
}

async fn emit(tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) -> Result<(), SessionError> {
    tx.send(event).await.map_err(|_| SessionError::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockProvider, Reply, unit_at};
    use tinyrag_config::BackendDefaults;
    use tinyrag_memory::InMemoryChunkStore;
    use tinyrag_tools::{CalculatorTool, SandboxTool};

    const ANSWER_DIRECT: &str = r#"{"action":"ANSWER_DIRECT"}"#;

    struct Fixture {
        provider: Arc<MockProvider>,
        store: Arc<InMemoryChunkStore>,
        chats: Arc<ChatStore>,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                provider: Arc::new(MockProvider::new()),
                store: Arc::new(InMemoryChunkStore::new()),
                chats: Arc::new(ChatStore::ephemeral()),
                settings: Settings::from_defaults(&BackendDefaults::default()),
            }
        }

        fn session(&self) -> Session {
            let mut registry = ToolRegistry::new();
            registry.register(Box::new(CalculatorTool));
            registry.register(Box::new(SandboxTool::new(SandboxLimits::default())));
            Session::new(
                self.provider.clone(),
                self.store.clone(),
                self.chats.clone(),
                self.settings.clone(),
            )
            .with_registry(registry)
        }

        async fn ask(&self, request: SessionRequest) -> (SessionOutcome, Vec<SessionEvent>) {
            let (tx, mut rx) = mpsc::channel(256);
            let outcome = self.session().run(request, &tx).await.unwrap();
            drop(tx);
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            (outcome, events)
        }
    }

    fn kinds(events: &[SessionEvent]) -> Vec<&'static str> {
        events.iter().map(SessionEvent::event_type).collect()
    }

    fn streamed_text(events: &[SessionEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Token { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn plain_answer_is_streamed_and_stored() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_tokens(&["Mars ", "ist ", "rot."]);

        let (outcome, events) = fx.ask(SessionRequest::new("Welche Farbe hat Mars?")).await;
        assert_eq!(kinds(&events), vec!["meta", "token", "token", "token", "done"]);
        assert_eq!(streamed_text(&events), "Mars ist rot.");
        assert_eq!(outcome.answer, "Mars ist rot.");
        assert_eq!(outcome.decision, Some(DecisionTag::AnswerDirect));
        assert!(outcome.request_id.starts_with("req-"));
        assert_eq!(outcome.request_id.len(), 12);

        let conv = fx.chats.get(&outcome.chat_id).await.unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[1].content, "Mars ist rot.");
        assert_eq!(conv.persona_id.as_deref(), Some(tinyrag_config::DEFAULT_PERSONA_ID));
    }

    #[tokio::test]
    async fn meta_comes_first_and_debug_when_requested() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_reply("ok");

        let mut request = SessionRequest::new("Hallo");
        request.debug = true;
        let (_, events) = fx.ask(request).await;
        assert_eq!(kinds(&events), vec!["meta", "debug", "token", "done"]);

        let SessionEvent::Meta(meta) = &events[0] else { panic!("expected meta") };
        assert_eq!(meta.mode, SessionMode::Normal);
        assert_eq!(meta.k, 5);
        assert_eq!(meta.message_count, 1);
        assert_eq!(meta.title, "Hallo");
        assert_eq!(meta.models.chat_model, "mock-chat");

        let SessionEvent::Debug(info) = &events[1] else { panic!("expected debug") };
        assert_eq!(info.history_messages, 1);
        assert_eq!(info.retrieval.decision, DecisionTag::AnswerDirect);
        assert!(info.system_prompt_chars > info.context_chars);
    }

    #[tokio::test]
    async fn tool_request_runs_once_and_continues() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_tokens(&[
            "Ich rechne nach. ",
            r#"[TOOL_REQUEST]{"tool":"calculate","query":"6*7"}[/TOOL_REQUEST]"#,
        ]);
        fx.provider.push_reply("Das Ergebnis ist 42.");

        let (outcome, events) = fx.ask(SessionRequest::new("Was ist 6*7?")).await;
        assert_eq!(
            kinds(&events),
            vec!["meta", "token", "token", "tool_request", "tool_result", "token", "done"]
        );
        let SessionEvent::ToolResult(result) = &events[4] else { panic!("expected tool_result") };
        assert_eq!(result.source.as_deref(), Some("calc:6*7"));
        assert_eq!(result.output.as_deref(), Some("6*7 = 42"));

        assert_eq!(outcome.answer, "Ich rechne nach.\n\nDas Ergebnis ist 42.");
        assert!(!outcome.answer.contains("TOOL_REQUEST"));

        // arbitration, answer, continuation
        let requests = fx.provider.chat_requests();
        assert_eq!(requests.len(), 3);
        let note = &requests[2].messages.last().unwrap().content;
        assert_eq!(
            note,
            "Tool calculate returned:\n6*7 = 42\n\nPlease continue the answer using this information."
        );
        assert_eq!(requests[2].messages[requests[2].messages.len() - 2].content, "Ich rechne nach.");

        assert_eq!(fx.store.article_count("calc:6*7").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn only_the_first_of_several_requests_is_honoured() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_reply(concat!(
            r#"[TOOL_REQUEST]{"tool":"calculate","query":"1+1"}[/TOOL_REQUEST]"#,
            r#"[TOOL_REQUEST]{"tool":"calculate","query":"2+2"}[/TOOL_REQUEST]"#,
        ));
        fx.provider.push_reply("");

        let (outcome, events) = fx.ask(SessionRequest::new("Rechne")).await;
        let requests: Vec<_> = events.iter().filter(|e| e.event_type() == "tool_request").collect();
        assert_eq!(requests.len(), 1);
        assert_eq!(outcome.tool.unwrap().query, "1+1");
        assert_eq!(outcome.answer, "");
    }

    #[tokio::test]
    async fn denied_sandbox_is_reported_and_not_continued() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider
            .push_reply(r#"Probieren wir es. [TOOL_REQUEST]{"tool":"sandbox","query":"print(1)"}[/TOOL_REQUEST]"#);

        let (outcome, events) = fx.ask(SessionRequest::new("Führe aus")).await;
        let SessionEvent::ToolResult(result) = &events[3] else { panic!("expected tool_result") };
        assert_eq!(result.allowed, Some(false));
        assert!(result.output.is_none());
        assert_eq!(outcome.answer, "Probieren wir es.");
        assert_eq!(fx.provider.chat_calls(), 2);
        assert_eq!(fx.store.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn each_sandbox_run_is_stored_under_its_own_article() {
        let mut fx = Fixture::new();
        fx.settings.allow_sandbox = true;
        let script = "let x = 2; while x < 100 { x = x * x } print(x)";

        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider
            .push_reply(r#"[TOOL_REQUEST]{"tool":"sandbox","query":"print(111)"}[/TOOL_REQUEST]"#);
        fx.provider.push_reply("Fertig.");
        fx.ask(SessionRequest::new("Führe aus")).await;

        // The stored output now scores above the high-confidence threshold,
        // so the second question needs no arbitration reply.
        fx.provider.push_reply(&format!(
            r#"Noch einmal. [TOOL_REQUEST]{{"tool":"sandbox","query":"{script}"}}[/TOOL_REQUEST]"#
        ));
        fx.provider.push_reply("Fertig.");
        let (outcome, _) = fx.ask(SessionRequest::new("Und weiter")).await;

        let result = outcome.tool.unwrap();
        assert_eq!(result.source.as_deref(), Some(format!("sandbox:{script}").as_str()));
        assert_eq!(outcome.answer, "Noch einmal.\n\nFertig.");

        let first = fx.store.article_chunks("sandbox:print(111)").await.unwrap();
        assert_eq!(first[0].content, "111");
        let second = fx.store.article_chunks(&format!("sandbox:{script}")).await.unwrap();
        assert_eq!(second[0].content, "256");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_not_a_denial() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_reply(r#"[TOOL_REQUEST]{"tool":"teleport","query":"Mars"}[/TOOL_REQUEST]"#);

        let (outcome, _) = fx.ask(SessionRequest::new("Hin da")).await;
        let result = outcome.tool.unwrap();
        assert!(result.error.unwrap().contains("teleport"));
        assert_eq!(result.allowed, None);
    }

    #[tokio::test]
    async fn backend_failure_before_any_token() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push(Reply::Refused(ProviderError::Network("connection refused".into())));

        let (outcome, events) = fx.ask(SessionRequest::new("Hallo?")).await;
        assert_eq!(kinds(&events), vec!["meta", "error", "done"]);
        assert!(outcome.answer.starts_with("LLM-Fehler: "));
        let conv = fx.chats.get(&outcome.chat_id).await.unwrap();
        assert_eq!(conv.messages[1].content, outcome.answer);
    }

    #[tokio::test]
    async fn partial_failure_reports_but_never_runs_tool() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push(Reply::Broken(
            vec![
                "Teilweise. ".into(),
                r#"[TOOL_REQUEST]{"tool":"calculate","query":"1+1"}[/TOOL_REQUEST]"#.into(),
            ],
            ProviderError::StreamInterrupted("reset".into()),
        ));

        let (outcome, events) = fx.ask(SessionRequest::new("Rechne")).await;
        assert_eq!(kinds(&events), vec!["meta", "token", "token", "tool_request", "error", "done"]);
        assert_eq!(outcome.answer, "Teilweise.");
        assert!(outcome.tool.is_none());
        assert_eq!(fx.store.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn offline_mode_streams_context_without_generation() {
        let fx = Fixture::new();
        fx.provider.set_vector("Mars", vec![1.0, 0.0, 0.0]);
        fx.provider.set_vector("Mars ist rot.", unit_at(0.95));
        fx.store
            .insert(fx.provider.as_ref(), "Mars", &["Mars ist rot.".to_string()])
            .await
            .unwrap();

        let mut request = SessionRequest::new("Mars");
        request.offline = true;
        let (outcome, events) = fx.ask(request).await;
        assert_eq!(kinds(&events), vec!["meta", "token", "token", "done"]);
        assert_eq!(outcome.answer, format!("{OFFLINE_BANNER}Mars ist rot."));
        assert_eq!(outcome.decision, Some(DecisionTag::ArticleSpecific));
        assert_eq!(fx.provider.chat_calls(), 0);
    }

    #[tokio::test]
    async fn history_and_persona_carry_over() {
        let mut fx = Fixture::new();
        fx.settings.personas.push(Persona {
            id: "persona-pirate".into(),
            name: "Pirat".into(),
            prompt: "Sprich wie ein Pirat.".into(),
        });

        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_reply("Arr, hallo.");
        let mut first = SessionRequest::new("Hallo");
        first.persona_id = Some("persona-pirate".into());
        let (first, _) = fx.ask(first).await;

        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_reply("Arr, gut.");
        let mut second = SessionRequest::new("Wie geht's?");
        second.chat_id = Some(first.chat_id.clone());
        let (second, events) = fx.ask(second).await;
        assert_eq!(second.chat_id, first.chat_id);

        let SessionEvent::Meta(meta) = &events[0] else { panic!("expected meta") };
        assert_eq!(meta.persona_name, "Pirat");
        assert_eq!(meta.message_count, 3);

        let request = fx.provider.chat_requests().pop().unwrap();
        assert!(request.system.starts_with("Sprich wie ein Pirat.\n\n"));
        let contents: Vec<_> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hallo", "Arr, hallo.", "Wie geht's?"]);
    }

    #[tokio::test]
    async fn closed_receiver_stops_the_session() {
        let fx = Fixture::new();
        fx.provider.push_reply(ANSWER_DIRECT);
        fx.provider.push_reply("never seen");
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let err = fx.session().run(SessionRequest::new("Hallo"), &tx).await.unwrap_err();
        assert!(matches!(err, SessionError::Disconnected));
    }

    #[test]
    fn deep_k_is_clamped() {
        let config = RetrievalConfig::default();
        assert_eq!(deep_k(5, 1000, &config), 15);
        assert_eq!(deep_k(2, 1000, &config), 10);
        assert_eq!(deep_k(5, 7, &config), 7);
        assert_eq!(deep_k(40, 1000, &config), 50);
        assert_eq!(deep_k(5, 0, &config), 15);
    }
}
