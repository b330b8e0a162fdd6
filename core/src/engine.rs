//! Turn orchestration: one inbound chat message in, one response out.
//!
//! A turn holds its session's flow lock from start to finish, so turns of the same
//! session never interleave while different sessions run fully in parallel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::context::{ChatMessage, ContextWindowBuilder};
use crate::execution::{ApplyCallback, ExecutionAgent, ExecutionContext, ExecutionResult, HighlightSource};
use crate::flow::{extract_intent, ConversationFlow, FlowController, FlowPhase};
use crate::llm::{
    complete_with_timeout, ApiKeyProvider, EnvApiKeyProvider, LlmReply, LlmRequest, LlmTransport,
    ToolChoice, WireMessage,
};
use crate::progress::{NoopProgressSink, ProgressBroadcaster, ProgressSink};
use crate::tools::{register_builtin_endpoints, EndpointConfig, FunctionResult, ToolRegistry};
use crate::{MontageError, Result};

/// Inbound chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub subject_id: String,
    pub endpoint_id: String,
    pub message: String,
    /// Absent for the first message of a new session
    #[serde(default)]
    pub session_id: Option<String>,
    pub model: String,
    #[serde(default)]
    pub context_data: Option<Value>,
}

impl ChatRequest {
    pub fn new(
        subject_id: impl Into<String>,
        endpoint_id: impl Into<String>,
        message: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            endpoint_id: endpoint_id.into(),
            message: message.into(),
            session_id: None,
            model: model.into(),
            context_data: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context_data(mut self, data: Value) -> Self {
        self.context_data = Some(data);
        self
    }
}

/// Outbound reply for one turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub session_id: String,
    /// Id of the assistant message in `transcript`
    pub message_id: String,
    pub message: String,
    pub model: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_actions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_results: Option<Vec<FunctionResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
    /// User and assistant messages the caller should append to the session log
    pub transcript: Vec<ChatMessage>,
}

/// Read access to a session's stored messages
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Up to `limit` most recent messages, oldest first.
    /// Returns `SessionNotFound` for a session id the store does not know.
    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn new_session_id() -> String {
    let ms = chrono::Utc::now().timestamp_millis();
    let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("session-{ms}-{n}")
}

fn compose_system_prompt(endpoint: &EndpointConfig, context: &str) -> String {
    let context = context.trim();
    if context.is_empty() {
        endpoint.system_prompt.clone()
    } else {
        format!("{}\n\n## Project context\n{}", endpoint.system_prompt, context)
    }
}

fn action_summary(results: &[FunctionResult]) -> String {
    let names: Vec<&str> = results.iter().map(|r| r.tool.as_str()).collect();
    let failed = results.iter().filter(|r| !r.success).count();
    let mut text = format!(
        "Ran {} action{}: {}",
        results.len(),
        if results.len() == 1 { "" } else { "s" },
        names.join(", ")
    );
    if failed > 0 {
        text.push_str(&format!(" ({failed} failed)"));
    }
    text
}

/// The conversational engine
pub struct ChatEngine {
    registry: ToolRegistry,
    flows: FlowController,
    window: ContextWindowBuilder,
    transport: Arc<dyn LlmTransport>,
    source: Arc<dyn HighlightSource>,
    applier: Arc<dyn ApplyCallback>,
    history: Arc<dyn HistoryProvider>,
    api_keys: Arc<dyn ApiKeyProvider>,
    progress: Arc<dyn ProgressSink>,
    executor: ExecutionAgent,
    config: EngineConfig,
}

impl ChatEngine {
    /// Engine with the built-in endpoints, env-based API key and config, and no progress output
    pub fn new(
        transport: Arc<dyn LlmTransport>,
        source: Arc<dyn HighlightSource>,
        applier: Arc<dyn ApplyCallback>,
        history: Arc<dyn HistoryProvider>,
    ) -> Self {
        let config = EngineConfig::default();
        let registry = ToolRegistry::new().with_tool_timeout(config.tool_timeout());
        register_builtin_endpoints(&registry, source.clone(), applier.clone());
        Self {
            executor: ExecutionAgent::new(transport.clone(), source.clone(), config.clone()),
            registry,
            flows: FlowController::new(),
            window: ContextWindowBuilder::with_defaults(),
            transport,
            source,
            applier,
            history,
            api_keys: Arc::new(EnvApiKeyProvider::default()),
            progress: Arc::new(NoopProgressSink),
            config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.registry = self.registry.with_tool_timeout(config.tool_timeout());
        self.executor = ExecutionAgent::new(self.transport.clone(), self.source.clone(), config.clone());
        self.config = config;
        self
    }

    /// Replace the endpoint registry (built-ins are not re-added)
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry.with_tool_timeout(self.config.tool_timeout());
        self
    }

    pub fn with_api_key_provider(mut self, provider: Arc<dyn ApiKeyProvider>) -> Self {
        self.api_keys = provider;
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_window_builder(mut self, window: ContextWindowBuilder) -> Self {
        self.window = window;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current phase of a session, if it has a flow
    pub async fn flow_phase(&self, session_id: &str) -> Option<FlowPhase> {
        self.flows.phase(session_id).await
    }

    /// Forget a session's flow state ("clear history"). Returns whether one existed.
    /// Waits for a turn already running on that session.
    pub async fn clear_session(&self, session_id: &str) -> bool {
        let removed = self.flows.clear(session_id).await;
        info!(target: "engine", session = %session_id, removed, "Session flow cleared");
        removed
    }

    /// Process one turn.
    ///
    /// Pipeline failures come back as `success == false` with a user-facing `error`;
    /// only an unknown endpoint or session is returned as `Err`.
    #[tracing::instrument(skip_all, fields(endpoint = %request.endpoint_id, subject = %request.subject_id))]
    pub async fn process(&self, request: ChatRequest) -> Result<ChatResponse> {
        let endpoint = self
            .registry
            .get(&request.endpoint_id)
            .ok_or_else(|| MontageError::EndpointNotFound(request.endpoint_id.clone()))?;

        let supplied = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let is_new = supplied.is_none();
        let session_id = supplied.unwrap_or_else(new_session_id);

        let started = Instant::now();
        let known = self.flows.contains(&session_id);
        let mut flow = self.flows.acquire(&session_id).await;
        if flow.phase() == FlowPhase::Execution {
            // An earlier turn was cancelled mid-execution
            warn!(target: "engine", session = %session_id, "Recovering flow stuck in execution");
            flow.finish_execution();
        }

        let progress = ProgressBroadcaster::new(
            self.progress.clone(),
            request.subject_id.as_str(),
            request.endpoint_id.as_str(),
            session_id.as_str(),
        );
        let user_message = ChatMessage::user(request.message.as_str());

        let outcome = self
            .run_turn(&request, &endpoint, &session_id, is_new, &mut flow, &progress, &user_message)
            .await;

        match outcome {
            Ok(response) => {
                info!(
                    target: "engine",
                    session = %session_id,
                    success = response.success,
                    has_actions = response.has_actions,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Turn complete"
                );
                Ok(response)
            }
            Err(e @ MontageError::SessionNotFound(_)) => {
                drop(flow);
                if !known {
                    self.flows.evict_idle(&session_id);
                }
                Err(e)
            }
            Err(e) => {
                match &e {
                    MontageError::Parse { message, payload } => {
                        error!(target: "engine", session = %session_id, %message, %payload, "Turn failed")
                    }
                    other => error!(target: "engine", session = %session_id, error = %other, "Turn failed"),
                }
                Ok(self.failure_response(&request, session_id, user_message, &e))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_turn(
        &self,
        request: &ChatRequest,
        endpoint: &EndpointConfig,
        session_id: &str,
        is_new: bool,
        flow: &mut ConversationFlow,
        progress: &ProgressBroadcaster,
        user_message: &ChatMessage,
    ) -> Result<ChatResponse> {
        let api_key = self
            .api_keys
            .api_key()
            .ok_or_else(|| MontageError::Configuration("no LLM API key configured".into()))?;

        flow.set_context("subject_id", request.subject_id.as_str());
        flow.set_context("endpoint_id", endpoint.id.as_str());
        flow.set_context("model", request.model.as_str());

        progress.update(1, "Reading the conversation");
        let history = if is_new {
            Vec::new()
        } else {
            let limit = self.window.limits().optimal_history_limit(&request.model);
            self.history.recent_messages(session_id, limit).await?
        };

        let context = self
            .registry
            .context_for(&endpoint.id, &request.subject_id, request.context_data.as_ref())
            .await?;
        let system_prompt = compose_system_prompt(endpoint, &context);
        let window = self.window.build(
            &request.model,
            &system_prompt,
            &history,
            &request.message,
            self.config.reserved_response_tokens,
        );
        debug!(
            target: "engine",
            messages = window.messages.len(),
            tokens = window.total_tokens,
            budget = window.budget,
            trimmed = window.trimmed_count,
            "Context window built"
        );

        let llm_request = LlmRequest::new(
            request.model.as_str(),
            window.messages.iter().map(WireMessage::from).collect(),
        )
        .with_temperature(self.config.conversation_temperature)
        .with_max_tokens(self.config.conversation_max_tokens())
        .with_tools(self.registry.tools_for(&endpoint.id), ToolChoice::Auto);

        progress.update(2, "Thinking about your message");
        let reply = complete_with_timeout(
            self.transport.as_ref(),
            &api_key,
            &llm_request,
            self.config.llm_timeout(),
        )
        .await?;

        if reply.has_tool_calls() {
            return self
                .tool_turn(request, endpoint, session_id, reply, progress, user_message)
                .await;
        }

        let extraction = extract_intent(reply.content_or_empty());
        let Some(intent) = extraction.intent else {
            let mut assistant = ChatMessage::assistant(extraction.visible);
            if let Some(hidden) = extraction.hidden {
                assistant = assistant.with_hidden(hidden);
            }
            return Ok(self.response(request, session_id, user_message, assistant));
        };

        info!(target: "engine", session = %session_id, intent = intent.category().label(), "Intent confirmed");
        flow.begin_execution(intent.clone());
        let result = self
            .executor
            .execute(
                &intent,
                &request.subject_id,
                self.applier.as_ref(),
                &ExecutionContext {
                    api_key: &api_key,
                    model: &request.model,
                    progress,
                },
            )
            .await;
        flow.finish_execution();

        let report = result.describe();
        let text = if extraction.visible.is_empty() {
            report
        } else {
            format!("{}\n\n{}", extraction.visible, report)
        };
        let mut assistant = ChatMessage::assistant(text);
        if let Some(hidden) = extraction.hidden {
            assistant = assistant.with_hidden(hidden);
        }

        let mut response = self.response(request, session_id, user_message, assistant);
        response.success = result.success;
        response.error = result.error.clone();
        response.has_actions = result.applied;
        response.action_summary = result.success.then(|| result.summary.clone());
        response.execution = Some(result);
        Ok(response)
    }

    async fn tool_turn(
        &self,
        request: &ChatRequest,
        endpoint: &EndpointConfig,
        session_id: &str,
        reply: LlmReply,
        progress: &ProgressBroadcaster,
        user_message: &ChatMessage,
    ) -> Result<ChatResponse> {
        let mut results = Vec::with_capacity(reply.tool_calls.len());
        for (i, call) in reply.tool_calls.iter().enumerate() {
            progress.update(3 + i as u32, format!("Running {}", call.name));
            let result = match self
                .registry
                .dispatch(&endpoint.id, &call.name, &call.arguments, &request.subject_id)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!(target: "engine", tool = %call.name, error = %e, "Tool call failed");
                    FunctionResult::failed(call.name.as_str(), &e)
                }
            };
            results.push(result);
        }

        let summary = action_summary(&results);
        let text = reply
            .content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| summary.clone());
        let assistant = ChatMessage::assistant(text).with_hidden(serde_json::to_string(&results)?);

        let mut response = self.response(request, session_id, user_message, assistant);
        response.has_actions = true;
        response.action_summary = Some(summary);
        response.function_results = Some(results);
        Ok(response)
    }

    fn response(
        &self,
        request: &ChatRequest,
        session_id: &str,
        user_message: &ChatMessage,
        assistant: ChatMessage,
    ) -> ChatResponse {
        ChatResponse {
            session_id: session_id.to_string(),
            message_id: assistant.id.clone(),
            message: assistant.content.clone(),
            model: request.model.clone(),
            success: true,
            error: None,
            has_actions: false,
            action_summary: None,
            function_results: None,
            execution: None,
            transcript: vec![user_message.clone(), assistant],
        }
    }

    fn failure_response(
        &self,
        request: &ChatRequest,
        session_id: String,
        user_message: ChatMessage,
        err: &MontageError,
    ) -> ChatResponse {
        let text = err.user_message();
        let assistant = ChatMessage::assistant(text.as_str());
        let mut response = self.response(request, &session_id, &user_message, assistant);
        response.success = false;
        response.error = Some(text);
        response
    }
}
