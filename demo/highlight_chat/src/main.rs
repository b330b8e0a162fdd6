mod config;

use async_trait::async_trait;
use config::ChatDemoConfig;
use montage_core::llm::EnvApiKeyProvider;
use montage_core::{
    ApplyCallback, ChannelProgressSink, ChatEngine, ChatMessage, ChatRequest, Highlight,
    HighlightSource, HistoryProvider, LlmClient, MontageError, OrderEntry, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// One project held in memory: highlights, saved order and chat logs
struct DemoProject {
    subject_id: String,
    highlights: Vec<Highlight>,
    order: Mutex<Vec<OrderEntry>>,
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl DemoProject {
    fn load(subject_id: &str, path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MontageError::Source(format!("{}: {e}", path.display())))?;
        let highlights: Vec<Highlight> = serde_json::from_str(&raw)?;
        Ok(Self {
            subject_id: subject_id.to_string(),
            highlights,
            order: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    fn record(&self, session_id: &str, messages: &[ChatMessage]) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions
                .entry(session_id.to_string())
                .or_default()
                .extend(messages.iter().cloned());
        }
    }

    fn rendered_order(&self) -> Vec<String> {
        let order = self.order.lock().map(|o| o.clone()).unwrap_or_default();
        if order.is_empty() {
            return self.highlights.iter().map(|h| h.id.clone()).collect();
        }
        order.into_iter().map(String::from).collect()
    }

    fn check_subject(&self, subject_id: &str) -> Result<()> {
        if subject_id == self.subject_id {
            Ok(())
        } else {
            Err(MontageError::Source(format!("unknown project {subject_id}")))
        }
    }
}

#[async_trait]
impl HighlightSource for DemoProject {
    async fn highlights(&self, subject_id: &str) -> Result<Vec<Highlight>> {
        self.check_subject(subject_id)?;
        Ok(self.highlights.clone())
    }

    async fn current_order(&self, subject_id: &str) -> Result<Vec<OrderEntry>> {
        self.check_subject(subject_id)?;
        self.order
            .lock()
            .map(|o| o.clone())
            .map_err(|_| MontageError::Source("order store poisoned".into()))
    }
}

#[async_trait]
impl ApplyCallback for DemoProject {
    async fn apply(&self, subject_id: &str, new_order: &[OrderEntry]) -> Result<()> {
        self.check_subject(subject_id)?;
        let mut order = self
            .order
            .lock()
            .map_err(|_| MontageError::Apply("order store poisoned".into()))?;
        *order = new_order.to_vec();
        info!(target: "highlight_chat", entries = order.len(), "Saved new order");
        Ok(())
    }
}

#[async_trait]
impl HistoryProvider for DemoProject {
    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| MontageError::Source("session store poisoned".into()))?;
        let log = sessions
            .get(session_id)
            .ok_or_else(|| MontageError::SessionNotFound(session_id.to_string()))?;
        let skip = log.len().saturating_sub(limit);
        Ok(log[skip..].to_vec())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing
    montage_core::telemetry::init_tracing_with_default(
        "warn,montage_core=info,highlight_chat=info",
    );

    let cfg = ChatDemoConfig::load();
    let project = Arc::new(DemoProject::load(&cfg.subject_id, &cfg.highlights_path)?);
    info!(
        target: "highlight_chat",
        project = %cfg.subject_id,
        highlights = project.highlights.len(),
        model = %cfg.model,
        "Loaded project"
    );

    let (progress_sink, mut progress_rx) = ChannelProgressSink::channel(cfg.progress_buffer);
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            println!("  [{}] {}", event.step, event.message);
        }
    });

    let engine = ChatEngine::new(
        Arc::new(LlmClient::from_env()?),
        project.clone(),
        project.clone(),
        project.clone(),
    )
    .with_api_key_provider(Arc::new(EnvApiKeyProvider::new(cfg.api_key_env.clone())))
    .with_progress_sink(Arc::new(progress_sink));

    println!("Chat about the order of your highlights. Commands: /order, /clear, /quit");
    let mut session_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/order" => {
                println!("{}", project.rendered_order().join("\n"));
                continue;
            }
            "/clear" => {
                if let Some(id) = session_id.take() {
                    engine.clear_session(&id).await;
                }
                println!("Started a new conversation.");
                continue;
            }
            _ => {}
        }

        let mut request = ChatRequest::new(
            cfg.subject_id.as_str(),
            cfg.endpoint_id.as_str(),
            input,
            cfg.model.as_str(),
        );
        if let Some(id) = &session_id {
            request = request.with_session(id.as_str());
        }

        match engine.process(request).await {
            Ok(response) => {
                project.record(&response.session_id, &response.transcript);
                session_id = Some(response.session_id.clone());
                println!("\n{}\n", response.message);
                if let Some(summary) = &response.action_summary {
                    println!("({summary})\n");
                }
                if !response.success {
                    warn!(target: "highlight_chat", error = ?response.error, "Turn did not succeed");
                }
            }
            Err(e) => error!(target: "highlight_chat", error = %e, "Request rejected"),
        }
    }

    drop(engine);
    let _ = progress_task.await;
    Ok(())
}
