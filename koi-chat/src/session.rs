//! One conversation over one document set.
//!
//! A [`Session`] owns everything a chat needs: the active
//! [`KnowledgeBase`], the conversation history and the model handles. Every
//! operation takes `&mut self`, so turns and ingestion are strictly
//! sequential.
//!
//! ```rust,ignore
//! let mut session = Session::builder()
//!     .llm(Arc::new(GeminiModel::new(&api_key, "gemini-2.5-flash")?))
//!     .pipeline(pipeline)
//!     .build()?;
//!
//! let report = session.ingest(&[FileBlob::from_path("data/handbook.pdf")?]).await?;
//! let answer = session.ask("What is the refund policy?").await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use koi_model::Llm;
use koi_rag::{DocumentLoader, FileBlob, KnowledgeBase, LoadReport, RagError, RagPipeline};
use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::agent::AgentLoop;
use crate::condenser::QuestionCondenser;
use crate::config::{AnswerMode, ChatConfig};
use crate::error::{ChatError, Result};
use crate::history::ConversationHistory;
use crate::prompt::PromptTemplates;
use crate::synthesizer::{Answer, AnswerSynthesizer, distinct_sources, format_context};
use crate::tool::{RetrievalTool, Tool, ToolRegistry};

/// Per-file result of an ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Indexed { name: String, chunks: usize },
    Skipped { name: String, reason: String },
}

impl FileOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Indexed { name, .. } | Self::Skipped { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files: Vec<FileOutcome>,
    /// Chunks in the new index, or zero when nothing was indexed.
    pub total_chunks: usize,
    /// Whether the active index was replaced (and the history reset).
    pub replaced_index: bool,
}

impl IngestReport {
    pub fn indexed_files(&self) -> usize {
        self.files.iter().filter(|f| matches!(f, FileOutcome::Indexed { .. })).count()
    }
}

pub struct Session {
    id: Uuid,
    config: ChatConfig,
    templates: Arc<PromptTemplates>,
    llm: Arc<dyn Llm>,
    pipeline: RagPipeline,
    loader: DocumentLoader,
    knowledge: Option<KnowledgeBase>,
    history: ConversationHistory,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn knowledge_base(&self) -> Option<&KnowledgeBase> {
        self.knowledge.as_ref()
    }

    pub fn set_mode(&mut self, mode: AnswerMode) {
        self.config.mode = mode;
    }

    /// Clear the conversation back to the greeting. The index is kept.
    pub fn reset_conversation(&mut self) {
        self.history = ConversationHistory::with_greeting(self.config.greeting.as_deref());
        info!(session = %self.id, "conversation reset");
    }

    /// Load, chunk and index `blobs`, replacing the active document set.
    ///
    /// Files that cannot be loaded are reported and skipped. If none can be
    /// loaded the current index and history stay as they are. Otherwise the
    /// new index is swapped in only after it is fully built, and the
    /// conversation restarts.
    pub async fn ingest(&mut self, blobs: &[FileBlob]) -> Result<IngestReport> {
        let report = self.loader.load_batch(blobs);
        self.ingest_loaded(report).await
    }

    /// Ingest every supported file of a directory.
    pub async fn ingest_directory(&mut self, dir: impl AsRef<Path>) -> Result<IngestReport> {
        let report = self.loader.load_directory(dir)?;
        self.ingest_loaded(report).await
    }

    async fn ingest_loaded(&mut self, report: LoadReport) -> Result<IngestReport> {
        let span = info_span!("ingest", session = %self.id);
        let LoadReport { documents, failures } = report;

        let mut skipped: Vec<FileOutcome> = failures
            .into_iter()
            .map(|f| FileOutcome::Skipped { name: f.name, reason: f.error.to_string() })
            .collect();

        let chunks = self.pipeline.chunk(&documents);
        let mut per_document: HashMap<&str, usize> = HashMap::new();
        for chunk in &chunks {
            *per_document.entry(chunk.document_id.as_str()).or_default() += 1;
        }

        let mut files: Vec<FileOutcome> = Vec::with_capacity(documents.len() + skipped.len());
        for document in &documents {
            match per_document.get(document.id.as_str()) {
                Some(&count) => files
                    .push(FileOutcome::Indexed { name: document.origin.clone(), chunks: count }),
                None => skipped.push(FileOutcome::Skipped {
                    name: document.origin.clone(),
                    reason: "no text could be extracted".to_string(),
                }),
            }
        }

        if chunks.is_empty() {
            warn!(parent: &span, skipped = skipped.len(), "nothing to index; index unchanged");
            return Ok(IngestReport { files: skipped, total_chunks: 0, replaced_index: false });
        }

        let knowledge = self.pipeline.index_chunks(chunks).instrument(span.clone()).await?;
        let total_chunks = knowledge.chunk_count();
        self.replace_knowledge(knowledge);

        files.extend(skipped);
        info!(parent: &span, files = files.len(), total_chunks, "ingestion finished");
        Ok(IngestReport { files, total_chunks, replaced_index: true })
    }

    fn replace_knowledge(&mut self, knowledge: KnowledgeBase) {
        self.knowledge = Some(knowledge);
        self.reset_conversation();
    }

    /// Persist the active dense index.
    pub fn save_index(&self, path: impl AsRef<Path>) -> Result<()> {
        let knowledge = self.knowledge.as_ref().ok_or(RagError::EmptyIndexError)?;
        knowledge.save(path)?;
        Ok(())
    }

    /// Replace the active index with a saved one; the conversation restarts.
    pub async fn load_index(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let knowledge = self.pipeline.load_knowledge_base(path).await?;
        let chunks = knowledge.chunk_count();
        self.replace_knowledge(knowledge);
        Ok(chunks)
    }

    /// Answer one question and record the exchange.
    ///
    /// On any error the history is left unchanged.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let span = info_span!("ask", session = %self.id, mode = ?self.config.mode);
        let answer = match self.config.mode {
            AnswerMode::FixedPipeline => {
                self.answer_fixed(question, None::<fn(&str)>).instrument(span).await?
            }
            AnswerMode::Agentic => self.answer_agentic(question).instrument(span).await?,
        };
        self.history.record_exchange(question, &answer.answer);
        Ok(answer)
    }

    /// Like [`ask`](Self::ask), streaming the answer text into `on_delta`.
    ///
    /// Only the fixed pipeline streams; in agentic mode the finished answer
    /// is delivered as a single delta. History is updated only after the
    /// stream completed.
    pub async fn ask_streaming<F>(&mut self, question: &str, mut on_delta: F) -> Result<Answer>
    where
        F: FnMut(&str) + Send,
    {
        let span = info_span!("ask", session = %self.id, mode = ?self.config.mode, streaming = true);
        let answer = match self.config.mode {
            AnswerMode::FixedPipeline => {
                self.answer_fixed(question, Some(on_delta)).instrument(span).await?
            }
            AnswerMode::Agentic => {
                let answer = self.answer_agentic(question).instrument(span).await?;
                on_delta(&answer.answer);
                answer
            }
        };
        self.history.record_exchange(question, &answer.answer);
        Ok(answer)
    }

    fn active_knowledge(&self) -> Result<&KnowledgeBase> {
        self.knowledge.as_ref().ok_or(ChatError::Rag(RagError::EmptyIndexError))
    }

    async fn answer_fixed<F>(&self, question: &str, on_delta: Option<F>) -> Result<Answer>
    where
        F: FnMut(&str) + Send,
    {
        let knowledge = self.active_knowledge()?;
        let timeout = self.config.service_timeout();

        let condenser = QuestionCondenser::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.templates),
            self.config.temperature,
            timeout,
        );
        let standalone = condenser.condense(question, &self.history).await?;

        let results = knowledge.retrieve(&standalone).await?;
        let context = format_context(&results);
        info!(retrieved = results.len(), context_chars = context.len(), "context retrieved");

        let synthesizer = AnswerSynthesizer::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.templates),
            self.config.temperature,
            timeout,
        );
        let text = match on_delta {
            Some(on_delta) => {
                synthesizer.synthesize_streaming(question, &context, &self.history, on_delta).await?
            }
            None => synthesizer.synthesize(question, &context, &self.history).await?,
        };

        Ok(Answer {
            answer: text,
            mode: AnswerMode::FixedPipeline,
            standalone_question: Some(standalone),
            trace: Vec::new(),
            sources: distinct_sources(&results),
        })
    }

    fn tool_registry(&self, knowledge: &KnowledgeBase) -> Result<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(
            RetrievalTool::new(knowledge.clone(), &self.templates.not_found)
                .with_description(&self.templates.retrieval_tool_description),
        ))?;
        for tool in &self.extra_tools {
            registry.register(Arc::clone(tool))?;
        }
        Ok(registry)
    }

    async fn answer_agentic(&self, question: &str) -> Result<Answer> {
        let knowledge = self.active_knowledge()?;
        let tools = self.tool_registry(knowledge)?;

        let agent = AgentLoop::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.templates),
            self.config.temperature,
            self.config.service_timeout(),
            self.config.max_agent_steps,
        );
        let outcome = agent.run(question, &self.history, &tools).await?;

        Ok(Answer {
            answer: outcome.answer,
            mode: AnswerMode::Agentic,
            standalone_question: None,
            trace: outcome.trace,
            sources: outcome.sources,
        })
    }
}

/// Builder for a [`Session`]. The model and pipeline are required.
#[derive(Default)]
pub struct SessionBuilder {
    config: Option<ChatConfig>,
    templates: Option<PromptTemplates>,
    llm: Option<Arc<dyn Llm>>,
    pipeline: Option<RagPipeline>,
    tools: Vec<Arc<dyn Tool>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn Llm>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn pipeline(mut self, pipeline: RagPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Offer an additional tool to the agent next to document search.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn build(self) -> Result<Session> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let templates = self.templates.unwrap_or_default();
        templates.validate()?;
        let llm = self.llm.ok_or_else(|| ChatError::ConfigError("llm is required".to_string()))?;
        let pipeline = self
            .pipeline
            .ok_or_else(|| ChatError::ConfigError("pipeline is required".to_string()))?;

        let mut names = vec![RetrievalTool::NAME];
        for tool in &self.tools {
            if names.contains(&tool.name()) {
                return Err(ChatError::ConfigError(format!(
                    "tool '{}' is already registered",
                    tool.name()
                )));
            }
            names.push(tool.name());
        }

        let id = Uuid::new_v4();
        info!(session = %id, mode = ?config.mode, "session created");
        Ok(Session {
            id,
            history: ConversationHistory::with_greeting(config.greeting.as_deref()),
            config,
            templates: Arc::new(templates),
            llm,
            pipeline,
            loader: DocumentLoader::new(),
            knowledge: None,
            extra_tools: self.tools,
        })
    }
}
