//! Report session: artifact → one-shot analysis → follow-up conversation.
//!
//! A single state machine owns the artifact, its analysis, the backend
//! conversation and the transcript, so they can only change together:
//!
//! ```text
//! Empty ──ingest──▶ Loaded ──analyze──▶ Analyzing ──ok──▶ Conversing
//!   ▲                 ▲  ◀────failed────────┘                │
//!   └──── clear ──────┴──────────── ingest / clear ──────────┘
//! ```
//!
//! Every async completion is checked against a generation counter that is
//! bumped whenever the artifact is replaced or cleared. A response for a
//! superseded artifact is dropped instead of being applied.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{AnalysisRequest, AnalysisService, ChatService};
use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};
use crate::ingest;
use crate::types::{AnalysisResult, Artifact, Message, SessionHandle};
use crate::voice::DraftInput;

/// An active conversation about an analyzed artifact.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub artifact: Artifact,
    pub analysis: AnalysisResult,
    pub session: SessionHandle,
    /// Append-only transcript, in display order.
    pub messages: Vec<Message>,
    /// Turns sent to the backend and not yet resolved.
    pub pending_turns: usize,
}

/// Phases of the report flow.
#[derive(Debug, Clone, Default)]
pub enum ReportPhase {
    #[default]
    Empty,
    Loaded {
        artifact: Artifact,
    },
    Analyzing {
        artifact: Artifact,
    },
    Conversing(Conversation),
}

impl ReportPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loaded { .. } => "loaded",
            Self::Analyzing { .. } => "analyzing",
            Self::Conversing(_) => "conversing",
        }
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Empty => None,
            Self::Loaded { artifact } | Self::Analyzing { artifact } => Some(artifact),
            Self::Conversing(conversation) => Some(&conversation.artifact),
        }
    }
}

/// Result of applying an ingested file or data URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The artifact replaced any previous one.
    Accepted,
    /// The input was not a base64 data URL; nothing changed.
    Malformed,
    /// Another ingest or a clear happened while the file was being read.
    Superseded,
}

/// Result of an `analyze` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    Completed,
    Failed { notice: String },
    Superseded,
}

/// Result of a `send` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The bot reply that was appended.
    Replied(Message),
    /// Blank input; no call was made.
    Rejected,
    /// The backend turn failed; nothing was appended for it.
    Dropped,
    /// The conversation was replaced before the reply arrived.
    Superseded,
}

/// Render-ready snapshot of the report flow.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub phase: &'static str,
    pub has_artifact: bool,
    pub can_analyze: bool,
    pub is_analyzing: bool,
    pub is_awaiting_reply: bool,
    pub analysis: Option<String>,
    pub messages: Vec<Message>,
    pub notice: Option<String>,
}

#[derive(Debug, Default)]
struct ReportState {
    phase: ReportPhase,
    generation: u64,
    notice: Option<String>,
}

/// Orchestrates ingestion, analysis and the follow-up conversation.
#[derive(Clone)]
pub struct ReportSession {
    analysis: Arc<dyn AnalysisService>,
    chat: Arc<dyn ChatService>,
    config: Arc<AppConfig>,
    state: Arc<Mutex<ReportState>>,
}

impl ReportSession {
    pub fn new(
        analysis: Arc<dyn AnalysisService>,
        chat: Arc<dyn ChatService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            analysis,
            chat,
            config,
            state: Arc::new(Mutex::new(ReportState::default())),
        }
    }

    /// Apply a data URL produced by the file picker.
    pub fn ingest_data_url(&self, data_url: &str) -> IngestOutcome {
        match ingest::parse_data_url(data_url) {
            Some(artifact) => {
                self.replace_artifact(Some(artifact));
                IngestOutcome::Accepted
            }
            None => {
                debug!("Ignoring malformed data URL");
                IngestOutcome::Malformed
            }
        }
    }

    /// Read an image file and apply it as the new artifact.
    pub async fn ingest_file(&self, path: impl AsRef<Path>) -> CoreResult<IngestOutcome> {
        let generation = self.state.lock().generation;
        let data_url = ingest::read_as_data_url(path).await?;

        if self.state.lock().generation != generation {
            warn!("Discarding file read superseded by a newer upload or clear");
            return Ok(IngestOutcome::Superseded);
        }
        Ok(self.ingest_data_url(&data_url))
    }

    /// Drop the artifact, its analysis, session and transcript.
    pub fn clear(&self) {
        self.replace_artifact(None);
    }

    fn replace_artifact(&self, artifact: Option<Artifact>) {
        let stale_session = {
            let mut state = self.state.lock();
            let previous = std::mem::take(&mut state.phase);
            state.generation += 1;
            state.notice = None;
            if let Some(artifact) = artifact {
                info!(
                    "Artifact loaded: {} ({} bytes), generation {}",
                    artifact.media_type(),
                    artifact.payload().len(),
                    state.generation
                );
                state.phase = ReportPhase::Loaded { artifact };
            } else {
                info!("Report cleared, generation {}", state.generation);
            }
            match previous {
                ReportPhase::Conversing(conversation) => Some(conversation.session),
                _ => None,
            }
        };

        if let Some(session) = stale_session {
            debug!("Closing session {}", session);
            self.chat.close_session(&session);
        }
    }

    /// Run the one-shot analysis and open the follow-up conversation.
    ///
    /// Only valid from `Loaded`; a second call while one is in flight is
    /// rejected with `InvalidState`.
    pub async fn analyze(&self) -> CoreResult<AnalyzeOutcome> {
        let (artifact, generation) = {
            let mut state = self.state.lock();
            let artifact = match &state.phase {
                ReportPhase::Loaded { artifact } => artifact.clone(),
                other => {
                    return Err(CoreError::invalid_state("analyze", other.name(), "loaded"));
                }
            };
            state.phase = ReportPhase::Analyzing {
                artifact: artifact.clone(),
            };
            state.notice = None;
            (artifact, state.generation)
        };

        info!("Analyzing {} artifact", artifact.media_type());
        let outcome = self.run_analysis(&artifact).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            drop(state);
            warn!("Discarding analysis for a superseded artifact");
            if let Ok((_, session)) = outcome {
                self.chat.close_session(&session);
            }
            return Ok(AnalyzeOutcome::Superseded);
        }

        match outcome {
            Ok((analysis, session)) => {
                info!("Analysis complete, conversation {} opened", session);
                state.phase = ReportPhase::Conversing(Conversation {
                    artifact,
                    analysis,
                    session,
                    messages: vec![Message::bot(&self.config.prompts.greeting)],
                    pending_turns: 0,
                });
                Ok(AnalyzeOutcome::Completed)
            }
            Err(e) => {
                warn!("Analysis failed: {}", e);
                let notice = self.config.notices.analysis_failed.clone();
                state.phase = ReportPhase::Loaded { artifact };
                state.notice = Some(notice.clone());
                Ok(AnalyzeOutcome::Failed { notice })
            }
        }
    }

    async fn run_analysis(&self, artifact: &Artifact) -> CoreResult<(AnalysisResult, SessionHandle)> {
        let request = AnalysisRequest {
            artifact: artifact.clone(),
            instruction: self.config.prompts.analysis_instruction.clone(),
            compute_budget_hint: self.config.models.analysis_compute_budget,
        };
        let mut analysis = self.analysis.analyze(request).await?;
        if analysis.narrative.trim().is_empty() {
            analysis.narrative = self.config.fallbacks.empty_analysis.clone();
        }

        let session = self
            .chat
            .create_session(artifact, &self.config.prompts.directive())
            .await?;
        Ok((analysis, session))
    }

    /// Send a follow-up question about the analyzed report.
    pub async fn send(&self, text: &str) -> CoreResult<SendOutcome> {
        if text.trim().is_empty() {
            return Ok(SendOutcome::Rejected);
        }

        let (session, generation) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match &mut state.phase {
                ReportPhase::Conversing(conversation) => {
                    conversation.messages.push(Message::user(text));
                    conversation.pending_turns += 1;
                    (conversation.session.clone(), state.generation)
                }
                other => {
                    return Err(CoreError::invalid_state("send", other.name(), "conversing"));
                }
            }
        };

        debug!("Sending turn to session {} ({} chars)", session, text.len());
        let reply = self.chat.turn(&session, text).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.generation != generation {
            warn!("Discarding reply for a superseded conversation");
            return Ok(SendOutcome::Superseded);
        }
        let conversation = match &mut state.phase {
            ReportPhase::Conversing(conversation) if conversation.session == session => conversation,
            _ => return Ok(SendOutcome::Superseded),
        };
        conversation.pending_turns = conversation.pending_turns.saturating_sub(1);

        match reply {
            Ok(text) => {
                let text = if text.trim().is_empty() {
                    self.config.fallbacks.empty_reply.clone()
                } else {
                    text
                };
                let message = Message::bot(text);
                conversation.messages.push(message.clone());
                Ok(SendOutcome::Replied(message))
            }
            Err(e) => {
                warn!("Chat turn failed, dropping reply: {}", e);
                Ok(SendOutcome::Dropped)
            }
        }
    }

    /// Take the composed draft and send it. Blank drafts are left in place.
    pub async fn submit_draft(&self, draft: &mut DraftInput) -> CoreResult<SendOutcome> {
        if draft.is_blank() {
            return Ok(SendOutcome::Rejected);
        }
        {
            let state = self.state.lock();
            if !matches!(state.phase, ReportPhase::Conversing(_)) {
                return Err(CoreError::invalid_state(
                    "submit",
                    state.phase.name(),
                    "conversing",
                ));
            }
        }
        let text = draft.take();
        self.send(&text).await
    }

    pub fn phase(&self) -> ReportPhase {
        self.state.lock().phase.clone()
    }

    pub fn artifact(&self) -> Option<Artifact> {
        self.state.lock().phase.artifact().cloned()
    }

    pub fn analysis(&self) -> Option<AnalysisResult> {
        match &self.state.lock().phase {
            ReportPhase::Conversing(conversation) => Some(conversation.analysis.clone()),
            _ => None,
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        match &self.state.lock().phase {
            ReportPhase::Conversing(conversation) => conversation.messages.clone(),
            _ => Vec::new(),
        }
    }

    pub fn notice(&self) -> Option<String> {
        self.state.lock().notice.clone()
    }

    /// Take the pending notice so it is shown only once.
    pub fn take_notice(&self) -> Option<String> {
        self.state.lock().notice.take()
    }

    pub fn snapshot(&self) -> ReportView {
        let state = self.state.lock();
        let (analysis, messages, is_awaiting_reply) = match &state.phase {
            ReportPhase::Conversing(c) => (
                Some(c.analysis.narrative.clone()),
                c.messages.clone(),
                c.pending_turns > 0,
            ),
            _ => (None, Vec::new(), false),
        };

        ReportView {
            phase: state.phase.name(),
            has_artifact: state.phase.artifact().is_some(),
            can_analyze: matches!(state.phase, ReportPhase::Loaded { .. }),
            is_analyzing: matches!(state.phase, ReportPhase::Analyzing { .. }),
            is_awaiting_reply,
            analysis,
            messages,
            notice: state.notice.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::encode_data_url;
    use crate::mock::{MockBackend, MockReply};
    use crate::types::Sender;

    fn session_with(backend: &MockBackend) -> ReportSession {
        ReportSession::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(AppConfig::default()),
        )
    }

    fn jpeg_url() -> String {
        encode_data_url(&[0xff, 0xd8, 0xff, 0xe0], "image/jpeg")
    }

    #[test]
    fn test_malformed_ingest_leaves_state() {
        let backend = MockBackend::new();
        let session = session_with(&backend);
        assert_eq!(session.ingest_data_url(&jpeg_url()), IngestOutcome::Accepted);

        assert_eq!(session.ingest_data_url("garbage"), IngestOutcome::Malformed);
        assert_eq!(session.phase().name(), "loaded");
        assert_eq!(session.artifact().unwrap().media_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_analyze_requires_artifact() {
        let backend = MockBackend::new();
        let session = session_with(&backend);
        let err = session.analyze().await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert_eq!(backend.analysis_calls(), 0);
    }

    #[tokio::test]
    async fn test_analyze_sends_instruction_and_budget() {
        let backend = MockBackend::new().add_analysis(MockReply::ok("All values normal."));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());

        assert_eq!(session.analyze().await.unwrap(), AnalyzeOutcome::Completed);

        let requests = backend.analysis_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].artifact.media_type(), "image/jpeg");
        assert_eq!(requests[0].compute_budget_hint, 32768);
        assert!(requests[0].instruction.contains("Key Biomarkers"));
        assert_eq!(backend.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_empty_analysis_uses_placeholder() {
        let backend = MockBackend::new().add_analysis(MockReply::ok("   "));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());
        session.analyze().await.unwrap();

        assert_eq!(
            session.analysis().unwrap().narrative,
            AppConfig::default().fallbacks.empty_analysis
        );
    }

    #[tokio::test]
    async fn test_failed_analysis_keeps_artifact_for_retry() {
        let backend = MockBackend::new()
            .add_analysis(MockReply::fail("quota exceeded"))
            .add_analysis(MockReply::ok("Second time lucky."));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());

        let outcome = session.analyze().await.unwrap();
        assert!(matches!(outcome, AnalyzeOutcome::Failed { .. }));
        assert!(session.analysis().is_none());
        assert!(session.messages().is_empty());
        assert_eq!(backend.sessions_created(), 0);
        assert_eq!(session.take_notice().unwrap(), "Analysis failed. Please try again.");
        assert!(session.notice().is_none());

        assert_eq!(session.analyze().await.unwrap(), AnalyzeOutcome::Completed);
        assert_eq!(session.analysis().unwrap().narrative, "Second time lucky.");
    }

    #[tokio::test]
    async fn test_session_creation_failure_fails_analysis() {
        let backend = MockBackend::new()
            .add_analysis(MockReply::ok("ok"))
            .fail_session_creation("session store offline");
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());

        let outcome = session.analyze().await.unwrap();
        assert!(matches!(outcome, AnalyzeOutcome::Failed { .. }));
        assert_eq!(session.phase().name(), "loaded");
    }

    #[tokio::test]
    async fn test_blank_send_is_rejected_without_call() {
        let backend = MockBackend::new().add_analysis(MockReply::ok("fine"));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());
        session.analyze().await.unwrap();

        assert_eq!(session.send("   \n\t").await.unwrap(), SendOutcome::Rejected);
        assert_eq!(backend.turn_calls(), 0);
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_send_without_conversation_is_invalid() {
        let backend = MockBackend::new();
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());
        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert_eq!(backend.turn_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_user_message_only() {
        let backend = MockBackend::new()
            .add_analysis(MockReply::ok("fine"))
            .add_turn(MockReply::fail("503"));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());
        session.analyze().await.unwrap();

        assert_eq!(session.send("Is this bad?").await.unwrap(), SendOutcome::Dropped);
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, Sender::User);
        assert!(session.notice().is_none());
        assert!(!session.snapshot().is_awaiting_reply);
    }

    #[tokio::test]
    async fn test_empty_reply_uses_fallback() {
        let backend = MockBackend::new()
            .add_analysis(MockReply::ok("fine"))
            .add_turn(MockReply::ok(""));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());
        session.analyze().await.unwrap();

        match session.send("?").await.unwrap() {
            SendOutcome::Replied(message) => assert_eq!(message.text, "I didn't understand that."),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reingest_closes_previous_session() {
        let backend = MockBackend::new().add_analysis(MockReply::ok("fine"));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());
        session.analyze().await.unwrap();

        session.ingest_data_url(&encode_data_url(b"png", "image/png"));
        let view = session.snapshot();
        assert_eq!(view.phase, "loaded");
        assert!(view.analysis.is_none());
        assert!(view.messages.is_empty());
        assert!(view.can_analyze);
        assert_eq!(backend.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_submit_draft_clears_input() {
        let backend = MockBackend::new()
            .add_analysis(MockReply::ok("fine"))
            .add_turn(MockReply::ok("Sure."));
        let session = session_with(&backend);
        session.ingest_data_url(&jpeg_url());
        session.analyze().await.unwrap();

        let mut draft = DraftInput::from("What is HbA1c?");
        let outcome = session.submit_draft(&mut draft).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Replied(_)));
        assert!(draft.is_blank());
        assert_eq!(backend.turn_texts(), vec!["What is HbA1c?".to_string()]);
    }

    #[tokio::test]
    async fn test_submit_draft_without_conversation_keeps_text() {
        let backend = MockBackend::new();
        let session = session_with(&backend);
        let mut draft = DraftInput::from("hello");
        assert!(session.submit_draft(&mut draft).await.is_err());
        assert_eq!(draft.as_str(), "hello");
    }
}
