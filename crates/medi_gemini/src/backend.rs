//! Gemini-backed implementations of the core capabilities.
//!
//! Chat sessions keep their history here, keyed by handle. Each request
//! replays the full history, so a failed turn simply leaves it untouched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use medi_core::{
    AnalysisRequest, AnalysisResult, AnalysisService, AppConfig, Artifact, ChatService,
    CoreResult, FacilityFinder, FacilityRequest, FacilityResponse, ModelConfig, SessionDirective,
    SessionHandle,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::client::GeminiClient;
use crate::error::GeminiError;
use crate::wire::{
    Content, GenerateRequest, GenerationConfig, Part, ThinkingConfig, Tool, ToolConfig,
};

#[derive(Debug, Clone)]
struct ChatHistory {
    system_instruction: Content,
    contents: Vec<Content>,
}

impl ChatHistory {
    /// Prior turns: the artifact with the seed prompt, then the acknowledgement.
    fn seeded(artifact: &Artifact, directive: &SessionDirective) -> Self {
        Self {
            system_instruction: Content::instruction(&directive.system_instruction),
            contents: vec![
                Content::user(vec![
                    Part::inline(artifact),
                    Part::text(&directive.seed_prompt),
                ]),
                Content::model(&directive.seed_acknowledgement),
            ],
        }
    }
}

/// Analysis, chat and facility lookup over the Gemini REST API.
pub struct GeminiBackend {
    client: GeminiClient,
    models: ModelConfig,
    sessions: RwLock<HashMap<SessionHandle, ChatHistory>>,
}

impl GeminiBackend {
    pub fn new(client: GeminiClient, config: Arc<AppConfig>) -> Self {
        Self {
            client,
            models: config.models.clone(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of sessions currently held.
    pub fn open_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// Turns recorded for a session, seed turns included.
    pub fn history_len(&self, session: &SessionHandle) -> Option<usize> {
        self.sessions.read().get(session).map(|h| h.contents.len())
    }
}

#[async_trait]
impl AnalysisService for GeminiBackend {
    async fn analyze(&self, request: AnalysisRequest) -> CoreResult<AnalysisResult> {
        let generation_config = (request.compute_budget_hint > 0).then(|| GenerationConfig {
            thinking_config: Some(ThinkingConfig {
                thinking_budget: request.compute_budget_hint,
            }),
        });
        let body = GenerateRequest {
            contents: vec![Content::user(vec![
                Part::inline(&request.artifact),
                Part::text(&request.instruction),
            ])],
            generation_config,
            ..GenerateRequest::default()
        };

        info!(
            "Analyzing {} artifact with {}",
            request.artifact.media_type(),
            self.models.analysis_model
        );
        let response = self.client.generate(&self.models.analysis_model, &body).await?;
        Ok(AnalysisResult::new(response.text()))
    }
}

#[async_trait]
impl ChatService for GeminiBackend {
    async fn create_session(
        &self,
        seed: &Artifact,
        directive: &SessionDirective,
    ) -> CoreResult<SessionHandle> {
        let handle = SessionHandle::generate();
        self.sessions
            .write()
            .insert(handle.clone(), ChatHistory::seeded(seed, directive));
        debug!("Opened chat session {}", handle);
        Ok(handle)
    }

    async fn turn(&self, session: &SessionHandle, text: &str) -> CoreResult<String> {
        let history = self
            .sessions
            .read()
            .get(session)
            .cloned()
            .ok_or_else(|| GeminiError::UnknownSession(session.to_string()))?;

        let user = Content::user(vec![Part::text(text)]);
        let mut contents = history.contents;
        contents.push(user.clone());
        let body = GenerateRequest {
            contents,
            system_instruction: Some(history.system_instruction),
            ..GenerateRequest::default()
        };

        let response = self.client.generate(&self.models.chat_model, &body).await?;
        let reply = response.text();

        // The session may have been closed while the request was in flight.
        if let Some(history) = self.sessions.write().get_mut(session) {
            history.contents.push(user);
            history.contents.push(Content::model(&reply));
        }
        Ok(reply)
    }

    fn close_session(&self, session: &SessionHandle) {
        if self.sessions.write().remove(session).is_some() {
            debug!("Closed chat session {}", session);
        }
    }
}

#[async_trait]
impl FacilityFinder for GeminiBackend {
    async fn find_facility(&self, request: FacilityRequest) -> CoreResult<FacilityResponse> {
        let tools = if request.tool_hint == FacilityRequest::MAPS_TOOL {
            vec![Tool::google_maps()]
        } else {
            Vec::new()
        };
        let body = GenerateRequest {
            contents: vec![Content::user(vec![Part::text(&request.instruction)])],
            tools,
            tool_config: Some(ToolConfig::near(request.coordinates)),
            ..GenerateRequest::default()
        };

        info!("Looking up facilities near {}", request.coordinates);
        let response = self.client.generate(&self.models.facility_model, &body).await?;
        Ok(FacilityResponse {
            narrative: response.text(),
            grounding: response.grounding_chunks(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> GeminiBackend {
        GeminiBackend::new(
            GeminiClient::new("key").with_base_url("http://127.0.0.1:9"),
            Arc::new(AppConfig::default()),
        )
    }

    #[test]
    fn test_seeded_history_shape() {
        let artifact = Artifact::new(vec![1, 2, 3], "image/png");
        let directive = AppConfig::default().prompts.directive();
        let history = ChatHistory::seeded(&artifact, &directive);

        assert_eq!(history.contents.len(), 2);
        assert_eq!(history.contents[0].role.as_deref(), Some("user"));
        assert!(history.contents[0].parts[0].inline_data.is_some());
        assert_eq!(history.contents[1].role.as_deref(), Some("model"));
        assert_eq!(history.contents[1].text(), directive.seed_acknowledgement);
        assert!(history.system_instruction.role.is_none());
    }

    #[tokio::test]
    async fn test_sessions_open_and_close_locally() {
        let backend = backend();
        let artifact = Artifact::new(vec![0xff], "image/jpeg");
        let directive = AppConfig::default().prompts.directive();

        let a = backend.create_session(&artifact, &directive).await.unwrap();
        let b = backend.create_session(&artifact, &directive).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.open_sessions(), 2);
        assert_eq!(backend.history_len(&a), Some(2));

        backend.close_session(&a);
        backend.close_session(&a);
        assert_eq!(backend.open_sessions(), 1);
        assert_eq!(backend.history_len(&a), None);
    }

    #[tokio::test]
    async fn test_turn_on_unknown_session_fails() {
        let backend = backend();
        let err = backend
            .turn(&SessionHandle::new("missing"), "hello")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown chat session"));
    }
}
