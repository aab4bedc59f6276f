//! Scripted capability fakes for testing.
//!
//! `MockBackend` implements every backend capability, captures each call
//! and answers from per-capability queues, so flows can be exercised
//! without a network. Calls can be held in flight with `pause`/`release`
//! to reproduce completion races deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Semaphore;

use crate::capability::{
    AnalysisRequest, AnalysisService, ChatService, FacilityFinder, FacilityRequest,
    FacilityResponse, GeoLocator, RecognitionOptions, RecognizerVariant, SessionDirective,
    SpeechPlatform, SpeechRecognizer,
};
use crate::error::{CoreError, CoreResult, GeoError};
use crate::types::{AnalysisResult, Artifact, Coordinates, GroundingChunk, SessionHandle};

/// Predefined text reply or failure.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok(String),
    Fail(String),
}

impl MockReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self::Ok(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    fn into_result(self) -> CoreResult<String> {
        match self {
            Self::Ok(text) => Ok(text),
            Self::Fail(message) => Err(CoreError::Backend(message)),
        }
    }
}

/// Predefined facility finder response.
#[derive(Debug, Clone)]
pub enum MockFacility {
    Ok(FacilityResponse),
    Fail(String),
}

impl MockFacility {
    pub fn ok(narrative: impl Into<String>, grounding: Vec<GroundingChunk>) -> Self {
        Self::Ok(FacilityResponse {
            narrative: narrative.into(),
            grounding,
        })
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// A session opened through the mock.
#[derive(Debug, Clone)]
pub struct CapturedSession {
    pub handle: SessionHandle,
    pub artifact: Artifact,
    pub directive: SessionDirective,
}

/// Mock generative backend.
#[derive(Clone)]
pub struct MockBackend {
    analysis_replies: Arc<RwLock<VecDeque<MockReply>>>,
    turn_replies: Arc<RwLock<VecDeque<MockReply>>>,
    facility_replies: Arc<RwLock<VecDeque<MockFacility>>>,
    session_failure: Arc<RwLock<Option<String>>>,

    analysis_requests: Arc<RwLock<Vec<AnalysisRequest>>>,
    turns: Arc<RwLock<Vec<(SessionHandle, String)>>>,
    facility_requests: Arc<RwLock<Vec<FacilityRequest>>>,
    sessions: Arc<RwLock<Vec<CapturedSession>>>,
    closed: Arc<RwLock<Vec<SessionHandle>>>,

    paused: Arc<AtomicBool>,
    held: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            analysis_replies: Arc::new(RwLock::new(VecDeque::new())),
            turn_replies: Arc::new(RwLock::new(VecDeque::new())),
            facility_replies: Arc::new(RwLock::new(VecDeque::new())),
            session_failure: Arc::new(RwLock::new(None)),
            analysis_requests: Arc::new(RwLock::new(Vec::new())),
            turns: Arc::new(RwLock::new(Vec::new())),
            facility_requests: Arc::new(RwLock::new(Vec::new())),
            sessions: Arc::new(RwLock::new(Vec::new())),
            closed: Arc::new(RwLock::new(Vec::new())),
            paused: Arc::new(AtomicBool::new(false)),
            held: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Queue a reply for the next `analyze` call.
    pub fn add_analysis(self, reply: MockReply) -> Self {
        self.analysis_replies.write().push_back(reply);
        self
    }

    /// Queue a reply for the next chat `turn`.
    pub fn add_turn(self, reply: MockReply) -> Self {
        self.turn_replies.write().push_back(reply);
        self
    }

    /// Queue a response for the next facility query.
    pub fn add_facility(self, reply: MockFacility) -> Self {
        self.facility_replies.write().push_back(reply);
        self
    }

    /// Make every `create_session` call fail.
    pub fn fail_session_creation(self, message: impl Into<String>) -> Self {
        *self.session_failure.write() = Some(message.into());
        self
    }

    /// Hold every subsequent call until released.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Let `n` held calls complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Stop holding calls and let every held call complete.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.gate.add_permits(self.held.load(Ordering::SeqCst));
    }

    /// Number of calls currently held by `pause`.
    pub fn held_calls(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_requests.read().len()
    }

    pub fn analysis_requests(&self) -> Vec<AnalysisRequest> {
        self.analysis_requests.read().clone()
    }

    pub fn turn_calls(&self) -> usize {
        self.turns.read().len()
    }

    pub fn turn_texts(&self) -> Vec<String> {
        self.turns.read().iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn facility_calls(&self) -> usize {
        self.facility_requests.read().len()
    }

    pub fn facility_requests(&self) -> Vec<FacilityRequest> {
        self.facility_requests.read().clone()
    }

    pub fn sessions(&self) -> Vec<CapturedSession> {
        self.sessions.read().clone()
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.read().len()
    }

    pub fn closed_sessions(&self) -> Vec<SessionHandle> {
        self.closed.read().clone()
    }

    async fn wait_for_gate(&self) {
        if self.paused.load(Ordering::SeqCst) {
            self.held.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.held.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl AnalysisService for MockBackend {
    async fn analyze(&self, request: AnalysisRequest) -> CoreResult<AnalysisResult> {
        self.analysis_requests.write().push(request);
        self.wait_for_gate().await;

        let reply = self
            .analysis_replies
            .write()
            .pop_front()
            .unwrap_or_else(|| MockReply::ok("Mock analysis"));
        reply.into_result().map(AnalysisResult::new)
    }
}

#[async_trait]
impl ChatService for MockBackend {
    async fn create_session(
        &self,
        seed: &Artifact,
        directive: &SessionDirective,
    ) -> CoreResult<SessionHandle> {
        if let Some(message) = self.session_failure.read().clone() {
            return Err(CoreError::Backend(message));
        }
        let handle = SessionHandle::new(format!("mock-{}", uuid::Uuid::new_v4()));
        self.sessions.write().push(CapturedSession {
            handle: handle.clone(),
            artifact: seed.clone(),
            directive: directive.clone(),
        });
        Ok(handle)
    }

    async fn turn(&self, session: &SessionHandle, text: &str) -> CoreResult<String> {
        self.turns.write().push((session.clone(), text.to_string()));
        self.wait_for_gate().await;

        self.turn_replies
            .write()
            .pop_front()
            .unwrap_or_else(|| MockReply::ok("Mock reply"))
            .into_result()
    }

    fn close_session(&self, session: &SessionHandle) {
        self.closed.write().push(session.clone());
    }
}

#[async_trait]
impl FacilityFinder for MockBackend {
    async fn find_facility(&self, request: FacilityRequest) -> CoreResult<FacilityResponse> {
        self.facility_requests.write().push(request);
        self.wait_for_gate().await;

        let reply = self
            .facility_replies
            .write()
            .pop_front()
            .unwrap_or_else(|| MockFacility::ok("Mock route", Vec::new()));
        match reply {
            MockFacility::Ok(response) => Ok(response),
            MockFacility::Fail(message) => Err(CoreError::Backend(message)),
        }
    }
}

/// Position source that always answers the same way.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    answer: Result<Coordinates, GeoError>,
    calls: Arc<AtomicUsize>,
}

impl FixedLocator {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            answer: Ok(Coordinates::new(latitude, longitude)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: GeoError) -> Self {
        Self {
            answer: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLocator for FixedLocator {
    async fn current_position(&self) -> Result<Coordinates, GeoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

/// Speech platform exposing at most one recognizer variant.
#[derive(Debug, Clone)]
pub struct MockSpeechPlatform {
    variant: Option<RecognizerVariant>,
    fail_start: bool,
    started_with: Arc<RwLock<Option<RecognitionOptions>>>,
    stops: Arc<AtomicUsize>,
}

impl Default for MockSpeechPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpeechPlatform {
    /// Platform with the standard recognizer.
    pub fn new() -> Self {
        Self::with_variant(RecognizerVariant::Standard)
    }

    pub fn with_variant(variant: RecognizerVariant) -> Self {
        Self {
            variant: Some(variant),
            fail_start: false,
            started_with: Arc::new(RwLock::new(None)),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Platform without any recognizer.
    pub fn unsupported() -> Self {
        Self {
            variant: None,
            ..Self::new()
        }
    }

    /// Recognizers refuse to start.
    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Options the last recognizer was started with.
    pub fn started_with(&self) -> Option<RecognitionOptions> {
        self.started_with.read().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SpeechPlatform for MockSpeechPlatform {
    fn recognizer(&self, variant: RecognizerVariant) -> Option<Box<dyn SpeechRecognizer>> {
        if self.variant != Some(variant) {
            return None;
        }
        Some(Box::new(MockRecognizer {
            fail_start: self.fail_start,
            started_with: Arc::clone(&self.started_with),
            stops: Arc::clone(&self.stops),
        }))
    }
}

struct MockRecognizer {
    fail_start: bool,
    started_with: Arc<RwLock<Option<RecognitionOptions>>>,
    stops: Arc<AtomicUsize>,
}

impl SpeechRecognizer for MockRecognizer {
    fn start(&mut self, options: &RecognitionOptions) -> CoreResult<()> {
        if self.fail_start {
            return Err(CoreError::Speech("recognizer busy".to_string()));
        }
        *self.started_with.write() = Some(options.clone());
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> Artifact {
        Artifact::new(vec![1, 2, 3], "image/png")
    }

    #[tokio::test]
    async fn test_mock_backend_replies_in_order() {
        let backend = MockBackend::new()
            .add_turn(MockReply::ok("first"))
            .add_turn(MockReply::fail("second failed"));
        let handle = SessionHandle::new("s");

        assert_eq!(backend.turn(&handle, "a").await.unwrap(), "first");
        assert!(backend.turn(&handle, "b").await.is_err());
        assert_eq!(backend.turn(&handle, "c").await.unwrap(), "Mock reply");
        assert_eq!(backend.turn_texts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_mock_backend_captures_sessions() {
        let backend = MockBackend::new();
        let directive = crate::config::PromptConfig::default().directive();
        let handle = backend.create_session(&artifact(), &directive).await.unwrap();
        backend.close_session(&handle);

        let sessions = backend.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].artifact.media_type(), "image/png");
        assert_eq!(backend.closed_sessions(), vec![handle]);
    }

    #[tokio::test]
    async fn test_paused_calls_wait_for_release() {
        let backend = MockBackend::new().add_turn(MockReply::ok("held"));
        backend.pause();

        let task = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.turn(&SessionHandle::new("s"), "q").await })
        };
        while backend.held_calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());

        backend.release(1);
        assert_eq!(task.await.unwrap().unwrap(), "held");
    }

    #[tokio::test]
    async fn test_fixed_locator_counts_calls() {
        let geo = FixedLocator::failing(GeoError::PositionUnavailable);
        assert_eq!(geo.current_position().await, Err(GeoError::PositionUnavailable));
        assert_eq!(geo.calls(), 1);
    }
}
