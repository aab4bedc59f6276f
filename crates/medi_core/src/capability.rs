//! External capability contracts.
//!
//! Everything the orchestrators talk to (the generative backend, the device
//! position source, the speech recognizer) sits behind one of these traits
//! and is injected as an `Arc<dyn ...>`, so flows can be driven by scripted
//! fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, GeoError};
use crate::types::{AnalysisResult, Artifact, Coordinates, GroundingChunk, SessionHandle};

/// A platform capability that may be entirely absent.
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Available(v),
            None => Self::Unavailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn as_ref(&self) -> Capability<&T> {
        match self {
            Self::Available(v) => Capability::Available(v),
            Self::Unavailable => Capability::Unavailable,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable => None,
        }
    }
}

/// One-shot structured analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub artifact: Artifact,
    pub instruction: String,
    /// Reasoning budget the backend may spend; 0 leaves it to the backend.
    pub compute_budget_hint: u32,
}

/// Fixed behaviour boundaries for a follow-up conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDirective {
    /// System instruction for the assistant.
    pub system_instruction: String,
    /// Opening user turn that carries the artifact.
    pub seed_prompt: String,
    /// Canned model reply to the opening turn.
    pub seed_acknowledgement: String,
}

/// Facility lookup request.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityRequest {
    pub coordinates: Coordinates,
    pub instruction: String,
    pub tool_hint: String,
}

impl FacilityRequest {
    pub const MAPS_TOOL: &'static str = "maps";

    pub fn new(coordinates: Coordinates, instruction: impl Into<String>) -> Self {
        Self {
            coordinates,
            instruction: instruction.into(),
            tool_hint: Self::MAPS_TOOL.to_string(),
        }
    }
}

/// Route narrative plus the raw grounding chunks behind it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacilityResponse {
    pub narrative: String,
    pub grounding: Vec<GroundingChunk>,
}

/// Structured analysis of a report image.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> CoreResult<AnalysisResult>;
}

/// Stateful follow-up conversation anchored to an artifact.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Open a session seeded with the artifact and directive.
    async fn create_session(
        &self,
        seed: &Artifact,
        directive: &SessionDirective,
    ) -> CoreResult<SessionHandle>;

    /// Send one user turn and return the model's reply.
    async fn turn(&self, session: &SessionHandle, text: &str) -> CoreResult<String>;

    /// Discard backend-held history. Unknown handles are ignored.
    fn close_session(&self, session: &SessionHandle);
}

/// Nearest medical facility lookup.
#[async_trait]
pub trait FacilityFinder: Send + Sync {
    async fn find_facility(&self, request: FacilityRequest) -> CoreResult<FacilityResponse>;
}

/// One-shot device position source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeoError>;
}

/// Vendor variants a platform may expose its recognizer under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognizerVariant {
    Standard,
    VendorPrefixed,
}

impl RecognizerVariant {
    /// Lookup order when resolving a recognizer.
    pub const PREFERENCE: [RecognizerVariant; 2] = [Self::Standard, Self::VendorPrefixed];
}

/// Recognition parameters handed to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            continuous: false,
            interim_results: false,
        }
    }
}

/// Events a recognizer emits while listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Start,
    Result { transcript: String, is_final: bool },
    Error(String),
    End,
}

/// A platform speech recognizer handle.
pub trait SpeechRecognizer: Send {
    fn start(&mut self, options: &RecognitionOptions) -> CoreResult<()>;
    fn stop(&mut self);
}

/// Source of speech recognizers.
pub trait SpeechPlatform: Send + Sync {
    fn recognizer(&self, variant: RecognizerVariant) -> Option<Box<dyn SpeechRecognizer>>;

    /// First available recognizer in preference order.
    fn resolve(&self) -> Capability<Box<dyn SpeechRecognizer>> {
        Capability::from_option(
            RecognizerVariant::PREFERENCE
                .iter()
                .find_map(|variant| self.recognizer(*variant)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_from_option() {
        assert!(Capability::from_option(Some(1)).is_available());
        assert!(!Capability::<u8>::from_option(None).is_available());
        assert_eq!(Capability::Available(3).into_option(), Some(3));
    }

    #[test]
    fn test_facility_request_uses_maps_tool() {
        let req = FacilityRequest::new(Coordinates::new(1.0, 2.0), "find");
        assert_eq!(req.tool_hint, "maps");
    }

    struct PrefixedOnly;

    struct NullRecognizer;

    impl SpeechRecognizer for NullRecognizer {
        fn start(&mut self, _options: &RecognitionOptions) -> CoreResult<()> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    impl SpeechPlatform for PrefixedOnly {
        fn recognizer(&self, variant: RecognizerVariant) -> Option<Box<dyn SpeechRecognizer>> {
            match variant {
                RecognizerVariant::VendorPrefixed => Some(Box::new(NullRecognizer)),
                RecognizerVariant::Standard => None,
            }
        }
    }

    #[test]
    fn test_resolve_falls_back_to_prefixed_variant() {
        assert!(PrefixedOnly.resolve().is_available());
    }

    #[tokio::test]
    async fn test_mock_geolocator_expectation() {
        let mut geo = MockGeoLocator::new();
        geo.expect_current_position()
            .times(1)
            .returning(|| Err(GeoError::Timeout));
        assert_eq!(geo.current_position().await, Err(GeoError::Timeout));
    }
}
