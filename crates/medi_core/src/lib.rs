//! # medi_core
//!
//! Session orchestration core for MediGlass: photograph a lab report, get a
//! structured interpretation, ask follow-up questions about it, and find
//! the nearest medical facility with a short route description.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────────────┐
//! │   ingest     │────▶│        ReportSession        │──▶ AnalysisService
//! │ (data URLs)  │     │ Loaded → Analyzing →        │──▶ ChatService
//! └──────────────┘     │ Conversing (transcript)     │
//!        ▲             └─────────────────────────────┘
//!        │                        ▲
//! ┌──────────────┐      DraftInput│
//! │ VoiceCapture │────────────────┘
//! └──────────────┘
//!
//! ┌─────────────────────────────┐
//! │       LocationFinder        │──▶ GeoLocator
//! │ Requesting → Querying →     │──▶ FacilityFinder
//! │ Resolved | Failed           │
//! └─────────────────────────────┘
//! ```
//!
//! All external collaborators are traits in [`capability`] and are passed
//! in at construction time; [`mock`] provides scripted fakes.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medi_core::{AppConfig, ReportSession, AnalyzeOutcome};
//!
//! let backend = Arc::new(my_backend);
//! let session = ReportSession::new(backend.clone(), backend, Arc::new(AppConfig::default()));
//!
//! session.ingest_file("report.jpg").await?;
//! if session.analyze().await? == AnalyzeOutcome::Completed {
//!     session.send("What does low ferritin mean?").await?;
//! }
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod ingest;
pub mod location;
pub mod logging;
pub mod mock;
pub mod preview;
pub mod report;
pub mod types;
pub mod voice;

// Re-export main types for convenience
pub use capability::{
    AnalysisRequest, AnalysisService, Capability, ChatService, FacilityFinder, FacilityRequest,
    FacilityResponse, GeoLocator, RecognitionOptions, RecognizerVariant, SessionDirective,
    SpeechEvent, SpeechPlatform, SpeechRecognizer,
};
pub use config::{
    AppConfig, FallbackConfig, MapPreviewConfig, ModelConfig, NoticeConfig, PromptConfig,
};
pub use error::{CoreError, CoreResult, GeoError};
pub use location::{LocationFinder, LocationPhase, LocationView, PlaceCard, PlaceListing};
pub use mock::{FixedLocator, MockBackend, MockFacility, MockReply, MockSpeechPlatform};
pub use preview::{MapPreview, MapPreviewBuilder};
pub use report::{
    AnalyzeOutcome, Conversation, IngestOutcome, ReportPhase, ReportSession, ReportView,
    SendOutcome,
};
pub use types::{
    AnalysisResult, Artifact, Coordinates, GroundingChunk, LocationQueryResult, MapsSource,
    Message, PlaceReference, ReviewSnippet, Sender, SessionHandle, WebSource,
};
pub use voice::{DraftInput, VoiceCapture, VoiceOutcome, VoiceState};
