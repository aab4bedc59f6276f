//! Core data model shared by the report and location flows.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded report image plus its media type.
///
/// Immutable once built; the ingestor is the only producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    payload: Vec<u8>,
    media_type: String,
}

impl Artifact {
    pub fn new(payload: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            payload,
            media_type: media_type.into(),
        }
    }

    /// Raw image bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Declared media type, e.g. `image/jpeg`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Standard base64 encoding of the payload, as backends expect it inline.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.payload)
    }
}

/// Narrative produced by a one-shot analysis of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub narrative: String,
}

impl AnalysisResult {
    pub fn new(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
        }
    }
}

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A single entry in the conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message ID (UUID)
    pub id: String,
    /// Message content
    pub text: String,
    /// Author of the message
    pub sender: Sender,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    /// Create a new bot message
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Bot)
    }

    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }
}

/// Opaque handle to a backend-held conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random handle.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A device position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// A review quoted by the facility finder for a place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSnippet {
    pub snippet: String,
    #[serde(default)]
    pub author: String,
}

/// A grounded place returned alongside the route narrative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceReference {
    pub title: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub review_snippets: Vec<ReviewSnippet>,
}

/// Route narrative plus zero or more grounded places, in backend order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationQueryResult {
    pub narrative: String,
    #[serde(default)]
    pub places: Vec<PlaceReference>,
}

/// A web source cited by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
}

/// Review snippets attached to a maps answer source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceAnswerSource {
    #[serde(default)]
    pub review_snippets: Vec<ReviewSnippet>,
}

/// A maps-typed grounding record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapsSource {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub place_answer_sources: Vec<PlaceAnswerSource>,
}

/// One grounding chunk as delivered by the facility finder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maps: Option<MapsSource>,
}

impl GroundingChunk {
    /// A chunk carrying only a maps record.
    pub fn maps(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            web: None,
            maps: Some(MapsSource {
                uri: uri.into(),
                title: title.into(),
                place_answer_sources: Vec::new(),
            }),
        }
    }

    /// A chunk carrying only a web record.
    pub fn web(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            web: Some(WebSource {
                uri: uri.into(),
                title: title.into(),
            }),
            maps: None,
        }
    }

    /// The place this chunk refers to, if it carries a maps record.
    pub fn to_place(&self) -> Option<PlaceReference> {
        self.maps.as_ref().map(|maps| PlaceReference {
            title: maps.title.clone(),
            uri: maps.uri.clone(),
            review_snippets: maps
                .place_answer_sources
                .iter()
                .flat_map(|source| source.review_snippets.iter().cloned())
                .collect(),
        })
    }
}
