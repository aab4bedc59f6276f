//! MediGlass Gemini adapter
//!
//! Implements the `medi_core` backend capabilities on top of the Gemini
//! `generateContent` REST endpoint:
//!
//! - `AnalysisService`: one-shot report analysis with a reasoning budget
//! - `ChatService`: locally held, artifact-seeded chat history
//! - `FacilityFinder`: Maps-grounded lookup around a coordinate
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use medi_core::AppConfig;
//! use medi_gemini::{GeminiBackend, GeminiClient};
//!
//! let config = Arc::new(AppConfig::default());
//! let backend = Arc::new(GeminiBackend::new(GeminiClient::from_env()?, config.clone()));
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod wire;

pub use backend::GeminiBackend;
pub use client::{GeminiClient, API_KEY_VARS, DEFAULT_BASE_URL, MAX_BACKOFF};
pub use error::{GeminiError, GeminiResult};
