//! Application configuration.
//!
//! Prompts, model names and user-visible notices are data, not code. The
//! defaults below are what ships; a TOML file can override any subset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capability::{RecognitionOptions, SessionDirective};
use crate::error::{CoreError, CoreResult};

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "MEDIGLASS_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub prompts: PromptConfig,
    pub models: ModelConfig,
    pub fallbacks: FallbackConfig,
    pub notices: NoticeConfig,
    pub voice: RecognitionOptions,
    pub map_preview: MapPreviewConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        debug!("Reading config from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> CoreResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the given path, else from `MEDIGLASS_CONFIG`, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> CoreResult<Self> {
        let resolved = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        match resolved {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Render as TOML, e.g. to seed a config file.
    pub fn to_toml(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    fn validate(&self) -> CoreResult<()> {
        if self.prompts.analysis_instruction.trim().is_empty() {
            return Err(CoreError::Config(
                "prompts.analysis_instruction must not be empty".to_string(),
            ));
        }
        if self.prompts.facility_instruction.trim().is_empty() {
            return Err(CoreError::Config(
                "prompts.facility_instruction must not be empty".to_string(),
            ));
        }
        if self.map_preview.base_url.trim().is_empty() {
            return Err(CoreError::Config(
                "map_preview.base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Instruction templates sent to the backend, plus the local greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub analysis_instruction: String,
    pub session_directive: String,
    pub session_seed_prompt: String,
    pub session_seed_acknowledgement: String,
    pub greeting: String,
    pub facility_instruction: String,
}

impl PromptConfig {
    pub fn directive(&self) -> SessionDirective {
        SessionDirective {
            system_instruction: self.session_directive.clone(),
            seed_prompt: self.session_seed_prompt.clone(),
            seed_acknowledgement: self.session_seed_acknowledgement.clone(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            analysis_instruction: DEFAULT_ANALYSIS_INSTRUCTION.to_string(),
            session_directive: "You are a helpful and knowledgeable medical AI assistant. \
                You have access to the user's lab report. Answer their follow-up questions \
                clearly and safely. Do not provide medical diagnoses or prescriptions. \
                Always encourage seeing a professional."
                .to_string(),
            session_seed_prompt:
                "Here is my lab report. Please be ready to answer questions about it.".to_string(),
            session_seed_acknowledgement: "I have reviewed your lab report. I'm ready to answer \
                your questions about the values, what they mean, and general health advice."
                .to_string(),
            greeting: "I've analyzed your report. Feel free to ask any specific questions!"
                .to_string(),
            facility_instruction: "Find the nearest medical center or hospital to my current \
                location. Provide the name and address. Then, generate a fun, text-based emoji \
                route description (e.g., Turn left ⬅️, Go straight 🚗) from my location to \
                there. Keep the route concise."
                .to_string(),
        }
    }
}

const DEFAULT_ANALYSIS_INSTRUCTION: &str = "\
Analyze this medical lab report image using a structured, patient-centric approach.

1. **Key Biomarkers**: Identify the key values and compare them to standard ranges.
2. **Abnormalities**: Clearly highlight any values outside the normal range (High/Low).
3. **Interpretation**: Explain what these results might indicate in simple, easy-to-understand terms.

4. **🩺 TAILORED HEALTH ACTION PLAN**:
   Based on the specific results found in this report, provide concrete recommendations:
   - 🥗 **Dietary Advice**: Specific foods to include or avoid.
   - 🏃 **Exercise & Lifestyle**: Tailored activity suggestions and lifestyle adjustments.
   - 📅 **Follow-up Plan**: Recommendations for re-testing or specific symptoms to watch for.

5. **📋 Summary Table**: Create a markdown table summarizing the findings with columns: \
[Test Name, Value, Status, Recommended Action].

Be professional, empathetic, and reassuring. **Disclaimer**: Always advise consulting a doctor \
for a final diagnosis and before starting new treatments.";

/// Backend model selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub analysis_model: String,
    pub chat_model: String,
    pub facility_model: String,
    /// Reasoning budget for the one-shot analysis.
    pub analysis_compute_budget: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            analysis_model: "gemini-3-pro-preview".to_string(),
            chat_model: "gemini-3-pro-preview".to_string(),
            facility_model: "gemini-2.5-flash".to_string(),
            analysis_compute_budget: 32768,
        }
    }
}

/// Text substituted when the backend answers without any text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub empty_analysis: String,
    pub empty_reply: String,
    pub empty_facility: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            empty_analysis:
                "I couldn't analyze the document. Please try again with a clearer image."
                    .to_string(),
            empty_reply: "I didn't understand that.".to_string(),
            empty_facility: "I couldn't find a medical center nearby.".to_string(),
        }
    }
}

/// User-visible failure notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeConfig {
    pub analysis_failed: String,
    pub speech_unsupported: String,
    pub speech_failed: String,
    pub geolocation_unsupported: String,
    pub location_denied: String,
    pub facility_fetch_failed: String,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            analysis_failed: "Analysis failed. Please try again.".to_string(),
            speech_unsupported: "Speech recognition is not supported on this device.".to_string(),
            speech_failed: "Speech recognition could not be started.".to_string(),
            geolocation_unsupported: "Geolocation is not supported on this device.".to_string(),
            location_denied: "Unable to retrieve your location. Please allow location access."
                .to_string(),
            facility_fetch_failed: "Failed to fetch nearby facility data.".to_string(),
        }
    }
}

/// Static map preview settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapPreviewConfig {
    pub base_url: String,
    pub zoom: u8,
    /// `WIDTHxHEIGHT` in pixels.
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for MapPreviewConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/staticmap".to_string(),
            zoom: 15,
            size: "600x300".to_string(),
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.models.analysis_compute_budget, 32768);
        assert!(!config.voice.continuous);
        assert!(!config.voice.interim_results);
        assert_eq!(config.voice.language, "en-US");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [prompts]
            greeting = "Ask me anything about your results."

            [models]
            chat_model = "gemini-2.5-pro"
            "#,
        )
        .unwrap();

        assert_eq!(config.prompts.greeting, "Ask me anything about your results.");
        assert_eq!(config.models.chat_model, "gemini-2.5-pro");
        assert_eq!(config.models.facility_model, "gemini-2.5-flash");
        assert_eq!(config.prompts.facility_instruction, PromptConfig::default().facility_instruction);
    }

    #[test]
    fn test_empty_instruction_rejected() {
        let err = AppConfig::from_toml("[prompts]\nanalysis_instruction = \"  \"\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = AppConfig::from_toml("[prompts\n").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut config = AppConfig::default();
        config.map_preview.zoom = 12;
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    // Env-var cases share one test so they never race on MEDIGLASS_CONFIG.
    #[test]
    fn test_load_or_default_resolution_order() {
        let mut from_env = tempfile::NamedTempFile::new().unwrap();
        from_env
            .write_all(b"[prompts]\ngreeting = \"Loaded from env\"\n")
            .unwrap();
        let mut explicit = tempfile::NamedTempFile::new().unwrap();
        explicit
            .write_all(b"[map_preview]\nzoom = 9\n")
            .unwrap();

        std::env::set_var(CONFIG_ENV_VAR, from_env.path());
        let config = AppConfig::load_or_default(None).unwrap();
        assert_eq!(config.prompts.greeting, "Loaded from env");
        assert_eq!(config.map_preview.zoom, 15);

        let config = AppConfig::load_or_default(Some(explicit.path())).unwrap();
        assert_eq!(config.map_preview.zoom, 9);
        assert_eq!(config.prompts.greeting, PromptConfig::default().greeting);

        std::env::set_var(CONFIG_ENV_VAR, "/no/such/mediglass.toml");
        assert!(matches!(
            AppConfig::load_or_default(None),
            Err(CoreError::Io(_))
        ));

        std::env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(AppConfig::load_or_default(None).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_directive_from_prompts() {
        let directive = PromptConfig::default().directive();
        assert!(directive.system_instruction.contains("Do not provide medical diagnoses"));
        assert!(directive.seed_prompt.contains("lab report"));
    }
}
