// ABOUTME: Detects the language of the unified context and supplies per-language prompt instructions
// ABOUTME: Detection never fails the pipeline; anything unexpected falls back to English

use docforge_core::truncate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::gateway::ModelGateway;

const DETECTION_SAMPLE_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
    Pt,
    Fr,
    De,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Pt => "pt",
            Language::Fr => "fr",
            Language::De => "de",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Spanish",
            Language::Pt => "Portuguese",
            Language::Fr => "French",
            Language::De => "German",
        }
    }

    /// Injected at the top of every generation prompt
    pub fn instruction(&self) -> &'static str {
        match self {
            Language::En => "You MUST respond in English. All content, questions, and explanations must be in English.",
            Language::Es => "DEBES responder en Español. Todo el contenido, preguntas y explicaciones deben estar en Español.",
            Language::Pt => "Você DEVE responder em Português. Todo o conteúdo, perguntas e explicações devem estar em Português.",
            Language::Fr => "Vous DEVEZ répondre en Français. Tout le contenu, les questions et les explications doivent être en Français.",
            Language::De => "Sie MÜSSEN auf Deutsch antworten. Alle Inhalte, Fragen und Erklärungen müssen auf Deutsch sein.",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            "pt" => Ok(Language::Pt),
            "fr" => Ok(Language::Fr),
            "de" => Ok(Language::De),
            other => Err(PipelineError::Validation(format!("Unsupported language: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectionReply {
    language_code: String,
}

pub struct LanguageDetector {
    gateway: Arc<ModelGateway>,
}

impl LanguageDetector {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn detect(&self, text: &str) -> Language {
        if text.trim().is_empty() {
            return Language::default();
        }

        let sample = truncate(text, DETECTION_SAMPLE_CHARS);
        let request = match self
            .gateway
            .prompts()
            .get_prompt("language_detection", &[("sample", sample)])
            .map_err(PipelineError::from)
            .and_then(|prompt| self.gateway.request(prompt))
        {
            Ok(request) => request.with_temperature(0.1).with_max_tokens(150),
            Err(e) => {
                warn!("Language detection unavailable, using English: {}", e);
                return Language::default();
            }
        };

        match self
            .gateway
            .complete_json::<DetectionReply, _>("language_detection", request, |_| Ok(()))
            .await
        {
            Ok(reply) => match reply.language_code.parse::<Language>() {
                Ok(language) => {
                    info!("Detected document language: {}", language.name());
                    language
                }
                Err(_) => {
                    warn!(
                        "Model reported unsupported language '{}', using English",
                        reply.language_code
                    );
                    Language::default()
                }
            },
            Err(e) => {
                warn!("Language detection failed, using English: {}", e);
                Language::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for language in [Language::En, Language::Es, Language::Pt, Language::Fr, Language::De] {
            assert_eq!(language.code().parse::<Language>().unwrap(), language);
        }
        assert!("it".parse::<Language>().is_err());
    }

    #[test]
    fn test_default_is_english() {
        assert_eq!(Language::default(), Language::En);
        assert!(Language::Es.instruction().contains("Español"));
    }
}
