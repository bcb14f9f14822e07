//! Keyword study over the Korean Urantia Book: scan the corpus for passages,
//! then ask a chat model for a theological report and slide outline.

pub mod artifact;
pub mod config;
pub mod corpus;
pub mod error;
pub mod generation;
pub mod prompt;
pub mod search;
#[cfg(feature = "web")]
pub mod web;

pub use artifact::{Artifact, Slide};
pub use config::Settings;
pub use corpus::{Corpus, CorpusLocator, CorpusStatus, LoadOptions, TextEncoding};
pub use error::{ConfigError, GenerationError};
pub use generation::{GenerationOutcome, Generator, OpenAiGenerator};
pub use prompt::{ChatPrompt, build_prompt};
pub use search::{Match, Matcher, SearchOptions, extract_reference, format_passages, search};

use std::sync::Arc;
use tracing::info;

pub const PREVIEW_LINES: usize = 5;

/// Everything a request needs: settings, the loaded corpus and the
/// generation capability. Constructed once at start-up and shared read-only.
pub struct AppContext {
    settings: Settings,
    corpus: Corpus,
    status: CorpusStatus,
    generator: Arc<dyn Generator>,
}

/// Passages and generated text for one term.
#[derive(Debug, Clone)]
pub struct StudyReport {
    pub term: String,
    pub passages: Vec<Match>,
    pub outcome: GenerationOutcome,
}

impl StudyReport {
    pub fn artifact(&self) -> Option<Artifact> {
        match &self.outcome {
            GenerationOutcome::Generated(text) => Some(Artifact::parse(text)),
            GenerationOutcome::Failed(_) => None,
        }
    }
}

impl AppContext {
    /// Loads the corpus described by `settings` and wires the OpenAI client.
    pub fn initialize(settings: Settings) -> Result<Self, GenerationError> {
        let generator = OpenAiGenerator::new(
            settings.api_key.clone(),
            settings.api_base.clone(),
            settings.model.clone(),
            settings.request_timeout,
        )?;
        let (corpus, status) = corpus::load_corpus(&settings.locator(), settings.load_options());
        info!(%status, model = %settings.model, "application context ready");
        Ok(Self::new(settings, corpus, status, Arc::new(generator)))
    }

    pub fn new(
        settings: Settings,
        corpus: Corpus,
        status: CorpusStatus,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            settings,
            corpus,
            status,
            generator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn corpus_status(&self) -> &CorpusStatus {
        &self.status
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    pub fn preview(&self) -> &[String] {
        self.corpus.preview(PREVIEW_LINES)
    }

    pub fn search(&self, keyword: &str, options: &SearchOptions) -> Vec<Match> {
        search::search(keyword, &self.corpus, options)
    }

    /// Searches with the configured options, builds the prompt and calls the
    /// generator. Errors from the service are folded into the outcome.
    pub async fn generate_report(&self, term: &str) -> StudyReport {
        let term = term.trim();
        let passages = if term.is_empty() {
            Vec::new()
        } else {
            self.search(term, &self.settings.search_options())
        };
        let prompt = build_prompt(term, &passages);
        let outcome = GenerationOutcome::from_result(self.generator.generate(&prompt).await);
        StudyReport {
            term: term.to_string(),
            passages,
            outcome,
        }
    }
}
