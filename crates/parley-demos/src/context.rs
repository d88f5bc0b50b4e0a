//! Demonstration settings and client setup.
//!
//! [`DemoConfig`] carries the model and directories shared by the
//! subcommands; [`connect`] turns a model reference into a ready
//! [`ChatClient`], failing before any request when the provider's key is
//! missing.

use parley_rs::{ChatClient, ClientConfig, Error, ModelRef, Settings};
use std::path::PathBuf;

/// Settings shared by the demonstrations.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Model reference, `provider:name`. Default: `openai:gpt-4o-mini`.
    pub model: ModelRef,
    /// Where the OCR demo looks for PDFs. Default: `./files/samples`.
    pub samples_dir: PathBuf,
    /// Where page images are written. Default: `./files/temp_files`.
    pub pages_dir: PathBuf,
    /// Where result files are written. Default: `./files/results`.
    pub results_dir: PathBuf,
    /// Fan-out cap for page inference. Default: `5`.
    pub concurrency: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            model: ModelRef::parse(parley_rs::DEFAULT_MODEL),
            samples_dir: PathBuf::from("./files/samples"),
            pages_dir: PathBuf::from("./files/temp_files"),
            results_dir: PathBuf::from("./files/results"),
            concurrency: parley_rs::fanout::DEFAULT_CONCURRENCY,
        }
    }
}

impl DemoConfig {
    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.model = model;
        self
    }

    /// Model name as the provider knows it.
    pub fn model_name(&self) -> &str {
        &self.model.name
    }
}

/// Build a client for `model`'s provider from `settings`.
pub fn connect(model: &ModelRef, settings: &Settings) -> Result<ChatClient, Error> {
    let config = ClientConfig::for_provider(model.provider, settings)?
        .with_headers("https://crates.io/crates/parley-demos", "parley-demos");
    ChatClient::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_rs::{ErrorKind, Provider};

    #[test]
    fn defaults_point_at_files_dir() {
        let config = DemoConfig::default();
        assert_eq!(config.model.provider, Provider::OpenAi);
        assert_eq!(config.model_name(), "gpt-4o-mini");
        assert_eq!(config.concurrency, 5);
        assert!(config.results_dir.ends_with("results"));
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let settings = Settings::isolated(Vec::<(String, String)>::new());
        let err = connect(&ModelRef::parse("openai:gpt-4o"), &settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn ollama_needs_no_key() {
        let settings = Settings::isolated([("OLLAMA_BASE_URL", "http://gpu-box:11434/v1")]);
        let client = connect(&ModelRef::parse("ollama:bielik_v3_q8_tools"), &settings).unwrap();
        assert_eq!(client.config().base_url, "http://gpu-box:11434/v1");
        assert!(client.config().api_key.is_none());
    }
}
