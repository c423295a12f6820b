use std::time::Duration;

use cqa_core::config::OllamaConfig;
use cqa_core::error::{codes, AppError};

/// HTTP handle for a local Ollama server. Only `127.0.0.1` is accepted.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    embed_timeout: Duration,
    generate_timeout: Duration,
}

fn remote_not_allowed(base_url: &str) -> AppError {
    AppError::new(
        codes::OLLAMA_REMOTE_NOT_ALLOWED,
        "Ollama base URL must be localhost (127.0.0.1)",
    )
    .with_details(format!("base_url={base_url}"))
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if base_url != "http://127.0.0.1" {
            let port = base_url
                .strip_prefix("http://127.0.0.1:")
                .ok_or_else(|| remote_not_allowed(&base_url))?;
            // Anything after the host must be a bare, non-zero port.
            match port.parse::<u16>() {
                Ok(p) if p != 0 && port.chars().all(|c| c.is_ascii_digit()) => {}
                _ => return Err(remote_not_allowed(&base_url)),
            }
        }

        Ok(Self {
            base_url,
            embed_timeout: Duration::from_secs(10),
            generate_timeout: Duration::from_secs(120),
        })
    }

    pub fn from_config(cfg: &OllamaConfig) -> Result<Self, AppError> {
        Ok(Self::new(&cfg.base_url)?
            .with_timeouts(
                Duration::from_secs(cfg.embed_timeout_secs),
                Duration::from_secs(cfg.generate_timeout_secs),
            ))
    }

    pub fn with_timeouts(mut self, embed: Duration, generate: Duration) -> Self {
        self.embed_timeout = embed;
        self.generate_timeout = generate;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }

    pub fn generate_timeout(&self) -> Duration {
        self.generate_timeout
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url).timeout(Duration::from_millis(800)).call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new(codes::OLLAMA_UNHEALTHY, "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, _)) => Err(
                AppError::new(codes::OLLAMA_UNHEALTHY, "Ollama health check failed")
                    .with_details(format!("status={status}")),
            ),
            Err(e) => Err(AppError::new(
                codes::OLLAMA_UNREACHABLE,
                "Failed to reach Ollama on 127.0.0.1",
            )
            .with_details(e.to_string())
            .with_retryable(true)),
        }
    }
}
