use cqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::{GenerateOptions, Llm};
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: RequestOptions<'a>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestOptions<'a> {
    num_predict: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, AppError> {
        let url = format!("{}/api/generate", self.client.base_url());
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: RequestOptions {
                num_predict: options.max_tokens,
                temperature: options.temperature,
                stop: &options.stop,
            },
        };

        let resp = ureq::post(&url)
            .timeout(self.client.generate_timeout())
            .send_json(serde_json::to_value(req).map_err(|e| {
                AppError::new(codes::GENERATOR_FAILED, "Failed to encode generate request")
                    .with_details(e.to_string())
            })?);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: GenerateResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::GENERATOR_FAILED, "Failed to decode generate response")
                        .with_details(e.to_string())
                })?;
                Ok(v.response)
            }
            Ok(r) => Err(
                AppError::new(codes::GENERATOR_FAILED, "Generate request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, _)) => Err(
                AppError::new(codes::GENERATOR_FAILED, "Generate request failed")
                    .with_details(format!("status={status}; model={model}")),
            ),
            Err(e) => Err(
                AppError::new(codes::GENERATOR_FAILED, "Failed to call generate endpoint")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}
