use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ResultExt};
use crate::services::LlmConfig;

use super::types::GenerationUsage;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Receives each streamed text fragment
pub type DeltaSink<'a> = dyn FnMut(&str) -> AppResult<()> + Send + 'a;

/// Text completion, the only thing response synthesis needs from a model
#[allow(async_fn_in_trait)]
pub trait LanguageModel {
    async fn complete(&self, prompt: &str) -> AppResult<String>;

    /// Stream the completion into `on_delta`, returning the full text
    async fn stream_complete(&self, prompt: &str, on_delta: &mut DeltaSink<'_>) -> AppResult<String>;
}

/// Client for a local Ollama-compatible runtime (`/api/generate`)
pub struct LlmService {
    client: Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
}

impl LlmService {
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let model = config.model.trim();
        if model.is_empty() {
            return Err(AppError::Config("llm model must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .config_err("build http client")?;

        Ok(Self {
            client,
            base_url: build_base_url(Some(&config.base_url)),
            model: model.to_string(),
            options: GenerateOptions {
                temperature: config.temperature,
                num_ctx: config.context_window,
                num_predict: config.num_output,
            },
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, stream: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: &self.options,
        }
    }

    async fn send(&self, request: &GenerateRequest<'_>) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .ai_err(&format!("llm request to {} failed", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AiService(format!(
                "llm request failed: {status} {body}"
            )));
        }

        Ok(response)
    }
}

impl LanguageModel for LlmService {
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let response = self.send(&self.request(prompt, false)).await?;
        let chunk: GenerateChunk = response.json().await.ai_err("llm response invalid")?;
        if let Some(error) = chunk.error {
            return Err(AppError::AiService(error));
        }
        if let Some(usage) = chunk.usage() {
            log_usage(&usage);
        }
        Ok(chunk.response)
    }

    async fn stream_complete(&self, prompt: &str, on_delta: &mut DeltaSink<'_>) -> AppResult<String> {
        let response = self.send(&self.request(prompt, true)).await?;

        let mut stream = response.bytes_stream();
        let mut decoder = NdjsonDecoder::default();
        let mut answer_text = String::new();

        while let Some(chunk_result) = stream.next().await {
            let bytes = chunk_result.ai_err("llm stream read error")?;
            for chunk in decoder.push(&bytes)? {
                if handle_chunk(chunk, &mut answer_text, on_delta)? {
                    return Ok(answer_text);
                }
            }
        }

        if let Some(chunk) = decoder.finish()? {
            handle_chunk(chunk, &mut answer_text, on_delta)?;
        }

        Ok(answer_text)
    }
}

/// Returns true once the final record has been seen
fn handle_chunk(
    chunk: GenerateChunk,
    answer_text: &mut String,
    on_delta: &mut DeltaSink<'_>,
) -> AppResult<bool> {
    if let Some(error) = chunk.error {
        return Err(AppError::AiService(format!("llm stream error: {error}")));
    }
    if !chunk.response.is_empty() {
        answer_text.push_str(&chunk.response);
        on_delta(&chunk.response)?;
    }
    if chunk.done {
        if let Some(usage) = chunk.usage() {
            log_usage(&usage);
        }
    }
    Ok(chunk.done)
}

fn log_usage(usage: &GenerationUsage) {
    tracing::debug!(
        prompt_tokens = usage.prompt_tokens,
        output_tokens = usage.output_tokens,
        "LLM generation finished"
    );
}

/// Splits a byte stream into JSON records, one per line
#[derive(Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> AppResult<Vec<GenerateChunk>> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..pos + 1).collect();
            if let Some(chunk) = parse_line(&line_bytes)? {
                chunks.push(chunk);
            }
        }

        Ok(chunks)
    }

    /// Parse whatever is left after the stream closed without a newline
    pub fn finish(&mut self) -> AppResult<Option<GenerateChunk>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line_bytes: &[u8]) -> AppResult<Option<GenerateChunk>> {
    let line = String::from_utf8_lossy(line_bytes);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk = serde_json::from_str(line).ai_err("llm stream payload invalid")?;
    Ok(Some(chunk))
}

fn build_base_url(base_url: Option<&str>) -> String {
    let base = base_url
        .unwrap_or(DEFAULT_BASE_URL)
        .trim()
        .trim_end_matches('/');
    if base.is_empty() {
        DEFAULT_BASE_URL.to_string()
    } else {
        base.to_string()
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Serialize, Clone)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: usize,
    num_predict: usize,
}

#[derive(Debug, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    pub error: Option<String>,
    pub prompt_eval_count: Option<i64>,
    pub eval_count: Option<i64>,
}

impl GenerateChunk {
    fn usage(&self) -> Option<GenerationUsage> {
        match (self.prompt_eval_count, self.eval_count) {
            (Some(prompt_tokens), Some(output_tokens)) => Some(GenerationUsage {
                prompt_tokens,
                output_tokens,
            }),
            _ => None,
        }
    }
}
