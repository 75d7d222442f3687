use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_ENGINE, Engine};
use log::{debug, error, info};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AiGateway, GatewayOutput, GenerateRequest, Operation, Part, ResponseKind};
use crate::{DeskError, GatewayConfig, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// [`AiGateway`] over the Gemini REST API.
pub struct GeminiGateway {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(300).collect();
        error!("AI service returned HTTP {}: {}", status, snippet);
        return Err(DeskError::GatewayError {
            message: format!("HTTP {}: {}", status, snippet),
        });
    }
    Ok(response.json().await?)
}

#[async_trait]
impl AiGateway for GeminiGateway {
    async fn generate(&self, request: GenerateRequest) -> Result<GatewayOutput> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, request.model);
        let body = build_generate_body(&request);
        let value = self.post(&url, &body).await?;
        parse_generate_response(value, &request.response)
    }

    async fn start_operation(&self, model: &str, prompt: &str) -> Result<Operation> {
        let url = format!("{}/models/{}:predictLongRunning", self.endpoint, model);
        let body = json!({ "instances": [{ "prompt": prompt }] });
        let value = self.post(&url, &body).await?;
        let operation = parse_operation(value)?;
        info!("Started operation {}", operation.name);
        Ok(operation)
    }

    async fn poll_operation(&self, name: &str) -> Result<Operation> {
        let url = format!("{}/{}", self.endpoint, name.trim_start_matches('/'));
        parse_operation(self.get(&url).await?)
    }
}

/// Builds the `generateContent` request body.
pub fn build_generate_body(request: &GenerateRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineData { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": BASE64_ENGINE.encode(data),
                }
            }),
        })
        .collect();

    let mut body = json!({ "contents": [{ "role": "user", "parts": parts }] });

    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }

    match &request.response {
        ResponseKind::Text => {}
        ResponseKind::Audio { voice } => {
            body["generationConfig"] = json!({
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
                }
            });
        }
        ResponseKind::Image => {
            body["generationConfig"] = json!({ "responseModalities": ["TEXT", "IMAGE"] });
        }
    }
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// Extracts the output matching `expected` from a `generateContent` reply.
pub fn parse_generate_response(value: Value, expected: &ResponseKind) -> Result<GatewayOutput> {
    let response: GenerateResponse = serde_json::from_value(value)?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(DeskError::GatewayError {
            message: format!("request blocked: {}", reason),
        });
    }

    let parts: Vec<ResponsePart> = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let empty = || DeskError::GatewayError {
        message: "response contained no usable content".to_string(),
    };

    match expected {
        ResponseKind::Text => {
            let text: String = parts.into_iter().filter_map(|p| p.text).collect();
            if text.is_empty() {
                return Err(empty());
            }
            Ok(GatewayOutput::Text(text))
        }
        ResponseKind::Audio { .. } | ResponseKind::Image => {
            let inline = parts
                .into_iter()
                .find_map(|p| p.inline_data)
                .ok_or_else(empty)?;
            let data = BASE64_ENGINE
                .decode(inline.data.as_bytes())
                .map_err(|e| DeskError::GatewayError {
                    message: format!("invalid inline data: {}", e),
                })?;
            Ok(match expected {
                ResponseKind::Image => GatewayOutput::Image {
                    mime_type: inline.mime_type,
                    data,
                },
                _ => GatewayOutput::Audio {
                    mime_type: inline.mime_type,
                    data,
                },
            })
        }
    }
}

/// Reads a long-running operation resource.
pub fn parse_operation(value: Value) -> Result<Operation> {
    let name = value["name"]
        .as_str()
        .ok_or_else(|| DeskError::GatewayError {
            message: "operation without a name".to_string(),
        })?
        .to_string();
    let done = value["done"].as_bool().unwrap_or(false);
    let error = value["error"]["message"].as_str().map(str::to_string);
    let output = value["response"]["generateVideoResponse"]["generatedSamples"][0]["video"]["uri"]
        .as_str()
        .map(|uri| GatewayOutput::MediaUri(uri.to_string()));

    Ok(Operation {
        name,
        done,
        output,
        error,
    })
}
