//! Study features built on the AI gateway.
//!
//! Every method is a single request/response exchange; failures come back
//! as errors and never touch local state.
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::{
    poll_until_done, AiGateway, DeskError, GatewayConfig, GatewayOutput, GenerateRequest, Part,
    ResponseKind, Result,
};

/// Prebuilt voice used for speech output
pub const DEFAULT_VOICE: &str = "Kore";

/// Node of a generated mind map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindMapNode {
    pub title: String,
    #[serde(default)]
    pub children: Vec<MindMapNode>,
}

impl MindMapNode {
    /// Total number of nodes in the tree, including this one
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(MindMapNode::size).sum::<usize>()
    }

    /// Renders the tree as an indented outline
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(0, &mut out);
        out
    }

    fn write_outline(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str("- ");
        out.push_str(&self.title);
        out.push('\n');
        for child in &self.children {
            child.write_outline(depth + 1, out);
        }
    }
}

/// Binary media returned by the service
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBlob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

pub struct StudyAssistant<G: AiGateway> {
    gateway: G,
    config: GatewayConfig,
}

impl<G: AiGateway> StudyAssistant<G> {
    pub fn new(gateway: G, config: GatewayConfig) -> Self {
        Self { gateway, config }
    }

    /// Condenses `text` into a short study summary.
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: Some(
                "You are a study assistant. Summarize the user's notes into concise bullet \
                 points that keep every key fact."
                    .to_string(),
            ),
            ..GenerateRequest::prompt(&self.config.text_model, text)
        };
        self.text(request).await
    }

    /// Translates `text` into `target_language`, returning only the
    /// translation.
    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: Some(format!(
                "Translate the user's text into {}. Reply with the translation only.",
                target_language
            )),
            ..GenerateRequest::prompt(&self.config.text_model, text)
        };
        self.text(request).await
    }

    /// Builds a mind map of the main ideas in `text`.
    pub async fn mind_map(&self, text: &str) -> Result<MindMapNode> {
        let request = GenerateRequest {
            system_instruction: Some(
                "Build a mind map of the user's text. Reply with JSON only, shaped as \
                 {\"title\": string, \"children\": [same shape]}."
                    .to_string(),
            ),
            ..GenerateRequest::prompt(&self.config.text_model, text)
        };
        let reply = self.text(request).await?;
        parse_mind_map(&reply)
    }

    /// Answers `question` about an image, video or document.
    pub async fn analyze_media(&self, data: Vec<u8>, mime_type: &str, question: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.config.text_model.clone(),
            system_instruction: None,
            parts: vec![Part::media(mime_type, data), Part::text(question)],
            response: ResponseKind::Text,
        };
        self.text(request).await
    }

    /// Synthesizes speech for `text`.
    pub async fn speak(&self, text: &str) -> Result<MediaBlob> {
        let request = GenerateRequest {
            response: ResponseKind::Audio {
                voice: DEFAULT_VOICE.to_string(),
            },
            ..GenerateRequest::prompt(&self.config.speech_model, text)
        };
        match self.gateway.generate(request).await? {
            GatewayOutput::Audio { mime_type, data } => Ok(MediaBlob { mime_type, data }),
            other => Err(unexpected("audio", &other)),
        }
    }

    /// Generates an illustration for `prompt`.
    pub async fn generate_image(&self, prompt: &str) -> Result<MediaBlob> {
        let request = GenerateRequest {
            response: ResponseKind::Image,
            ..GenerateRequest::prompt(&self.config.image_model, prompt)
        };
        match self.gateway.generate(request).await? {
            GatewayOutput::Image { mime_type, data } => Ok(MediaBlob { mime_type, data }),
            other => Err(unexpected("image", &other)),
        }
    }

    /// Generates a video and waits for it, returning its URI.
    pub async fn generate_video(&self, prompt: &str) -> Result<String> {
        let operation = self
            .gateway
            .start_operation(&self.config.video_model, prompt)
            .await?;
        info!("Video generation started as {}", operation.name);

        let output = poll_until_done(
            &self.gateway,
            operation,
            Duration::from_secs(self.config.video_poll_secs),
            self.config.video_max_polls,
        )
        .await?;
        match output {
            GatewayOutput::MediaUri(uri) => Ok(uri),
            other => Err(unexpected("video URI", &other)),
        }
    }

    async fn text(&self, request: GenerateRequest) -> Result<String> {
        debug!("Sending text request to {}", request.model);
        match self.gateway.generate(request).await? {
            GatewayOutput::Text(text) => Ok(text.trim().to_string()),
            other => Err(unexpected("text", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &GatewayOutput) -> DeskError {
    let kind = match got {
        GatewayOutput::Text(_) => "text",
        GatewayOutput::Audio { .. } => "audio",
        GatewayOutput::Image { .. } => "image",
        GatewayOutput::MediaUri(_) => "media URI",
    };
    DeskError::GatewayError {
        message: format!("expected {} output, got {}", wanted, kind),
    }
}

/// Parses a mind map reply, tolerating a surrounding Markdown code fence.
pub fn parse_mind_map(reply: &str) -> Result<MindMapNode> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim()).map_err(|e| DeskError::InvalidFormat {
        message: format!("mind map reply is not valid JSON: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::FakeGateway;
    use crate::Operation;

    fn assistant(outputs: Vec<Result<GatewayOutput>>) -> StudyAssistant<FakeGateway> {
        let config = GatewayConfig {
            video_poll_secs: 0,
            video_max_polls: 3,
            ..GatewayConfig::default()
        };
        StudyAssistant::new(FakeGateway::answering(outputs), config)
    }

    #[tokio::test]
    async fn summarize_sends_notes_with_instructions() {
        let assistant = assistant(vec![Ok(GatewayOutput::Text("  - key point\n".into()))]);
        let summary = assistant.summarize("long notes").await.unwrap();
        assert_eq!(summary, "- key point");

        let request = assistant.gateway.last_request().unwrap();
        assert_eq!(request.parts, vec![Part::text("long notes")]);
        assert_eq!(request.model, GatewayConfig::default().text_model);
        assert!(request.system_instruction.unwrap().contains("Summarize"));
    }

    #[tokio::test]
    async fn translate_names_the_target_language() {
        let assistant = assistant(vec![Ok(GatewayOutput::Text("Bonjour".into()))]);
        assert_eq!(assistant.translate("Hello", "French").await.unwrap(), "Bonjour");
        let request = assistant.gateway.last_request().unwrap();
        assert!(request.system_instruction.unwrap().contains("French"));
    }

    #[tokio::test]
    async fn mind_map_accepts_fenced_json() {
        let reply = "```json\n{\"title\":\"Cells\",\"children\":[{\"title\":\"Nucleus\"},{\"title\":\"Membrane\",\"children\":[]}]}\n```";
        let assistant = assistant(vec![Ok(GatewayOutput::Text(reply.into()))]);
        let map = assistant.mind_map("biology notes").await.unwrap();
        assert_eq!(map.title, "Cells");
        assert_eq!(map.size(), 3);
        assert_eq!(map.outline(), "- Cells\n  - Nucleus\n  - Membrane\n");
    }

    #[test]
    fn mind_map_rejects_prose() {
        assert!(matches!(
            parse_mind_map("Here is your map: Cells -> Nucleus"),
            Err(DeskError::InvalidFormat { .. })
        ));
        assert!(parse_mind_map("{\"title\":\"plain\"}").is_ok());
    }

    #[tokio::test]
    async fn analyze_media_sends_inline_data_first() {
        let assistant = assistant(vec![Ok(GatewayOutput::Text("A diagram".into()))]);
        let answer = assistant
            .analyze_media(vec![0xff, 0xd8], "image/jpeg", "What is this?")
            .await
            .unwrap();
        assert_eq!(answer, "A diagram");
        let request = assistant.gateway.last_request().unwrap();
        assert_eq!(request.parts[0], Part::media("image/jpeg", vec![0xff, 0xd8]));
    }

    #[tokio::test]
    async fn speak_requires_audio_output() {
        let assistant = assistant(vec![
            Ok(GatewayOutput::Audio {
                mime_type: "audio/pcm".into(),
                data: vec![1, 2],
            }),
            Ok(GatewayOutput::Text("no audio".into())),
        ]);
        assert_eq!(assistant.speak("hi").await.unwrap().data, vec![1, 2]);
        assert!(assistant.speak("hi").await.is_err());
    }

    #[tokio::test]
    async fn gateway_failures_surface_as_service_unavailable() {
        let assistant = assistant(vec![Err(DeskError::GatewayError {
            message: "HTTP 503".into(),
        })]);
        let err = assistant.summarize("x").await.unwrap_err();
        assert_eq!(err.user_message(), "AI service unavailable");
    }

    #[tokio::test]
    async fn video_generation_polls_to_completion() {
        let assistant = assistant(vec![]);
        assistant.gateway.polls.lock().unwrap().push_back(Operation {
            name: "operations/fake".into(),
            done: true,
            output: Some(GatewayOutput::MediaUri("https://files/v.mp4".into())),
            error: None,
        });
        assert_eq!(
            assistant.generate_video("a cell dividing").await.unwrap(),
            "https://files/v.mp4"
        );
    }
}
