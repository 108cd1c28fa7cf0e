use crate::media::{parse_prompt_part, PromptPart};
use async_trait::async_trait;
use canvascore::{HandlerMetadata, NodeContext, NodeError, NodeHandler, NodeKind, Value};
use serde_json::json;

/// Offline stand-in for a generation backend.
///
/// Logs its inputs and answers with a placeholder under the handle a real
/// backend of the same kind would use, so canvases run end to end without
/// network access.
pub struct EchoHandler {
    kind: NodeKind,
}

impl EchoHandler {
    pub fn new(kind: NodeKind) -> Self {
        Self { kind }
    }
}

/// Output handle a generated value of `kind` is published under.
pub fn output_handle(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::GeminiImage | NodeKind::ImagenUpscale => "image",
        NodeKind::SpeechGen | NodeKind::LyriaGen => "audio",
        NodeKind::VeoStandard | NodeKind::VeoExtend | NodeKind::VeoReference | NodeKind::Editor => {
            "video"
        }
        _ => "text",
    }
}

#[async_trait]
impl NodeHandler for EchoHandler {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let mut text = Vec::new();
        let mut media = 0usize;

        let parts = ctx
            .inputs
            .iter()
            .flat_map(|(_, values)| values.iter())
            .chain(std::iter::once(&ctx.value));
        for value in parts {
            match parse_prompt_part(value) {
                PromptPart::Text(t) if !t.is_empty() => text.push(t),
                PromptPart::Text(_) => {}
                PromptPart::Media(_) => media += 1,
            }
        }

        for (handle, values) in ctx.inputs.iter() {
            tracing::debug!(node_id = %ctx.node_id, handle, count = values.len(), "echo input");
        }

        let summary = format!("[{} via {}] {}", self.kind, ctx.model, text.join(" "));
        tracing::info!(node_id = %ctx.node_id, media, "ECHO: {}", summary);

        Ok(json!({
            (output_handle(self.kind)): summary.trim_end(),
            "media_inputs": media,
        }))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Echoes prompt text without calling a backend".to_string(),
            category: "debug".to_string(),
        }
    }
}
