use crate::media::extract_media;
use async_trait::async_trait;
use canvascore::{HandlerMetadata, NodeContext, NodeError, NodeHandler, NodeInputs, NodeKind, Value};
use serde_json::{json, Map};

/// Environment variable naming the generation service base URL
pub const GENERATION_URL_ENV: &str = "CANVAS_GENERATION_URL";

/// Forwards a node to an HTTP generation service.
///
/// POSTs `{kind, model, value, config, inputs, meta}` to `<base_url>/<kind>`
/// and returns the response body. Media inputs are normalized to
/// `{data, mime_type}` or `{uri, mime_type}` before sending.
pub struct RemoteGenerationHandler {
    kind: NodeKind,
    base_url: String,
    client: reqwest::Client,
}

impl RemoteGenerationHandler {
    pub fn new(kind: NodeKind, base_url: impl Into<String>) -> Self {
        Self::with_client(kind, base_url, reqwest::Client::new())
    }

    /// Share one connection pool across handlers.
    pub fn with_client(kind: NodeKind, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            kind,
            base_url,
            client,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, self.kind)
    }
}

/// Request body for one node.
pub fn request_body(ctx: &NodeContext) -> Value {
    json!({
        "kind": ctx.kind,
        "model": ctx.model,
        "value": ctx.value,
        "config": ctx.config,
        "inputs": normalize_inputs(&ctx.inputs),
        "meta": ctx.meta.to_value(),
    })
}

fn normalize_inputs(inputs: &NodeInputs) -> Value {
    let mut buckets = Map::new();
    for (handle, values) in inputs.iter() {
        let normalized = values
            .iter()
            .map(|value| match extract_media(value) {
                Some(media) => media.to_value(),
                None => value.clone(),
            })
            .collect();
        buckets.insert(handle.to_string(), Value::Array(normalized));
    }
    Value::Object(buckets)
}

#[async_trait]
impl NodeHandler for RemoteGenerationHandler {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn execute(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let url = self.endpoint();
        tracing::info!(node_id = %ctx.node_id, model = %ctx.model, "POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request_body(&ctx))
            .send()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::ExecutionFailed(format!(
                "Generation service returned {}: {}",
                status, body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Invalid generation response: {}", e)))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: format!("Remote generation via {}", self.endpoint()),
            category: "generation".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvascore::{NodeSpec, RunMeta};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn context() -> NodeContext {
        let node = NodeSpec::new("img", NodeKind::GeminiImage)
            .with_model("gemini-3-pro-image-preview")
            .with_config("aspect_ratio", "16:9");
        let mut inputs = NodeInputs::new();
        inputs.extend("text", vec![json!("a lighthouse")]);
        inputs.extend("image", vec![json!("data:image/png;base64,aGVsbG8=")]);
        NodeContext::new(&node, inputs, RunMeta::new("exec-1").with_user("ana"))
    }

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (base, task)
    }

    #[test]
    fn body_normalizes_media_inputs() {
        let body = request_body(&context());
        assert_eq!(body["kind"], json!("gemini_image"));
        assert_eq!(body["config"]["aspect_ratio"], json!("16:9"));
        assert_eq!(body["inputs"]["text"], json!(["a lighthouse"]));
        assert_eq!(
            body["inputs"]["image"],
            json!([{"data": "aGVsbG8=", "mime_type": "image/png"}])
        );
        assert_eq!(body["meta"]["user_id"], json!("ana"));
    }

    #[test]
    fn endpoint_joins_kind() {
        let handler = RemoteGenerationHandler::new(NodeKind::VeoExtend, "http://gen.local/api/");
        assert_eq!(handler.endpoint(), "http://gen.local/api/veo_extend");
    }

    #[tokio::test]
    async fn returns_service_json() {
        let (base, server) = serve_once("200 OK", r#"{"image": "data:image/png;base64,AAAA"}"#).await;
        let handler = RemoteGenerationHandler::new(NodeKind::GeminiImage, base);

        let output = handler.execute(context()).await.unwrap();
        assert_eq!(output, json!({"image": "data:image/png;base64,AAAA"}));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /gemini_image "));
        assert!(request.contains("a lighthouse"));
    }

    #[tokio::test]
    async fn non_success_status_fails_node() {
        let (base, server) = serve_once("503 Service Unavailable", r#"{"detail": "overloaded"}"#).await;
        let handler = RemoteGenerationHandler::new(NodeKind::GeminiImage, base);

        let err = handler.execute(context()).await.unwrap_err();
        match err {
            NodeError::ExecutionFailed(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("overloaded"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        server.await.unwrap();
    }
}
