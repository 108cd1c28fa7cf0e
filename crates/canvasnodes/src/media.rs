//! Normalization of the many shapes media values take on the canvas.
//!
//! Upstream nodes hand media along as raw byte arrays, `data:` URIs,
//! `{data, mime_type}` objects, `{uri, mime_type}` references or wrappers
//! such as `{images: [...]}`. Handlers call [`extract_media`] to get one
//! [`MediaRef`] regardless of shape.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use canvascore::Value;
use serde_json::json;

const WRAPPER_KEYS: [&str; 3] = ["images", "videos", "audio"];

#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    Bytes(Vec<u8>),
    Uri(String),
}

/// Media payload plus its MIME type when one is known
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    pub source: MediaSource,
    pub mime_type: Option<String>,
}

impl MediaRef {
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.source {
            MediaSource::Bytes(bytes) => Some(bytes),
            MediaSource::Uri(_) => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.source {
            MediaSource::Uri(uri) => Some(uri),
            MediaSource::Bytes(_) => None,
        }
    }

    /// Uniform JSON form: `{data: <base64>, mime_type}` or `{uri, mime_type}`.
    pub fn to_value(&self) -> Value {
        match &self.source {
            MediaSource::Bytes(bytes) => json!({
                "data": STANDARD.encode(bytes),
                "mime_type": self.mime_type,
            }),
            MediaSource::Uri(uri) => json!({
                "uri": uri,
                "mime_type": self.mime_type,
            }),
        }
    }
}

/// Split `data:<mime>;base64,<payload>` into MIME type and decoded bytes.
pub fn parse_data_uri(value: &str) -> Option<(String, Vec<u8>)> {
    let rest = value.trim().strip_prefix("data:")?;
    let (mime_type, payload) = rest.split_once(";base64,")?;
    if mime_type.is_empty() || payload.is_empty() {
        return None;
    }
    match STANDARD.decode(payload) {
        Ok(bytes) => Some((mime_type.to_string(), bytes)),
        Err(e) => {
            tracing::warn!("Failed to decode base64 data URI: {}", e);
            None
        }
    }
}

/// Normalize any supported media shape; `None` when `value` holds no media.
pub fn extract_media(value: &Value) -> Option<MediaRef> {
    match value {
        Value::String(s) => parse_data_uri(s).map(|(mime_type, bytes)| MediaRef {
            source: MediaSource::Bytes(bytes),
            mime_type: Some(mime_type),
        }),
        Value::Array(items) => byte_array(items).map(|bytes| MediaRef {
            source: MediaSource::Bytes(bytes),
            mime_type: None,
        }),
        Value::Object(map) => {
            let mime_type = map
                .get("mime_type")
                .and_then(Value::as_str)
                .map(str::to_string);

            if let Some(data) = map.get("data") {
                let bytes = match data {
                    Value::String(encoded) => match STANDARD.decode(encoded) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::warn!("Failed to decode base64 media data: {}", e);
                            return None;
                        }
                    },
                    Value::Array(items) => byte_array(items)?,
                    _ => return None,
                };
                return Some(MediaRef {
                    source: MediaSource::Bytes(bytes),
                    mime_type,
                });
            }

            if let Some(uri) = map.get("uri").and_then(Value::as_str) {
                return Some(MediaRef {
                    source: MediaSource::Uri(uri.to_string()),
                    mime_type,
                });
            }

            WRAPPER_KEYS
                .iter()
                .find_map(|key| match map.get(*key)? {
                    Value::Array(items) => items.first(),
                    inner @ Value::Object(_) => Some(inner),
                    _ => None,
                })
                .and_then(extract_media)
        }
        _ => None,
    }
}

/// Raw bytes only, dropping URI references.
pub fn extract_media_bytes(value: &Value) -> Option<Vec<u8>> {
    match extract_media(value)?.source {
        MediaSource::Bytes(bytes) => Some(bytes),
        MediaSource::Uri(_) => None,
    }
}

fn byte_array(items: &[Value]) -> Option<Vec<u8>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

/// One piece of a multimodal prompt
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Media(MediaRef),
}

/// Inline media for data URIs, text for everything else.
pub fn parse_prompt_part(value: &Value) -> PromptPart {
    match value {
        Value::String(s) if s.trim_start().starts_with("data:") => match extract_media(value) {
            Some(media) => PromptPart::Media(media),
            None => PromptPart::Text(s.clone()),
        },
        Value::String(s) => PromptPart::Text(s.clone()),
        Value::Null => PromptPart::Text(String::new()),
        other => PromptPart::Text(other.to_string()),
    }
}
