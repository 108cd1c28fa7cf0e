//! Generation node handlers
//!
//! Handlers for the generative node kinds plus the media helper they share.

pub mod echo;
pub mod media;
pub mod remote;

pub use echo::EchoHandler;
pub use media::{extract_media, extract_media_bytes, MediaRef, MediaSource, PromptPart};
pub use remote::{RemoteGenerationHandler, GENERATION_URL_ENV};

use canvascore::NodeKind;
use canvasruntime::NodeRegistry;
use std::sync::Arc;

/// Register a remote handler for every generative kind, all sharing one client.
pub fn register_remote(registry: &mut NodeRegistry, base_url: &str) {
    let client = reqwest::Client::new();
    for kind in NodeKind::generative() {
        registry.register(Arc::new(RemoteGenerationHandler::with_client(
            kind,
            base_url,
            client.clone(),
        )));
    }
}

/// Register echo handlers for every generative kind.
pub fn register_offline(registry: &mut NodeRegistry) {
    for kind in NodeKind::generative() {
        registry.register(Arc::new(EchoHandler::new(kind)));
    }
}

/// Register all generation handlers with a registry
///
/// Uses the service named by `CANVAS_GENERATION_URL` when set, echo handlers otherwise.
pub fn register_all(registry: &mut NodeRegistry) {
    match std::env::var(GENERATION_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => register_remote(registry, url.trim()),
        _ => {
            tracing::warn!("{} not set, using offline echo handlers", GENERATION_URL_ENV);
            register_offline(registry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_registration_covers_every_kind() {
        let mut registry = NodeRegistry::new();
        register_offline(&mut registry);
        assert_eq!(registry.list_node_kinds(), NodeKind::ALL.to_vec());
    }

    #[test]
    fn remote_registration_covers_generative_kinds() {
        let mut registry = NodeRegistry::empty();
        register_remote(&mut registry, "http://localhost:9000");
        assert!(registry.contains(NodeKind::VeoReference));
        assert!(registry.get(NodeKind::Input).is_none());
        assert_eq!(
            registry.get_metadata(NodeKind::GeminiText).unwrap().category,
            "generation"
        );
    }
}
