//! Example workflows shipped with the runtime.

use canvascore::Workflow;

const SOURCES: [&str; 4] = [
    include_str!("../templates/product-ad.json"),
    include_str!("../templates/influencer.json"),
    include_str!("../templates/fashion-tryon.json"),
    include_str!("../templates/look-book.json"),
];

/// Every built-in template, in a stable order.
pub fn all() -> Result<Vec<Workflow>, serde_json::Error> {
    SOURCES.iter().map(|src| serde_json::from_str(src)).collect()
}

/// Look a template up by workflow id.
pub fn find(id: &str) -> Result<Option<Workflow>, serde_json::Error> {
    Ok(all()?.into_iter().find(|w| w.id == id))
}
