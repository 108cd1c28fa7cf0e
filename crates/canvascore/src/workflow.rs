use crate::value::{Value, DEFAULT_HANDLE};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;
use std::str::FromStr;

pub type WorkflowId = String;
pub type NodeId = String;

/// Model selector applied when a node does not name one.
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Complete workflow definition
///
/// Treated as immutable once handed to an execution. Operations that need a
/// modified graph (input injection, partial runs) build a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: WorkflowId,
    #[serde(default = "default_workflow_name")]
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn default_workflow_name() -> String {
    "Untitled Workflow".to_string()
}

impl Workflow {
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Connect two nodes through their default handles.
    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) {
        self.edges.push(Edge::new(source, target));
    }

    /// Connect `source[source_handle]` to the `target_handle` bucket of `target`.
    pub fn connect_handles(
        &mut self,
        source: impl Into<NodeId>,
        source_handle: impl Into<String>,
        target: impl Into<NodeId>,
        target_handle: impl Into<String>,
    ) {
        self.edges.push(
            Edge::new(source, target)
                .with_source_handle(source_handle)
                .with_target_handle(target_handle),
        );
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Edges terminating at `node_id`, in declaration order.
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// A copy of this workflow with `node_id`'s static value replaced.
    pub fn with_node_value(&self, node_id: &str, value: Value) -> Workflow {
        let mut workflow = self.clone();
        if let Some(node) = workflow.nodes.iter_mut().find(|n| n.id == node_id) {
            node.data.value = value;
        }
        workflow
    }

    /// A copy with `value` injected into the first Input node, if any.
    pub fn with_first_input(&self, value: Value) -> Workflow {
        match self.nodes_of_kind(NodeKind::Input).next() {
            Some(node) => self.with_node_value(&node.id, value),
            None => self.clone(),
        }
    }
}

/// Closed set of node kinds a workflow may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Output,
    Workflow,
    GeminiText,
    GeminiImage,
    ImagenUpscale,
    SpeechGen,
    LyriaGen,
    VeoStandard,
    VeoExtend,
    VeoReference,
    Editor,
}

impl NodeKind {
    pub const ALL: [NodeKind; 12] = [
        NodeKind::Input,
        NodeKind::Output,
        NodeKind::Workflow,
        NodeKind::GeminiText,
        NodeKind::GeminiImage,
        NodeKind::ImagenUpscale,
        NodeKind::SpeechGen,
        NodeKind::LyriaGen,
        NodeKind::VeoStandard,
        NodeKind::VeoExtend,
        NodeKind::VeoReference,
        NodeKind::Editor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Workflow => "workflow",
            NodeKind::GeminiText => "gemini_text",
            NodeKind::GeminiImage => "gemini_image",
            NodeKind::ImagenUpscale => "imagen_upscale",
            NodeKind::SpeechGen => "speech_gen",
            NodeKind::LyriaGen => "lyria_gen",
            NodeKind::VeoStandard => "veo_standard",
            NodeKind::VeoExtend => "veo_extend",
            NodeKind::VeoReference => "veo_reference",
            NodeKind::Editor => "editor",
        }
    }

    /// Kinds implemented by the engine itself rather than an external handler.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, NodeKind::Input | NodeKind::Output | NodeKind::Workflow)
    }

    pub fn generative() -> impl Iterator<Item = NodeKind> {
        Self::ALL.into_iter().filter(|k| !k.is_control_flow())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown node kind: {}", s))
    }
}

/// Node definition in a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub data: NodeData,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: None,
            data: NodeData::default(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = label.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.data.value = value.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.data.model = model.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.config.insert(key.into(), value.into());
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<WorkflowId>) -> Self {
        self.data.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }

    /// Attach an output recorded by an earlier run, used to seed partial runs.
    pub fn with_recorded_output(mut self, output: impl Into<Value>) -> Self {
        self.data.execution_result = Some(serde_json::json!({ "output": output.into() }));
        self
    }
}

/// Per-node payload, laid out the way the canvas editor stores it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeData {
    #[serde(default)]
    pub label: String,
    /// Static value, returned verbatim by Input nodes.
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Referenced sub-workflow, only meaningful for `NodeKind::Workflow`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    #[serde(
        default,
        rename = "executionResult",
        skip_serializing_if = "Option::is_none"
    )]
    pub execution_result: Option<Value>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for NodeData {
    fn default() -> Self {
        Self {
            label: String::new(),
            value: Value::Null,
            model: default_model(),
            config: Map::new(),
            workflow_id: None,
            execution_result: None,
        }
    }
}

impl NodeData {
    /// Output recorded by a previous run, if the editor sent one back.
    pub fn recorded_output(&self) -> Option<&Value> {
        self.execution_result
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|result| result.get("output"))
    }
}

/// Connection between nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, rename = "sourceHandle")]
    pub source_handle: Option<String>,
    #[serde(default, rename = "targetHandle")]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }

    /// Input bucket on the target that receives this edge's value.
    pub fn target_bucket(&self) -> &str {
        self.target_handle.as_deref().unwrap_or(DEFAULT_HANDLE)
    }
}

/// Node position in visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
