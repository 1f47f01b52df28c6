//! ComfyUI workflow graph model and runtime parameter injection.
//!
//! A workflow is a mapping from node id to node spec:
//!
//! ```json
//! {
//!   "3": { "class_type": "KSampler", "inputs": { "seed": 42, "cfg": 7.5 } },
//!   "5": { "class_type": "EmptyLatentImage", "inputs": { "width": 512 } }
//! }
//! ```
//!
//! Exported workflows are sometimes wrapped as `{ "prompt": { ... } }`;
//! [`WorkflowGraph::from_value`] accepts both shapes and always stores the
//! inner node mapping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::generation::GenerationParameters;

// ---------------------------------------------------------------------------
// ComfyUI node class types targeted by injection
// ---------------------------------------------------------------------------

/// Latent image node carrying output dimensions and batch size.
pub const EMPTY_LATENT_IMAGE_CLASS: &str = "EmptyLatentImage";

/// Standard sampler node.
pub const KSAMPLER_CLASS: &str = "KSampler";

/// Advanced sampler node (its seed input is named `noise_seed`).
pub const KSAMPLER_ADVANCED_CLASS: &str = "KSamplerAdvanced";

/// CLIP text encode (prompt) node.
pub const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";

/// Envelope key wrapping the node mapping in exported API workflows.
const ENVELOPE_KEY: &str = "prompt";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// ComfyUI class type (e.g. "KSampler", "CLIPTextEncode").
    pub class_type: String,
    /// Input values. Absent means the node has no configurable inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Map<String, Value>>,
    /// Any other node fields (`_meta`, etc.), kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeSpec {
    /// Set `name` on this node's inputs. Nodes without inputs are skipped.
    ///
    /// Returns whether the input was written.
    fn set_input(&mut self, name: &str, value: Value) -> bool {
        match self.inputs.as_mut() {
            Some(inputs) => {
                inputs.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }
}

/// A node graph keyed by node id, in document order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: IndexMap<String, NodeSpec>,
}

/// Number of nodes updated per kind by one injection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InjectionSummary {
    pub latent_nodes: usize,
    pub sampler_nodes: usize,
    pub prompt_nodes: usize,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl WorkflowGraph {
    /// Parse a workflow document, unwrapping the `prompt` envelope if present.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let Value::Object(obj) = value else {
            return Err(CoreError::Validation(
                "Workflow JSON must be an object".to_string(),
            ));
        };

        let obj = unwrap_envelope(obj)?;

        if obj.is_empty() {
            return Err(CoreError::Validation(
                "Workflow JSON must contain at least one node".to_string(),
            ));
        }

        let mut nodes = IndexMap::with_capacity(obj.len());
        for (node_id, node_value) in obj {
            if !node_value.is_object() {
                return Err(CoreError::Validation(format!(
                    "Node '{node_id}' must be an object"
                )));
            }
            if node_value.get("class_type").and_then(Value::as_str).is_none() {
                return Err(CoreError::Validation(format!(
                    "Node '{node_id}' is missing required 'class_type' field"
                )));
            }
            let node: NodeSpec = serde_json::from_value(node_value)
                .map_err(|e| CoreError::Validation(format!("Node '{node_id}' is malformed: {e}")))?;
            nodes.insert(node_id, node);
        }

        Ok(Self { nodes })
    }

    /// Parse a workflow from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Workflow is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// The bare node mapping, as submitted in the `prompt` field.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.nodes).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Return the inner node mapping of a `{ "prompt": {...} }` envelope, or the
/// object itself when it is already a bare mapping.
///
/// A `prompt` entry that is itself a node (has `class_type`) is treated as a
/// node id, not an envelope.
fn unwrap_envelope(mut obj: Map<String, Value>) -> Result<Map<String, Value>, CoreError> {
    let is_envelope = match obj.get(ENVELOPE_KEY) {
        Some(Value::Object(inner)) => !inner.contains_key("class_type"),
        Some(_) => {
            return Err(CoreError::Validation(
                "Workflow 'prompt' envelope must be an object".to_string(),
            ))
        }
        None => false,
    };

    if !is_envelope {
        return Ok(obj);
    }

    match obj.remove(ENVELOPE_KEY) {
        Some(Value::Object(inner)) => Ok(inner),
        _ => Ok(Map::new()),
    }
}

// ---------------------------------------------------------------------------
// Injection
// ---------------------------------------------------------------------------

/// Return a copy of `graph` with `params` injected.
///
/// Every node of a targeted kind is updated identically; kinds absent from
/// the graph are skipped without error.
pub fn inject(graph: &WorkflowGraph, params: &GenerationParameters) -> WorkflowGraph {
    let mut injected = graph.clone();
    inject_in_place(&mut injected, params);
    injected
}

/// Inject `params` into `graph` in place, returning per-kind update counts.
///
/// - `EmptyLatentImage`: `width`, `height`, `batch_size`
/// - `KSampler`: `seed`, `steps`, `cfg`
/// - `KSamplerAdvanced`: `noise_seed`, `steps`, `cfg`
/// - `CLIPTextEncode`: `text`
pub fn inject_in_place(
    graph: &mut WorkflowGraph,
    params: &GenerationParameters,
) -> InjectionSummary {
    let mut summary = InjectionSummary::default();

    for node in graph.nodes.values_mut() {
        let Some(kind) = NodeKind::of(&node.class_type) else {
            continue;
        };
        let updated = match kind {
            NodeKind::Latent => set_inputs(
                node,
                [
                    ("width", Value::from(params.width)),
                    ("height", Value::from(params.height)),
                    ("batch_size", Value::from(params.batch_size)),
                ],
            ),
            NodeKind::Sampler { seed_input } => set_inputs(
                node,
                [
                    (seed_input, Value::from(params.seed)),
                    ("steps", Value::from(params.steps)),
                    ("cfg", Value::from(params.cfg_scale)),
                ],
            ),
            NodeKind::Prompt => node.set_input("text", Value::from(params.prompt_text.as_str())),
        };
        if updated {
            match kind {
                NodeKind::Latent => summary.latent_nodes += 1,
                NodeKind::Sampler { .. } => summary.sampler_nodes += 1,
                NodeKind::Prompt => summary.prompt_nodes += 1,
            }
        }
    }

    tracing::debug!(
        latent_nodes = summary.latent_nodes,
        sampler_nodes = summary.sampler_nodes,
        prompt_nodes = summary.prompt_nodes,
        "Injected generation parameters into workflow",
    );

    summary
}

/// Node kinds that receive injected parameters.
#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Latent,
    Sampler { seed_input: &'static str },
    Prompt,
}

impl NodeKind {
    fn of(class_type: &str) -> Option<Self> {
        match class_type {
            EMPTY_LATENT_IMAGE_CLASS => Some(Self::Latent),
            KSAMPLER_CLASS => Some(Self::Sampler { seed_input: "seed" }),
            KSAMPLER_ADVANCED_CLASS => Some(Self::Sampler {
                seed_input: "noise_seed",
            }),
            CLIP_TEXT_ENCODE_CLASS => Some(Self::Prompt),
            _ => None,
        }
    }
}

fn set_inputs<const N: usize>(node: &mut NodeSpec, values: [(&str, Value); N]) -> bool {
    if node.inputs.is_none() {
        return false;
    }
    for (name, value) in values {
        node.set_input(name, value);
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
