//! JSON graph documents and their versioned upgrade path.
//!
//! Documents reference nodes and parameters by name. Older node layouts are upgraded on
//! the raw JSON value before the typed decode, so the typed structs only describe the
//! current layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Graph, GraphBuilder};
use crate::error::GraphError;
use crate::ids::NodeIndex;
use crate::node::motion::MOTION_NODE_VERSION;
use crate::node::{
    BlendNDef, BlendTwoDef, MotionNodeDef, NodeKind, ParameterNodeDef, SetTransformDef,
    StateMachineDef, TransitionCondition,
};
use crate::parameter::ValueParameter;
use crate::selection::DEFAULT_MOTION_WEIGHT;
use crate::Result;

pub const GRAPH_DOCUMENT_VERSION: u32 = 2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionDocument {
    /// Omitted for transitions allowed from any state.
    #[serde(default)]
    pub source: Option<String>,
    pub target: String,
    #[serde(default)]
    pub blend_time: f32,
    #[serde(default)]
    pub conditions: Vec<TransitionCondition>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineDocument {
    pub entry_state: Option<String>,
    pub transitions: Vec<TransitionDocument>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeSettings {
    Motion(MotionNodeDef),
    StateMachine(StateMachineDocument),
    BlendTree,
    BlendTwo(BlendTwoDef),
    BlendN(BlendNDef),
    PoseSwitch,
    SetTransform(SetTransformDef),
    Parameter(ParameterNodeDef),
    FloatConstant { value: f32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(flatten)]
    pub settings: NodeSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDocument {
    pub source: String,
    #[serde(default)]
    pub source_port: usize,
    pub target: String,
    pub target_port: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ValueParameter>,
    pub nodes: Vec<NodeDocument>,
    #[serde(default)]
    pub connections: Vec<ConnectionDocument>,
    #[serde(default)]
    pub root: Option<String>,
}

impl GraphDocument {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Upgrade and decode a parsed document.
    pub fn from_value(mut value: Value) -> Result<Self> {
        upgrade_document(&mut value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the runtime graph. Parents are created before their children regardless of
    /// document order.
    pub fn to_graph(&self) -> Result<Graph> {
        let mut builder = GraphBuilder::new(self.name.clone());
        for parameter in &self.parameters {
            builder.add_parameter(parameter.clone())?;
        }

        let mut added = vec![false; self.nodes.len()];
        let mut remaining = self.nodes.len();
        while remaining > 0 {
            let before = remaining;
            for (i, node) in self.nodes.iter().enumerate() {
                if added[i] {
                    continue;
                }
                let kind = node_kind(&node.settings);
                let index = match &node.parent {
                    None => builder.add_node(node.name.clone(), kind)?,
                    Some(parent) => match builder.find_node(parent) {
                        Some(p) => builder.add_child(p, node.name.clone(), kind)?,
                        None => continue,
                    },
                };
                if node.disabled {
                    builder.set_disabled(index, true)?;
                }
                added[i] = true;
                remaining -= 1;
            }
            if remaining == before {
                let orphan = self
                    .nodes
                    .iter()
                    .zip(&added)
                    .find(|(_, done)| !**done)
                    .and_then(|(n, _)| n.parent.clone())
                    .unwrap_or_default();
                return Err(GraphError::NodeNotFound { name: orphan });
            }
        }

        let lookup = |builder: &GraphBuilder, name: &str| -> Result<NodeIndex> {
            builder.find_node(name).ok_or_else(|| GraphError::NodeNotFound {
                name: name.to_string(),
            })
        };

        for node in &self.nodes {
            let NodeSettings::StateMachine(sm) = &node.settings else {
                continue;
            };
            let machine = lookup(&builder, &node.name)?;
            if let Some(entry) = &sm.entry_state {
                let entry = lookup(&builder, entry)?;
                builder.set_entry_state(machine, entry)?;
            }
            for t in &sm.transitions {
                let source = t
                    .source
                    .as_deref()
                    .map(|s| lookup(&builder, s))
                    .transpose()?;
                let target = lookup(&builder, &t.target)?;
                builder.add_transition(machine, source, target, t.blend_time, t.conditions.clone())?;
            }
        }

        for c in &self.connections {
            let source = lookup(&builder, &c.source)?;
            let target = lookup(&builder, &c.target)?;
            builder.connect(source, c.source_port, target, c.target_port)?;
        }

        if let Some(root) = &self.root {
            let root = lookup(&builder, root)?;
            builder.set_root(root);
        }
        builder.build()
    }
}

fn node_kind(settings: &NodeSettings) -> NodeKind {
    match settings {
        NodeSettings::Motion(def) => NodeKind::Motion(def.clone()),
        NodeSettings::StateMachine(_) => NodeKind::StateMachine(StateMachineDef::default()),
        NodeSettings::BlendTree => NodeKind::BlendTree,
        NodeSettings::BlendTwo(def) => NodeKind::BlendTwo(def.clone()),
        NodeSettings::BlendN(def) => NodeKind::BlendN(def.clone()),
        NodeSettings::PoseSwitch => NodeKind::PoseSwitch,
        NodeSettings::SetTransform(def) => NodeKind::SetTransform(def.clone()),
        NodeSettings::Parameter(def) => NodeKind::Parameter(def.clone()),
        NodeSettings::FloatConstant { value } => NodeKind::FloatConstant(*value),
    }
}

fn version_of(value: &Value, default: u32) -> u32 {
    value
        .get("version")
        .and_then(Value::as_u64)
        .map_or(default, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// Bring a raw document up to the current layout in place.
pub fn upgrade_document(doc: &mut Value) -> Result<()> {
    let doc_version = version_of(doc, 1);
    if doc_version > GRAPH_DOCUMENT_VERSION {
        return Err(GraphError::UnsupportedVersion {
            version: doc_version,
            max: GRAPH_DOCUMENT_VERSION,
        });
    }

    if let Some(nodes) = doc.get_mut("nodes").and_then(Value::as_array_mut) {
        for node in nodes {
            if node.get("type").and_then(Value::as_str) != Some("motion") {
                continue;
            }
            // version 1 documents predate per-node versions
            let default = if doc_version < 2 { 1 } else { MOTION_NODE_VERSION };
            let version = version_of(node, default);
            if version > MOTION_NODE_VERSION {
                return Err(GraphError::UnsupportedVersion {
                    version,
                    max: MOTION_NODE_VERSION,
                });
            }
            if version < 2 {
                upgrade_motion_ids(node)?;
            }
            if let Some(obj) = node.as_object_mut() {
                obj.insert("version".into(), Value::from(MOTION_NODE_VERSION));
            }
        }
    }

    if let Some(obj) = doc.as_object_mut() {
        obj.insert("version".into(), Value::from(GRAPH_DOCUMENT_VERSION));
    }
    Ok(())
}

/// `motionIds: ["a", "b"]` becomes `motion_ids: [["a", 1.0], ["b", 2.0]]`.
fn upgrade_motion_ids(node: &mut Value) -> Result<()> {
    let Some(obj) = node.as_object_mut() else {
        return Ok(());
    };
    let legacy = obj.remove("motionIds").or_else(|| obj.remove("motion_ids"));
    let Some(legacy) = legacy else {
        return Ok(());
    };
    let ids = legacy.as_array().ok_or_else(|| GraphError::Serialization {
        reason: "legacy motion ids must be an array".into(),
    })?;

    let mut cumulative = 0.0;
    let mut weighted = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.as_str().ok_or_else(|| GraphError::Serialization {
            reason: format!("legacy motion id must be a string, got {id}"),
        })?;
        cumulative += DEFAULT_MOTION_WEIGHT;
        weighted.push(serde_json::json!([id, cumulative]));
    }
    obj.insert("motion_ids".into(), Value::Array(weighted));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_motion_ids_gain_cumulative_weights() {
        let mut doc = json!({
            "version": 1,
            "name": "legacy",
            "nodes": [
                { "name": "Idle", "type": "motion", "motionIds": ["idle_a", "idle_b", "idle_c"] }
            ]
        });
        upgrade_document(&mut doc).unwrap();
        assert_eq!(doc["version"], json!(GRAPH_DOCUMENT_VERSION));
        let node = &doc["nodes"][0];
        assert_eq!(node["version"], json!(MOTION_NODE_VERSION));
        assert_eq!(
            node["motion_ids"],
            json!([["idle_a", 1.0], ["idle_b", 2.0], ["idle_c", 3.0]])
        );
        assert!(node.get("motionIds").is_none());
    }

    #[test]
    fn current_documents_pass_through() {
        let mut doc = json!({
            "version": 2,
            "name": "g",
            "nodes": [
                { "name": "Walk", "type": "motion", "version": 3, "motion_ids": [["walk", 2.5]] }
            ]
        });
        let before = doc["nodes"][0]["motion_ids"].clone();
        upgrade_document(&mut doc).unwrap();
        assert_eq!(doc["nodes"][0]["motion_ids"], before);
    }

    #[test]
    fn newer_versions_are_rejected() {
        let mut doc = json!({ "version": 9, "name": "g", "nodes": [] });
        assert_eq!(
            upgrade_document(&mut doc),
            Err(GraphError::UnsupportedVersion {
                version: 9,
                max: GRAPH_DOCUMENT_VERSION
            })
        );

        let mut doc = json!({
            "version": 2,
            "name": "g",
            "nodes": [{ "name": "M", "type": "motion", "version": 4 }]
        });
        assert!(matches!(
            upgrade_document(&mut doc),
            Err(GraphError::UnsupportedVersion { version: 4, .. })
        ));
    }

    #[test]
    fn oversized_versions_do_not_wrap_to_legacy() {
        let mut doc = json!({ "version": 4_294_967_297_u64, "name": "g", "nodes": [] });
        assert_eq!(
            upgrade_document(&mut doc),
            Err(GraphError::UnsupportedVersion {
                version: u32::MAX,
                max: GRAPH_DOCUMENT_VERSION
            })
        );

        let mut doc = json!({
            "version": 2,
            "name": "g",
            "nodes": [{ "name": "M", "type": "motion", "version": 4_294_967_297_u64 }]
        });
        assert!(matches!(
            upgrade_document(&mut doc),
            Err(GraphError::UnsupportedVersion { version: u32::MAX, .. })
        ));
    }

    #[test]
    fn children_may_precede_parents() {
        let doc = GraphDocument::from_json_str(
            r#"{
                "version": 2,
                "name": "g",
                "nodes": [
                    { "name": "Idle", "parent": "SM", "type": "motion", "motion_ids": [["idle", 1.0]] },
                    { "name": "SM", "type": "state_machine", "entry_state": "Idle" }
                ]
            }"#,
        )
        .unwrap();
        let graph = doc.to_graph().unwrap();
        let sm = graph.find_node("SM").unwrap();
        let idle = graph.find_node("Idle").unwrap();
        assert_eq!(graph.root(), sm);
        assert_eq!(graph.parent_state_machine(idle), Some(sm));
    }

    #[test]
    fn unknown_parent_is_reported() {
        let doc = GraphDocument::from_json_str(
            r#"{ "version": 2, "name": "g",
                 "nodes": [{ "name": "A", "parent": "Ghost", "type": "motion" }] }"#,
        )
        .unwrap();
        assert_eq!(
            doc.to_graph().unwrap_err(),
            GraphError::NodeNotFound {
                name: "Ghost".into()
            }
        );
    }
}
