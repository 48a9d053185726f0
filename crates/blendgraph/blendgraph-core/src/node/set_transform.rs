//! Overrides one joint of the incoming pose.

use serde::{Deserialize, Serialize};

use super::{port, PortKind, PortSpec};
use crate::evaluation::Evaluation;
use crate::ids::NodeIndex;
use crate::math::normalize4;
use crate::unique_data::BlendState;

pub const POSE_PORT: usize = 0;
pub const TRANSLATION_PORT: usize = 1;
pub const ROTATION_PORT: usize = 2;
pub const SCALE_PORT: usize = 3;

pub(crate) const INPUTS: [PortSpec; 4] = [
    port("Pose", PortKind::Pose),
    port("Translation", PortKind::Vector),
    port("Rotation", PortKind::Rotation),
    port("Scale", PortKind::Vector),
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetTransformDef {
    /// Joint to override, by name.
    pub joint: String,
}

impl SetTransformDef {
    pub fn new(joint: impl Into<String>) -> Self {
        Self { joint: joint.into() }
    }
}

pub(crate) fn update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let source = ev.input_node(node, POSE_PORT);
    if let Some(source) = source {
        ev.update_incoming(source, dt);
    }
    for p in [TRANSLATION_PORT, ROTATION_PORT, SCALE_PORT] {
        if let Some(value_node) = ev.input_node(node, p) {
            ev.perform_update(value_node, dt);
        }
    }

    let timing = source.map(|s| ev.unique(s).timing).unwrap_or_default();
    let u = ev.unique(node);
    u.timing = timing;
    u.set_blend(BlendState {
        a: source,
        b: None,
        weight: 0.0,
    });
}

pub(crate) fn output(ev: &mut Evaluation<'_>, node: NodeIndex, def: &SetTransformDef) {
    let source = ev.unique(node).blend().a;
    let h = ev.output_blended(node, source, None, 0.0);

    // values were produced during update; these reads do not re-run the sources
    let translation = ev.input_attribute(node, TRANSLATION_PORT, 0.0).and_then(|a| a.as_vec3());
    let rotation = ev.input_attribute(node, ROTATION_PORT, 0.0).and_then(|a| a.as_rotation());
    let scale = ev.input_attribute(node, SCALE_PORT, 0.0).and_then(|a| a.as_vec3());

    let Some(joint) = ev.skeleton.find_joint(&def.joint) else {
        ev.set_has_error(node, true);
        return;
    };
    let Some(transform) = ev
        .ctx
        .pose_pool
        .get_mut(h)
        .and_then(|pose| pose.transforms.get_mut(joint))
    else {
        return;
    };
    if let Some(t) = translation {
        transform.translation = t;
    }
    if let Some(r) = rotation {
        transform.rotation = normalize4(r);
    }
    if let Some(s) = scale {
        transform.scale = s;
    }
    ev.set_has_error(node, source.is_none());
}
