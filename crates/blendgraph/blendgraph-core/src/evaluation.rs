//! The four evaluation passes and the bookkeeping shared by every node kind.
//!
//! Every `perform_*` wrapper runs its pass at most once per node per frame. Disabled
//! nodes are handled here: they report no timing, produce empty transient data and
//! output the bind pose.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::attribute::{Attribute, AttributeStore};
use crate::character::Character;
use crate::config::Config;
use crate::context::EvalContext;
use crate::event::StateNotification;
use crate::graph::Graph;
use crate::ids::{NodeIndex, PortIndex};
use crate::motion::MotionLookup;
use crate::node::{self, NodeKind, POSE_OUTPUT_PORT};
use crate::pool::{PoseHandle, RefDataHandle};
use crate::skeleton::Skeleton;
use crate::unique_data::{MachineState, UniqueData};

pub(crate) const WEIGHT_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct NodeFlags {
    pub updated: bool,
    pub top_down_updated: bool,
    pub post_updated: bool,
    pub output_ready: bool,
    pub disabled: bool,
    pub has_error: bool,
}

/// Everything one instance owns that the passes mutate.
pub(crate) struct InstanceState {
    pub unique: Vec<Option<UniqueData>>,
    pub flags: Vec<NodeFlags>,
    pub params: AttributeStore,
    pub internal: AttributeStore,
    pub rng: StdRng,
    pub motion_set: Option<Arc<dyn MotionLookup>>,
    pub character: Character,
    pub config: Config,
    pub notifications: Vec<StateNotification>,
}

impl InstanceState {
    pub fn new(graph: &Graph, character: Character, config: Config) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut state = Self {
            unique: Vec::new(),
            flags: Vec::new(),
            params: AttributeStore::new(
                graph
                    .parameters()
                    .iter()
                    .map(|p| p.kind.default_value())
                    .collect(),
            ),
            internal: AttributeStore::default(),
            rng,
            motion_set: None,
            character,
            config,
            notifications: Vec::new(),
        };
        state.rebuild_node_data(graph);
        state
    }

    /// Size unique data, flags and internal attributes to `graph`. Existing unique data is dropped.
    pub fn rebuild_node_data(&mut self, graph: &Graph) {
        let n = graph.num_nodes();
        self.unique.clear();
        self.unique.resize_with(n, || None);
        self.flags = graph
            .nodes()
            .map(|(_, def)| NodeFlags {
                disabled: def.disabled,
                ..NodeFlags::default()
            })
            .collect();
        self.internal.replace_all(graph.internal_attribute_defaults());
    }

    #[inline]
    pub fn unique(&mut self, graph: &Graph, node: NodeIndex) -> &mut UniqueData {
        self.unique[node.index()].get_or_insert_with(|| UniqueData::new(&graph.node(node).kind))
    }

    pub fn machine(&self, node: NodeIndex) -> Option<MachineState> {
        self.unique
            .get(node.index())?
            .as_ref()?
            .machine()
            .copied()
    }

    pub fn reset_frame(&mut self) {
        for f in &mut self.flags {
            f.updated = false;
            f.top_down_updated = false;
            f.post_updated = false;
            f.output_ready = false;
        }
        for u in self.unique.iter_mut().flatten() {
            u.reset_frame();
        }
    }

    /// Restore pose ref counts collected during update so output can run again.
    pub fn prepare_output(&mut self) {
        for f in &mut self.flags {
            f.output_ready = false;
        }
        for u in self.unique.iter_mut().flatten() {
            u.pose_refs = u.pose_ref_budget;
        }
    }

    pub fn commit_pose_ref_budget(&mut self) {
        for u in self.unique.iter_mut().flatten() {
            u.pose_ref_budget = u.pose_refs;
        }
    }

    /// Only tracked in editor mode.
    pub fn set_has_error(&mut self, node: NodeIndex, has_error: bool) {
        if self.config.editor_mode {
            self.flags[node.index()].has_error = has_error;
        }
    }
}

/// Reset playback of `node` and everything feeding it.
pub(crate) fn rewind_subtree(graph: &Graph, state: &mut InstanceState, node: NodeIndex) {
    node::rewind(graph, state, node);
    let def = graph.node(node);
    for conn in def.connections.iter().flatten() {
        rewind_subtree(graph, state, conn.source);
    }
    if let NodeKind::StateMachine(_) = def.kind {
        if let Some(current) = state.machine(node).and_then(|m| m.current) {
            rewind_subtree(graph, state, current);
        }
    }
}

pub(crate) struct Evaluation<'a> {
    pub graph: &'a Graph,
    pub state: &'a mut InstanceState,
    pub ctx: &'a mut EvalContext,
    pub skeleton: Arc<Skeleton>,
}

impl<'a> Evaluation<'a> {
    pub fn new(graph: &'a Graph, state: &'a mut InstanceState, ctx: &'a mut EvalContext) -> Self {
        let skeleton = Arc::clone(state.character.skeleton());
        Self {
            graph,
            state,
            ctx,
            skeleton,
        }
    }

    #[inline]
    pub fn unique(&mut self, node: NodeIndex) -> &mut UniqueData {
        self.state.unique(self.graph, node)
    }

    #[inline]
    fn is_disabled(&self, node: NodeIndex) -> bool {
        self.state.flags[node.index()].disabled && self.graph.node(node).kind.caps().supports_disable
    }

    pub fn perform_update(&mut self, node: NodeIndex, dt: f32) {
        let flags = &mut self.state.flags[node.index()];
        if flags.updated {
            return;
        }
        flags.updated = true;
        if self.is_disabled(node) {
            self.unique(node).timing.clear();
            return;
        }
        node::update(self, node, dt);
    }

    pub fn perform_top_down_update(&mut self, node: NodeIndex, dt: f32) {
        let flags = &mut self.state.flags[node.index()];
        if flags.top_down_updated {
            return;
        }
        flags.top_down_updated = true;
        if self.is_disabled(node) {
            return;
        }
        node::top_down_update(self, node, dt);
    }

    pub fn perform_post_update(&mut self, node: NodeIndex, dt: f32) {
        let flags = &mut self.state.flags[node.index()];
        if flags.post_updated {
            return;
        }
        flags.post_updated = true;
        if self.is_disabled(node) {
            self.request_ref_data(node);
            return;
        }
        node::post_update(self, node, dt);
    }

    pub fn perform_output(&mut self, node: NodeIndex) {
        let flags = &mut self.state.flags[node.index()];
        if flags.output_ready {
            return;
        }
        flags.output_ready = true;
        if self.is_disabled(node) {
            let h = self.request_output_pose(node);
            self.fill_bind_pose(h);
            return;
        }
        node::output(self, node);
    }

    /// Update an input whose pose and transient data this node will consume.
    pub fn update_incoming(&mut self, node: NodeIndex, dt: f32) {
        self.perform_update(node, dt);
        let u = self.unique(node);
        u.pose_refs += 1;
        u.ref_data_refs += 1;
    }

    #[inline]
    pub fn input_node(&self, node: NodeIndex, port: PortIndex) -> Option<NodeIndex> {
        self.graph.input_node(node, port)
    }

    /// Update the value source on `port` and read what it wrote.
    pub fn input_attribute(&mut self, node: NodeIndex, port: PortIndex, dt: f32) -> Option<Attribute> {
        let conn = self.graph.node(node).input(port)?;
        self.perform_update(conn.source, dt);
        let slot = self.graph.output_attribute_index(conn.source, conn.source_port);
        self.state.internal.get(slot).cloned()
    }

    pub fn input_float(&mut self, node: NodeIndex, port: PortIndex, dt: f32) -> Option<f32> {
        self.input_attribute(node, port, dt)?.as_float()
    }

    pub fn input_bool(&mut self, node: NodeIndex, port: PortIndex, dt: f32) -> Option<bool> {
        self.input_attribute(node, port, dt)?.as_bool()
    }

    pub fn set_output_value(&mut self, node: NodeIndex, port: PortIndex, value: Attribute) {
        let slot = self.graph.output_attribute_index(node, port);
        if let Some(attr) = self.state.internal.get_mut(slot) {
            *attr = value;
        }
    }

    pub fn node_pose(&mut self, node: NodeIndex) -> Option<PoseHandle> {
        let slot = self.graph.output_attribute_index(node, POSE_OUTPUT_PORT);
        self.state.internal.get(slot)?.as_pose()
    }

    /// Check out this node's output pose, reusing one still held from earlier in the frame.
    pub fn request_output_pose(&mut self, node: NodeIndex) -> PoseHandle {
        if let Some(h) = self.node_pose(node) {
            if self.ctx.pose_pool.owns(h) {
                return h;
            }
        }
        let h = self.ctx.pose_pool.request();
        self.set_output_value(node, POSE_OUTPUT_PORT, Attribute::Pose(Some(h)));
        h
    }

    pub fn fill_bind_pose(&mut self, pose: PoseHandle) {
        if let Some(p) = self.ctx.pose_pool.get_mut(pose) {
            p.init_from_bind_pose(&self.skeleton);
        }
    }

    /// Check out (or reuse) this node's transient data, cleared.
    pub fn request_ref_data(&mut self, node: NodeIndex) -> RefDataHandle {
        let existing = self.unique(node).ref_data;
        let h = match existing {
            Some(h) if self.ctx.ref_data_pool.owns(h) => h,
            _ => {
                let h = self.ctx.ref_data_pool.request();
                self.unique(node).ref_data = Some(h);
                h
            }
        };
        if let Some(data) = self.ctx.ref_data_pool.get_mut(h) {
            data.reset();
        }
        h
    }

    /// Drop one consumer of `node`'s pose; the last one returns it to the pool.
    pub fn decrease_pose_ref(&mut self, node: NodeIndex) {
        let u = self.unique(node);
        if u.pose_refs == 0 {
            return;
        }
        u.pose_refs -= 1;
        if u.pose_refs > 0 {
            return;
        }
        if let Some(h) = self.node_pose(node) {
            self.ctx.pose_pool.free(h);
            self.set_output_value(node, POSE_OUTPUT_PORT, Attribute::Pose(None));
        }
    }

    pub fn decrease_ref_data_ref(&mut self, node: NodeIndex) {
        let u = self.unique(node);
        if u.ref_data_refs == 0 {
            return;
        }
        u.ref_data_refs -= 1;
        if u.ref_data_refs > 0 {
            return;
        }
        if let Some(h) = u.ref_data.take() {
            self.ctx.ref_data_pool.free(h);
        }
    }

    /// Return poses still parked in output ports. A balanced frame leaves none.
    pub fn free_dangling_poses(&mut self) {
        let graph = self.graph;
        for (node, def) in graph.nodes() {
            if !def.kind.caps().has_output_pose {
                continue;
            }
            let Some(h) = self.node_pose(node) else {
                continue;
            };
            if self.ctx.pose_pool.free(h) {
                log::debug!("'{}': returned a dangling pose", graph.node_name(node));
            }
            self.set_output_value(node, POSE_OUTPUT_PORT, Attribute::Pose(None));
            self.unique(node).pose_refs = 0;
        }
    }

    /// Return transient data nobody consumed this frame.
    pub fn free_dangling_ref_data(&mut self) {
        for u in self.state.unique.iter_mut().flatten() {
            u.ref_data_refs = 0;
            if let Some(h) = u.ref_data.take() {
                self.ctx.ref_data_pool.free(h);
            }
        }
    }

    pub fn set_has_error(&mut self, node: NodeIndex, has_error: bool) {
        self.state.set_has_error(node, has_error);
    }

    /// Assign a child's weights from its parent's global weight.
    pub fn set_child_weight(&mut self, parent: NodeIndex, child: NodeIndex, local_weight: f32) {
        let global = self.unique(parent).global_weight;
        let u = self.unique(child);
        u.local_weight = local_weight;
        u.global_weight = global * local_weight;
    }

    /// Post-update `a` and `b`, then merge their events and deltas into `node`'s data.
    /// `weight` is the share of `b`.
    pub fn post_update_blended(
        &mut self,
        node: NodeIndex,
        a: Option<NodeIndex>,
        b: Option<NodeIndex>,
        weight: f32,
        dt: f32,
    ) {
        for input in [a, b].into_iter().flatten() {
            self.perform_post_update(input, dt);
        }
        let dst = self.request_ref_data(node);
        let src_a = a.and_then(|n| self.unique(n).ref_data);
        let src_b = b.and_then(|n| self.unique(n).ref_data);

        let pool = &mut self.ctx.ref_data_pool;
        if let Some(mut out) = pool.take(dst) {
            match (src_a.and_then(|h| pool.get(h)), src_b.and_then(|h| pool.get(h))) {
                (Some(da), Some(db)) => {
                    out.events.extend_from(&da.events);
                    out.events.scale_local_weights(0, 1.0 - weight);
                    let split = out.events.len();
                    out.events.extend_from(&db.events);
                    out.events.scale_local_weights(split, weight);
                    out.trajectory_delta = da.trajectory_delta.blend(&db.trajectory_delta, weight);
                    out.trajectory_delta_mirrored = da
                        .trajectory_delta_mirrored
                        .blend(&db.trajectory_delta_mirrored, weight);
                }
                (Some(d), None) | (None, Some(d)) => {
                    out.events.extend_from(&d.events);
                    out.trajectory_delta = d.trajectory_delta;
                    out.trajectory_delta_mirrored = d.trajectory_delta_mirrored;
                }
                (None, None) => {}
            }
            pool.restore(dst, out);
        }

        for input in [a, b].into_iter().flatten() {
            self.decrease_ref_data_ref(input);
        }
    }

    /// Output `a` and `b` and blend them into `node`'s pose. `weight` is the share of `b`.
    /// With no inputs the bind pose is produced.
    pub fn output_blended(
        &mut self,
        node: NodeIndex,
        a: Option<NodeIndex>,
        b: Option<NodeIndex>,
        weight: f32,
    ) -> PoseHandle {
        let dst = self.request_output_pose(node);
        match (a, b) {
            (None, None) => self.fill_bind_pose(dst),
            (Some(x), None) | (None, Some(x)) => self.output_copy(dst, x),
            (Some(x), Some(y)) if weight <= WEIGHT_EPSILON => {
                self.output_copy(dst, x);
                self.decrease_pose_ref(y);
            }
            (Some(x), Some(y)) if weight >= 1.0 - WEIGHT_EPSILON => {
                self.output_copy(dst, y);
                self.decrease_pose_ref(x);
            }
            (Some(x), Some(y)) => {
                self.perform_output(x);
                self.perform_output(y);
                let blended = match (self.node_pose(x), self.node_pose(y)) {
                    (Some(px), Some(py)) => self.ctx.pose_pool.blend_into(dst, px, py, weight),
                    _ => false,
                };
                if !blended {
                    self.fill_bind_pose(dst);
                }
                self.decrease_pose_ref(x);
                self.decrease_pose_ref(y);
            }
        }
        dst
    }

    fn output_copy(&mut self, dst: PoseHandle, src: NodeIndex) {
        self.perform_output(src);
        let copied = match self.node_pose(src) {
            Some(p) => self.ctx.pose_pool.copy_into(dst, p),
            None => false,
        };
        if !copied {
            self.fill_bind_pose(dst);
        }
        self.decrease_pose_ref(src);
    }
}
