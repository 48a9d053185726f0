//! A graph bound to one character: the public evaluation and control surface.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::attribute::Attribute;
use crate::character::Character;
use crate::config::Config;
use crate::context::EvalContext;
use crate::error::GraphError;
use crate::evaluation::{rewind_subtree, Evaluation, InstanceState};
use crate::event::{EventBuffer, GraphEventHandler, HandlerId, StateNotification};
use crate::graph::Graph;
use crate::ids::{NodeIndex, ParameterIndex};
use crate::math::{normalize4, Transform};
use crate::motion::MotionLookup;
use crate::node::{motion, state_machine, NodeKind, POSE_OUTPUT_PORT};
use crate::pool::PoseHandle;
use crate::skeleton::Pose;
use crate::Result;

/// One live evaluation of a shared [`Graph`] for one [`Character`].
///
/// An instance is evaluated single-threaded; many instances may be updated in parallel
/// as long as each one uses the same [`EvalContext`] lane for its `update` and `output`
/// within a frame.
pub struct GraphInstance {
    graph: Arc<Graph>,
    state: InstanceState,
    handlers: Vec<(HandlerId, Box<dyn GraphEventHandler>)>,
    next_handler_id: u32,
    /// Lane of the frame in flight: set by update, cleared once output frees the root pose.
    frame_lane: Option<usize>,
    /// Root pose kept checked out by `output(.., auto_free = false)`.
    held_output: Option<PoseHandle>,
    events: EventBuffer,
    trajectory_delta: Transform,
    trajectory_delta_mirrored: Transform,
}

impl GraphInstance {
    pub fn new(graph: Arc<Graph>, character: Character, config: Config) -> Self {
        let state = InstanceState::new(&graph, character, config);
        Self {
            graph,
            state,
            handlers: Vec::new(),
            next_handler_id: 1,
            frame_lane: None,
            held_output: None,
            events: EventBuffer::new(),
            trajectory_delta: Transform::IDENTITY,
            trajectory_delta_mirrored: Transform::IDENTITY,
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn character(&self) -> &Character {
        &self.state.character
    }

    pub fn character_mut(&mut self) -> &mut Character {
        &mut self.state.character
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Bind the motion collection clips are resolved from. Every motion node reloads.
    pub fn set_motion_set(&mut self, motion_set: Arc<dyn MotionLookup>) {
        self.state.motion_set = Some(motion_set);
        motion::mark_for_reload(&mut self.state);
    }

    pub fn motion_set(&self) -> Option<&Arc<dyn MotionLookup>> {
        self.state.motion_set.as_ref()
    }

    /// Switch to a structurally different graph. Node state restarts from scratch;
    /// parameter values carry over where name and type still match.
    pub fn set_graph(&mut self, graph: Arc<Graph>) {
        let old_values = self.state.params.snapshot();
        let values: Vec<Attribute> = graph
            .parameters()
            .iter()
            .map(|p| {
                let default = p.kind.default_value();
                self.graph
                    .find_parameter_index(&p.name)
                    .ok()
                    .and_then(|i| old_values.get(i.index()))
                    .filter(|old| old.same_type(&default))
                    .cloned()
                    .unwrap_or(default)
            })
            .collect();
        log::debug!(
            "instance resync: '{}' -> '{}' ({} nodes, {} parameters)",
            self.graph.name(),
            graph.name(),
            graph.num_nodes(),
            values.len()
        );
        self.state.params.replace_all(values);
        self.state.rebuild_node_data(&graph);
        self.state.notifications.clear();
        self.graph = graph;
        // a held root pose stays checked out until the next update or release_output
        self.frame_lane = None;
        self.events.clear();
    }

    /// Run update, top-down update and post-update for one frame.
    pub fn update(&mut self, ctx: &mut EvalContext, dt: f32) {
        if let Some(lane) = self.frame_lane {
            if lane != ctx.lane() {
                log::warn!(
                    "instance of '{}' updated on lane {} while its last frame belongs to lane {}",
                    self.graph.name(),
                    ctx.lane(),
                    lane
                );
            }
        }
        self.release_output(ctx);
        self.frame_lane = Some(ctx.lane());

        let graph = Arc::clone(&self.graph);
        let root = graph.root();
        self.state.reset_frame();

        let mut ev = Evaluation::new(&graph, &mut self.state, ctx);
        {
            let u = ev.unique(root);
            u.global_weight = 1.0;
            u.local_weight = 1.0;
        }
        ev.update_incoming(root, dt);
        ev.perform_top_down_update(root, dt);
        ev.perform_post_update(root, dt);

        self.events.clear();
        self.trajectory_delta = Transform::IDENTITY;
        self.trajectory_delta_mirrored = Transform::IDENTITY;
        let root_data = ev.unique(root).ref_data;
        if let Some(data) = root_data.and_then(|h| ev.ctx.ref_data_pool.get(h)) {
            self.events.extend_from(&data.events);
            self.trajectory_delta = data.trajectory_delta;
            self.trajectory_delta_mirrored = data.trajectory_delta_mirrored;
        }
        ev.decrease_ref_data_ref(root);
        ev.free_dangling_ref_data();

        log::trace!(
            "lane {}: poses {:?}, ref data {:?}",
            ctx.lane(),
            ctx.pose_pool.stats(),
            ctx.ref_data_pool.stats()
        );

        self.state.commit_pose_ref_budget();
        self.state.character.apply_motion_extraction(self.trajectory_delta);

        let state = &self.state;
        self.events.update_weights(|n| {
            state.unique[n.index()]
                .as_ref()
                .map_or(0.0, |u| u.global_weight)
        });
        self.dispatch();
    }

    /// Evaluate the pose for the last update into `out`.
    ///
    /// With `auto_free` the root pose returns to the pool immediately; otherwise it stays
    /// checked out (see [`Self::output_handle`]) until the next `update`, `output` or
    /// [`Self::release_output`].
    pub fn output(&mut self, ctx: &mut EvalContext, out: &mut Pose, auto_free: bool) {
        if let Some(lane) = self.frame_lane {
            if lane != ctx.lane() {
                log::warn!(
                    "instance of '{}' output on lane {} but updated on lane {}",
                    self.graph.name(),
                    ctx.lane(),
                    lane
                );
            }
        }
        self.release_output(ctx);

        let graph = Arc::clone(&self.graph);
        let root = graph.root();
        self.state.prepare_output();

        let mut ev = Evaluation::new(&graph, &mut self.state, ctx);
        ev.perform_output(root);
        let handle = ev.node_pose(root);
        match handle.and_then(|h| ev.ctx.pose_pool.get(h)) {
            Some(pose) => out.copy_from(pose),
            None => out.init_from_bind_pose(&ev.skeleton),
        }
        if auto_free {
            ev.decrease_pose_ref(root);
            ev.free_dangling_poses();
            self.frame_lane = None;
        } else {
            self.held_output = handle;
        }
    }

    /// Root pose kept by the last `output(.., false)`, readable from the lane's pose pool.
    pub fn output_handle(&self) -> Option<PoseHandle> {
        self.held_output
    }

    /// Return a root pose kept by `output(.., false)`.
    pub fn release_output(&mut self, ctx: &mut EvalContext) {
        if let Some(h) = self.held_output.take() {
            let root = self.graph.root();
            if let Some(u) = self.state.unique[root.index()].as_mut() {
                u.pose_refs = 0;
            }
            ctx.pose_pool.free(h);
            let slot = self.graph.output_attribute_index(root, POSE_OUTPUT_PORT);
            self.state.internal.write(slot, Attribute::Pose(None));
        }
    }

    fn dispatch(&mut self) {
        let limit = self.state.config.max_events_per_tick;
        if self.events.len() > limit {
            log::warn!(
                "'{}': {} events this update, dispatching the first {}",
                self.graph.name(),
                self.events.len(),
                limit
            );
        }
        let notifications = std::mem::take(&mut self.state.notifications);
        if self.handlers.is_empty() {
            return;
        }
        let graph = &self.graph;
        for (_, handler) in &mut self.handlers {
            for event in self.events.iter().take(limit) {
                handler.on_event(event);
            }
            for n in &notifications {
                deliver(graph, handler.as_mut(), n);
            }
        }
    }

    pub fn add_event_handler(&mut self, handler: Box<dyn GraphEventHandler>) -> HandlerId {
        let id = HandlerId(self.next_handler_id);
        self.next_handler_id += 1;
        self.handlers.push((id, handler));
        id
    }

    pub fn remove_event_handler(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Events gathered by the last update, with refreshed global weights.
    pub fn event_buffer(&self) -> &EventBuffer {
        &self.events
    }

    /// Root motion of the last update.
    pub fn trajectory_delta(&self) -> Transform {
        self.trajectory_delta
    }

    /// Root motion of the last update as if every motion were mirrored the other way.
    pub fn trajectory_delta_mirrored(&self) -> Transform {
        self.trajectory_delta_mirrored
    }

    // --- state machines ---

    /// Cut to a state without blending. Enclosing state machines are switched to the
    /// path containing it. Fails while the owning machine is transitioning.
    pub fn switch_to_state(&mut self, name: &str) -> Result<()> {
        let target = self.graph.require_node(name)?;
        state_machine::request_switch(&self.graph, &mut self.state, target)
    }

    /// Blend to a state over the authored transition from the current state, or cut to it
    /// when no transition is authored.
    pub fn transition_to_state(&mut self, name: &str) -> Result<()> {
        let target = self.graph.require_node(name)?;
        state_machine::request_transition(&self.graph, &mut self.state, target)
    }

    /// Put every state machine, nested ones included, into its entry state. The enter
    /// notifications reach handlers with the next update.
    pub fn start(&mut self) {
        let outermost: Vec<NodeIndex> = self
            .state_machines()
            .into_iter()
            .filter(|&m| self.graph.parent_state_machine(m).is_none())
            .collect();
        for machine in outermost {
            state_machine::start(&self.graph, &mut self.state, machine);
        }
    }

    /// Exit every state machine's states; they stay idle until [`Self::start`].
    pub fn stop(&mut self) {
        for machine in self.state_machines() {
            state_machine::stop(&self.graph, &mut self.state, machine);
        }
    }

    fn state_machines(&self) -> Vec<NodeIndex> {
        self.graph
            .nodes()
            .filter(|(_, n)| n.kind.caps().is_state_machine)
            .map(|(i, _)| i)
            .collect()
    }

    fn require_machine(&self, name: &str) -> Result<NodeIndex> {
        let node = self.graph.require_node(name)?;
        match self.graph.node(node).kind {
            NodeKind::StateMachine(_) => Ok(node),
            _ => Err(GraphError::InvalidNode {
                name: name.to_string(),
                reason: "not a state machine".into(),
            }),
        }
    }

    pub fn is_transitioning(&self, machine: &str) -> Result<bool> {
        let machine = self.require_machine(machine)?;
        Ok(self
            .state
            .machine(machine)
            .is_some_and(|m| m.is_transitioning()))
    }

    /// Weight of the running (or last completed) transition.
    pub fn transition_weight(&self, machine: &str) -> Result<f32> {
        let machine = self.require_machine(machine)?;
        Ok(self.state.machine(machine).map_or(0.0, |m| m.weight))
    }

    /// Names of the current state and, while transitioning, the target state.
    pub fn active_states(&self, machine: &str) -> Result<(Option<&str>, Option<&str>)> {
        let machine = self.require_machine(machine)?;
        let m = self.state.machine(machine).unwrap_or_default();
        let name = |n: Option<NodeIndex>| n.map(|n| self.graph.node_name(n));
        Ok((name(m.current), name(m.target)))
    }

    // --- parameters ---

    pub fn find_parameter_index(&self, name: &str) -> Result<ParameterIndex> {
        self.graph.find_parameter_index(name)
    }

    fn check_index(&self, index: ParameterIndex) -> Result<()> {
        let count = self.graph.parameters().len();
        if index.index() >= count {
            return Err(GraphError::ParameterIndexOutOfRange {
                index: index.index(),
                count,
            });
        }
        Ok(())
    }

    pub fn parameter_value(&self, index: ParameterIndex) -> Result<Attribute> {
        self.check_index(index)?;
        self.state
            .params
            .read(index.index())
            .ok_or(GraphError::ParameterIndexOutOfRange {
                index: index.index(),
                count: self.state.params.len(),
            })
    }

    pub fn parameter_value_by_name(&self, name: &str) -> Result<Attribute> {
        self.parameter_value(self.find_parameter_index(name)?)
    }

    /// Write a parameter. The value must have the parameter's type; floats are clamped
    /// to the declared range.
    pub fn set_parameter_value(&mut self, index: ParameterIndex, value: Attribute) -> Result<()> {
        self.check_index(index)?;
        let parameter = &self.graph.parameters()[index.index()];
        let expected = parameter.kind.default_value();
        if !expected.same_type(&value) {
            return Err(GraphError::ParameterTypeMismatch {
                expected: expected.type_name().to_string(),
                actual: value.type_name().to_string(),
            });
        }
        let value = parameter.kind.clamp(value);
        if let Some(slot) = self.state.params.get_mut(index.index()) {
            *slot = value;
        }
        Ok(())
    }

    pub fn set_parameter_by_name(&mut self, name: &str, value: Attribute) -> Result<()> {
        let index = self.find_parameter_index(name)?;
        self.set_parameter_value(index, value)
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> Result<()> {
        self.set_parameter_by_name(name, Attribute::Float(value))
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.set_parameter_by_name(name, Attribute::Bool(value))
    }

    pub fn set_int(&mut self, name: &str, value: i32) -> Result<()> {
        self.set_parameter_by_name(name, Attribute::Int(value))
    }

    pub fn set_vector2(&mut self, name: &str, value: [f32; 2]) -> Result<()> {
        self.set_parameter_by_name(name, Attribute::Vector2(value))
    }

    pub fn set_vector3(&mut self, name: &str, value: [f32; 3]) -> Result<()> {
        self.set_parameter_by_name(name, Attribute::Vector3(value))
    }

    pub fn set_vector4(&mut self, name: &str, value: [f32; 4]) -> Result<()> {
        self.set_parameter_by_name(name, Attribute::Vector4(value))
    }

    pub fn set_rotation(&mut self, name: &str, value: [f32; 4]) -> Result<()> {
        self.set_parameter_by_name(name, Attribute::Rotation(normalize4(value)))
    }

    /// Numeric read with the lossy conversions of [`Attribute::as_float`].
    pub fn float(&self, name: &str) -> Result<f32> {
        let value = self.parameter_value_by_name(name)?;
        value.as_float().ok_or(GraphError::ParameterTypeMismatch {
            expected: "float".into(),
            actual: value.type_name().to_string(),
        })
    }

    /// Reset one parameter to its declared default.
    pub fn reinit_parameter_value(&mut self, index: ParameterIndex) -> Result<()> {
        self.check_index(index)?;
        let default = self.graph.parameters()[index.index()].kind.default_value();
        if let Some(slot) = self.state.params.get_mut(index.index()) {
            *slot = default;
        }
        Ok(())
    }

    /// Insert the default of graph parameter `index` into the value list at `index`.
    ///
    /// Mirrors a parameter added to the bound graph one slot at a time; the list may not
    /// grow past the graph's parameter count.
    pub fn add_parameter_value(&mut self, index: ParameterIndex) -> Result<()> {
        self.check_index(index)?;
        let count = self.graph.parameters().len();
        let len = self.state.params.len();
        if len >= count || index.index() > len {
            return Err(GraphError::ParameterIndexOutOfRange {
                index: index.index().max(len),
                count,
            });
        }
        let default = self.graph.parameters()[index.index()].kind.default_value();
        self.state.params.insert(index.index(), default);
        Ok(())
    }

    /// Drop the value at `index`, shifting later values down. Returns the removed value.
    pub fn remove_parameter_value(&mut self, index: ParameterIndex) -> Result<Attribute> {
        let count = self.state.params.len();
        self.state
            .params
            .remove(index.index())
            .ok_or(GraphError::ParameterIndexOutOfRange {
                index: index.index(),
                count,
            })
    }

    /// Reset every parameter to its default, resizing the value list to the graph's.
    pub fn reinit_parameter_values(&mut self) {
        self.state.params.replace_all(
            self.graph
                .parameters()
                .iter()
                .map(|p| p.kind.default_value())
                .collect(),
        );
    }

    // --- nodes ---

    /// Disable or re-enable a node. Kinds without disable support ignore the request.
    pub fn set_node_disabled(&mut self, name: &str, disabled: bool) -> Result<()> {
        let node = self.graph.require_node(name)?;
        if !self.graph.node(node).kind.caps().supports_disable {
            log::debug!("'{name}' cannot be disabled");
            return Ok(());
        }
        self.state.flags[node.index()].disabled = disabled;
        Ok(())
    }

    pub fn is_node_disabled(&self, name: &str) -> Result<bool> {
        let node = self.graph.require_node(name)?;
        Ok(self.state.flags[node.index()].disabled)
    }

    /// Diagnostic flag; only maintained in editor mode.
    pub fn node_has_error(&self, name: &str) -> Result<bool> {
        let node = self.graph.require_node(name)?;
        Ok(self.state.flags[node.index()].has_error)
    }

    /// Play time reported by a node during the last update.
    pub fn current_play_time(&self, name: &str) -> Result<f32> {
        let node = self.graph.require_node(name)?;
        Ok(self.state.unique[node.index()]
            .as_ref()
            .map_or(0.0, |u| u.timing.current_time))
    }

    /// Nodes evaluated by the last update, in node order.
    pub fn collect_active_nodes(&self) -> Vec<NodeIndex> {
        self.state
            .flags
            .iter()
            .enumerate()
            .filter(|(_, f)| f.updated)
            .map(|(i, _)| NodeIndex(i as u32))
            .collect()
    }

    /// Restart playback of a node and everything feeding it.
    pub fn rewind_node(&mut self, name: &str) -> Result<()> {
        let node = self.graph.require_node(name)?;
        rewind_subtree(&self.graph, &mut self.state, node);
        Ok(())
    }

    pub fn seed_random(&mut self, seed: u64) {
        self.state.rng = StdRng::seed_from_u64(seed);
    }
}

fn deliver(graph: &Graph, handler: &mut dyn GraphEventHandler, n: &StateNotification) {
    let name = |i: NodeIndex| graph.node_name(i);
    match *n {
        StateNotification::Entering { machine, state } => {
            handler.on_state_entering(name(machine), name(state))
        }
        StateNotification::Enter { machine, state } => handler.on_state_enter(name(machine), name(state)),
        StateNotification::Exit { machine, state } => handler.on_state_exit(name(machine), name(state)),
        StateNotification::End { machine, state } => handler.on_state_end(name(machine), name(state)),
        StateNotification::StartTransition {
            machine,
            source,
            target,
        } => handler.on_start_transition(name(machine), source.map(name), name(target)),
        StateNotification::EndTransition {
            machine,
            source,
            target,
        } => handler.on_end_transition(name(machine), source.map(name), name(target)),
    }
}
