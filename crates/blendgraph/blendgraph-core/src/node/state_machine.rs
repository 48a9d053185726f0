//! State machines: child states, timed transitions and the switch/transition requests.
//!
//! At most two states are active at once. While a transition runs, the source keeps the
//! `current` slot and the destination sits in `target`; both subtrees are updated and
//! their poses blended by the transition weight. The transition completes once the weight
//! reaches one, at which point the source is dropped.

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::error::GraphError;
use crate::evaluation::{rewind_subtree, Evaluation, InstanceState, WEIGHT_EPSILON};
use crate::event::StateNotification;
use crate::graph::Graph;
use crate::ids::{NodeIndex, ParameterIndex};
use crate::node::NodeKind;
use crate::unique_data::MachineState;
use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn test(self, lhs: f32, rhs: f32) -> bool {
        match self {
            CompareOp::Greater => lhs > rhs,
            CompareOp::GreaterEqual => lhs >= rhs,
            CompareOp::Less => lhs < rhs,
            CompareOp::LessEqual => lhs <= rhs,
            CompareOp::Equal => (lhs - rhs).abs() <= f32::EPSILON,
            CompareOp::NotEqual => (lhs - rhs).abs() > f32::EPSILON,
        }
    }
}

/// Trigger for an authored transition. All conditions of a transition must hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionCondition {
    /// Compare a graph parameter (read as a number) against a constant.
    Parameter {
        parameter: String,
        #[serde(skip)]
        index: Option<ParameterIndex>,
        op: CompareOp,
        value: f32,
    },
    /// The source state has played at least `time` seconds.
    PlayTime { time: f32 },
    /// The source state's motion ended or wrapped.
    MotionEnded,
}

impl TransitionCondition {
    pub fn parameter(parameter: impl Into<String>, op: CompareOp, value: f32) -> Self {
        TransitionCondition::Parameter {
            parameter: parameter.into(),
            index: None,
            op,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// `None` allows the transition from any state.
    pub source: Option<NodeIndex>,
    pub target: NodeIndex,
    /// Seconds to blend from source to target.
    pub blend_time: f32,
    /// Empty means the transition only runs on request.
    pub conditions: Vec<TransitionCondition>,
}

impl Transition {
    fn applies(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.target == to && self.source.map_or(true, |s| s == from)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateMachineDef {
    /// Entered when the machine has no current state. Falls back to the first child.
    pub entry_state: Option<NodeIndex>,
    pub transitions: Vec<Transition>,
}

fn entry_state(graph: &Graph, machine: NodeIndex, def: &StateMachineDef) -> Option<NodeIndex> {
    def.entry_state
        .or_else(|| graph.node(machine).children.first().copied())
}

fn machine_def(graph: &Graph, machine: NodeIndex) -> Option<&StateMachineDef> {
    match &graph.node(machine).kind {
        NodeKind::StateMachine(def) => Some(def),
        _ => None,
    }
}

fn load(graph: &Graph, state: &mut InstanceState, machine: NodeIndex) -> MachineState {
    state
        .unique(graph, machine)
        .machine()
        .copied()
        .unwrap_or_default()
}

fn store(graph: &Graph, state: &mut InstanceState, machine: NodeIndex, m: MachineState) {
    if let Some(slot) = state.unique(graph, machine).machine_mut() {
        *slot = m;
    }
}

/// Cut to `target` without blending.
pub(crate) fn switch_to(graph: &Graph, state: &mut InstanceState, machine: NodeIndex, target: NodeIndex) {
    let mut m = load(graph, state, machine);
    if let Some(current) = m.current {
        state.notifications.push(StateNotification::Exit {
            machine,
            state: current,
        });
    }
    log::debug!(
        "{}: switch {} -> {}",
        graph.node_name(machine),
        m.current.map_or("<none>", |c| graph.node_name(c)),
        graph.node_name(target)
    );
    m.current = Some(target);
    m.target = None;
    m.transition = None;
    m.elapsed = 0.0;
    m.weight = 1.0;
    m.stopped = false;
    store(graph, state, machine, m);

    rewind_subtree(graph, state, target);
    state.notifications.push(StateNotification::Enter {
        machine,
        state: target,
    });
}

/// Begin authored transition `index` from the current state.
pub(crate) fn start_transition(graph: &Graph, state: &mut InstanceState, machine: NodeIndex, index: usize) {
    let Some(transition) = machine_def(graph, machine).and_then(|d| d.transitions.get(index)) else {
        return;
    };
    let target = transition.target;
    let mut m = load(graph, state, machine);
    let source = m.current;
    log::debug!(
        "{}: transition {} -> {} over {}s",
        graph.node_name(machine),
        source.map_or("<none>", |s| graph.node_name(s)),
        graph.node_name(target),
        transition.blend_time
    );
    m.target = Some(target);
    m.transition = Some(index);
    m.elapsed = 0.0;
    m.weight = 0.0;
    m.stopped = false;
    store(graph, state, machine, m);

    rewind_subtree(graph, state, target);
    if let Some(source) = source {
        state.notifications.push(StateNotification::Exit {
            machine,
            state: source,
        });
    }
    state.notifications.push(StateNotification::Entering {
        machine,
        state: target,
    });
    state.notifications.push(StateNotification::StartTransition {
        machine,
        source,
        target,
    });
}

fn complete_transition(graph: &Graph, state: &mut InstanceState, machine: NodeIndex) {
    let mut m = load(graph, state, machine);
    let Some(target) = m.target else {
        return;
    };
    let source = m.current;
    m.current = Some(target);
    m.target = None;
    m.transition = None;
    m.weight = 1.0;
    store(graph, state, machine, m);
    log::debug!(
        "{}: transition to {} complete",
        graph.node_name(machine),
        graph.node_name(target)
    );

    if let Some(source) = source {
        state.notifications.push(StateNotification::End {
            machine,
            state: source,
        });
    }
    state.notifications.push(StateNotification::Enter {
        machine,
        state: target,
    });
    state.notifications.push(StateNotification::EndTransition {
        machine,
        source,
        target,
    });
}

fn conditions_hold(ev: &mut Evaluation<'_>, transition: &Transition, current: NodeIndex) -> bool {
    if transition.conditions.is_empty() {
        return false;
    }
    let timing = ev.unique(current).timing;
    let params: &[Attribute] = ev.state.params.as_mut_slice();
    transition.conditions.iter().all(|condition| match condition {
        TransitionCondition::Parameter {
            index, op, value, ..
        } => index
            .and_then(|i| params.get(i.index()))
            .and_then(|a| a.as_float())
            .is_some_and(|v| op.test(v, *value)),
        TransitionCondition::PlayTime { time } => timing.current_time >= *time,
        TransitionCondition::MotionEnded => timing.has_ended || timing.has_looped,
    })
}

pub(crate) fn update(ev: &mut Evaluation<'_>, node: NodeIndex, def: &StateMachineDef, dt: f32) {
    let graph = ev.graph;
    let m = load(graph, ev.state, node);
    if m.current.is_none() && !m.stopped {
        if let Some(entry) = entry_state(graph, node, def) {
            switch_to(graph, ev.state, node, entry);
        }
    }

    let mut m = load(graph, ev.state, node);
    if m.is_transitioning() {
        let blend_time = m
            .transition
            .and_then(|i| def.transitions.get(i))
            .map_or(0.0, |t| t.blend_time);
        m.elapsed += dt;
        m.weight = if blend_time > 0.0 {
            (m.elapsed / blend_time).min(1.0)
        } else {
            1.0
        };
        store(graph, ev.state, node, m);
        if m.weight >= 1.0 - WEIGHT_EPSILON {
            complete_transition(graph, ev.state, node);
        }
    } else if let Some(current) = m.current {
        let ready = def.transitions.iter().position(|t| {
            t.target != current
                && t.source.map_or(true, |s| s == current)
                && conditions_hold(ev, t, current)
        });
        if let Some(index) = ready {
            start_transition(graph, ev.state, node, index);
            if def.transitions[index].blend_time <= 0.0 {
                complete_transition(graph, ev.state, node);
            }
        }
    }

    let m = load(graph, ev.state, node);
    for active in [m.current, m.target].into_iter().flatten() {
        ev.update_incoming(active, dt);
    }
    let leader = match (m.current, m.target) {
        (_, Some(target)) if m.weight >= 0.5 => Some(target),
        (current, _) => current,
    };
    let timing = leader.map(|l| ev.unique(l).timing).unwrap_or_default();
    ev.unique(node).timing = timing;
    ev.set_has_error(node, m.current.is_none() && !m.stopped);
}

fn blend_inputs(m: &MachineState) -> (Option<NodeIndex>, Option<NodeIndex>, f32) {
    match m.target {
        Some(target) => (m.current, Some(target), m.weight),
        None => (m.current, None, 0.0),
    }
}

pub(crate) fn top_down_update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let m = load(ev.graph, ev.state, node);
    let (a, b, weight) = blend_inputs(&m);
    if let Some(a) = a {
        ev.set_child_weight(node, a, 1.0 - weight);
    }
    if let Some(b) = b {
        ev.set_child_weight(node, b, weight);
    }
    for active in [a, b].into_iter().flatten() {
        ev.perform_top_down_update(active, dt);
    }
}

pub(crate) fn post_update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let m = load(ev.graph, ev.state, node);
    let (a, b, weight) = blend_inputs(&m);
    ev.post_update_blended(node, a, b, weight, dt);
}

pub(crate) fn output(ev: &mut Evaluation<'_>, node: NodeIndex) {
    let m = load(ev.graph, ev.state, node);
    let (a, b, weight) = blend_inputs(&m);
    ev.output_blended(node, a, b, weight);
}

/// Cancel any running transition; the current state's subtree is rewound by the caller.
pub(crate) fn rewind(graph: &Graph, state: &mut InstanceState, node: NodeIndex) {
    let mut m = load(graph, state, node);
    m.target = None;
    m.transition = None;
    m.elapsed = 0.0;
    m.weight = if m.current.is_some() { 1.0 } else { 0.0 };
    store(graph, state, node, m);
    state.unique(graph, node).timing.clear();
}

/// Make `machine` the current state of every enclosing state machine.
fn activate_ancestors(graph: &Graph, state: &mut InstanceState, machine: NodeIndex) -> Result<()> {
    let Some(parent) = graph.parent_state_machine(machine) else {
        return Ok(());
    };
    activate_ancestors(graph, state, parent)?;
    let m = load(graph, state, parent);
    if m.current == Some(machine) && !m.is_transitioning() {
        return Ok(());
    }
    if m.is_transitioning() {
        return Err(GraphError::AlreadyTransitioning {
            machine: graph.node_name(parent).to_string(),
        });
    }
    switch_to(graph, state, parent, machine);
    Ok(())
}

fn owning_machine(graph: &Graph, target: NodeIndex) -> Result<NodeIndex> {
    graph
        .parent_state_machine(target)
        .ok_or_else(|| GraphError::NotAState {
            name: graph.node_name(target).to_string(),
        })
}

/// Immediate cut to `target`, activating enclosing machines as needed.
pub(crate) fn request_switch(graph: &Graph, state: &mut InstanceState, target: NodeIndex) -> Result<()> {
    let machine = owning_machine(graph, target)?;
    if load(graph, state, machine).is_transitioning() {
        return Err(GraphError::AlreadyTransitioning {
            machine: graph.node_name(machine).to_string(),
        });
    }
    activate_ancestors(graph, state, machine)?;
    switch_to(graph, state, machine, target);
    Ok(())
}

/// Blend to `target` using the authored transition from the current state, or cut if there is none.
pub(crate) fn request_transition(graph: &Graph, state: &mut InstanceState, target: NodeIndex) -> Result<()> {
    let machine = owning_machine(graph, target)?;
    let m = load(graph, state, machine);
    if m.is_transitioning() {
        return Err(GraphError::AlreadyTransitioning {
            machine: graph.node_name(machine).to_string(),
        });
    }
    activate_ancestors(graph, state, machine)?;
    if m.current == Some(target) {
        return Ok(());
    }
    let authored = match (m.current, machine_def(graph, machine)) {
        (Some(current), Some(def)) => def
            .transitions
            .iter()
            .position(|t| t.applies(current, target)),
        _ => None,
    };
    match authored {
        Some(index) => start_transition(graph, state, machine, index),
        None => switch_to(graph, state, machine, target),
    }
    Ok(())
}

/// Leave the current state; the machine stays idle until started again.
pub(crate) fn stop(graph: &Graph, state: &mut InstanceState, machine: NodeIndex) {
    if let Some(current) = load(graph, state, machine).current {
        state.notifications.push(StateNotification::Exit {
            machine,
            state: current,
        });
    }
    let stopped = MachineState {
        stopped: true,
        ..MachineState::default()
    };
    store(graph, state, machine, stopped);
}

/// Enter the authored entry state, then start every machine nested under it.
///
/// Children that are themselves state machines are reset to their own entry states, so
/// the whole hierarchy is active (and `Enter` notified) before the next update.
pub(crate) fn start(graph: &Graph, state: &mut InstanceState, machine: NodeIndex) {
    let Some(def) = machine_def(graph, machine) else {
        return;
    };
    match entry_state(graph, machine, def) {
        Some(entry) => switch_to(graph, state, machine, entry),
        None => {
            let mut m = load(graph, state, machine);
            m.stopped = false;
            store(graph, state, machine, m);
        }
    }
    for &child in &graph.node(machine).children {
        if graph.node(child).kind.caps().is_state_machine {
            start(graph, state, child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_ops() {
        assert!(CompareOp::Greater.test(2.0, 1.0));
        assert!(!CompareOp::Greater.test(1.0, 1.0));
        assert!(CompareOp::GreaterEqual.test(1.0, 1.0));
        assert!(CompareOp::Less.test(0.5, 1.0));
        assert!(CompareOp::LessEqual.test(1.0, 1.0));
        assert!(CompareOp::Equal.test(3.0, 3.0));
        assert!(CompareOp::NotEqual.test(3.0, 3.5));
    }

    #[test]
    fn wildcard_transitions_apply_from_any_state() {
        let t = Transition {
            source: None,
            target: NodeIndex(4),
            blend_time: 0.2,
            conditions: Vec::new(),
        };
        assert!(t.applies(NodeIndex(1), NodeIndex(4)));
        assert!(!t.applies(NodeIndex(1), NodeIndex(2)));
    }

    #[test]
    fn condition_json_shape() {
        let c: TransitionCondition = serde_json::from_str(
            r#"{"type":"parameter","parameter":"speed","op":"greater","value":0.5}"#,
        )
        .unwrap();
        assert_eq!(c, TransitionCondition::parameter("speed", CompareOp::Greater, 0.5));
    }
}
