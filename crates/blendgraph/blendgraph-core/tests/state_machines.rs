mod common;

use approx::assert_relative_eq;
use blendgraph_core::{EvalContext, GraphError, Pose};
use common::{instance, Recorder};

fn notifications(recorder: &Recorder) -> Vec<String> {
    recorder
        .take()
        .into_iter()
        .filter(|line| !line.starts_with("event "))
        .collect()
}

#[test]
fn timed_transition_blends_then_drops_the_source() {
    let mut inst = instance("two-state");
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();

    inst.update(&mut ctx, 0.1);
    assert_eq!(inst.active_states("SM").unwrap(), (Some("A"), None));

    inst.transition_to_state("B").unwrap();
    assert!(inst.is_transitioning("SM").unwrap());

    inst.update(&mut ctx, 0.5);
    inst.output(&mut ctx, &mut pose, true);
    assert_relative_eq!(inst.transition_weight("SM").unwrap(), 0.5, epsilon = 1e-5);
    assert_eq!(inst.active_states("SM").unwrap(), (Some("A"), Some("B")));
    // foot_l: bind z 0.0 in idle, -0.2 in walk at t = 0.5
    assert_relative_eq!(pose.transforms[2].translation[2], -0.1, epsilon = 1e-4);

    inst.update(&mut ctx, 0.5);
    assert_relative_eq!(inst.transition_weight("SM").unwrap(), 1.0);
    assert!(!inst.is_transitioning("SM").unwrap());
    assert_eq!(inst.active_states("SM").unwrap(), (Some("B"), None));

    let graph = inst.graph().clone();
    let active = inst.collect_active_nodes();
    assert!(active.contains(&graph.find_node("B").unwrap()));
    assert!(!active.contains(&graph.find_node("A").unwrap()));
}

#[test]
fn requests_are_rejected_while_transitioning() {
    let mut inst = instance("two-state");
    let mut ctx = EvalContext::new(0);
    inst.update(&mut ctx, 0.1);
    inst.transition_to_state("B").unwrap();

    let busy = GraphError::AlreadyTransitioning {
        machine: "SM".into(),
    };
    assert_eq!(inst.switch_to_state("A"), Err(busy.clone()));
    assert_eq!(inst.transition_to_state("A"), Err(busy.clone()));
    assert!(busy.is_recoverable());

    inst.update(&mut ctx, 0.5);
    inst.update(&mut ctx, 0.5);
    inst.switch_to_state("A").unwrap();
    assert_eq!(inst.active_states("SM").unwrap(), (Some("A"), None));
}

#[test]
fn unknown_and_non_state_targets_are_errors() {
    let mut inst = instance("two-state");
    assert_eq!(
        inst.switch_to_state("Nowhere"),
        Err(GraphError::NodeNotFound {
            name: "Nowhere".into()
        })
    );
    assert_eq!(
        inst.transition_to_state("SM"),
        Err(GraphError::NotAState { name: "SM".into() })
    );
    assert!(matches!(
        inst.is_transitioning("A"),
        Err(GraphError::InvalidNode { .. })
    ));
}

#[test]
fn listeners_hear_state_changes_in_order() {
    let mut inst = instance("two-state");
    let mut ctx = EvalContext::new(0);
    let recorder = Recorder::default();
    inst.add_event_handler(Box::new(recorder.clone()));

    inst.update(&mut ctx, 0.1);
    assert_eq!(notifications(&recorder), vec!["enter SM/A"]);

    inst.transition_to_state("B").unwrap();
    inst.update(&mut ctx, 0.5);
    assert_eq!(
        notifications(&recorder),
        vec!["exit SM/A", "entering SM/B", "start SM: A -> B"]
    );

    inst.update(&mut ctx, 0.5);
    assert_eq!(
        notifications(&recorder),
        vec!["end SM/A", "enter SM/B", "finish SM: A -> B"]
    );

    inst.switch_to_state("A").unwrap();
    inst.update(&mut ctx, 0.1);
    assert_eq!(notifications(&recorder), vec!["exit SM/B", "enter SM/A"]);
}

#[test]
fn parameter_conditions_drive_transitions_and_sync_the_blend() {
    let mut inst = instance("locomotion");
    let mut ctx = EvalContext::new(0);
    inst.set_float("speed", 0.5).unwrap();

    // entry and the speed transition start on the same frame
    inst.update(&mut ctx, 0.125);
    assert_eq!(
        inst.active_states("Locomotion").unwrap(),
        (Some("Idle"), Some("Move"))
    );
    inst.update(&mut ctx, 0.125);
    assert_relative_eq!(inst.transition_weight("Locomotion").unwrap(), 0.5, epsilon = 1e-5);
    inst.update(&mut ctx, 0.125);
    assert_eq!(inst.active_states("Locomotion").unwrap(), (Some("Move"), None));

    // run carries half the weight and leads; walk follows its phase
    let walk = inst.current_play_time("Walk").unwrap();
    let run = inst.current_play_time("Run").unwrap();
    assert_relative_eq!(run, 0.375, epsilon = 1e-5);
    assert_relative_eq!(walk / 1.0, run / 0.5, epsilon = 1e-4);

    inst.set_float("speed", 0.0).unwrap();
    inst.update(&mut ctx, 0.125);
    assert_eq!(
        inst.active_states("Locomotion").unwrap(),
        (Some("Move"), Some("Idle"))
    );
}

#[test]
fn request_only_transition_returns_when_the_motion_ends() {
    let mut inst = instance("locomotion");
    let mut ctx = EvalContext::new(0);
    let recorder = Recorder::default();
    inst.add_event_handler(Box::new(recorder.clone()));

    // empty-condition transitions never fire on their own
    for _ in 0..8 {
        inst.update(&mut ctx, 0.25);
    }
    assert_eq!(inst.active_states("Locomotion").unwrap(), (Some("Idle"), None));
    recorder.take();

    inst.transition_to_state("Wave").unwrap();
    for _ in 0..12 {
        inst.update(&mut ctx, 0.25);
    }
    let log = notifications(&recorder);
    assert!(log.contains(&"start Locomotion: Idle -> Wave".to_string()));
    assert!(log.contains(&"start Locomotion: Wave -> Idle".to_string()));
    assert_eq!(inst.active_states("Locomotion").unwrap(), (Some("Idle"), None));
}

#[test]
fn stopped_machines_idle_until_started() {
    let mut inst = instance("two-state");
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();
    inst.update(&mut ctx, 0.1);

    inst.stop();
    inst.update(&mut ctx, 0.1);
    inst.output(&mut ctx, &mut pose, true);
    assert_eq!(inst.active_states("SM").unwrap(), (None, None));
    assert_eq!(pose.len(), 4);

    inst.start();
    inst.update(&mut ctx, 0.1);
    assert_eq!(inst.active_states("SM").unwrap(), (Some("A"), None));
    assert_relative_eq!(inst.current_play_time("A").unwrap(), 0.1, epsilon = 1e-5);
}

#[test]
fn switching_to_a_nested_state_activates_the_enclosing_path() {
    let mut inst = instance("nested");
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();
    let recorder = Recorder::default();
    inst.add_event_handler(Box::new(recorder.clone()));

    inst.switch_to_state("Y").unwrap();
    assert_eq!(inst.active_states("Root").unwrap(), (Some("Inner"), None));
    assert_eq!(inst.active_states("Inner").unwrap(), (Some("Y"), None));

    inst.update(&mut ctx, 0.5);
    inst.output(&mut ctx, &mut pose, true);
    assert_eq!(notifications(&recorder), vec!["enter Root/Inner", "enter Inner/Y"]);
    assert_relative_eq!(inst.current_play_time("Y").unwrap(), 0.5, epsilon = 1e-5);
    // foot_l follows walk, not the idle bind pose
    assert_relative_eq!(pose.transforms[2].translation[2], -0.2, epsilon = 1e-4);
    assert_eq!(ctx.pose_pool.used(), 0);
    assert_eq!(ctx.ref_data_pool.used(), 0);
}

#[test]
fn nested_requests_wait_for_the_enclosing_transition() {
    let mut inst = instance("nested");
    let mut ctx = EvalContext::new(0);
    inst.update(&mut ctx, 0.1);
    assert_eq!(inst.active_states("Root").unwrap(), (Some("A"), None));

    inst.transition_to_state("Inner").unwrap();
    inst.update(&mut ctx, 0.25);
    assert_eq!(inst.active_states("Root").unwrap(), (Some("A"), Some("Inner")));
    assert_eq!(inst.active_states("Inner").unwrap(), (Some("X"), None));

    let busy = GraphError::AlreadyTransitioning {
        machine: "Root".into(),
    };
    assert_eq!(inst.switch_to_state("Y"), Err(busy.clone()));
    assert_eq!(inst.transition_to_state("Y"), Err(busy));
    assert_eq!(inst.active_states("Inner").unwrap(), (Some("X"), None));

    inst.update(&mut ctx, 0.25);
    assert_eq!(inst.active_states("Root").unwrap(), (Some("Inner"), None));
    inst.transition_to_state("Y").unwrap();
    assert!(inst.is_transitioning("Inner").unwrap());
    assert!(!inst.is_transitioning("Root").unwrap());
}

#[test]
fn start_enters_every_nested_entry_state() {
    let mut inst = instance("nested");
    let mut ctx = EvalContext::new(0);
    let recorder = Recorder::default();
    inst.add_event_handler(Box::new(recorder.clone()));

    inst.update(&mut ctx, 0.1);
    inst.switch_to_state("Y").unwrap();
    inst.update(&mut ctx, 0.1);
    recorder.take();

    inst.stop();
    inst.update(&mut ctx, 0.1);
    let exits = notifications(&recorder);
    assert!(exits.contains(&"exit Root/Inner".to_string()));
    assert!(exits.contains(&"exit Inner/Y".to_string()));
    assert_eq!(inst.active_states("Root").unwrap(), (None, None));
    assert_eq!(inst.active_states("Inner").unwrap(), (None, None));

    inst.start();
    assert_eq!(inst.active_states("Root").unwrap(), (Some("A"), None));
    assert_eq!(inst.active_states("Inner").unwrap(), (Some("X"), None));

    inst.update(&mut ctx, 0.1);
    assert_eq!(notifications(&recorder), vec!["enter Root/A", "enter Inner/X"]);
    assert_relative_eq!(inst.current_play_time("A").unwrap(), 0.1, epsilon = 1e-5);
}
