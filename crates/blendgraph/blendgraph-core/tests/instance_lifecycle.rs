mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use blendgraph_core::{
    Attribute, Config, EvalContext, GraphBuilder, GraphError, MotionNodeDef, NodeKind,
    ParameterIndex, ParameterKind, Pose, ValueParameter,
};
use common::{bind_pose, graph, instance, instance_with, seeded, Recorder};

const DT: f32 = 1.0 / 60.0;

#[test]
fn pools_drain_after_every_frame() {
    let mut inst = instance("locomotion");
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();

    for frame in 0..240 {
        match frame {
            30 => inst.set_float("speed", 0.8).unwrap(),
            90 => inst.transition_to_state("Wave").unwrap(),
            200 => inst.set_float("speed", 0.0).unwrap(),
            _ => {}
        }
        inst.update(&mut ctx, DT);
        inst.output(&mut ctx, &mut pose, true);
        assert_eq!(ctx.pose_pool.used(), 0, "poses leaked on frame {frame}");
        assert_eq!(ctx.ref_data_pool.used(), 0, "ref data leaked on frame {frame}");
    }
    assert_eq!(pose.len(), 4);
    assert!(ctx.pose_pool.max_used() >= 2);
}

#[test]
fn held_output_stays_checked_out_until_released() {
    let mut inst = instance("two-state");
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();

    inst.update(&mut ctx, DT);
    inst.output(&mut ctx, &mut pose, false);
    let handle = inst.output_handle().expect("root pose kept");
    assert_eq!(ctx.pose_pool.used(), 1);
    assert_eq!(ctx.pose_pool.get(handle), Some(&pose));

    inst.release_output(&mut ctx);
    assert!(inst.output_handle().is_none());
    assert_eq!(ctx.pose_pool.used(), 0);

    // the next update releases a held pose on its own
    inst.output(&mut ctx, &mut pose, false);
    assert_eq!(ctx.pose_pool.used(), 1);
    inst.update(&mut ctx, DT);
    assert_eq!(ctx.pose_pool.used(), 0);
}

#[test]
fn looping_motion_wraps_and_extracts_root_motion() {
    let mut inst = instance("pose-switch");
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();
    inst.set_int("choice", 1).unwrap();

    inst.update(&mut ctx, 0.5);
    inst.output(&mut ctx, &mut pose, true);
    assert_relative_eq!(inst.current_play_time("Walk").unwrap(), 0.5, epsilon = 1e-5);
    assert_relative_eq!(inst.trajectory_delta().translation[2], 0.5, epsilon = 1e-5);
    // extracted motion is removed from the root joint
    assert_relative_eq!(pose.transforms[0].translation[2], 0.0, epsilon = 1e-6);

    inst.update(&mut ctx, 0.6);
    assert_relative_eq!(inst.current_play_time("Walk").unwrap(), 0.1, epsilon = 1e-5);
    // 0.5 -> 1.0 plus 0.0 -> 0.1
    assert_relative_eq!(inst.trajectory_delta().translation[2], 0.6, epsilon = 1e-5);
    assert_relative_eq!(
        inst.trajectory_delta_mirrored().translation[2],
        0.6,
        epsilon = 1e-5
    );
    assert_relative_eq!(
        inst.character().world_transform.translation[2],
        1.1,
        epsilon = 1e-4
    );

    let steps: Vec<&str> = inst
        .event_buffer()
        .iter()
        .map(|e| e.parameters.as_str())
        .collect();
    assert_eq!(steps, vec!["right"]);
}

#[test]
fn update_longer_than_the_clip_keeps_the_wrapped_cycle() {
    let mut inst = instance("pose-switch");
    let mut ctx = EvalContext::new(0);
    inst.set_int("choice", 1).unwrap();

    inst.update(&mut ctx, 0.2);
    assert!(inst.event_buffer().is_empty());

    inst.update(&mut ctx, 1.0);
    assert_relative_eq!(inst.current_play_time("Walk").unwrap(), 0.2, epsilon = 1e-4);
    // 0.2 -> 1.0 plus 0.0 -> 0.2
    assert_relative_eq!(inst.trajectory_delta().translation[2], 1.0, epsilon = 1e-4);
    assert_relative_eq!(
        inst.character().world_transform.translation[2],
        1.2,
        epsilon = 1e-4
    );
    let steps: Vec<&str> = inst
        .event_buffer()
        .iter()
        .map(|e| e.parameters.as_str())
        .collect();
    assert_eq!(steps, vec!["left", "right"]);
}

#[test]
fn disabled_node_outputs_bind_pose_without_events_or_motion() {
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();

    let mut live = instance("pose-switch");
    live.update(&mut ctx, 0.6);
    live.output(&mut ctx, &mut pose, true);
    assert!(!pose.approx_eq(&bind_pose(), 1e-4));
    assert_eq!(live.event_buffer().len(), 1);

    let mut inst = instance("pose-switch");
    inst.set_node_disabled("Idle", true).unwrap();
    assert!(inst.is_node_disabled("Idle").unwrap());
    inst.update(&mut ctx, 0.6);
    inst.output(&mut ctx, &mut pose, true);

    assert!(pose.approx_eq(&bind_pose(), 1e-6));
    assert!(inst.event_buffer().is_empty());
    assert!(inst.trajectory_delta().is_identity(1e-6));
    assert_eq!(inst.current_play_time("Idle").unwrap(), 0.0);
    assert_eq!(ctx.pose_pool.used(), 0);
    assert_eq!(ctx.ref_data_pool.used(), 0);

    // value nodes cannot be disabled; the request is ignored
    inst.set_node_disabled("Choice", true).unwrap();
    assert!(!inst.is_node_disabled("Choice").unwrap());
}

#[test]
fn handlers_receive_weighted_events_until_removed() {
    let mut inst = instance("pose-switch");
    let mut ctx = EvalContext::new(0);
    let recorder = Recorder::default();
    let id = inst.add_event_handler(Box::new(recorder.clone()));
    inst.set_int("choice", 1).unwrap();

    inst.update(&mut ctx, 0.5);
    assert_eq!(recorder.take(), vec!["event footstep left"]);
    {
        let events = recorder.events.lock();
        assert_eq!(events[0].emitter, inst.graph().find_node("Walk").unwrap());
        assert_relative_eq!(events[0].global_weight, 1.0);
        assert_relative_eq!(events[0].local_weight, 1.0);
    }

    assert!(inst.remove_event_handler(id));
    assert!(!inst.remove_event_handler(id));
    inst.update(&mut ctx, 0.5);
    assert!(recorder.take().is_empty());
    assert_eq!(inst.event_buffer().len(), 1);
}

#[test]
fn dispatch_is_capped_per_update() {
    let config = Config {
        max_events_per_tick: 1,
        ..seeded()
    };
    let mut inst = instance_with(graph("pose-switch"), config);
    let mut ctx = EvalContext::new(0);
    let recorder = Recorder::default();
    inst.add_event_handler(Box::new(recorder.clone()));
    inst.set_int("choice", 1).unwrap();

    inst.update(&mut ctx, 0.9);
    assert_eq!(inst.event_buffer().len(), 2);
    assert_eq!(recorder.take(), vec!["event footstep left"]);
}

#[test]
fn parameters_are_typed_and_clamped() {
    let mut inst = instance("locomotion");

    assert_eq!(
        inst.set_bool("speed", true),
        Err(GraphError::ParameterTypeMismatch {
            expected: "float".into(),
            actual: "bool".into(),
        })
    );
    assert_eq!(
        inst.set_float("missing", 1.0),
        Err(GraphError::ParameterNotFound {
            name: "missing".into()
        })
    );

    inst.set_float("speed", 5.0).unwrap();
    assert_eq!(inst.float("speed").unwrap(), 1.0);
    assert_eq!(inst.float("grounded").unwrap(), 1.0);

    let speed = inst.find_parameter_index("speed").unwrap();
    inst.reinit_parameter_value(speed).unwrap();
    assert_eq!(inst.parameter_value(speed).unwrap(), Attribute::Float(0.0));

    inst.set_bool("grounded", false).unwrap();
    inst.reinit_parameter_values();
    assert_eq!(
        inst.parameter_value_by_name("grounded").unwrap(),
        Attribute::Bool(true)
    );
}

#[test]
fn parameter_slots_can_be_removed_and_added_back() {
    let mut inst = instance("locomotion");
    inst.set_float("speed", 0.7).unwrap();
    inst.set_bool("grounded", false).unwrap();
    let speed = inst.find_parameter_index("speed").unwrap();
    let grounded = inst.find_parameter_index("grounded").unwrap();

    assert_eq!(inst.remove_parameter_value(speed), Ok(Attribute::Float(0.7)));
    assert_eq!(
        inst.parameter_value(grounded),
        Err(GraphError::ParameterIndexOutOfRange { index: 1, count: 1 })
    );

    inst.add_parameter_value(speed).unwrap();
    assert_eq!(inst.parameter_value(speed).unwrap(), Attribute::Float(0.0));
    assert_eq!(inst.parameter_value(grounded).unwrap(), Attribute::Bool(false));

    // already one value per graph parameter
    assert_eq!(
        inst.add_parameter_value(speed),
        Err(GraphError::ParameterIndexOutOfRange { index: 2, count: 2 })
    );
    assert!(inst.add_parameter_value(ParameterIndex(5)).is_err());
    assert_eq!(
        inst.remove_parameter_value(ParameterIndex(9)),
        Err(GraphError::ParameterIndexOutOfRange { index: 9, count: 2 })
    );
}

#[test]
fn set_graph_keeps_matching_parameters() {
    let mut inst = instance("locomotion");
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();
    inst.set_float("speed", 0.7).unwrap();
    inst.set_bool("grounded", false).unwrap();
    inst.update(&mut ctx, DT);
    inst.output(&mut ctx, &mut pose, true);

    let mut builder = GraphBuilder::new("resync");
    builder
        .add_parameter(ValueParameter::new("speed", ParameterKind::float(0.0)))
        .unwrap();
    builder
        .add_parameter(ValueParameter::new(
            "grounded",
            ParameterKind::Int { default: 3 },
        ))
        .unwrap();
    builder
        .add_node("Idle", NodeKind::Motion(MotionNodeDef::with_motion("idle")))
        .unwrap();
    inst.set_graph(Arc::new(builder.build().unwrap()));

    assert_eq!(
        inst.parameter_value_by_name("speed").unwrap(),
        Attribute::Float(0.7)
    );
    // same name, different type: back to the new default
    assert_eq!(
        inst.parameter_value_by_name("grounded").unwrap(),
        Attribute::Int(3)
    );

    inst.update(&mut ctx, 0.25);
    inst.output(&mut ctx, &mut pose, true);
    assert_relative_eq!(inst.current_play_time("Idle").unwrap(), 0.25, epsilon = 1e-5);
    assert_eq!(ctx.pose_pool.used(), 0);
    assert_eq!(ctx.ref_data_pool.used(), 0);
}

#[test]
fn rewind_node_restarts_playback() {
    let mut inst = instance("pose-switch");
    let mut ctx = EvalContext::new(0);
    inst.update(&mut ctx, 0.4);
    assert_relative_eq!(inst.current_play_time("Idle").unwrap(), 0.4, epsilon = 1e-5);

    inst.rewind_node("Switch").unwrap();
    inst.update(&mut ctx, 0.1);
    assert_relative_eq!(inst.current_play_time("Idle").unwrap(), 0.1, epsilon = 1e-5);
}

#[test]
fn unresolved_motion_falls_back_to_bind_pose() {
    let mut builder = GraphBuilder::new("missing-clip");
    builder
        .add_node("Ghost", NodeKind::Motion(MotionNodeDef::with_motion("nope")))
        .unwrap();
    let mut inst = instance_with(Arc::new(builder.build().unwrap()), seeded());
    let mut ctx = EvalContext::new(0);
    let mut pose = Pose::default();

    inst.update(&mut ctx, 0.5);
    inst.output(&mut ctx, &mut pose, true);
    assert!(pose.approx_eq(&bind_pose(), 1e-6));
    assert!(inst.node_has_error("Ghost").unwrap());
    assert_eq!(inst.current_play_time("Ghost").unwrap(), 0.0);
}

#[test]
fn lanes_evaluate_instances_in_parallel() {
    const LANES: usize = 4;
    const PER_LANE: usize = 3;
    let shared = graph("locomotion");

    let make = || {
        (0..LANES * PER_LANE)
            .map(|i| {
                let mut inst = instance_with(Arc::clone(&shared), seeded());
                inst.set_float("speed", i as f32 / (LANES * PER_LANE) as f32)
                    .unwrap();
                inst
            })
            .collect::<Vec<_>>()
    };

    let run = |instances: &mut [blendgraph_core::GraphInstance], ctx: &mut EvalContext| {
        let mut pose = Pose::default();
        for _ in 0..90 {
            for inst in instances.iter_mut() {
                inst.update(ctx, DT);
                inst.output(ctx, &mut pose, true);
            }
        }
        assert_eq!(ctx.pose_pool.used(), 0);
        assert_eq!(ctx.ref_data_pool.used(), 0);
    };

    let mut sequential = make();
    run(&mut sequential, &mut EvalContext::new(0));

    let mut parallel = make();
    std::thread::scope(|scope| {
        for (lane, chunk) in parallel.chunks_mut(PER_LANE).enumerate() {
            let run = &run;
            scope.spawn(move || {
                let mut ctx = EvalContext::new(lane);
                run(chunk, &mut ctx);
            });
        }
    });

    for (a, b) in sequential.iter().zip(&parallel) {
        let (ta, tb) = (
            a.character().world_transform.translation,
            b.character().world_transform.translation,
        );
        for axis in 0..3 {
            assert_relative_eq!(ta[axis], tb[axis], epsilon = 1e-6);
        }
    }
    // the fastest instance actually moved
    assert!(parallel[LANES * PER_LANE - 1].character().world_transform.translation[2] > 0.5);
}
