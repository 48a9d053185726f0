mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use blendgraph_core::graph::document::{NodeSettings, GRAPH_DOCUMENT_VERSION};
use blendgraph_core::{
    EvalContext, GraphBuilder, GraphDocument, GraphError, IndexMode, MotionNodeDef, NodeKind,
    ParameterKind, ParameterNodeDef, PortKind, ValueParameter, WeightedMotionList,
};
use common::{instance_with, seeded};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn every_graph_fixture_builds() {
    for name in blendgraph_test_fixtures::graphs::keys() {
        let json = blendgraph_test_fixtures::graphs::json(&name).unwrap();
        let doc = GraphDocument::from_json_str(&json)
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        doc.to_graph().unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[test]
fn legacy_fixture_is_migrated_on_load() {
    let json = blendgraph_test_fixtures::graphs::json("legacy-v1").unwrap();
    let doc = GraphDocument::from_json_str(&json).unwrap();
    assert_eq!(doc.version, GRAPH_DOCUMENT_VERSION);

    let NodeSettings::Motion(def) = &doc.nodes[0].settings else {
        panic!("expected a motion node, got {:?}", doc.nodes[0].settings);
    };
    assert_eq!(
        def.motion_ids.entries(),
        &[("idle".to_string(), 1.0), ("walk".to_string(), 2.0)]
    );
    assert!(def.loop_motion);

    let graph = Arc::new(doc.to_graph().unwrap());
    let mut inst = instance_with(graph, seeded());
    let mut ctx = EvalContext::new(0);
    inst.update(&mut ctx, 0.3);
    assert_relative_eq!(inst.current_play_time("Idle").unwrap(), 0.3, epsilon = 1e-5);
}

#[test]
fn documents_survive_a_json_round_trip() {
    let json = blendgraph_test_fixtures::graphs::json("locomotion").unwrap();
    let doc = GraphDocument::from_json_str(&json).unwrap();
    let again = GraphDocument::from_json_str(&doc.to_json_string().unwrap()).unwrap();
    assert_eq!(doc, again);
}

#[test]
fn builder_rejects_bad_wiring() {
    let mut b = GraphBuilder::new("bad");
    let speed = b
        .add_parameter(ValueParameter::new("speed", ParameterKind::float(0.0)))
        .unwrap();
    assert_eq!(speed.index(), 0);
    assert_eq!(
        b.add_parameter(ValueParameter::new("speed", ParameterKind::float(1.0))),
        Err(GraphError::DuplicateParameter {
            name: "speed".into()
        })
    );

    let walk = b
        .add_node("Walk", NodeKind::Motion(MotionNodeDef::with_motion("walk")))
        .unwrap();
    let param = b
        .add_node("Speed", NodeKind::Parameter(ParameterNodeDef::new("speed")))
        .unwrap();
    assert!(matches!(
        b.add_node("Walk", NodeKind::PoseSwitch),
        Err(GraphError::DuplicateNode { .. })
    ));
    assert!(matches!(
        b.add_child(walk, "Inner", NodeKind::PoseSwitch),
        Err(GraphError::InvalidNode { .. })
    ));
    assert!(matches!(
        b.connect(param, 0, walk, 7),
        Err(GraphError::InvalidConnection { .. })
    ));

    // a number into a pose port fails when the graph is built
    let blend = b.add_node("Blend", NodeKind::BlendTwo(Default::default())).unwrap();
    b.connect(param, 0, blend, 0).unwrap();
    assert!(matches!(
        b.build(),
        Err(GraphError::InvalidConnection { .. })
    ));
}

#[test]
fn parameter_nodes_expose_their_type() {
    let graph = common::graph("pose-switch");
    let choice = graph.find_node("Choice").unwrap();
    let node = graph.node(choice);
    assert_eq!(node.outputs.len(), 1);
    assert_eq!(node.outputs[0].kind, PortKind::Number);
    assert_eq!(graph.root(), graph.find_node("Switch").unwrap());
}

#[test]
fn weighted_selection_follows_the_weights() {
    let list = WeightedMotionList::from_ids(["idle_a", "idle_b"]);
    let mut rng = StdRng::seed_from_u64(11);
    let draws = 10_000;
    let first = (0..draws)
        .filter(|_| list.pick(IndexMode::Randomize, None, &mut rng) == Some(0))
        .count();
    let share = first as f32 / draws as f32;
    assert!((0.47..0.53).contains(&share), "share {share}");
}

#[test]
fn no_repeat_selection_never_repeats() {
    let mut list = WeightedMotionList::new();
    list.add_motion("a", 1.0);
    list.add_motion("b", 0.5);
    list.add_motion("c", 2.5);
    let mut rng = StdRng::seed_from_u64(5);

    let mut previous = None;
    let mut seen = [0usize; 3];
    for _ in 0..1000 {
        let next = list
            .pick(IndexMode::RandomizeNoRepeat, previous, &mut rng)
            .unwrap();
        assert_ne!(Some(next), previous);
        seen[next] += 1;
        previous = Some(next);
    }
    assert!(seen.iter().all(|&n| n > 0), "{seen:?}");
}
