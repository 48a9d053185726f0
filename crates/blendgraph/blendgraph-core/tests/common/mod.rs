#![allow(dead_code)]

use std::sync::Arc;

use blendgraph_core::{
    Character, Config, EventInfo, Graph, GraphDocument, GraphEventHandler, GraphInstance, Motion,
    MotionSet, MotionSetId, Pose, Skeleton,
};
use parking_lot::Mutex;

pub fn skeleton() -> Arc<Skeleton> {
    Arc::new(blendgraph_test_fixtures::skeletons::load("biped-min").expect("load biped-min skeleton"))
}

pub fn motion_set() -> Arc<MotionSet> {
    let mut set = MotionSet::new(MotionSetId(1), "fixtures");
    for id in blendgraph_test_fixtures::motions::keys() {
        let motion: Motion =
            blendgraph_test_fixtures::motions::load(&id).expect("load motion fixture");
        set.add_motion(id, motion);
    }
    Arc::new(set)
}

pub fn graph(name: &str) -> Arc<Graph> {
    let json = blendgraph_test_fixtures::graphs::json(name).expect("load graph fixture");
    let doc = GraphDocument::from_json_str(&json).expect("parse graph document");
    Arc::new(doc.to_graph().expect("build graph"))
}

pub fn seeded() -> Config {
    Config {
        random_seed: Some(7),
        editor_mode: true,
        ..Config::default()
    }
}

pub fn instance(name: &str) -> GraphInstance {
    instance_with(graph(name), seeded())
}

pub fn instance_with(graph: Arc<Graph>, config: Config) -> GraphInstance {
    let mut inst = GraphInstance::new(graph, Character::new(skeleton()), config);
    inst.set_motion_set(motion_set());
    inst
}

pub fn bind_pose() -> Pose {
    let mut pose = Pose::default();
    pose.init_from_bind_pose(&skeleton());
    pose
}

/// Handler that records everything it hears as short strings.
#[derive(Clone, Default)]
pub struct Recorder {
    pub log: Arc<Mutex<Vec<String>>>,
    pub events: Arc<Mutex<Vec<EventInfo>>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }
}

impl GraphEventHandler for Recorder {
    fn on_event(&mut self, event: &EventInfo) {
        self.log
            .lock()
            .push(format!("event {} {}", event.event_type, event.parameters));
        self.events.lock().push(event.clone());
    }

    fn on_state_enter(&mut self, machine: &str, state: &str) {
        self.log.lock().push(format!("enter {machine}/{state}"));
    }

    fn on_state_entering(&mut self, machine: &str, state: &str) {
        self.log.lock().push(format!("entering {machine}/{state}"));
    }

    fn on_state_exit(&mut self, machine: &str, state: &str) {
        self.log.lock().push(format!("exit {machine}/{state}"));
    }

    fn on_state_end(&mut self, machine: &str, state: &str) {
        self.log.lock().push(format!("end {machine}/{state}"));
    }

    fn on_start_transition(&mut self, machine: &str, source: Option<&str>, target: &str) {
        self.log.lock().push(format!(
            "start {machine}: {} -> {target}",
            source.unwrap_or("*")
        ));
    }

    fn on_end_transition(&mut self, machine: &str, source: Option<&str>, target: &str) {
        self.log.lock().push(format!(
            "finish {machine}: {} -> {target}",
            source.unwrap_or("*")
        ));
    }
}
