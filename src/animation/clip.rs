use glam::{Quat, Vec3};

use crate::scene::{NodeKey, SceneGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
}

/// Keyframe values for one animated property
#[derive(Debug, Clone, PartialEq)]
pub enum Keyframes {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

impl Keyframes {
    pub fn len(&self) -> usize {
        match self {
            Keyframes::Translation(values) | Keyframes::Scale(values) => values.len(),
            Keyframes::Rotation(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keyframe track targeting one node
#[derive(Debug, Clone, PartialEq)]
pub struct Channel<T> {
    pub target: T,
    pub interpolation: Interpolation,
    pub times: Vec<f32>,
    pub keyframes: Keyframes,
}

impl<T> Channel<T> {
    /// Index of the key at or before `time` and blend factor to the next
    fn locate(&self, time: f32) -> (usize, usize, f32) {
        let last = self.times.len().min(self.keyframes.len()).saturating_sub(1);
        if last == 0 || time <= self.times[0] {
            return (0, 0, 0.0);
        }
        if time >= self.times[last] {
            return (last, last, 0.0);
        }

        let next = self.times.partition_point(|t| *t <= time).min(last);
        let prev = next - 1;
        let span = self.times[next] - self.times[prev];
        let t = if span > 0.0 {
            (time - self.times[prev]) / span
        } else {
            0.0
        };
        match self.interpolation {
            Interpolation::Linear => (prev, next, t),
            Interpolation::Step => (prev, prev, 0.0),
        }
    }

    fn apply(&self, time: f32, graph: &mut SceneGraph, node: NodeKey) {
        if self.times.is_empty() || self.keyframes.is_empty() {
            return;
        }
        let (a, b, t) = self.locate(time);
        let Some(node) = graph.node_mut(node) else {
            return;
        };

        match &self.keyframes {
            Keyframes::Translation(values) => {
                node.transform.translation = values[a].lerp(values[b], t);
            }
            Keyframes::Rotation(values) => {
                node.transform.rotation = values[a].slerp(values[b], t).normalize();
            }
            Keyframes::Scale(values) => {
                node.transform.scale = values[a].lerp(values[b], t);
            }
        }
    }
}

/// Named set of channels
///
/// `T` is how channels name their node: glTF node indices in a decoded
/// asset, [`NodeKey`]s once instantiated into a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip<T> {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<Channel<T>>,
}

impl<T> Clip<T> {
    /// Re-target every channel; channels whose target does not map are dropped
    pub fn bind<U>(&self, mut map: impl FnMut(&T) -> Option<U>) -> Clip<U> {
        let channels = self
            .channels
            .iter()
            .filter_map(|channel| {
                Some(Channel {
                    target: map(&channel.target)?,
                    interpolation: channel.interpolation,
                    times: channel.times.clone(),
                    keyframes: channel.keyframes.clone(),
                })
            })
            .collect();

        Clip {
            name: self.name.clone(),
            duration: self.duration,
            channels,
        }
    }
}

impl Clip<NodeKey> {
    /// Pose every target node at `time`
    pub fn sample(&self, time: f32, graph: &mut SceneGraph) {
        for channel in &self.channels {
            channel.apply(time, graph, channel.target);
        }
    }
}

#[derive(Debug, Clone)]
struct Action {
    clip: Clip<NodeKey>,
    time: f32,
    playing: bool,
}

/// Plays bound clips against a scene graph
#[derive(Debug, Clone)]
pub struct Mixer {
    actions: Vec<Action>,
    time_scale: f32,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            time_scale: 1.0,
        }
    }

    pub fn with_time_scale(mut self, time_scale: f32) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Add a clip and start playing it from the beginning
    pub fn play(&mut self, clip: Clip<NodeKey>) {
        log::debug!("playing clip {:?} ({:.2}s)", clip.name, clip.duration);
        self.actions.push(Action {
            clip,
            time: 0.0,
            playing: true,
        });
    }

    /// Stop every action, keeping the current pose
    pub fn stop_all(&mut self) {
        for action in &mut self.actions {
            action.playing = false;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.actions.iter().any(|action| action.playing)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Local time of the first action named `name`
    pub fn time_of(&self, name: &str) -> Option<f32> {
        self.actions
            .iter()
            .find(|action| action.clip.name == name)
            .map(|action| action.time)
    }

    /// Advance every playing action by `delta` scaled seconds, looping,
    /// and pose nodes
    pub fn update(&mut self, delta: f32, graph: &mut SceneGraph) {
        let step = delta * self.time_scale;
        for action in &mut self.actions {
            if !action.playing {
                continue;
            }

            action.time += step;
            let duration = action.clip.duration;
            if duration > 0.0 && action.time > duration {
                action.time %= duration;
            }
            action.clip.sample(action.time, graph);
        }
    }

    /// Pose nodes at each action's current time without advancing it
    pub fn pose(&self, graph: &mut SceneGraph) {
        for action in &self.actions {
            action.clip.sample(action.time, graph);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Node;

    fn spin_clip(target: NodeKey) -> Clip<NodeKey> {
        Clip {
            name: "Spin".to_string(),
            duration: 2.0,
            channels: vec![Channel {
                target,
                interpolation: Interpolation::Linear,
                times: vec![0.0, 2.0],
                keyframes: Keyframes::Translation(vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]),
            }],
        }
    }

    #[test]
    fn linear_channel_interpolates() {
        let mut graph = SceneGraph::new();
        let node = graph.add(Node::named("Globe"), None);

        spin_clip(node).sample(0.5, &mut graph);
        let x = graph.node(node).unwrap().transform.translation.x;
        assert!((x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn step_channel_holds_previous_key() {
        let mut graph = SceneGraph::new();
        let node = graph.add(Node::named("Globe"), None);
        let mut clip = spin_clip(node);
        clip.channels[0].interpolation = Interpolation::Step;

        clip.sample(1.9, &mut graph);
        assert_eq!(graph.node(node).unwrap().transform.translation.x, 0.0);
    }

    #[test]
    fn mixer_applies_time_scale_and_loops() {
        let mut graph = SceneGraph::new();
        let node = graph.add(Node::named("Globe"), None);
        let mut mixer = Mixer::new().with_time_scale(0.5);
        mixer.play(spin_clip(node));

        mixer.update(1.0, &mut graph);
        assert_eq!(mixer.time_of("Spin"), Some(0.5));

        mixer.update(4.0, &mut graph);
        assert_eq!(mixer.time_of("Spin"), Some(0.5));
        assert!(mixer.is_playing());
    }

    #[test]
    fn stopped_mixer_poses_without_advancing() {
        let mut graph = SceneGraph::new();
        let node = graph.add(Node::named("Globe"), None);
        graph.node_mut(node).unwrap().transform.translation.x = 7.0;
        let mut mixer = Mixer::new();
        mixer.play(spin_clip(node));
        mixer.stop_all();

        mixer.update(1.0, &mut graph);
        assert_eq!(graph.node(node).unwrap().transform.translation.x, 7.0);

        mixer.pose(&mut graph);
        assert_eq!(mixer.time_of("Spin"), Some(0.0));
        assert_eq!(graph.node(node).unwrap().transform.translation.x, 0.0);
        assert!(!mixer.is_playing());
    }

    #[test]
    fn channel_without_values_leaves_node_alone() {
        let mut graph = SceneGraph::new();
        let node = graph.add(Node::named("Globe"), None);
        graph.node_mut(node).unwrap().transform.translation.x = 3.0;
        let mut clip = spin_clip(node);
        clip.channels[0].keyframes = Keyframes::Translation(Vec::new());

        clip.sample(1.0, &mut graph);
        assert_eq!(graph.node(node).unwrap().transform.translation.x, 3.0);
    }

    #[test]
    fn bind_drops_unmapped_channels() {
        let clip: Clip<usize> = Clip {
            name: "Orbit".to_string(),
            duration: 1.0,
            channels: vec![
                Channel {
                    target: 0,
                    interpolation: Interpolation::Linear,
                    times: vec![0.0],
                    keyframes: Keyframes::Scale(vec![Vec3::ONE]),
                },
                Channel {
                    target: 7,
                    interpolation: Interpolation::Linear,
                    times: vec![0.0],
                    keyframes: Keyframes::Scale(vec![Vec3::ONE]),
                },
            ],
        };

        let bound = clip.bind(|index| (*index == 0).then_some("root"));
        assert_eq!(bound.channels.len(), 1);
        assert_eq!(bound.channels[0].target, "root");
    }
}
