//! Arena scene graph, cameras and lights

pub mod camera;
pub mod graph;
pub mod light;
pub mod transform;

pub use camera::{Camera, CameraConfig, Projection};
pub use graph::{Material, MaterialKey, Mesh, Node, NodeKey, SceneGraph};
pub use light::{DirectionalLight, LightRig};
pub use transform::Transform;
