//! Graphics capability surface
//!
//! Scenes never touch a graphics API directly. They create resources, bind
//! uniforms, issue draws and dispose resources through [`GraphicsDevice`].
//! Two backends exist: [`WgpuDevice`] for real windows and
//! [`RecordingDevice`] which keeps a ledger of live resources and every
//! call made, used headless and by the test suite.

mod recording;
mod wgpu_device;

pub use recording::{DeviceCall, Ledger, RecordingDevice};
pub use wgpu_device::WgpuDevice;

use glam::{Mat4, Vec3};

use crate::error::RenderError;

/// Kind of GPU object behind a [`ResourceId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Geometry,
    Material,
    Texture,
    Cubemap,
    RenderTarget,
    Uniform,
}

/// Opaque handle to a GPU object owned by one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    kind: ResourceKind,
    raw: u32,
}

impl ResourceId {
    pub const fn new(kind: ResourceKind, raw: u32) -> Self {
        Self { kind, raw }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }
}

/// Triangle mesh ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl GeometryData {
    /// Unit quad in the XZ plane facing +Y, centered at origin
    pub fn plane(width: f32, depth: f32) -> Self {
        let (hw, hd) = (width * 0.5, depth * 0.5);
        Self {
            positions: vec![[-hw, 0.0, -hd], [hw, 0.0, -hd], [hw, 0.0, hd], [-hw, 0.0, hd]],
            normals: vec![[0.0, 1.0, 0.0]; 4],
            uvs: vec![[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]],
            indices: vec![0, 2, 1, 0, 3, 2],
        }
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// Decoded RGBA8 image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    /// Single opaque pixel
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: color.to_vec(),
        }
    }
}

/// Six square cubemap faces (+X, -X, +Y, -Y, +Z, -Z) plus the
/// pre-filtered irradiance as 9 spherical harmonic coefficients
#[derive(Debug, Clone)]
pub struct EnvironmentUpload<'a> {
    pub size: u32,
    pub faces: [&'a [u8]; 6],
    pub irradiance: [[f32; 3]; 9],
}

/// Maximum directional lights the shading model evaluates
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

/// One directional light as laid out in the lights uniform
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLightUniform {
    pub direction: [f32; 4],
    pub color: [f32; 4],
}

/// Lights uniform buffer data for GPU
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightsUniform {
    pub ambient: [f32; 4],
    pub directional: [DirectionalLightUniform; MAX_DIRECTIONAL_LIGHTS],
    pub count: [u32; 4],
}

/// Offscreen color + depth buffer description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub width: u32,
    pub height: u32,
}

impl RenderTargetDesc {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
}

/// Parameters of the single fixed shading model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    pub env_intensity: f32,
    pub map: Option<ResourceId>,
    pub alpha_map: Option<ResourceId>,
    pub transparent: bool,
    pub unlit: bool,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0; 3],
            roughness: 0.5,
            metalness: 0.0,
            opacity: 1.0,
            env_intensity: 1.0,
            map: None,
            alpha_map: None,
            transparent: false,
            unlit: false,
        }
    }
}

/// Where a pass writes its pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Surface,
    RenderTarget(ResourceId),
}

/// What is drawn behind the geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Transparent,
    Color([f32; 4]),
    Texture(ResourceId),
}

/// Replacement shading applied to every item of a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialOverride {
    /// Inverted distance: near fragments opaque black, far transparent
    Depth { darkness: f32 },
}

/// Per-pass camera data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewUniforms {
    pub view_proj: Mat4,
    pub camera_position: Vec3,
    pub near: f32,
    pub far: f32,
}

/// One mesh draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub geometry: ResourceId,
    pub material: ResourceId,
    pub world: Mat4,
    pub transparent: bool,
}

/// Scene draw into the surface or a render target
#[derive(Debug, Clone, Copy)]
pub struct ScenePass<'a> {
    pub label: &'a str,
    pub target: Target,
    pub view: ViewUniforms,
    pub background: Background,
    pub lights: Option<ResourceId>,
    pub environment: Option<ResourceId>,
    pub material_override: Option<MaterialOverride>,
    pub items: &'a [DrawItem],
}

/// Axis of a separable blur pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl BlurDirection {
    pub fn axis(&self) -> [f32; 2] {
        match self {
            BlurDirection::Horizontal => [1.0, 0.0],
            BlurDirection::Vertical => [0.0, 1.0],
        }
    }
}

/// Shader run over a full-target quad
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FullscreenProgram {
    /// Separable blur; `texel_step` is in UV units (radius / resolution)
    Blur {
        direction: BlurDirection,
        texel_step: f32,
    },
}

/// Full-target quad sampling `source` and writing `target`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullscreenPass<'a> {
    pub label: &'a str,
    pub source: ResourceId,
    pub target: ResourceId,
    pub program: FullscreenProgram,
}

/// Renderer capability surface used by every scene
pub trait GraphicsDevice {
    /// Resize the presentation surface
    fn resize(&mut self, width: u32, height: u32);

    /// Current surface size in physical pixels
    fn size(&self) -> (u32, u32);

    fn create_render_target(&mut self, desc: RenderTargetDesc) -> ResourceId;

    fn upload_geometry(&mut self, geometry: &GeometryData) -> ResourceId;

    fn upload_texture(&mut self, image: &ImageData) -> ResourceId;

    fn upload_environment(&mut self, environment: &EnvironmentUpload<'_>) -> ResourceId;

    fn create_material(&mut self, params: &MaterialParams) -> ResourceId;

    fn update_material(&mut self, id: ResourceId, params: &MaterialParams);

    /// Create a uniform buffer with initial contents
    fn create_uniform(&mut self, label: &str, contents: &[u8]) -> ResourceId;

    fn draw_scene(&mut self, pass: &ScenePass<'_>) -> Result<(), RenderError>;

    fn draw_fullscreen(&mut self, pass: &FullscreenPass<'_>) -> Result<(), RenderError>;

    /// Present whatever was drawn to the surface this frame
    fn present(&mut self) -> Result<(), RenderError>;

    fn dispose(&mut self, id: ResourceId);

    /// Tear down the renderer itself; must be the last call on a device
    fn dispose_renderer(&mut self);

    /// Number of resources created and not yet disposed
    fn live_resources(&self) -> usize;
}
