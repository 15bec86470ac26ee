use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Buffer, RenderPipeline, Sampler, Surface, SurfaceConfiguration, Texture, TextureView};
use winit::window::Window;

use super::{
    Background, EnvironmentUpload, FullscreenPass, FullscreenProgram, GeometryData, GraphicsDevice,
    ImageData, LightsUniform, MaterialOverride, MaterialParams, RenderTargetDesc, ResourceId,
    ResourceKind, ScenePass, Target,
};
use crate::core::gpu_context::GpuContext;
use crate::error::RenderError;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
// Dynamic uniform offsets must honour the 256 byte alignment limit
const OBJECT_STRIDE: u64 = 256;
const INITIAL_OBJECT_CAPACITY: usize = 64;

const FLAG_MAP: u32 = 1;
const FLAG_ALPHA_MAP: u32 = 2;
const FLAG_UNLIT: u32 = 4;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

// === GPU Data Structures ===

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ViewUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    params: [f32; 4], // near, far, darkness, unused
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct EnvironmentUniform {
    sh: [[f32; 4]; 9],
    params: [f32; 4], // intensity, has_environment
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct MaterialUniform {
    base_color: [f32; 4],
    emissive_roughness: [f32; 4],
    params: [f32; 4], // metalness, opacity, env_intensity, flags
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BlurUniform {
    direction: [f32; 2],
    step: f32,
    _pad: f32,
}

// === Resources ===

struct GpuGeometry {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

struct GpuTexture {
    texture: Texture,
    view: TextureView,
}

struct GpuRenderTarget {
    color: Texture,
    color_view: TextureView,
    depth: Texture,
    depth_view: TextureView,
}

struct GpuEnvironment {
    texture: Texture,
    view: TextureView,
    uniform: Buffer,
}

struct GpuMaterial {
    uniform: Buffer,
    bind_group: BindGroup,
}

struct Layouts {
    frame: BindGroupLayout,
    material: BindGroupLayout,
    object: BindGroupLayout,
    fullscreen: BindGroupLayout,
    background: BindGroupLayout,
}

struct MeshPipelines {
    opaque: RenderPipeline,
    transparent: RenderPipeline,
}

struct Pipelines {
    surface: MeshPipelines,
    offscreen: MeshPipelines,
    depth_override: RenderPipeline,
    background: RenderPipeline,
    blur: RenderPipeline,
}

/// Placeholders bound when a slot has no resource
struct Fallbacks {
    white: GpuTexture,
    cube: GpuEnvironment,
    lights: Buffer,
}

/// [`GraphicsDevice`] backed by wgpu and a window surface
pub struct WgpuDevice {
    gpu: Arc<GpuContext>,
    surface: Option<Surface<'static>>,
    surface_config: SurfaceConfiguration,
    surface_depth: (Texture, TextureView),
    frame: Option<wgpu::SurfaceTexture>,
    layouts: Layouts,
    pipelines: Pipelines,
    sampler: Sampler,
    fallbacks: Fallbacks,
    view_buffer: Buffer,
    object_buffer: Buffer,
    object_capacity: usize,
    blur_buffer: Buffer,
    next_raw: u32,
    geometries: HashMap<ResourceId, GpuGeometry>,
    textures: HashMap<ResourceId, GpuTexture>,
    environments: HashMap<ResourceId, GpuEnvironment>,
    render_targets: HashMap<ResourceId, GpuRenderTarget>,
    materials: HashMap<ResourceId, GpuMaterial>,
    uniforms: HashMap<ResourceId, Buffer>,
    disposed: bool,
}

impl WgpuDevice {
    /// Create a device rendering into the window's surface
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY | wgpu::Backends::GL,
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;
        let gpu = Arc::new(GpuContext::for_surface(&instance, &surface).await?);

        let surface_config = gpu.surface_config(&surface, width, height)?;
        let surface_format = surface_config.format;
        surface.configure(gpu.device(), &surface_config);

        let device = gpu.device();
        let layouts = Self::create_layouts(device);
        let pipelines = Self::create_pipelines(device, &layouts, surface_format);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Scene Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let fallbacks = Fallbacks {
            white: Self::create_texture_2d(&gpu, &ImageData::solid([255; 4]), "Fallback White"),
            cube: Self::create_cube(&gpu, 1, [&[255u8; 4][..]; 6], &[[0.0; 3]; 9], false),
            lights: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Fallback Lights"),
                contents: bytemuck::bytes_of(&LightsUniform::default()),
                usage: wgpu::BufferUsages::UNIFORM,
            }),
        };

        let view_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("View Uniform"),
            size: std::mem::size_of::<ViewUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let object_buffer = Self::create_object_buffer(device, INITIAL_OBJECT_CAPACITY);
        let blur_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blur Uniform"),
            size: std::mem::size_of::<BlurUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let surface_depth = Self::create_depth(device, width, height, "Surface Depth");

        log::info!(
            "wgpu device ready: {}x{} {:?} on {}",
            width,
            height,
            surface_format,
            gpu.adapter().get_info().name
        );

        Ok(Self {
            gpu,
            surface: Some(surface),
            surface_config,
            surface_depth,
            frame: None,
            layouts,
            pipelines,
            sampler,
            fallbacks,
            view_buffer,
            object_buffer,
            object_capacity: INITIAL_OBJECT_CAPACITY,
            blur_buffer,
            next_raw: 0,
            geometries: HashMap::new(),
            textures: HashMap::new(),
            environments: HashMap::new(),
            render_targets: HashMap::new(),
            materials: HashMap::new(),
            uniforms: HashMap::new(),
            disposed: false,
        })
    }

    fn allocate(&mut self, kind: ResourceKind) -> ResourceId {
        if self.disposed {
            log::error!("{:?} requested from a disposed renderer", kind);
        }
        self.next_raw += 1;
        ResourceId::new(kind, self.next_raw)
    }

    fn ensure_alive(&self) -> std::result::Result<(), RenderError> {
        if self.disposed {
            Err(RenderError::Disposed)
        } else {
            Ok(())
        }
    }

    /// View of any sampleable resource
    fn sampled_view(&self, id: ResourceId) -> Option<&TextureView> {
        match id.kind() {
            ResourceKind::Texture => self.textures.get(&id).map(|t| &t.view),
            ResourceKind::RenderTarget => self.render_targets.get(&id).map(|rt| &rt.color_view),
            _ => None,
        }
    }

    fn material_bind_group(&self, params: &MaterialParams, uniform: &Buffer) -> BindGroup {
        let map = params.map.and_then(|id| self.sampled_view(id));
        let alpha_map = params.alpha_map.and_then(|id| self.sampled_view(id));

        let mut flags = 0;
        if map.is_some() {
            flags |= FLAG_MAP;
        }
        if alpha_map.is_some() {
            flags |= FLAG_ALPHA_MAP;
        }
        if params.unlit {
            flags |= FLAG_UNLIT;
        }

        let data = MaterialUniform {
            base_color: params.base_color,
            emissive_roughness: [
                params.emissive[0],
                params.emissive[1],
                params.emissive[2],
                params.roughness,
            ],
            params: [params.metalness, params.opacity, params.env_intensity, flags as f32],
        };
        self.gpu.queue().write_buffer(uniform, 0, bytemuck::bytes_of(&data));

        let white = &self.fallbacks.white.view;
        self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &self.layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(map.unwrap_or(white)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(alpha_map.unwrap_or(white)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn frame_bind_group(&self, lights: Option<ResourceId>, environment: Option<ResourceId>) -> BindGroup {
        let lights = lights
            .and_then(|id| self.uniforms.get(&id))
            .unwrap_or(&self.fallbacks.lights);
        let environment = environment
            .and_then(|id| self.environments.get(&id))
            .unwrap_or(&self.fallbacks.cube);

        self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &self.layouts.frame,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.view_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: environment.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&environment.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn fullscreen_bind_group(&self, layout: &BindGroupLayout, source: &TextureView, params: Option<&Buffer>) -> BindGroup {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(source),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        if let Some(buffer) = params {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: buffer.as_entire_binding(),
            });
        }

        self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fullscreen Bind Group"),
            layout,
            entries: &entries,
        })
    }

    fn ensure_object_capacity(&mut self, count: usize) {
        if count <= self.object_capacity {
            return;
        }
        let capacity = count.next_power_of_two();
        self.object_buffer.destroy();
        self.object_buffer = Self::create_object_buffer(self.gpu.device(), capacity);
        self.object_capacity = capacity;
        log::debug!("object buffer grown to {} slots", capacity);
    }

    fn acquire_frame(&mut self) -> std::result::Result<TextureView, RenderError> {
        if self.frame.is_none() {
            let surface = self.surface.as_ref().ok_or(RenderError::Disposed)?;
            self.frame = Some(surface.get_current_texture()?);
        }
        let frame = self.frame.as_ref().ok_or(RenderError::Disposed)?;
        Ok(frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default()))
    }

    // === Construction helpers ===

    fn create_texture_2d(gpu: &GpuContext, image: &ImageData, label: &str) -> GpuTexture {
        let size = wgpu::Extent3d {
            width: image.width.max(1),
            height: image.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        gpu.queue().write_texture(
            texture.as_image_copy(),
            &image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture { texture, view }
    }

    fn create_cube(
        gpu: &GpuContext,
        face_size: u32,
        faces: [&[u8]; 6],
        irradiance: &[[f32; 3]; 9],
        has_environment: bool,
    ) -> GpuEnvironment {
        let size = wgpu::Extent3d {
            width: face_size,
            height: face_size,
            depth_or_array_layers: 6,
        };
        let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("Environment Cubemap"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (layer, face) in faces.iter().enumerate() {
            gpu.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                face,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * face_size),
                    rows_per_image: Some(face_size),
                },
                wgpu::Extent3d {
                    width: face_size,
                    height: face_size,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Environment Cube View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let mut sh = [[0.0f32; 4]; 9];
        for (dst, src) in sh.iter_mut().zip(irradiance.iter()) {
            *dst = [src[0], src[1], src[2], 0.0];
        }
        let uniform = gpu
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Environment Uniform"),
                contents: bytemuck::bytes_of(&EnvironmentUniform {
                    sh,
                    params: [1.0, if has_environment { 1.0 } else { 0.0 }, 0.0, 0.0],
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        GpuEnvironment {
            texture,
            view,
            uniform,
        }
    }

    fn create_depth(device: &wgpu::Device, width: u32, height: u32, label: &str) -> (Texture, TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    fn create_object_buffer(device: &wgpu::Device, capacity: usize) -> Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Object Uniforms"),
            size: OBJECT_STRIDE * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_layouts(device: &wgpu::Device) -> Layouts {
        let uniform = |binding: u32, visibility: wgpu::ShaderStages, dynamic: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: dynamic,
                min_binding_size: None,
            },
            count: None,
        };
        let texture = |binding: u32, dimension: wgpu::TextureViewDimension| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        };
        let sampler = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let both = wgpu::ShaderStages::VERTEX_FRAGMENT;

        Layouts {
            frame: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Layout"),
                entries: &[
                    uniform(0, both, false),
                    uniform(1, wgpu::ShaderStages::FRAGMENT, false),
                    uniform(2, wgpu::ShaderStages::FRAGMENT, false),
                    texture(3, wgpu::TextureViewDimension::Cube),
                    sampler(4),
                ],
            }),
            material: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Material Layout"),
                entries: &[
                    uniform(0, wgpu::ShaderStages::FRAGMENT, false),
                    texture(1, wgpu::TextureViewDimension::D2),
                    texture(2, wgpu::TextureViewDimension::D2),
                    sampler(3),
                ],
            }),
            object: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Object Layout"),
                entries: &[uniform(0, wgpu::ShaderStages::VERTEX, true)],
            }),
            fullscreen: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Blur Layout"),
                entries: &[
                    texture(0, wgpu::TextureViewDimension::D2),
                    sampler(1),
                    uniform(2, wgpu::ShaderStages::FRAGMENT, false),
                ],
            }),
            background: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Background Layout"),
                entries: &[texture(0, wgpu::TextureViewDimension::D2), sampler(1)],
            }),
        }
    }

    fn create_pipelines(device: &wgpu::Device, layouts: &Layouts, surface_format: wgpu::TextureFormat) -> Pipelines {
        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/mesh.wgsl").into()),
        });
        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blur Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/blur.wgsl").into()),
        });
        let background_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Background Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/background.wgsl").into()),
        });

        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.material, &layouts.object],
            push_constant_ranges: &[],
        });
        let blur_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blur Pipeline Layout"),
            bind_group_layouts: &[&layouts.fullscreen],
            push_constant_ranges: &[],
        });
        let background_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Background Pipeline Layout"),
            bind_group_layouts: &[&layouts.background],
            push_constant_ranges: &[],
        });

        let mesh = |label: &str, format: wgpu::TextureFormat, entry: &str, blend: wgpu::BlendState, depth_write: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&mesh_layout),
                vertex: wgpu::VertexState {
                    module: &mesh_shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &VERTEX_ATTRIBUTES,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &mesh_shader,
                    entry_point: Some(entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: depth_write,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let fullscreen = |label: &str,
                          layout: &wgpu::PipelineLayout,
                          shader: &wgpu::ShaderModule,
                          format: wgpu::TextureFormat,
                          depth: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: depth.then(|| wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let alpha = wgpu::BlendState::ALPHA_BLENDING;
        Pipelines {
            surface: MeshPipelines {
                opaque: mesh("Mesh Opaque", surface_format, "fs_main", wgpu::BlendState::REPLACE, true),
                transparent: mesh("Mesh Transparent", surface_format, "fs_main", alpha, false),
            },
            offscreen: MeshPipelines {
                opaque: mesh("Offscreen Opaque", OFFSCREEN_FORMAT, "fs_main", wgpu::BlendState::REPLACE, true),
                transparent: mesh("Offscreen Transparent", OFFSCREEN_FORMAT, "fs_main", alpha, false),
            },
            depth_override: mesh("Depth Override", OFFSCREEN_FORMAT, "fs_depth", alpha, true),
            background: fullscreen("Background", &background_layout, &background_shader, surface_format, true),
            blur: fullscreen("Blur", &blur_layout, &blur_shader, OFFSCREEN_FORMAT, false),
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.disposed {
            return;
        }
        let Some(surface) = &self.surface else {
            return;
        };

        self.surface_config.width = width;
        self.surface_config.height = height;
        surface.configure(self.gpu.device(), &self.surface_config);

        self.surface_depth.0.destroy();
        self.surface_depth = Self::create_depth(self.gpu.device(), width, height, "Surface Depth");
    }

    fn size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn create_render_target(&mut self, desc: RenderTargetDesc) -> ResourceId {
        let id = self.allocate(ResourceKind::RenderTarget);
        let color = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("Render Target Color"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let (depth, depth_view) = Self::create_depth(self.gpu.device(), desc.width, desc.height, "Render Target Depth");

        self.render_targets.insert(
            id,
            GpuRenderTarget {
                color,
                color_view,
                depth,
                depth_view,
            },
        );
        id
    }

    fn upload_geometry(&mut self, geometry: &GeometryData) -> ResourceId {
        let id = self.allocate(ResourceKind::Geometry);
        let vertices: Vec<Vertex> = geometry
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| Vertex {
                position: *position,
                normal: geometry.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                uv: geometry.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
            })
            .collect();

        let indices: Vec<u32> = if geometry.indices.is_empty() {
            (0..vertices.len() as u32).collect()
        } else {
            geometry.indices.clone()
        };

        let device = self.gpu.device();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        self.geometries.insert(
            id,
            GpuGeometry {
                vertex_buffer,
                index_buffer,
                index_count: indices.len() as u32,
            },
        );
        id
    }

    fn upload_texture(&mut self, image: &ImageData) -> ResourceId {
        let id = self.allocate(ResourceKind::Texture);
        let texture = Self::create_texture_2d(&self.gpu, image, "Scene Texture");
        self.textures.insert(id, texture);
        id
    }

    fn upload_environment(&mut self, environment: &EnvironmentUpload<'_>) -> ResourceId {
        let id = self.allocate(ResourceKind::Cubemap);
        let cube = Self::create_cube(
            &self.gpu,
            environment.size,
            environment.faces,
            &environment.irradiance,
            true,
        );
        self.environments.insert(id, cube);
        id
    }

    fn create_material(&mut self, params: &MaterialParams) -> ResourceId {
        let id = self.allocate(ResourceKind::Material);
        let uniform = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("Material Uniform"),
            size: std::mem::size_of::<MaterialUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.material_bind_group(params, &uniform);
        self.materials.insert(id, GpuMaterial { uniform, bind_group });
        id
    }

    fn update_material(&mut self, id: ResourceId, params: &MaterialParams) {
        let Some(material) = self.materials.remove(&id) else {
            log::warn!("update of unknown material {:?}", id);
            return;
        };
        let bind_group = self.material_bind_group(params, &material.uniform);
        self.materials.insert(
            id,
            GpuMaterial {
                uniform: material.uniform,
                bind_group,
            },
        );
    }

    fn create_uniform(&mut self, label: &str, contents: &[u8]) -> ResourceId {
        let id = self.allocate(ResourceKind::Uniform);
        let buffer = self
            .gpu
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        self.uniforms.insert(id, buffer);
        id
    }

    fn draw_scene(&mut self, pass: &ScenePass<'_>) -> std::result::Result<(), RenderError> {
        self.ensure_alive()?;

        let darkness = match pass.material_override {
            Some(MaterialOverride::Depth { darkness }) => darkness,
            None => 0.0,
        };
        let view = ViewUniform {
            view_proj: pass.view.view_proj.to_cols_array_2d(),
            camera_position: pass.view.camera_position.extend(1.0).to_array(),
            params: [pass.view.near, pass.view.far, darkness, 0.0],
        };
        self.gpu.queue().write_buffer(&self.view_buffer, 0, bytemuck::bytes_of(&view));

        // Opaque first, then blended items in submission order
        let mut ordered: Vec<&super::DrawItem> = pass.items.iter().filter(|item| !item.transparent).collect();
        ordered.extend(pass.items.iter().filter(|item| item.transparent));

        self.ensure_object_capacity(ordered.len());
        for (slot, item) in ordered.iter().enumerate() {
            let data = ObjectUniform {
                model: item.world.to_cols_array_2d(),
                normal: item.world.inverse().transpose().to_cols_array_2d(),
            };
            self.gpu.queue().write_buffer(
                &self.object_buffer,
                slot as u64 * OBJECT_STRIDE,
                bytemuck::bytes_of(&data),
            );
        }

        let (color_view, depth_view, offscreen) = match pass.target {
            Target::Surface => (self.acquire_frame()?, self.surface_depth.1.clone(), false),
            Target::RenderTarget(id) => {
                let rt = self
                    .render_targets
                    .get(&id)
                    .ok_or(RenderError::UnknownResource(id))?;
                (rt.color_view.clone(), rt.depth_view.clone(), true)
            }
        };

        let frame_bind_group = self.frame_bind_group(pass.lights, pass.environment);
        let object_bind_group = self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object Bind Group"),
            layout: &self.layouts.object,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &self.object_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<ObjectUniform>() as u64),
                }),
            }],
        });
        let background_bind_group = match pass.background {
            Background::Texture(id) if !offscreen => self
                .sampled_view(id)
                .map(|view| self.fullscreen_bind_group(&self.layouts.background, view, None)),
            _ => None,
        };

        let clear = match pass.background {
            Background::Color([r, g, b, a]) => wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            },
            Background::Texture(_) => wgpu::Color::BLACK,
            Background::Transparent => wgpu::Color::TRANSPARENT,
        };

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(bind_group) = &background_bind_group {
                render_pass.set_pipeline(&self.pipelines.background);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }

            render_pass.set_bind_group(0, &frame_bind_group, &[]);

            let set = if offscreen {
                &self.pipelines.offscreen
            } else {
                &self.pipelines.surface
            };

            for (slot, item) in ordered.iter().enumerate() {
                let geometry = self
                    .geometries
                    .get(&item.geometry)
                    .ok_or(RenderError::UnknownResource(item.geometry))?;
                let material = self
                    .materials
                    .get(&item.material)
                    .ok_or(RenderError::UnknownResource(item.material))?;

                let pipeline = match (pass.material_override, item.transparent) {
                    (Some(_), _) if offscreen => &self.pipelines.depth_override,
                    (_, true) => &set.transparent,
                    (_, false) => &set.opaque,
                };

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(1, &material.bind_group, &[]);
                render_pass.set_bind_group(2, &object_bind_group, &[(slot as u64 * OBJECT_STRIDE) as u32]);
                render_pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                render_pass.set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..geometry.index_count, 0, 0..1);
            }
        }

        self.gpu.queue().submit(Some(encoder.finish()));
        Ok(())
    }

    fn draw_fullscreen(&mut self, pass: &FullscreenPass<'_>) -> std::result::Result<(), RenderError> {
        self.ensure_alive()?;

        let FullscreenProgram::Blur { direction, texel_step } = pass.program;
        let params = BlurUniform {
            direction: direction.axis(),
            step: texel_step,
            _pad: 0.0,
        };
        self.gpu.queue().write_buffer(&self.blur_buffer, 0, bytemuck::bytes_of(&params));

        let source = self
            .sampled_view(pass.source)
            .ok_or(RenderError::UnknownResource(pass.source))?;
        let bind_group = self.fullscreen_bind_group(&self.layouts.fullscreen, source, Some(&self.blur_buffer));
        let target = &self
            .render_targets
            .get(&pass.target)
            .ok_or(RenderError::UnknownResource(pass.target))?
            .color_view;

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipelines.blur);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1); // Fullscreen triangle
        }

        self.gpu.queue().submit(Some(encoder.finish()));
        Ok(())
    }

    fn present(&mut self) -> std::result::Result<(), RenderError> {
        self.ensure_alive()?;
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
        Ok(())
    }

    fn dispose(&mut self, id: ResourceId) {
        match id.kind() {
            ResourceKind::Geometry => {
                if let Some(geometry) = self.geometries.remove(&id) {
                    geometry.vertex_buffer.destroy();
                    geometry.index_buffer.destroy();
                }
            }
            ResourceKind::Texture => {
                if let Some(texture) = self.textures.remove(&id) {
                    texture.texture.destroy();
                }
            }
            ResourceKind::Cubemap => {
                if let Some(environment) = self.environments.remove(&id) {
                    environment.texture.destroy();
                    environment.uniform.destroy();
                }
            }
            ResourceKind::RenderTarget => {
                if let Some(target) = self.render_targets.remove(&id) {
                    target.color.destroy();
                    target.depth.destroy();
                }
            }
            ResourceKind::Material => {
                if let Some(material) = self.materials.remove(&id) {
                    material.uniform.destroy();
                }
            }
            ResourceKind::Uniform => {
                if let Some(buffer) = self.uniforms.remove(&id) {
                    buffer.destroy();
                }
            }
        }
    }

    fn dispose_renderer(&mut self) {
        if self.disposed {
            return;
        }
        let leaked = self.live_resources();
        if leaked > 0 {
            log::warn!("renderer disposed with {} live resources", leaked);
        }

        let ids: Vec<ResourceId> = self
            .geometries
            .keys()
            .chain(self.textures.keys())
            .chain(self.environments.keys())
            .chain(self.render_targets.keys())
            .chain(self.materials.keys())
            .chain(self.uniforms.keys())
            .copied()
            .collect();
        for id in ids {
            self.dispose(id);
        }

        self.frame = None;
        self.surface_depth.0.destroy();
        self.object_buffer.destroy();
        self.view_buffer.destroy();
        self.blur_buffer.destroy();
        self.surface = None;
        self.disposed = true;
        log::info!("renderer disposed");
    }

    fn live_resources(&self) -> usize {
        self.geometries.len()
            + self.textures.len()
            + self.environments.len()
            + self.render_targets.len()
            + self.materials.len()
            + self.uniforms.len()
    }
}
