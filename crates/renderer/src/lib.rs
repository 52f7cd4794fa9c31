//! Renderer: wgpu surface/device setup, the model pipeline, and the
//! per-frame draw path (model batches + egui overlay).
//! wgpu = 23.x, winit = 0.30.x.

pub mod model;

use std::num::NonZeroU64;
use std::sync::Arc;

use asset::material::TextureRole;
use asset::model::ModelData;
use asset::texture::TextureData;
use bytemuck::{Pod, Zeroable};
use corelib::camera::Camera;
use corelib::transform::Transform;
use glam::Mat4;
use wgpu::{
    util::DeviceExt, BindGroup, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingType, BlendState, Buffer, BufferBindingType, BufferUsages, ColorTargetState,
    ColorWrites, CommandEncoderDescriptor, DepthBiasState, DepthStencilState, Device,
    DeviceDescriptor, Extent3d, Features, FragmentState, Instance, InstanceDescriptor, Limits,
    LoadOp, Operations, PipelineLayoutDescriptor, PowerPreference, PresentMode, Queue,
    RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor,
    ShaderModuleDescriptor, ShaderSource, ShaderStages, StoreOp, Surface, SurfaceConfiguration,
    SurfaceError, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView,
    TextureViewDescriptor, VertexBufferLayout, VertexState, VertexStepMode,
};
use winit::{dpi::PhysicalSize, window::Window};

pub use model::{GpuModel, GpuTexture, SceneModel};

/// Vertex layout matching `asset::mesh::MeshVertex`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub const LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![
            0 => Float32x3, 1 => Float32x3, 2 => Float32x2, 3 => Float32x3
        ],
    };
}

impl From<&asset::mesh::MeshVertex> for Vertex {
    fn from(v: &asset::mesh::MeshVertex) -> Self {
        Self {
            position: v.position,
            normal: v.normal,
            uv: v.uv,
            color: v.color,
        }
    }
}

/// Per-frame scene uniforms (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SceneUniform {
    view_proj: [[f32; 4]; 4],
    object: [[f32; 4]; 4],
    cam_pos: [f32; 4],
    light_pos: [f32; 4],
    light_color: [f32; 4],
}

/// Per-batch uniform: the resolved world transform from flattening.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct BatchUniform {
    pub model: [[f32; 4]; 4],
}

const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Remap OpenGL-style clip z in [-1,1] to wgpu's [0,1].
pub const OPENGL_TO_WGPU: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.0, 0.0, 0.5, 1.0,
]);

/// Tessellated egui output for one frame.
pub struct EguiFrame {
    pub primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
}

pub struct GpuState {
    surface: Surface<'static>,
    surface_format: TextureFormat,
    surface_config: SurfaceConfiguration,

    device: Device,
    queue: Queue,

    pipeline: RenderPipeline,
    scene_buf: Buffer,
    scene_bg: BindGroup,
    model_bgl: BindGroupLayout,
    texture_bgl: BindGroupLayout,

    /// The single 1x1 magenta fallback, created once at init and passed
    /// by reference into every batch's bind step.
    fallback_texture: GpuTexture,

    depth_view: TextureView,
    egui_renderer: egui_wgpu::Renderer,

    width: u32,
    height: u32,
}

impl GpuState {
    /// Create GPU state bound to an Arc<Window>.
    pub async fn new(window: Arc<Window>, backends: wgpu::Backends) -> Self {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        let instance = Instance::new(InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window.clone())
            .expect("create_surface failed");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("No suitable GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("Veles3D Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .expect("request_device failed");

        // Surface format (prefer sRGB)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let depth_view = create_depth_view(&device, &surface_config);

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Model WGSL"),
            source: ShaderSource::Wgsl(include_str!("shaders/model.wgsl").into()),
        });

        let scene_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Scene BGL"),
            entries: &[uniform_entry::<SceneUniform>(0, ShaderStages::VERTEX_FRAGMENT)],
        });
        let model_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Batch BGL"),
            entries: &[uniform_entry::<BatchUniform>(0, ShaderStages::VERTEX)],
        });
        let texture_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Texture BGL"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let scene_init = SceneUniform {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            object: Mat4::IDENTITY.to_cols_array_2d(),
            cam_pos: [0.0; 4],
            light_pos: [0.5, 0.5, 0.5, 1.0],
            light_color: [1.0, 1.0, 1.0, 1.0],
        };
        let scene_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene UBO"),
            contents: bytemuck::bytes_of(&scene_init),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let scene_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene BG"),
            layout: &scene_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene_buf.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Model PipelineLayout"),
            bind_group_layouts: &[&scene_bgl, &model_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Model Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: Some(BlendState::REPLACE),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let fallback_texture = GpuTexture::upload(
            &device,
            &queue,
            &texture_bgl,
            &TextureData::fallback_magenta(),
            TextureRole::Diffuse,
            0,
            "Fallback Magenta",
        );

        let egui_renderer =
            egui_wgpu::Renderer::new(&device, surface_format, Some(DEPTH_FORMAT), 1, false);

        Self {
            surface,
            surface_format,
            surface_config,
            device,
            queue,
            pipeline,
            scene_buf,
            scene_bg,
            model_bgl,
            texture_bgl,
            fallback_texture,
            depth_view,
            egui_renderer,
            width,
            height,
        }
    }

    pub fn surface_format(&self) -> TextureFormat {
        self.surface_format
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Upload a fully loaded CPU model; the caller swaps it in only
    /// after this returns (load-then-swap, never load-in-place).
    pub fn upload_model(&self, data: &ModelData) -> GpuModel {
        GpuModel::upload(
            &self.device,
            &self.queue,
            &self.model_bgl,
            &self.texture_bgl,
            data,
        )
    }

    /// Resize: reconfigure surface & recreate depth view.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.surface_config.width = self.width;
        self.surface_config.height = self.height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
    }

    /// Render one frame: scene uniforms, model batches in emission
    /// order, then the egui overlay.
    pub fn render(
        &mut self,
        scene: &SceneModel,
        camera: &Camera,
        object: &Transform,
        egui_frame: Option<EguiFrame>,
    ) -> Result<(), SurfaceError> {
        let view_proj = OPENGL_TO_WGPU * camera.proj_view();
        let eye = camera.position();
        let uniform = SceneUniform {
            view_proj: view_proj.to_cols_array_2d(),
            object: object.matrix().to_cols_array_2d(),
            cam_pos: [eye.x, eye.y, eye.z, 1.0],
            light_pos: [0.5, 0.5, 0.5, 1.0],
            light_color: [1.0, 1.0, 1.0, 1.0],
        };
        self.queue
            .write_buffer(&self.scene_buf, 0, bytemuck::bytes_of(&uniform));

        let frame = self.surface.get_current_texture()?;
        let target = frame.texture.create_view(&Default::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });

        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.width, self.height],
            pixels_per_point: egui_frame.as_ref().map(|f| f.pixels_per_point).unwrap_or(1.0),
        };
        if let Some(frame) = &egui_frame {
            for (id, delta) in &frame.textures_delta.set {
                self.egui_renderer
                    .update_texture(&self.device, &self.queue, *id, delta);
            }
            self.egui_renderer.update_buffers(
                &self.device,
                &self.queue,
                &mut encoder,
                &frame.primitives,
                &screen,
            );
        }

        {
            let mut rpass = encoder
                .begin_render_pass(&RenderPassDescriptor {
                    label: Some("MainPass"),
                    color_attachments: &[Some(RenderPassColorAttachment {
                        view: &target,
                        resolve_target: None,
                        ops: Operations {
                            load: LoadOp::Clear(wgpu::Color {
                                r: 0.07,
                                g: 0.13,
                                b: 0.17,
                                a: 1.0,
                            }),
                            store: StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: &self.depth_view,
                        depth_ops: Some(Operations {
                            load: LoadOp::Clear(1.0),
                            store: StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    occlusion_query_set: None,
                    timestamp_writes: None,
                })
                .forget_lifetime();

            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &self.scene_bg, &[]);
            scene.draw(&mut rpass, &self.fallback_texture);

            if let Some(frame) = &egui_frame {
                self.egui_renderer.render(&mut rpass, &frame.primitives, &screen);
            }
        }

        if let Some(frame) = &egui_frame {
            for id in &frame.textures_delta.free {
                self.egui_renderer.free_texture(id);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    pub fn is_surface_lost(err: &SurfaceError) -> bool {
        matches!(err, SurfaceError::Lost | SurfaceError::Outdated)
    }

    pub fn recreate_surface(&mut self) {
        self.resize(self.width, self.height);
    }
}

fn uniform_entry<T>(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(std::mem::size_of::<T>() as u64),
        },
        count: None,
    }
}

/// Create a depth texture view matching the surface config.
fn create_depth_view(device: &Device, sc: &SurfaceConfiguration) -> TextureView {
    let tex = device.create_texture(&TextureDescriptor {
        label: Some("DepthTex"),
        size: Extent3d {
            width: sc.width.max(1),
            height: sc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&TextureViewDescriptor::default())
}
