//! GPU half of the model container: uploaded mesh batches, their
//! textures, and the tagged union over the currently loaded model.

use asset::material::TextureRole;
use asset::model::ModelData;
use asset::resolve::TextureSource;
use asset::texture::TextureData;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Buffer, BufferUsages, Device, Queue, RenderPass};

use crate::{BatchUniform, Vertex};

/// One texture uploaded to the GPU, with its sampler and bind group.
/// Owned exclusively by one mesh batch (or by the renderer, for the
/// shared magenta fallback); dropping it releases the GPU handles.
pub struct GpuTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    #[allow(dead_code)]
    view: wgpu::TextureView,
    #[allow(dead_code)]
    sampler: wgpu::Sampler,
    pub bind_group: BindGroup,
    pub role: TextureRole,
    pub unit: u32,
}

impl GpuTexture {
    pub fn upload(
        device: &Device,
        queue: &Queue,
        texture_bgl: &BindGroupLayout,
        data: &TextureData,
        role: TextureRole,
        unit: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: texture_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        Self {
            texture,
            view,
            sampler,
            bind_group,
            role,
            unit,
        }
    }
}

/// Uploaded drawable unit: vertex/index buffers, per-batch model
/// uniform, and the batch's textures. Buffers are exclusively owned;
/// nothing is shared across two live models.
pub struct GpuMesh {
    vertex_buf: Buffer,
    index_buf: Buffer,
    index_count: u32,
    #[allow(dead_code)]
    model_buf: Buffer,
    model_bg: BindGroup,
    textures: Vec<GpuTexture>,
}

impl GpuMesh {
    /// Bind buffers and the diffuse texture (unit 0), falling back to
    /// the shared magenta texture, and issue one indexed draw call.
    pub fn draw(&self, rpass: &mut RenderPass<'static>, fallback: &GpuTexture) {
        let diffuse = self
            .textures
            .iter()
            .find(|t| t.role == TextureRole::Diffuse && t.unit == 0)
            .unwrap_or(fallback);
        rpass.set_bind_group(1, &self.model_bg, &[]);
        rpass.set_bind_group(2, &diffuse.bind_group, &[]);
        rpass.set_vertex_buffer(0, self.vertex_buf.slice(..));
        rpass.set_index_buffer(self.index_buf.slice(..), wgpu::IndexFormat::Uint32);
        rpass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// All batches of one loaded model, in flattening emission order.
pub struct GpuModel {
    meshes: Vec<GpuMesh>,
}

impl GpuModel {
    /// Upload a fully loaded CPU model. Texture files that fail to
    /// decode at this point downgrade to the fallback, like unresolved
    /// references do.
    pub fn upload(
        device: &Device,
        queue: &Queue,
        model_bgl: &BindGroupLayout,
        texture_bgl: &BindGroupLayout,
        data: &ModelData,
    ) -> Self {
        let mut meshes = Vec::with_capacity(data.batches.len());
        for (batch_index, batch) in data.batches.iter().enumerate() {
            let vertices: Vec<Vertex> = batch.mesh.vertices.iter().map(Vertex::from).collect();
            let vertex_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Batch{batch_index} VB")),
                contents: bytemuck::cast_slice(&vertices),
                usage: BufferUsages::VERTEX,
            });
            let index_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Batch{batch_index} IB")),
                contents: bytemuck::cast_slice(&batch.mesh.indices),
                usage: BufferUsages::INDEX,
            });
            let uniform = BatchUniform {
                model: batch.transform.to_cols_array_2d(),
            };
            let model_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Batch{batch_index} UBO")),
                contents: bytemuck::bytes_of(&uniform),
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            });
            let model_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Batch{batch_index} BG")),
                layout: model_bgl,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: model_buf.as_entire_binding(),
                }],
            });

            let mut textures = Vec::new();
            for bound in &batch.textures {
                let cpu = match &bound.source {
                    TextureSource::Path(path) => match TextureData::load(path) {
                        Ok(t) => t,
                        Err(e) => {
                            log::warn!("[texture] {e:#}; using fallback");
                            TextureData::fallback_magenta()
                        }
                    },
                    TextureSource::Fallback => TextureData::fallback_magenta(),
                };
                textures.push(GpuTexture::upload(
                    device,
                    queue,
                    texture_bgl,
                    &cpu,
                    bound.role,
                    bound.unit,
                    &format!("Batch{batch_index} {}{}", bound.role.sampler_prefix(), bound.unit),
                ));
            }

            meshes.push(GpuMesh {
                vertex_buf,
                index_buf,
                index_count: batch.mesh.indices.len() as u32,
                model_buf,
                model_bg,
                textures,
            });
        }
        Self { meshes }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Draw every batch in emission order; no sorting.
    pub fn draw(&self, rpass: &mut RenderPass<'static>, fallback: &GpuTexture) {
        for mesh in &self.meshes {
            mesh.draw(rpass, fallback);
        }
    }
}

/// The currently loaded model: none, glTF-backed, or FBX-backed. The
/// two loaders share only this draw/count contract.
#[derive(Default)]
pub enum SceneModel {
    #[default]
    Empty,
    Gltf(GpuModel),
    Fbx(GpuModel),
}

impl SceneModel {
    pub fn from_parts(kind: asset::ModelKind, model: GpuModel) -> Self {
        match kind {
            asset::ModelKind::Gltf => SceneModel::Gltf(model),
            asset::ModelKind::Fbx => SceneModel::Fbx(model),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SceneModel::Empty)
    }

    pub fn mesh_count(&self) -> usize {
        match self {
            SceneModel::Empty => 0,
            SceneModel::Gltf(m) | SceneModel::Fbx(m) => m.mesh_count(),
        }
    }

    pub fn draw(&self, rpass: &mut RenderPass<'static>, fallback: &GpuTexture) {
        match self {
            SceneModel::Empty => {}
            SceneModel::Gltf(m) | SceneModel::Fbx(m) => m.draw(rpass, fallback),
        }
    }
}
