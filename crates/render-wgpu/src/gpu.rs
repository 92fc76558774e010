use crate::shaders;
use crate::shadow::{self, ShadowMap};
use bytemuck::{Pod, Zeroable};
use cafescene_kernel::{Sprite, MAX_LIGHTS};
use cafescene_render::{DrawList, LightSample, MeshDraw};
use cafescene_scene::{GeometryId, MeshData, SceneGraph, TextureId};
use std::ops::Range;
use wgpu::util::DeviceExt;

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct GpuLight {
    position: [f32; 4],
    radiance: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
    cam_right: [f32; 4],
    cam_up: [f32; 4],
    ambient: [f32; 4],
    fog: [f32; 4],
    light_view_proj: [[f32; 4]; 4],
    shadow: [f32; 4],
    light_count: [u32; 4],
    lights: [GpuLight; MAX_LIGHTS],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq)]
struct InstanceData {
    model_0: [f32; 4],
    model_1: [f32; 4],
    model_2: [f32; 4],
    model_3: [f32; 4],
    color: [f32; 4],
    emissive: [f32; 4],
    params: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq)]
struct SpriteInstance {
    position_size: [f32; 4],
    color: [f32; 4],
}

/// A run of consecutive instances sharing geometry and texture.
#[derive(Debug, Clone, PartialEq)]
struct Batch {
    geometry: GeometryId,
    texture: Option<TextureId>,
    instances: Range<u32>,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

fn interleave(mesh: &MeshData) -> Vec<Vertex> {
    (0..mesh.positions.len())
        .map(|i| Vertex {
            position: mesh.positions[i],
            normal: mesh.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            uv: mesh.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
        })
        .collect()
}

fn globals(frame: &DrawList) -> Globals {
    let camera = frame.view.view.inverse();
    let mut lights = [GpuLight::zeroed(); MAX_LIGHTS];
    let mut count = 0;
    for (slot, sample) in lights.iter_mut().zip(&frame.lights) {
        *slot = match *sample {
            LightSample::Directional {
                direction,
                radiance,
            } => GpuLight {
                position: direction.extend(0.0).to_array(),
                radiance: [radiance[0], radiance[1], radiance[2], 0.0],
            },
            LightSample::Point {
                position,
                range,
                radiance,
            } => GpuLight {
                position: position.extend(1.0).to_array(),
                radiance: [radiance[0], radiance[1], radiance[2], range],
            },
        };
        count += 1;
    }
    let [fr, fg, fb] = frame.fog_color.linear();
    let [ar, ag, ab] = frame.ambient;
    let light_view_proj = frame
        .shadow
        .map(|s| s.view_proj.to_cols_array_2d())
        .unwrap_or([[0.0; 4]; 4]);
    Globals {
        view_proj: frame.view.view_projection().to_cols_array_2d(),
        eye: frame.view.eye.extend(1.0).to_array(),
        cam_right: camera.x_axis.truncate().extend(0.0).to_array(),
        cam_up: camera.y_axis.truncate().extend(0.0).to_array(),
        ambient: [ar, ag, ab, 0.0],
        fog: [fr, fg, fb, frame.fog_density],
        light_view_proj,
        shadow: shadow::shadow_params(frame.shadow.as_ref()),
        light_count: [count, 0, 0, 0],
        lights,
    }
}

fn instance(graph: &SceneGraph, draw: &MeshDraw) -> Option<InstanceData> {
    let material = graph.material(draw.material)?;
    let cols = draw.model.to_cols_array_2d();
    let [r, g, b] = material.color().linear();
    let [er, eg, eb] = material.emission();
    let (roughness, metalness) = material.surface();
    Some(InstanceData {
        model_0: cols[0],
        model_1: cols[1],
        model_2: cols[2],
        model_3: cols[3],
        color: [r, g, b, material.opacity().clamp(0.0, 1.0)],
        emissive: [er, eg, eb, 0.0],
        params: [
            roughness,
            metalness,
            if material.is_lit() { 1.0 } else { 0.0 },
            if draw.shadows.receive { 1.0 } else { 0.0 },
        ],
    })
}

/// Pack draws into instances and group neighbours with the same
/// geometry and texture. Order is preserved; callers sort first.
fn batch(
    graph: &SceneGraph,
    draws: &[MeshDraw],
    instances: &mut Vec<InstanceData>,
    batches: &mut Vec<Batch>,
) {
    for draw in draws {
        let Some(data) = instance(graph, draw) else {
            continue;
        };
        let index = instances.len() as u32;
        instances.push(data);
        match batches.last_mut() {
            Some(last)
                if last.geometry == draw.geometry
                    && last.texture == draw.texture
                    && last.instances.end == index =>
            {
                last.instances.end += 1;
            }
            _ => batches.push(Batch {
                geometry: draw.geometry,
                texture: draw.texture,
                instances: index..index + 1,
            }),
        }
    }
}

/// Casters grouped by geometry; texture is irrelevant to a depth pass.
fn shadow_casters(frame: &DrawList) -> Vec<MeshDraw> {
    let mut casters: Vec<MeshDraw> = frame
        .shadow_casters()
        .map(|d| MeshDraw { texture: None, ..*d })
        .collect();
    casters.sort_by_key(|d| d.geometry);
    casters
}

fn sprite_instance(sprite: &Sprite) -> SpriteInstance {
    let [r, g, b] = sprite.color.linear();
    SpriteInstance {
        position_size: sprite.position.extend(sprite.size).to_array(),
        color: [r, g, b, sprite.opacity.clamp(0.0, 1.0)],
    }
}

/// A vertex or instance buffer that grows to fit.
struct DynamicBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl DynamicBuffer {
    fn new(device: &wgpu::Device, label: &'static str, capacity: u64) -> Self {
        let capacity = capacity.max(256);
        Self {
            label,
            buffer: Self::allocate(device, label, capacity),
            capacity,
        }
    }

    fn allocate(device: &wgpu::Device, label: &'static str, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let needed = bytes.len() as u64;
        if needed > self.capacity {
            self.capacity = needed.next_power_of_two();
            self.buffer = Self::allocate(device, self.label, self.capacity);
            tracing::debug!(buffer = self.label, bytes = self.capacity, "grew GPU buffer");
        }
        queue.write_buffer(&self.buffer, 0, bytes);
    }
}

fn blended_target(format: wgpu::TextureFormat) -> [Option<wgpu::ColorTargetState>; 1] {
    [Some(wgpu::ColorTargetState {
        format,
        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
        write_mask: wgpu::ColorWrites::ALL,
    })]
}

fn depth_state(write: bool) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: Default::default(),
        bias: Default::default(),
    }
}

/// wgpu renderer for the stage's draw lists.
///
/// Geometry and textures are uploaded the first time a frame references
/// them; the graph only ever grows, so uploads are never invalidated.
pub struct WgpuRenderer {
    opaque_pipeline: wgpu::RenderPipeline,
    transparent_pipeline: wgpu::RenderPipeline,
    sprite_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    globals_layout: wgpu::BindGroupLayout,
    globals_bind_group: wgpu::BindGroup,
    shadow_globals_buffer: wgpu::Buffer,
    shadow_globals_bind_group: wgpu::BindGroup,
    shadow_map: ShadowMap,
    shadow_sampler: wgpu::Sampler,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white_texture: wgpu::BindGroup,
    textures: Vec<wgpu::BindGroup>,
    meshes: Vec<GpuMesh>,
    instance_buffer: DynamicBuffer,
    sprite_buffer: DynamicBuffer,
    depth_texture: wgpu::TextureView,
    surface_format: wgpu::TextureFormat,
}

impl WgpuRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals_buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let shadow_map = ShadowMap::new(device, 1);
        let shadow_sampler = shadow::comparison_sampler(device);
        let globals_bind_group = Self::globals_bind_group(
            device,
            &globals_layout,
            &globals_buffer,
            &shadow_map,
            &shadow_sampler,
        );

        let shadow_globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow_globals_buffer"),
            size: std::mem::size_of::<[[f32; 4]; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shadow_globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow_globals_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let shadow_globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_globals_bind_group"),
            layout: &shadow_globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_globals_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("label_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh_pipeline_layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let sprite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite_pipeline_layout"),
            bind_group_layouts: &[&globals_layout],
            push_constant_ranges: &[],
        });
        let shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow_pipeline_layout"),
            bind_group_layouts: &[&shadow_globals_layout],
            push_constant_ranges: &[],
        });

        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::mesh_shader().into()),
        });
        let sprite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::sprite_shader().into()),
        });
        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::shadow_shader().into()),
        });

        let mesh_buffers = [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x3,
                    1 => Float32x3,
                    2 => Float32x2,
                ],
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<InstanceData>() as u64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &wgpu::vertex_attr_array![
                    3 => Float32x4,
                    4 => Float32x4,
                    5 => Float32x4,
                    6 => Float32x4,
                    7 => Float32x4,
                    8 => Float32x4,
                    9 => Float32x4,
                ],
            },
        ];

        // Planes and open shapes are seen from both sides; the shader
        // flips the normal on back faces.
        let mesh_primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        };

        let opaque_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("opaque_pipeline"),
            layout: Some(&mesh_layout),
            vertex: wgpu::VertexState {
                module: &mesh_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &mesh_buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &mesh_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: mesh_primitive,
            depth_stencil: Some(depth_state(true)),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let transparent_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("transparent_pipeline"),
            layout: Some(&mesh_layout),
            vertex: wgpu::VertexState {
                module: &mesh_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &mesh_buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &mesh_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &blended_target(surface_format),
            }),
            primitive: mesh_primitive,
            depth_stencil: Some(depth_state(false)),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        // Depth only; the caster's own faces are biased away from the light.
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow_pipeline"),
            layout: Some(&shadow_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: Some("vs_shadow"),
                compilation_options: Default::default(),
                buffers: &mesh_buffers,
            },
            fragment: None,
            primitive: mesh_primitive,
            depth_stencil: Some(wgpu::DepthStencilState {
                bias: shadow::caster_bias(),
                ..depth_state(true)
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let sprite_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite_pipeline"),
            layout: Some(&sprite_layout),
            vertex: wgpu::VertexState {
                module: &sprite_shader,
                entry_point: Some("vs_sprite"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<SpriteInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x4,
                        1 => Float32x4,
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &sprite_shader,
                entry_point: Some("fs_sprite"),
                compilation_options: Default::default(),
                targets: &blended_target(surface_format),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(depth_state(false)),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let white = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let white_texture =
            Self::upload_texture(device, queue, &texture_layout, &sampler, &white, "white_texture");

        let instance_buffer = DynamicBuffer::new(
            device,
            "instance_buffer",
            256 * std::mem::size_of::<InstanceData>() as u64,
        );
        let sprite_buffer = DynamicBuffer::new(
            device,
            "sprite_buffer",
            2048 * std::mem::size_of::<SpriteInstance>() as u64,
        );

        let depth_texture = Self::create_depth_texture(device, width, height);

        Self {
            opaque_pipeline,
            transparent_pipeline,
            sprite_pipeline,
            shadow_pipeline,
            globals_buffer,
            globals_layout,
            globals_bind_group,
            shadow_globals_buffer,
            shadow_globals_bind_group,
            shadow_map,
            shadow_sampler,
            texture_layout,
            sampler,
            white_texture,
            textures: Vec::new(),
            meshes: Vec::new(),
            instance_buffer,
            sprite_buffer,
            depth_texture,
            surface_format,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_texture = Self::create_depth_texture(device, width, height);
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    fn globals_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        shadow_map: &ShadowMap,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadow_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Reallocate the shadow map when the requested size changes.
    fn ensure_shadow_map(&mut self, device: &wgpu::Device, size: u32) {
        if self.shadow_map.size() == size.max(1) {
            return;
        }
        self.shadow_map = ShadowMap::new(device, size);
        self.globals_bind_group = Self::globals_bind_group(
            device,
            &self.globals_layout,
            &self.globals_buffer,
            &self.shadow_map,
            &self.shadow_sampler,
        );
    }

    /// Upload geometry and textures added to the graph since the last call.
    pub fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, graph: &SceneGraph) {
        for geometry in &graph.geometries()[self.meshes.len()..] {
            let mesh = geometry.tessellate();
            let vertices = interleave(&mesh);
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertex_buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_index_buffer"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            self.meshes.push(GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
            });
        }
        for image in &graph.textures()[self.textures.len()..] {
            let bind_group = Self::upload_texture(
                device,
                queue,
                &self.texture_layout,
                &self.sampler,
                image,
                "label_texture",
            );
            self.textures.push(bind_group);
        }
        tracing::trace!(
            meshes = self.meshes.len(),
            textures = self.textures.len(),
            "GPU resources in sync"
        );
    }

    /// Render one frame: the shadow map from the directional light, then
    /// clear to the background, opaque meshes, blended meshes back to
    /// front, then sprites.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        graph: &SceneGraph,
        frame: &DrawList,
    ) {
        self.sync(device, queue, graph);
        if let Some(shadow) = &frame.shadow {
            self.ensure_shadow_map(device, shadow.map_size);
            queue.write_buffer(
                &self.shadow_globals_buffer,
                0,
                bytemuck::bytes_of(&shadow.view_proj.to_cols_array_2d()),
            );
        }

        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals(frame)));

        let mut opaque = frame.opaque.clone();
        opaque.sort_by_key(|d| (d.geometry, d.texture));

        let mut instances = Vec::with_capacity(frame.mesh_count());
        let mut opaque_batches = Vec::new();
        let mut transparent_batches = Vec::new();
        batch(graph, &opaque, &mut instances, &mut opaque_batches);
        batch(graph, &frame.transparent, &mut instances, &mut transparent_batches);
        let mut caster_batches = Vec::new();
        if frame.shadow.is_some() {
            let casters = shadow_casters(frame);
            batch(graph, &casters, &mut instances, &mut caster_batches);
        }
        self.instance_buffer
            .write(device, queue, bytemuck::cast_slice(&instances));

        let sprites: Vec<SpriteInstance> = frame.sprites.iter().map(sprite_instance).collect();
        self.sprite_buffer
            .write(device, queue, bytemuck::cast_slice(&sprites));

        let [r, g, b] = frame.background.linear();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });

        if frame.shadow.is_some() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            if !caster_batches.is_empty() {
                pass.set_pipeline(&self.shadow_pipeline);
                pass.set_bind_group(0, &self.shadow_globals_bind_group, &[]);
                pass.set_vertex_buffer(1, self.instance_buffer.buffer.slice(..));
                for batch in &caster_batches {
                    self.draw_geometry(&mut pass, batch);
                }
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            pass.set_bind_group(0, &self.globals_bind_group, &[]);

            if !instances.is_empty() {
                pass.set_vertex_buffer(1, self.instance_buffer.buffer.slice(..));
                pass.set_pipeline(&self.opaque_pipeline);
                self.draw_batches(&mut pass, &opaque_batches);
                pass.set_pipeline(&self.transparent_pipeline);
                self.draw_batches(&mut pass, &transparent_batches);
            }

            if !sprites.is_empty() {
                pass.set_pipeline(&self.sprite_pipeline);
                pass.set_vertex_buffer(0, self.sprite_buffer.buffer.slice(..));
                pass.draw(0..6, 0..sprites.len() as u32);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        tracing::trace!(
            instances = instances.len(),
            opaque_batches = opaque_batches.len(),
            transparent_batches = transparent_batches.len(),
            caster_batches = caster_batches.len(),
            sprites = sprites.len(),
            "frame submitted"
        );
    }

    fn draw_batches(&self, pass: &mut wgpu::RenderPass<'_>, batches: &[Batch]) {
        for batch in batches {
            let texture = batch
                .texture
                .and_then(|t| self.textures.get(t.0 as usize))
                .unwrap_or(&self.white_texture);
            pass.set_bind_group(1, texture, &[]);
            self.draw_geometry(pass, batch);
        }
    }

    fn draw_geometry(&self, pass: &mut wgpu::RenderPass<'_>, batch: &Batch) {
        let Some(mesh) = self.meshes.get(batch.geometry.0 as usize) else {
            return;
        };
        if mesh.index_count == 0 {
            return;
        }
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, batch.instances.clone());
    }

    fn upload_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        image: &image::RgbaImage,
        label: &str,
    ) -> wgpu::BindGroup {
        let (width, height) = image.dimensions();
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
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
        if width > 0 && height > 0 {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                size,
            );
        }
        let view = texture.create_view(&Default::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafescene_common::SceneConfig;
    use cafescene_kernel::Stage;
    use cafescene_scene::LabelPainter;

    fn frame() -> (Stage, DrawList) {
        let stage = Stage::new(&SceneConfig::default(), &LabelPainter::bitmap());
        let frame = DrawList::collect(&stage);
        (stage, frame)
    }

    #[test]
    fn gpu_structs_match_shader_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::size_of::<InstanceData>(), 112);
        assert_eq!(std::mem::size_of::<SpriteInstance>(), 32);
        assert_eq!(std::mem::size_of::<GpuLight>(), 32);
        assert_eq!(std::mem::size_of::<Globals>() % 16, 0);
    }

    #[test]
    fn globals_carry_lights_and_fog() {
        let (stage, frame) = frame();
        let g = globals(&frame);
        assert_eq!(g.light_count[0] as usize, stage.lights.len() - 1);
        assert_eq!(g.fog[3], 0.012);
        let point = g.lights[..g.light_count[0] as usize]
            .iter()
            .filter(|l| l.position[3] == 1.0)
            .count();
        assert_eq!(point, 4);
    }

    #[test]
    fn globals_carry_the_shadow_view() {
        let (_, frame) = frame();
        let view = frame.shadow.unwrap();
        let g = globals(&frame);
        assert_eq!(g.light_view_proj, view.view_proj.to_cols_array_2d());
        assert_eq!(g.shadow[0], 1.0);

        let mut config = SceneConfig::default();
        config.shadows.enabled = false;
        let stage = Stage::new(&config, &LabelPainter::bitmap());
        let g = globals(&DrawList::collect(&stage));
        assert_eq!(g.shadow, [0.0; 4]);
    }

    #[test]
    fn caster_batches_group_by_geometry_only() {
        let (stage, frame) = frame();
        let casters = shadow_casters(&frame);
        assert_eq!(casters.len(), frame.shadow_casters().count());
        assert!(casters.iter().all(|d| d.shadows.cast && d.texture.is_none()));
        let mut instances = Vec::new();
        let mut batches = Vec::new();
        batch(&stage.graph, &casters, &mut instances, &mut batches);
        let mut geometries: Vec<_> = batches.iter().map(|b| b.geometry).collect();
        let before = geometries.len();
        geometries.dedup();
        assert_eq!(geometries.len(), before);
    }

    #[test]
    fn receivers_are_flagged_per_instance() {
        let (stage, frame) = frame();
        let ground = stage.graph.find("ground").unwrap();
        let draw = frame.opaque.iter().find(|d| d.node == ground).unwrap();
        assert_eq!(instance(&stage.graph, draw).unwrap().params[3], 1.0);
        let banner = stage.graph.find("banner").unwrap();
        let draw = frame.transparent.iter().find(|d| d.node == banner).unwrap();
        assert_eq!(instance(&stage.graph, draw).unwrap().params[3], 0.0);
    }

    #[test]
    fn batches_cover_every_draw_once() {
        let (stage, frame) = frame();
        let mut opaque = frame.opaque.clone();
        opaque.sort_by_key(|d| (d.geometry, d.texture));
        let mut instances = Vec::new();
        let mut batches = Vec::new();
        batch(&stage.graph, &opaque, &mut instances, &mut batches);
        assert_eq!(instances.len(), opaque.len());
        let covered: u32 = batches.iter().map(|b| b.instances.end - b.instances.start).sum();
        assert_eq!(covered as usize, instances.len());
        for pair in batches.windows(2) {
            assert_eq!(pair[0].instances.end, pair[1].instances.start);
            assert!((pair[0].geometry, pair[0].texture) != (pair[1].geometry, pair[1].texture));
        }
    }

    #[test]
    fn unlit_materials_are_flagged() {
        let (stage, frame) = frame();
        let banner = stage.graph.find("banner").unwrap();
        let draw = frame.transparent.iter().find(|d| d.node == banner).unwrap();
        let data = instance(&stage.graph, draw).unwrap();
        assert_eq!(data.params[2], 0.0);
        assert_eq!(data.model_3[1], draw.model.w_axis.y);
    }

    #[test]
    fn interleave_fills_missing_attributes() {
        let mesh = MeshData {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: vec![0, 1, 2],
        };
        let vertices = interleave(&mesh);
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[2].uv, [0.0, 0.0]);
    }

    #[test]
    fn sprites_pack_size_and_opacity() {
        let (_, frame) = frame();
        let sprite = frame.sprites[0];
        let packed = sprite_instance(&sprite);
        assert_eq!(packed.position_size[3], sprite.size);
        assert_eq!(packed.color[3], sprite.opacity);
    }
}
