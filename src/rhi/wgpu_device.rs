//! wgpu Driver
//!
//! Maps the RHI surface onto a `wgpu` device/queue pair. Texture uploads
//! walk the packed mip chain with one `write_texture` per level; recorded
//! command buffers are translated into a single `CommandEncoder` and
//! submitted once.
//!
//! Fullscreen pipelines are built from WGSL with an explicit `@group(0)`
//! layout taken from [`PipelineDesc::bindings`]; draws get their bind
//! group assembled at submit time from the textures bound on the command
//! stream, the way the blit path below assembles its own per-mip groups.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::borrow::Cow;

use super::{
    Attachment, BindingKind, Capabilities, Command, CommandBuffer, FramebufferDesc, PipelineDesc,
    PipelineKind, RhiDevice, RhiFramebuffer, RhiPipeline, RhiTexture, TextureDesc,
    TextureDimension, TextureFormat, TextureUsage,
};
use crate::errors::{EngineError, Result};

const BLIT_WGSL: &str = r"
struct VertexOutput {
    @builtin(position) position : vec4<f32>,
    @location(0) uv : vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index : u32) -> VertexOutput {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0)
    );
    var output : VertexOutput;
    output.position = vec4<f32>(pos[vertex_index], 0.0, 1.0);
    output.uv = pos[vertex_index] * 0.5 + 0.5;
    output.uv.y = 1.0 - output.uv.y;
    return output;
}

@group(0) @binding(0) var s_blit : sampler;
@group(0) @binding(1) var t_blit : texture_2d<f32>;

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(t_blit, s_blit, in.uv);
}
";

struct WgpuTexture {
    texture: wgpu::Texture,
}

struct WgpuFramebuffer {
    color_view: Option<wgpu::TextureView>,
    depth_view: Option<wgpu::TextureView>,
}

enum WgpuPipelinePayload {
    Graphics(wgpu::RenderPipeline),
    Compute(wgpu::ComputePipeline),
}

struct WgpuPipeline {
    payload: WgpuPipelinePayload,
    layout: wgpu::BindGroupLayout,
    bindings: Vec<BindingKind>,
}

/// RHI driver over a `wgpu::Device`/`wgpu::Queue` pair.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: Capabilities,
    sampler: wgpu::Sampler,
    blit: Mutex<BlitPipelines>,
}

/// Per-format pipeline cache for the mipmap blit path.
struct BlitPipelines {
    shader: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipelines: FxHashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl WgpuDevice {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let capabilities = Capabilities {
            max_multisample_count: 4,
            max_texture_dimension_2d: device.limits().max_texture_dimension_2d,
            depth_clip_zero_to_one: true,
            upper_left_texture_origin: true,
            native_multithreading: true,
            supports_bc_compression: device
                .features()
                .contains(wgpu::Features::TEXTURE_COMPRESSION_BC),
        };

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("RHI Shared Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mipmap Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(BLIT_WGSL)),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mipmap Blit Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        Self {
            device,
            queue,
            capabilities,
            sampler,
            blit: Mutex::new(BlitPipelines {
                shader,
                layout,
                pipelines: FxHashMap::default(),
            }),
        }
    }

    fn native_texture<'a>(&self, texture: &'a RhiTexture) -> Result<&'a wgpu::Texture> {
        texture
            .backend::<WgpuTexture>()
            .map(|t| &t.texture)
            .ok_or(EngineError::ForeignBackendResource("texture"))
    }

    fn upload(&self, texture: &wgpu::Texture, desc: &TextureDesc, data: &[u8]) {
        let format = desc.format;
        let (block_w, block_h) = format.block_dimensions();
        let mut offset = 0usize;

        for mip in 0..desc.mip_level_count {
            let mip_w = (desc.width >> mip).max(1);
            let mip_h = (desc.height >> mip).max(1);
            let layers = if desc.dimension == TextureDimension::D3 {
                (desc.depth_or_array_layers >> mip).max(1)
            } else {
                desc.depth_or_array_layers
            };

            let blocks_x = mip_w.div_ceil(block_w);
            let blocks_y = mip_h.div_ceil(block_h);
            let bytes_per_row = blocks_x * format.bytes_per_block();
            let mip_size = format.mip_byte_size(mip_w, mip_h, layers);

            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: mip,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &data[offset..offset + mip_size],
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(blocks_y),
                },
                wgpu::Extent3d {
                    width: mip_w,
                    height: mip_h,
                    depth_or_array_layers: layers,
                },
            );
            offset += mip_size;
        }
    }

    fn binding_entry(kind: BindingKind, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let visibility = wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;
        let ty = match kind {
            BindingKind::Sampler => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
            BindingKind::Texture2d => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            BindingKind::Texture2dArray => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2Array,
                multisampled: false,
            },
            BindingKind::DepthTexture2d => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            BindingKind::DepthTextureMultisampled2d => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: true,
            },
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty,
            count: None,
        }
    }

    /// Builds the `@group(0)` bind group for the currently bound textures.
    fn make_bind_group(
        &self,
        pipeline: &WgpuPipeline,
        bound: &[BoundTexture],
    ) -> Result<wgpu::BindGroup> {
        // Views must outlive the entry array.
        let mut views = Vec::new();
        for (index, kind) in pipeline.bindings.iter().enumerate() {
            if *kind == BindingKind::Sampler {
                views.push(None);
                continue;
            }
            let slot = index as u32;
            let Some(b) = bound.iter().find(|b| b.slot == slot) else {
                return Err(EngineError::InvalidFramebufferDesc(format!(
                    "no texture bound for pipeline binding {slot}"
                )));
            };
            let texture = self.native_texture(&b.texture)?;
            let dimension = match kind {
                BindingKind::Texture2dArray => wgpu::TextureViewDimension::D2Array,
                _ => wgpu::TextureViewDimension::D2,
            };
            views.push(Some(texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("RHI Binding View"),
                dimension: Some(dimension),
                base_mip_level: b.mip_level.unwrap_or(0),
                mip_level_count: b.mip_level.map(|_| 1),
                base_array_layer: b.array_layer.unwrap_or(0),
                array_layer_count: b.array_layer.map(|_| 1),
                ..Default::default()
            })));
        }

        let mut entries = Vec::with_capacity(pipeline.bindings.len());
        for (index, view) in views.iter().enumerate() {
            let resource = match view {
                Some(view) => wgpu::BindingResource::TextureView(view),
                None => wgpu::BindingResource::Sampler(&self.sampler),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32,
                resource,
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("RHI BindGroup"),
            layout: &pipeline.layout,
            entries: &entries,
        }))
    }

    fn blit_mipmaps(&self, encoder: &mut wgpu::CommandEncoder, texture: &RhiTexture) -> Result<()> {
        let desc = texture.desc().clone();
        let native = self.native_texture(texture)?;
        if desc.mip_level_count < 2 {
            return Ok(());
        }

        let format = map_format(desc.format);
        let pipeline = {
            let mut blit = self.blit.lock();
            let BlitPipelines {
                shader,
                layout,
                pipelines,
            } = &mut *blit;
            pipelines
                .entry(format)
                .or_insert_with(|| {
                    self.device
                        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                            label: Some("Mipmap Blit Pipeline"),
                            layout: Some(&self.device.create_pipeline_layout(
                                &wgpu::PipelineLayoutDescriptor {
                                    label: Some("Mipmap Blit Pipeline Layout"),
                                    bind_group_layouts: &[Some(layout)],
                                    immediate_size: 0,
                                },
                            )),
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
                                    blend: None,
                                    write_mask: wgpu::ColorWrites::ALL,
                                })],
                                compilation_options: Default::default(),
                            }),
                            primitive: wgpu::PrimitiveState {
                                topology: wgpu::PrimitiveTopology::TriangleList,
                                ..Default::default()
                            },
                            depth_stencil: None,
                            multisample: wgpu::MultisampleState::default(),
                            multiview_mask: None,
                            cache: None,
                        })
                })
                .clone()
        };

        let blit = self.blit.lock();
        for layer in 0..desc.depth_or_array_layers {
            for mip in 0..desc.mip_level_count - 1 {
                let src_view = native.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Mipmap Src"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                let dst_view = native.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Mipmap Dst"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: mip + 1,
                    mip_level_count: Some(1),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                });

                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Mipmap BindGroup"),
                    layout: &blit.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&src_view),
                        },
                    ],
                });

                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Mipmap Blit Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &dst_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                    ..Default::default()
                });
                rpass.set_pipeline(&pipeline);
                rpass.set_bind_group(0, &bind_group, &[]);
                rpass.draw(0..3, 0..1);
            }
        }
        Ok(())
    }

    fn run_render_segment(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        segment: &[Command],
        bound_pipeline: &mut Option<RhiPipeline>,
        bound_textures: &mut Vec<BoundTexture>,
    ) -> Result<()> {
        let Command::BeginRenderPass {
            framebuffer,
            clear_color,
            clear_depth,
        } = &segment[0]
        else {
            unreachable!("segment starts with BeginRenderPass");
        };
        let native_fb = framebuffer
            .backend::<WgpuFramebuffer>()
            .ok_or(EngineError::ForeignBackendResource("framebuffer"))?;

        // Pre-assemble per-draw state so every wgpu object outlives the pass.
        struct PreparedDraw {
            pipeline: wgpu::RenderPipeline,
            bind_group: Option<wgpu::BindGroup>,
            vertex_count: u32,
            instance_count: u32,
        }
        let mut draws = Vec::new();
        for command in &segment[1..] {
            match command {
                Command::BindPipeline(p) => *bound_pipeline = Some(p.clone()),
                Command::BindTexture {
                    slot,
                    texture,
                    mip_level,
                    array_layer,
                } => upsert_binding(bound_textures, *slot, texture, *mip_level, *array_layer),
                Command::Draw {
                    vertex_count,
                    instance_count,
                } => {
                    let Some(rhi_pipeline) = bound_pipeline.as_ref() else {
                        debug_assert!(false, "draw without a bound pipeline");
                        continue;
                    };
                    let Some(pipeline) = rhi_pipeline.backend::<WgpuPipeline>() else {
                        return Err(EngineError::ForeignBackendResource("pipeline"));
                    };
                    let WgpuPipelinePayload::Graphics(render_pipeline) = &pipeline.payload else {
                        debug_assert!(false, "compute pipeline bound in a render pass");
                        continue;
                    };
                    let bind_group = if pipeline.bindings.is_empty() {
                        None
                    } else {
                        Some(self.make_bind_group(pipeline, bound_textures)?)
                    };
                    draws.push(PreparedDraw {
                        pipeline: render_pipeline.clone(),
                        bind_group,
                        vertex_count: *vertex_count,
                        instance_count: *instance_count,
                    });
                }
                Command::EndRenderPass => break,
                _ => {
                    debug_assert!(false, "unsupported command inside a render pass");
                }
            }
        }

        let color_attachments = native_fb.color_view.as_ref().map(|view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: clear_color.map_or(wgpu::LoadOp::Load, |c| {
                        wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(c[0]),
                            g: f64::from(c[1]),
                            b: f64::from(c[2]),
                            a: f64::from(c[3]),
                        })
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
        });
        let color_attachments: Vec<_> = color_attachments.into_iter().collect();

        let depth_stencil_attachment =
            native_fb
                .depth_view
                .as_ref()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(framebuffer.desc().label.as_str()),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            ..Default::default()
        });
        for draw in &draws {
            rpass.set_pipeline(&draw.pipeline);
            if let Some(bind_group) = &draw.bind_group {
                rpass.set_bind_group(0, bind_group, &[]);
            }
            rpass.draw(0..draw.vertex_count, 0..draw.instance_count);
        }
        Ok(())
    }
}

#[derive(Clone)]
struct BoundTexture {
    slot: u32,
    texture: RhiTexture,
    mip_level: Option<u32>,
    array_layer: Option<u32>,
}

fn upsert_binding(
    bound: &mut Vec<BoundTexture>,
    slot: u32,
    texture: &RhiTexture,
    mip_level: Option<u32>,
    array_layer: Option<u32>,
) {
    let entry = BoundTexture {
        slot,
        texture: texture.clone(),
        mip_level,
        array_layer,
    };
    if let Some(existing) = bound.iter_mut().find(|b| b.slot == slot) {
        *existing = entry;
    } else {
        bound.push(entry);
    }
}

impl RhiDevice for WgpuDevice {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn create_texture(&self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<RhiTexture> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.depth_or_array_layers,
            },
            mip_level_count: desc.mip_level_count,
            sample_count: desc.sample_count,
            dimension: map_dimension(desc.dimension),
            format: map_format(desc.format),
            usage: map_usage(desc.usage),
            view_formats: &[],
        });

        if let Some(data) = data {
            self.upload(&texture, desc, data);
        }

        Ok(RhiTexture::from_backend(
            desc.clone(),
            Box::new(WgpuTexture { texture }),
        ))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<RhiFramebuffer> {
        let make_view = |att: &Attachment| -> Result<wgpu::TextureView> {
            let native = self.native_texture(&att.texture)?;
            Ok(native.create_view(&wgpu::TextureViewDescriptor {
                label: Some(desc.label.as_str()),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_mip_level: att.mip_level,
                mip_level_count: Some(1),
                base_array_layer: att.array_layer,
                array_layer_count: Some(1),
                ..Default::default()
            }))
        };

        let color_view = desc.color.as_ref().map(&make_view).transpose()?;
        let depth_view = desc.depth.as_ref().map(&make_view).transpose()?;
        if color_view.is_none() && depth_view.is_none() {
            return Err(EngineError::InvalidFramebufferDesc(format!(
                "'{}' has no attachments",
                desc.label
            )));
        }

        Ok(RhiFramebuffer::from_backend(
            desc.clone(),
            Box::new(WgpuFramebuffer {
                color_view,
                depth_view,
            }),
        ))
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<RhiPipeline> {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&desc.source)),
            });

        let entries: Vec<_> = desc
            .bindings
            .iter()
            .enumerate()
            .map(|(i, kind)| Self::binding_entry(*kind, i as u32))
            .collect();
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&desc.label),
                entries: &entries,
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&desc.label),
                bind_group_layouts: &[Some(&layout)],
                immediate_size: 0,
            });

        let payload = match desc.kind {
            PipelineKind::Graphics => {
                let fragment_targets = desc.color_format.map(|format| {
                    [Some(wgpu::ColorTargetState {
                        format: map_format(format),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })]
                });
                let pipeline =
                    self.device
                        .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                            label: Some(&desc.label),
                            layout: Some(&pipeline_layout),
                            vertex: wgpu::VertexState {
                                module: &module,
                                entry_point: Some("vs_main"),
                                buffers: &[],
                                compilation_options: Default::default(),
                            },
                            fragment: fragment_targets.as_ref().map(|targets| {
                                wgpu::FragmentState {
                                    module: &module,
                                    entry_point: Some("fs_main"),
                                    targets,
                                    compilation_options: Default::default(),
                                }
                            }),
                            primitive: wgpu::PrimitiveState {
                                topology: wgpu::PrimitiveTopology::TriangleList,
                                ..Default::default()
                            },
                            depth_stencil: desc.depth_format.map(|format| {
                                wgpu::DepthStencilState {
                                    format: map_format(format),
                                    depth_write_enabled: Some(true),
                                    depth_compare: Some(wgpu::CompareFunction::LessEqual),
                                    stencil: wgpu::StencilState::default(),
                                    bias: wgpu::DepthBiasState::default(),
                                }
                            }),
                            multisample: wgpu::MultisampleState {
                                count: desc.sample_count,
                                ..Default::default()
                            },
                            multiview_mask: None,
                            cache: None,
                        });
                WgpuPipelinePayload::Graphics(pipeline)
            }
            PipelineKind::Compute => {
                let pipeline =
                    self.device
                        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                            label: Some(&desc.label),
                            layout: Some(&pipeline_layout),
                            module: &module,
                            entry_point: Some("cs_main"),
                            compilation_options: Default::default(),
                            cache: None,
                        });
                WgpuPipelinePayload::Compute(pipeline)
            }
        };

        Ok(RhiPipeline::from_backend(
            desc.label.clone(),
            desc.kind,
            Box::new(WgpuPipeline {
                payload,
                layout,
                bindings: desc.bindings.clone(),
            }),
        ))
    }

    fn submit(&self, commands: &CommandBuffer) -> Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("RHI Command Encoder"),
            });

        let cmds = commands.commands();
        let mut bound_pipeline: Option<RhiPipeline> = None;
        let mut bound_textures: Vec<BoundTexture> = Vec::new();
        let mut i = 0;
        while i < cmds.len() {
            match &cmds[i] {
                Command::BeginRenderPass { .. } => {
                    let end = cmds[i..]
                        .iter()
                        .position(|c| matches!(c, Command::EndRenderPass))
                        .map(|p| i + p);
                    let (segment, next) = match end {
                        Some(e) => (&cmds[i..=e], e + 1),
                        None => (&cmds[i..], cmds.len()),
                    };
                    self.run_render_segment(
                        &mut encoder,
                        segment,
                        &mut bound_pipeline,
                        &mut bound_textures,
                    )?;
                    i = next;
                }
                Command::BindPipeline(p) => {
                    bound_pipeline = Some(p.clone());
                    i += 1;
                }
                Command::BindTexture {
                    slot,
                    texture,
                    mip_level,
                    array_layer,
                } => {
                    upsert_binding(&mut bound_textures, *slot, texture, *mip_level, *array_layer);
                    i += 1;
                }
                Command::Dispatch { groups } => {
                    let Some(rhi_pipeline) = bound_pipeline.as_ref() else {
                        debug_assert!(false, "dispatch without a bound pipeline");
                        i += 1;
                        continue;
                    };
                    let pipeline = rhi_pipeline
                        .backend::<WgpuPipeline>()
                        .ok_or(EngineError::ForeignBackendResource("pipeline"))?;
                    let WgpuPipelinePayload::Compute(compute_pipeline) = &pipeline.payload else {
                        debug_assert!(false, "graphics pipeline bound for a dispatch");
                        i += 1;
                        continue;
                    };
                    let bind_group = if pipeline.bindings.is_empty() {
                        None
                    } else {
                        Some(self.make_bind_group(pipeline, &bound_textures)?)
                    };
                    {
                        let mut cpass =
                            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                                label: Some("RHI Compute Pass"),
                                timestamp_writes: None,
                            });
                        cpass.set_pipeline(compute_pipeline);
                        if let Some(bind_group) = &bind_group {
                            cpass.set_bind_group(0, bind_group, &[]);
                        }
                        cpass.dispatch_workgroups(groups[0], groups[1], groups[2]);
                    }
                    i += 1;
                }
                Command::CopyTexture {
                    source,
                    destination,
                } => {
                    let src = self.native_texture(source)?;
                    let dst = self.native_texture(destination)?;
                    let extent = wgpu::Extent3d {
                        width: source.desc().width.min(destination.desc().width),
                        height: source.desc().height.min(destination.desc().height),
                        depth_or_array_layers: source
                            .desc()
                            .depth_or_array_layers
                            .min(destination.desc().depth_or_array_layers),
                    };
                    encoder.copy_texture_to_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: src,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: dst,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        extent,
                    );
                    i += 1;
                }
                Command::GenerateMipmaps { texture } => {
                    self.blit_mipmaps(&mut encoder, texture)?;
                    i += 1;
                }
                Command::DebugMarker(name) => {
                    encoder.push_debug_group(name);
                    encoder.pop_debug_group();
                    i += 1;
                }
                Command::EndRenderPass | Command::Draw { .. } => {
                    debug_assert!(false, "render command outside a render pass");
                    i += 1;
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

fn map_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Bc1RgbaUnorm => wgpu::TextureFormat::Bc1RgbaUnorm,
        TextureFormat::Bc1RgbaUnormSrgb => wgpu::TextureFormat::Bc1RgbaUnormSrgb,
        TextureFormat::Bc3RgbaUnorm => wgpu::TextureFormat::Bc3RgbaUnorm,
        TextureFormat::Bc3RgbaUnormSrgb => wgpu::TextureFormat::Bc3RgbaUnormSrgb,
        TextureFormat::Bc5RgUnorm => wgpu::TextureFormat::Bc5RgUnorm,
    }
}

fn map_dimension(dimension: TextureDimension) -> wgpu::TextureDimension {
    match dimension {
        TextureDimension::D1 => wgpu::TextureDimension::D1,
        TextureDimension::D2 => wgpu::TextureDimension::D2,
        TextureDimension::D3 => wgpu::TextureDimension::D3,
    }
}

fn map_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsage::COPY_SRC) {
        out |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::STORAGE) {
        out |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    out
}
