//! The compiled pipeline and its per-frame render step.
//!
//! [`Pipeline::compile`] turns a validated pass list into GPU resources: one
//! render pipeline, uniform buffer, and (for offscreen passes) color target
//! per pass. [`Pipeline::render`] executes the chain once, in declaration
//! order, with uniform precedence global -> persistent per-pass -> per-call.

use std::borrow::Cow;
use std::collections::BTreeMap;

use wgpu::naga::ShaderStage;

use crate::types::{PassDeclaration, PassOverrides, RenderError, UniformValue};

use super::graph::{validate, GraphError};
use super::reflect::{wrap_fragment, UniformLayout, WriteOutcome};
use super::texture::{next_texture_id, TextureHandle};

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct OffscreenTarget {
    id: u64,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl OffscreenTarget {
    fn new(device: &wgpu::Device, name: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("pass target '{name}'")),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            id: next_texture_id(),
            texture,
            view,
        }
    }
}

struct CompiledPass {
    name: String,
    pipeline: wgpu::RenderPipeline,
    layout: UniformLayout,
    input_sources: BTreeMap<String, usize>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler_layout: Option<wgpu::BindGroupLayout>,
    sampler_bind_group: Option<wgpu::BindGroup>,
    bound_texture_ids: Vec<u64>,
    target: Option<OffscreenTarget>,
    overrides: BTreeMap<String, UniformValue>,
    staging: Vec<u8>,
}

/// A texture resolved for one sampler slot of one pass.
struct ResolvedSampler {
    id: u64,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

/// The compiled multi-pass effect chain.
pub struct Pipeline {
    device: wgpu::Device,
    queue: wgpu::Queue,
    passes: Vec<CompiledPass>,
    globals: BTreeMap<String, UniformValue>,
    placeholder: TextureHandle,
    pass_sampler: wgpu::Sampler,
    width: u32,
    height: u32,
    disposed: bool,
}

impl Pipeline {
    /// Validates `declarations` and builds every GPU resource the chain
    /// needs. Validation failures allocate nothing.
    pub fn compile(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        declarations: &[PassDeclaration],
        width: u32,
        height: u32,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, GraphError> {
        let plan = validate(declarations)?;
        tracing::debug!(
            passes = declarations.len(),
            intermediates = plan.intermediate_count(),
            "pass graph validated"
        );
        let width = width.max(1);
        let height = height.max(1);

        let placeholder = TextureHandle::placeholder(device, queue);
        let pass_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("pass output sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mut passes = Vec::with_capacity(declarations.len());
        for (declaration, pass_plan) in declarations.iter().zip(plan.passes) {
            let layout = pass_plan.layout;

            let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("vertex '{}'", declaration.name)),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Borrowed(&declaration.vertex_source),
                    stage: ShaderStage::Vertex,
                    defines: &[],
                },
            });
            let wrapped = wrap_fragment(&declaration.fragment_source, &layout);
            let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("fragment '{}'", declaration.name)),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Owned(wrapped),
                    stage: ShaderStage::Fragment,
                    defines: &[],
                },
            });

            let buffer_size = layout.buffer_size().max(16) as u64;
            let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("uniform layout '{}'", declaration.name)),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("uniforms '{}'", declaration.name)),
                size: buffer_size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("uniform bind group '{}'", declaration.name)),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

            let sampler_layout = if layout.samplers().is_empty() {
                None
            } else {
                Some(
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("sampler layout '{}'", declaration.name)),
                        entries: &build_sampler_layout_entries(layout.samplers().len()),
                    }),
                )
            };

            let mut bind_group_layouts = vec![&uniform_layout];
            if let Some(samplers) = sampler_layout.as_ref() {
                bind_group_layouts.push(samplers);
            }
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("pipeline layout '{}'", declaration.name)),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });

            let target_format = if declaration.output_to_screen {
                surface_format
            } else {
                OFFSCREEN_FORMAT
            };
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("pass '{}'", declaration.name)),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some("main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: declaration.blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });

            let target = if declaration.output_to_screen {
                None
            } else {
                Some(OffscreenTarget::new(device, &declaration.name, width, height))
            };

            let staging = vec![0u8; layout.buffer_size()];
            passes.push(CompiledPass {
                name: declaration.name.clone(),
                pipeline,
                layout,
                input_sources: pass_plan.input_sources,
                uniform_buffer,
                uniform_bind_group,
                sampler_layout,
                sampler_bind_group: None,
                bound_texture_ids: Vec::new(),
                target,
                overrides: BTreeMap::new(),
                staging,
            });
        }

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            passes,
            globals: BTreeMap::new(),
            placeholder,
            pass_sampler,
            width,
            height,
            disposed: false,
        })
    }

    /// Current offscreen target dimensions.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Stores a global uniform applied to every pass that declares the name,
    /// unless shadowed by a per-pass value.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.globals.insert(name.into(), value.into());
    }

    /// Stores several globals at once.
    pub fn set_uniforms<I, K, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UniformValue>,
    {
        for (name, value) in values {
            self.globals.insert(name.into(), value.into());
        }
    }

    /// Stores a persistent override for one pass; wins over globals, loses to
    /// per-call values.
    pub fn set_pass_uniform(
        &mut self,
        pass: &str,
        name: impl Into<String>,
        value: impl Into<UniformValue>,
    ) {
        match self.passes.iter_mut().find(|candidate| candidate.name == pass) {
            Some(compiled) => {
                compiled.overrides.insert(name.into(), value.into());
            }
            None => tracing::warn!(pass, "per-pass uniform targets unknown pass"),
        }
    }

    /// Reallocates every intermediate target to the new dimensions.
    ///
    /// A repeated call with unchanged dimensions does nothing. Replacement
    /// targets are fully built before any swap, so a failure leaves the
    /// previous resources intact and later frames valid.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }
        if width == self.width && height == self.height {
            return Ok(());
        }
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(RenderError::TargetTooLarge {
                width,
                height,
                limit,
            });
        }

        let replacements: Vec<Option<OffscreenTarget>> = self
            .passes
            .iter()
            .map(|pass| {
                pass.target
                    .as_ref()
                    .map(|_| OffscreenTarget::new(&self.device, &pass.name, width, height))
            })
            .collect();
        for (pass, replacement) in self.passes.iter_mut().zip(replacements) {
            if let Some(old) = std::mem::replace(&mut pass.target, replacement) {
                old.texture.destroy();
            }
            pass.sampler_bind_group = None;
            pass.bound_texture_ids.clear();
        }
        self.width = width;
        self.height = height;
        tracing::debug!(width, height, "intermediate targets reallocated");
        Ok(())
    }

    /// Executes the chain exactly once: offscreen passes into their own
    /// targets, the final pass into `screen`.
    pub fn render(
        &mut self,
        screen: &wgpu::TextureView,
        overrides: &PassOverrides,
    ) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }

        // Outputs snapshotted up front; a pass only ever reads targets of
        // earlier passes, which this frame has already redrawn by the time
        // they are sampled.
        let outputs: Vec<Option<(u64, wgpu::TextureView)>> = self
            .passes
            .iter()
            .map(|pass| pass.target.as_ref().map(|t| (t.id, t.view.clone())))
            .collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("effect chain encoder"),
            });

        for index in 0..self.passes.len() {
            let call_overrides = overrides.get(&self.passes[index].name);
            self.stage_uniforms(index, call_overrides);
            let resolved = self.resolve_samplers(index, &outputs, call_overrides);
            self.refresh_sampler_bind_group(index, resolved);

            let pass = &self.passes[index];
            if !pass.staging.is_empty() {
                self.queue
                    .write_buffer(&pass.uniform_buffer, 0, &pass.staging);
            }

            let attachment = match pass.target.as_ref() {
                Some(target) => &target.view,
                None => screen,
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&pass.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: attachment,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&pass.pipeline);
            render_pass.set_bind_group(0, &pass.uniform_bind_group, &[]);
            if let Some(samplers) = pass.sampler_bind_group.as_ref() {
                render_pass.set_bind_group(1, samplers, &[]);
            }
            render_pass.draw(0..6, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Releases every owned GPU resource. Idempotent; `render` and `resize`
    /// fail with [`RenderError::Disposed`] afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for pass in &mut self.passes {
            if let Some(target) = pass.target.take() {
                target.texture.destroy();
            }
            pass.uniform_buffer.destroy();
        }
        self.passes.clear();
        self.globals.clear();
        self.disposed = true;
        tracing::debug!("pipeline disposed");
    }

    /// Merges global, persistent per-pass, and per-call uniforms into the
    /// pass's staging bytes. The buffer is rewritten from zero each frame so
    /// its contents are fully determined by the current stores.
    fn stage_uniforms(
        &mut self,
        index: usize,
        call_overrides: Option<&BTreeMap<String, UniformValue>>,
    ) {
        let (globals, pass) = (&self.globals, &mut self.passes[index]);
        pass.staging.fill(0);
        let names: Vec<String> = pass
            .layout
            .fields()
            .iter()
            .map(|slot| slot.name.clone())
            .collect();
        for name in names {
            let mut value = call_overrides.and_then(|map| map.get(&name));
            if value.is_none() {
                value = pass.overrides.get(&name);
            }
            if value.is_none() {
                value = globals.get(&name);
            }
            let Some(value) = value else { continue };
            if matches!(value, UniformValue::Texture(_)) {
                continue;
            }
            if pass.layout.write(&name, value, &mut pass.staging) == WriteOutcome::KindMismatch {
                tracing::warn!(
                    pass = %pass.name,
                    uniform = %name,
                    kind = value.kind_name(),
                    "uniform value kind does not match shader declaration; skipped"
                );
            }
        }
    }

    /// Resolves each sampler slot of a pass to a concrete texture: a
    /// declared earlier-pass output, an externally supplied texture value,
    /// or the placeholder.
    fn resolve_samplers(
        &self,
        index: usize,
        outputs: &[Option<(u64, wgpu::TextureView)>],
        call_overrides: Option<&BTreeMap<String, UniformValue>>,
    ) -> Vec<ResolvedSampler> {
        let pass = &self.passes[index];
        pass.layout
            .samplers()
            .iter()
            .map(|name| {
                if let Some(source) = pass.input_sources.get(name) {
                    let (id, view) = outputs[*source]
                        .as_ref()
                        .expect("validated inputs always reference offscreen passes");
                    return ResolvedSampler {
                        id: *id,
                        view: view.clone(),
                        sampler: self.pass_sampler.clone(),
                    };
                }
                let external = call_overrides
                    .and_then(|map| map.get(name))
                    .or_else(|| pass.overrides.get(name))
                    .or_else(|| self.globals.get(name));
                match external {
                    Some(UniformValue::Texture(handle)) => ResolvedSampler {
                        id: handle.id(),
                        view: handle.view().clone(),
                        sampler: handle.sampler().clone(),
                    },
                    Some(other) => {
                        tracing::warn!(
                            pass = %pass.name,
                            uniform = %name,
                            kind = other.kind_name(),
                            "sampler uniform needs a texture value; using placeholder"
                        );
                        self.placeholder_sampler()
                    }
                    None => self.placeholder_sampler(),
                }
            })
            .collect()
    }

    fn placeholder_sampler(&self) -> ResolvedSampler {
        ResolvedSampler {
            id: self.placeholder.id(),
            view: self.placeholder.view().clone(),
            sampler: self.placeholder.sampler().clone(),
        }
    }

    /// Rebuilds a pass's texture bind group only when the resolved id set
    /// changed since the last frame.
    fn refresh_sampler_bind_group(&mut self, index: usize, resolved: Vec<ResolvedSampler>) {
        let device = self.device.clone();
        let pass = &mut self.passes[index];
        let Some(layout) = pass.sampler_layout.as_ref() else {
            return;
        };
        let ids: Vec<u64> = resolved.iter().map(|r| r.id).collect();
        if pass.sampler_bind_group.is_some() && ids == pass.bound_texture_ids {
            return;
        }
        let mut entries = Vec::with_capacity(resolved.len() * 2);
        for (i, sampler) in resolved.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i as u32) * 2,
                resource: wgpu::BindingResource::TextureView(&sampler.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (i as u32) * 2 + 1,
                resource: wgpu::BindingResource::Sampler(&sampler.sampler),
            });
        }
        pass.sampler_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("sampler bind group '{}'", pass.name)),
            layout,
            entries: &entries,
        }));
        pass.bound_texture_ids = ids;
    }
}

fn build_sampler_layout_entries(count: usize) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(count * 2);
    for index in 0..count {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}
