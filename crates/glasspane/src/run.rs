//! Window host: owns the event loop, the GPU context, and the per-frame
//! update. Event handlers only enqueue intents into [`FrameContext`]; the
//! redraw step drains them, services the background slot and spring, and
//! drives the four-pass chain.

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use glassconfig::{AppConfig, BackgroundEntry, BackgroundKind};
use pipeline::{
    BackgroundSlot, GpuContext, ImageSource, PassDeclaration, Pipeline, PointerSpring,
    SpringConfig,
};

use crate::cli::RunArgs;
use crate::controls::{self, PointerUniforms};
use crate::state::FrameContext;
use crate::video::SyntheticVideo;

const VERTEX_SHADER: &str = include_str!("../shaders/quad.vert");
const BG_FRAGMENT: &str = include_str!("../shaders/bg.frag");
const VBLUR_FRAGMENT: &str = include_str!("../shaders/vblur.frag");
const HBLUR_FRAGMENT: &str = include_str!("../shaders/hblur.frag");
const GLASS_FRAGMENT: &str = include_str!("../shaders/glass.frag");

const DEFAULT_SIZE: (u32, u32) = (1280, 720);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// The four-pass liquid-glass chain: background, two separable blur passes,
/// and the glass composite on screen.
fn declarations() -> Vec<PassDeclaration> {
    vec![
        PassDeclaration::new("bg", VERTEX_SHADER, BG_FRAGMENT),
        PassDeclaration::new("vblur", VERTEX_SHADER, VBLUR_FRAGMENT)
            .with_input("u_prevPassTexture", "bg"),
        PassDeclaration::new("hblur", VERTEX_SHADER, HBLUR_FRAGMENT)
            .with_input("u_prevPassTexture", "vblur"),
        PassDeclaration::new("glass", VERTEX_SHADER, GLASS_FRAGMENT)
            .with_input("u_blurredBg", "hblur")
            .with_input("u_bg", "bg")
            .to_screen(),
    ]
}

/// Built-in catalog used when the config supplies no backgrounds.
fn default_catalog() -> Vec<BackgroundEntry> {
    let pattern = |name: &str, pattern| BackgroundEntry {
        name: name.into(),
        kind: BackgroundKind::Pattern,
        source: None,
        pattern,
    };
    vec![
        pattern("grid", 0),
        pattern("bars", 1),
        pattern("checker", 2),
        BackgroundEntry {
            name: "flow".into(),
            kind: BackgroundKind::Video,
            source: Some("synthetic:640x360@30".into()),
            pattern: 0,
        },
    ]
}

pub fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if config.backgrounds.is_empty() {
        config.backgrounds = default_catalog();
    }
    if let Some(path) = &args.preset {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read preset from {}", path.display()))?;
        config
            .effect
            .apply_preset(&json)
            .with_context(|| format!("failed to apply preset from {}", path.display()))?;
        tracing::info!(preset = %path.display(), "parameter preset applied");
    }

    let (width, height) = args.size.unwrap_or(DEFAULT_SIZE);
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window = WindowBuilder::new()
        .with_title("glasspane")
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .context("failed to create window")?;
    let window = Arc::new(window);

    let mut app = WindowState::new(window.clone(), config)?;
    app.bootstrap_background(args.background.as_deref());
    app.window.request_redraw();

    event_loop
        .run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            match event {
                Event::WindowEvent { window_id, event } if window_id == app.window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                        WindowEvent::KeyboardInput {
                            event:
                                KeyEvent {
                                    logical_key,
                                    state: ElementState::Pressed,
                                    ..
                                },
                            ..
                        } => app.handle_key(&logical_key, elwt),
                        WindowEvent::Resized(size) => app.ctx.request_resize(size),
                        WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                            app.ctx.record_scale_factor(scale_factor);
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            let height = app.window.inner_size().height as f32;
                            app.ctx.push_pointer(
                                [position.x as f32, height - position.y as f32],
                                Instant::now(),
                            );
                        }
                        WindowEvent::RedrawRequested => {
                            if let Err(error) = app.redraw() {
                                tracing::error!(%error, "render step failed");
                                elwt.exit();
                            }
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => app.window.request_redraw(),
                Event::LoopExiting => app.shutdown(),
                _ => {}
            }
        })
        .context("event loop terminated with an error")?;
    Ok(())
}

struct WindowState {
    window: Arc<Window>,
    gpu: GpuContext,
    pipeline: Pipeline,
    background: BackgroundSlot,
    spring: PointerSpring,
    ctx: FrameContext,
    config: AppConfig,
    kernel: Vec<f32>,
    pattern: u32,
    dpr: f32,
    last_frame: Instant,
}

impl WindowState {
    fn new(window: Arc<Window>, config: AppConfig) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuContext::new(window.as_ref(), size)?;
        let pipeline = Pipeline::compile(
            &gpu.device,
            &gpu.queue,
            &declarations(),
            size.width,
            size.height,
            gpu.surface_format,
        )
        .context("failed to compile the effect chain")?;

        let kernel = controls::gaussian_kernel(config.effect.blur_radius);
        let spring = PointerSpring::new(SpringConfig {
            stiffness: config.pointer.stiffness,
            damping_ratio: config.pointer.damping_ratio,
        });
        let dpr = window.scale_factor() as f32;

        Ok(Self {
            window,
            gpu,
            pipeline,
            background: BackgroundSlot::new(),
            spring,
            ctx: FrameContext::new(),
            config,
            kernel,
            pattern: 0,
            dpr,
            last_frame: Instant::now(),
        })
    }

    /// Queues the starting background: a catalog entry by name, the first
    /// entry when nothing was requested, or an ad-hoc image path/URL.
    fn bootstrap_background(&mut self, requested: Option<&str>) {
        match requested {
            None => {
                if !self.config.backgrounds.is_empty() {
                    self.ctx.request_background(0);
                }
            }
            Some(spec) => {
                if let Some(index) = self
                    .config
                    .backgrounds
                    .iter()
                    .position(|entry| entry.name == spec)
                {
                    self.ctx.request_background(index);
                } else {
                    tracing::info!(source = spec, "background not in catalog; loading as image");
                    self.background.set_image(ImageSource::parse(spec));
                }
            }
        }
    }

    fn handle_key(&mut self, key: &Key, elwt: &winit::event_loop::EventLoopWindowTarget<()>) {
        match key {
            Key::Named(NamedKey::Escape) => elwt.exit(),
            Key::Character(text) => {
                if let Some(digit) = text.chars().next().and_then(|c| c.to_digit(10)) {
                    if digit >= 1 {
                        let index = (digit - 1) as usize;
                        if index < self.config.backgrounds.len() {
                            self.ctx.request_background(index);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn apply_background(&mut self, index: usize) {
        let Some(entry) = self.config.backgrounds.get(index) else {
            tracing::warn!(index, "background request out of catalog range");
            return;
        };
        tracing::info!(name = %entry.name, kind = ?entry.kind, "switching background");
        self.pattern = entry.pattern;
        match entry.kind {
            BackgroundKind::Pattern => self.background.clear(),
            BackgroundKind::Image => {
                let source = entry.source.as_deref().unwrap_or_default();
                self.background.set_image(ImageSource::parse(source));
            }
            BackgroundKind::Video => {
                self.background.set_video(
                    &self.gpu.device,
                    &self.gpu.queue,
                    Box::new(SyntheticVideo::new(640, 360, 30.0)),
                );
            }
        }
    }

    fn redraw(&mut self) -> Result<()> {
        if let Some(scale_factor) = self.ctx.take_scale_factor() {
            self.dpr = scale_factor as f32;
        }
        if let Some(size) = self.ctx.take_resize() {
            if size.width > 0 && size.height > 0 {
                self.gpu.resize(size);
                if let Err(error) = self.pipeline.resize(size.width, size.height) {
                    tracing::warn!(%error, "resize rejected; keeping previous targets");
                }
            }
        }
        if let Some(index) = self.ctx.take_background_request() {
            self.apply_background(index);
        }
        self.background.poll(&self.gpu.device, &self.gpu.queue);

        for sample in self.ctx.take_pointer_samples() {
            self.spring.push_sample(sample.position, sample.at);
        }
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.spring.advance(dt.as_secs_f32());

        let pointer = PointerUniforms {
            raw: self.spring.target().unwrap_or_default(),
            eased: self.spring.eased_position().unwrap_or_default(),
            velocity: self.spring.raw_velocity(),
        };
        let shape =
            controls::reactive_shape_size(&self.config.effect, &self.config.pointer, pointer.velocity);
        let size = self.gpu.size;
        self.pipeline.set_uniforms(controls::global_uniforms(
            &self.config.effect,
            &self.kernel,
            [size.width as f32, size.height as f32],
            self.dpr,
            pointer,
            shape,
        ));
        let overrides = controls::pass_overrides(
            &self.config.effect,
            self.pattern,
            self.background.background(),
        );

        let frame = match self.gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = self.gpu.size;
                self.gpu.resize(size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                anyhow::bail!("surface reported out of memory");
            }
            Err(error) => {
                tracing::warn!(%error, "skipping frame");
                return Ok(());
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.pipeline.render(&view, &overrides)?;
        frame.present();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.background.clear();
        self.pipeline.dispose();
    }
}
