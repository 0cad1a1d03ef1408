use std::collections::BTreeMap;

use crate::gpu::texture::TextureHandle;

/// Describes one full-screen shader pass before compilation.
///
/// Passes form an ordered chain: `inputs` maps a sampler uniform declared in
/// `fragment_source` to the name of an earlier pass whose output should feed
/// it. Exactly one declaration sets `output_to_screen`, and it must be the
/// last one in the list.
#[derive(Clone, Debug)]
pub struct PassDeclaration {
    /// Unique pass name, also the key for per-pass uniform overrides.
    pub name: String,
    /// GLSL vertex source compiled as-is (expected to emit the shared quad).
    pub vertex_source: String,
    /// Plain GLSL fragment source with ordinary `uniform` declarations; the
    /// pipeline reflects and rewrites these before compilation.
    pub fragment_source: String,
    /// Sampler uniform name -> earlier pass name.
    pub inputs: BTreeMap<String, String>,
    /// When set, the pass renders into the caller-provided surface view
    /// instead of an owned offscreen target.
    pub output_to_screen: bool,
    /// Blend state for the pass's color target; `None` disables blending.
    pub blend: Option<wgpu::BlendState>,
}

impl PassDeclaration {
    /// Creates a pass rendering into an offscreen target with no inputs.
    pub fn new(
        name: impl Into<String>,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            inputs: BTreeMap::new(),
            output_to_screen: false,
            blend: None,
        }
    }

    /// Binds `sampler_uniform` to the output of the earlier pass `source`.
    pub fn with_input(
        mut self,
        sampler_uniform: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.inputs.insert(sampler_uniform.into(), source.into());
        self
    }

    /// Marks this pass as the final screen output.
    pub fn to_screen(mut self) -> Self {
        self.output_to_screen = true;
        self
    }
}

/// A uniform value staged on the CPU and applied at render time.
///
/// The set of kinds is closed; each pass's reflected descriptor table decides
/// whether a value of a given kind may be written to a given slot.
#[derive(Clone, Debug)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Kernel weights and similar; padded with zeroes up to the declared
    /// array length, rejected if longer.
    FloatArray(Vec<f32>),
    Texture(TextureHandle),
}

impl UniformValue {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "float",
            UniformValue::Int(_) => "int",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec3(_) => "vec3",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::FloatArray(_) => "float[]",
            UniformValue::Texture(_) => "sampler2D",
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<Vec<f32>> for UniformValue {
    fn from(value: Vec<f32>) -> Self {
        UniformValue::FloatArray(value)
    }
}

impl From<TextureHandle> for UniformValue {
    fn from(value: TextureHandle) -> Self {
        UniformValue::Texture(value)
    }
}

/// Per-call uniform overrides keyed by pass name; the innermost map wins over
/// persistent per-pass overrides and globals on name collision.
pub type PassOverrides = BTreeMap<String, BTreeMap<String, UniformValue>>;

/// Runtime failures of an already-compiled pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("pipeline has been disposed")]
    Disposed,
    #[error("requested target size {width}x{height} exceeds device limit {limit}")]
    TargetTooLarge { width: u32, height: u32, limit: u32 },
    #[error("target dimensions must be non-zero (got {width}x{height})")]
    EmptyTarget { width: u32, height: u32 },
}
