//! Uniform reflection and fragment-shader wrapping.
//!
//! Effect shaders are written as plain GLSL with ordinary `uniform`
//! declarations, the way the original WebGL sources read. Before handing a
//! fragment to `wgpu` we scan those declarations into a typed descriptor
//! table, strip them from the body, and prepend a generated header that packs
//! every non-sampler uniform into one std140 block (set 0) and every sampler
//! into a texture/sampler binding pair (set 1). `#define` aliases map the
//! original uniform names onto the generated block fields, so shader bodies
//! compile unchanged.

use std::collections::HashMap;

use crate::types::UniformValue;

/// Closed set of uniform value kinds understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    /// Fixed-length float array (std140 stride 16).
    FloatArray(usize),
    Sampler2d,
}

impl UniformKind {
    fn glsl_field(&self, name: &str) -> String {
        match self {
            UniformKind::Float => format!("float _{name};"),
            UniformKind::Int => format!("int _{name};"),
            UniformKind::Vec2 => format!("vec2 _{name};"),
            UniformKind::Vec3 => format!("vec3 _{name};"),
            UniformKind::Vec4 => format!("vec4 _{name};"),
            UniformKind::FloatArray(len) => format!("float _{name}[{len}];"),
            UniformKind::Sampler2d => unreachable!("samplers are not block fields"),
        }
    }

    fn alignment(&self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 | UniformKind::Vec4 | UniformKind::FloatArray(_) => 16,
            UniformKind::Sampler2d => 0,
        }
    }

    fn byte_size(&self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::FloatArray(len) => len * 16,
            UniformKind::Sampler2d => 0,
        }
    }
}

/// One uniform declaration recovered from a fragment source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedUniform {
    pub name: String,
    pub kind: UniformKind,
}

#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    #[error("uniform '{name}' has unsupported type '{ty}'")]
    UnsupportedType { name: String, ty: String },
    #[error("malformed uniform declaration: '{0}'")]
    Malformed(String),
    #[error("uniform '{0}' declared more than once")]
    Duplicate(String),
    #[error("uniform array '{0}' must have a positive literal length")]
    BadArrayLength(String),
}

/// Scans `uniform` declarations out of a fragment source, one per line.
///
/// Precision qualifiers are accepted and ignored; arrays are supported for
/// `float` only, matching the blur-kernel use the chain needs.
pub fn reflect_uniforms(source: &str) -> Result<Vec<ReflectedUniform>, ReflectError> {
    let mut uniforms: Vec<ReflectedUniform> = Vec::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("uniform ") else {
            continue;
        };
        let decl = rest
            .split_once(';')
            .map(|(decl, _)| decl)
            .ok_or_else(|| ReflectError::Malformed(trimmed.to_string()))?;
        let mut tokens = decl.split_whitespace().filter(|token| {
            !matches!(*token, "highp" | "mediump" | "lowp")
        });
        let ty = tokens
            .next()
            .ok_or_else(|| ReflectError::Malformed(trimmed.to_string()))?;
        let ident = tokens
            .next()
            .ok_or_else(|| ReflectError::Malformed(trimmed.to_string()))?;
        if tokens.next().is_some() {
            return Err(ReflectError::Malformed(trimmed.to_string()));
        }

        let (name, array_len) = match ident.split_once('[') {
            Some((name, rest)) => {
                let len = rest
                    .strip_suffix(']')
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .filter(|len| *len > 0)
                    .ok_or_else(|| ReflectError::BadArrayLength(name.to_string()))?;
                (name, Some(len))
            }
            None => (ident, None),
        };

        let kind = match (ty, array_len) {
            ("float", None) => UniformKind::Float,
            ("int", None) => UniformKind::Int,
            ("vec2", None) => UniformKind::Vec2,
            ("vec3", None) => UniformKind::Vec3,
            ("vec4", None) => UniformKind::Vec4,
            ("float", Some(len)) => UniformKind::FloatArray(len),
            ("sampler2D", None) => UniformKind::Sampler2d,
            _ => {
                return Err(ReflectError::UnsupportedType {
                    name: name.to_string(),
                    ty: ty.to_string(),
                })
            }
        };

        if uniforms.iter().any(|existing| existing.name == name) {
            return Err(ReflectError::Duplicate(name.to_string()));
        }
        uniforms.push(ReflectedUniform {
            name: name.to_string(),
            kind,
        });
    }
    Ok(uniforms)
}

/// One entry of a pass's uniform descriptor table.
#[derive(Debug, Clone)]
pub struct UniformSlot {
    pub name: String,
    pub kind: UniformKind,
    /// Byte offset inside the pass's std140 buffer. Unused for samplers.
    pub offset: usize,
}

/// Outcome of staging a value into a pass's CPU uniform bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    UnknownName,
    KindMismatch,
}

/// Typed per-pass uniform descriptor table with std140 offsets, built once at
/// compile time from the reflected declaration list.
#[derive(Debug, Clone)]
pub struct UniformLayout {
    fields: Vec<UniformSlot>,
    index: HashMap<String, usize>,
    size: usize,
    samplers: Vec<String>,
}

impl UniformLayout {
    pub fn from_reflected(uniforms: &[ReflectedUniform]) -> Self {
        let mut fields = Vec::new();
        let mut index = HashMap::new();
        let mut samplers = Vec::new();
        let mut offset = 0usize;
        for uniform in uniforms {
            if uniform.kind == UniformKind::Sampler2d {
                samplers.push(uniform.name.clone());
                continue;
            }
            let alignment = uniform.kind.alignment();
            offset = offset.div_ceil(alignment) * alignment;
            index.insert(uniform.name.clone(), fields.len());
            fields.push(UniformSlot {
                name: uniform.name.clone(),
                kind: uniform.kind,
                offset,
            });
            offset += uniform.kind.byte_size();
        }
        let size = offset.div_ceil(16) * 16;
        Self {
            fields,
            index,
            size,
            samplers,
        }
    }

    /// Block fields in declaration order (samplers excluded).
    pub fn fields(&self) -> &[UniformSlot] {
        &self.fields
    }

    /// Sampler uniform names in declaration order; index i maps to texture
    /// binding 2i and sampler binding 2i+1 in set 1.
    pub fn samplers(&self) -> &[String] {
        &self.samplers
    }

    /// Size of the std140 buffer in bytes, 16-byte padded. Zero when the pass
    /// declares no non-sampler uniforms.
    pub fn buffer_size(&self) -> usize {
        self.size
    }

    pub fn field(&self, name: &str) -> Option<&UniformSlot> {
        self.index.get(name).map(|i| &self.fields[*i])
    }

    pub fn has_sampler(&self, name: &str) -> bool {
        self.samplers.iter().any(|sampler| sampler == name)
    }

    /// Stages `value` into `bytes` at the slot registered for `name`.
    ///
    /// Texture values are not buffer data and report `KindMismatch` here;
    /// they are resolved during bind-group assembly instead.
    pub fn write(&self, name: &str, value: &UniformValue, bytes: &mut [u8]) -> WriteOutcome {
        let Some(slot) = self.field(name) else {
            return WriteOutcome::UnknownName;
        };
        let offset = slot.offset;
        match (slot.kind, value) {
            (UniformKind::Float, UniformValue::Float(v)) => {
                bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
            }
            (UniformKind::Int, UniformValue::Int(v)) => {
                bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
            }
            (UniformKind::Vec2, UniformValue::Vec2(v)) => {
                bytes[offset..offset + 8].copy_from_slice(bytemuck::cast_slice(v));
            }
            (UniformKind::Vec3, UniformValue::Vec3(v)) => {
                bytes[offset..offset + 12].copy_from_slice(bytemuck::cast_slice(v));
            }
            (UniformKind::Vec4, UniformValue::Vec4(v)) => {
                bytes[offset..offset + 16].copy_from_slice(bytemuck::cast_slice(v));
            }
            (UniformKind::FloatArray(len), UniformValue::FloatArray(values)) => {
                if values.len() > len {
                    return WriteOutcome::KindMismatch;
                }
                for (i, v) in values.iter().enumerate() {
                    let at = offset + i * 16;
                    bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
                }
                for i in values.len()..len {
                    let at = offset + i * 16;
                    bytes[at..at + 4].copy_from_slice(&0.0f32.to_le_bytes());
                }
            }
            _ => return WriteOutcome::KindMismatch,
        }
        WriteOutcome::Written
    }
}

/// Produces a self-contained `#version 450` fragment from a plain effect
/// shader.
///
/// Steps:
/// 1. Strip `#version`, `precision`, and `uniform` lines from the body.
/// 2. Prepend the generated header: `v_uv`/`fragColor` interface, the std140
///    block with `#define` aliases, and texture/sampler pairs for every
///    sampler uniform.
pub fn wrap_fragment(source: &str, layout: &UniformLayout) -> String {
    let mut body = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#version")
            || trimmed.starts_with("precision ")
            || trimmed.starts_with("uniform ")
        {
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }

    let mut header = String::from(
        "#version 450\n\
         layout(location = 0) in vec2 v_uv;\n\
         layout(location = 0) out vec4 fragColor;\n",
    );

    if !layout.fields().is_empty() {
        header.push_str("layout(std140, set = 0, binding = 0) uniform GlassParams {\n");
        for slot in layout.fields() {
            header.push_str("    ");
            header.push_str(&slot.kind.glsl_field(&slot.name));
            header.push('\n');
        }
        header.push_str("} glass_ubo;\n");
        for slot in layout.fields() {
            header.push_str(&format!("#define {name} glass_ubo._{name}\n", name = slot.name));
        }
    }

    for (i, name) in layout.samplers().iter().enumerate() {
        header.push_str(&format!(
            "layout(set = 1, binding = {tex}) uniform texture2D glass_tex{i};\n\
             layout(set = 1, binding = {samp}) uniform sampler glass_samp{i};\n\
             #define {name} sampler2D(glass_tex{i}, glass_samp{i})\n",
            tex = i * 2,
            samp = i * 2 + 1,
        ));
    }

    format!("{header}#line 1\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        precision highp float;
        uniform vec2 u_resolution;
        uniform float u_dpr;
        uniform int u_bgType;
        uniform sampler2D u_bgTexture;
        uniform vec3 u_light;
        uniform float u_weights[8];
        uniform vec4 u_tint;

        void main() {
            fragColor = vec4(v_uv, 0.0, 1.0) * u_tint;
        }
    "#;

    #[test]
    fn reflects_declarations_in_order() {
        let uniforms = reflect_uniforms(SAMPLE).expect("reflect");
        let names: Vec<_> = uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "u_resolution",
                "u_dpr",
                "u_bgType",
                "u_bgTexture",
                "u_light",
                "u_weights",
                "u_tint"
            ]
        );
        assert_eq!(uniforms[3].kind, UniformKind::Sampler2d);
        assert_eq!(uniforms[5].kind, UniformKind::FloatArray(8));
    }

    #[test]
    fn rejects_unsupported_types() {
        let err = reflect_uniforms("uniform mat4 u_model;").unwrap_err();
        assert!(matches!(err, ReflectError::UnsupportedType { .. }));
    }

    #[test]
    fn rejects_duplicates() {
        let err = reflect_uniforms("uniform float u_x;\nuniform vec2 u_x;").unwrap_err();
        assert!(matches!(err, ReflectError::Duplicate(name) if name == "u_x"));
    }

    #[test]
    fn rejects_non_literal_array_lengths() {
        let err = reflect_uniforms("uniform float u_w[KERNEL];").unwrap_err();
        assert!(matches!(err, ReflectError::BadArrayLength(_)));
    }

    #[test]
    fn std140_offsets_follow_alignment_rules() {
        let uniforms = reflect_uniforms(SAMPLE).expect("reflect");
        let layout = UniformLayout::from_reflected(&uniforms);
        let offsets: Vec<_> = layout
            .fields()
            .iter()
            .map(|slot| (slot.name.as_str(), slot.offset))
            .collect();
        // vec2 @0, float @8, int @12, vec3 @16 (size 12), float[8] @32
        // (stride 16), vec4 @160.
        assert_eq!(
            offsets,
            [
                ("u_resolution", 0),
                ("u_dpr", 8),
                ("u_bgType", 12),
                ("u_light", 16),
                ("u_weights", 32),
                ("u_tint", 160),
            ]
        );
        assert_eq!(layout.buffer_size(), 176);
        assert_eq!(layout.samplers(), ["u_bgTexture".to_string()]);
    }

    #[test]
    fn float_after_vec3_packs_into_tail() {
        let uniforms =
            reflect_uniforms("uniform vec3 u_a;\nuniform float u_b;").expect("reflect");
        let layout = UniformLayout::from_reflected(&uniforms);
        assert_eq!(layout.field("u_a").unwrap().offset, 0);
        assert_eq!(layout.field("u_b").unwrap().offset, 12);
        assert_eq!(layout.buffer_size(), 16);
    }

    #[test]
    fn write_respects_kinds_and_pads_arrays() {
        let uniforms = reflect_uniforms("uniform float u_w[4];\nuniform vec2 u_r;").unwrap();
        let layout = UniformLayout::from_reflected(&uniforms);
        let mut bytes = vec![0u8; layout.buffer_size()];

        assert_eq!(
            layout.write("u_w", &UniformValue::FloatArray(vec![1.0, 2.0]), &mut bytes),
            WriteOutcome::Written
        );
        assert_eq!(
            layout.write("u_r", &UniformValue::Vec2([3.0, 4.0]), &mut bytes),
            WriteOutcome::Written
        );
        assert_eq!(
            layout.write("u_r", &UniformValue::Float(1.0), &mut bytes),
            WriteOutcome::KindMismatch
        );
        assert_eq!(
            layout.write("nope", &UniformValue::Float(1.0), &mut bytes),
            WriteOutcome::UnknownName
        );
        assert_eq!(
            layout.write(
                "u_w",
                &UniformValue::FloatArray(vec![0.0; 5]),
                &mut bytes
            ),
            WriteOutcome::KindMismatch,
            "arrays longer than declared must be rejected"
        );

        let stride = 16;
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[stride..stride + 4], &2.0f32.to_le_bytes());
        assert_eq!(&bytes[2 * stride..2 * stride + 4], &0.0f32.to_le_bytes());
    }

    #[test]
    fn wrap_strips_declarations_and_generates_bindings() {
        let uniforms = reflect_uniforms(SAMPLE).expect("reflect");
        let layout = UniformLayout::from_reflected(&uniforms);
        let wrapped = wrap_fragment(SAMPLE, &layout);
        assert!(wrapped.starts_with("#version 450"));
        assert!(!wrapped.contains("uniform vec2 u_resolution"));
        assert!(!wrapped.contains("precision highp"));
        assert!(wrapped.contains("uniform GlassParams"));
        assert!(wrapped.contains("#define u_tint glass_ubo._u_tint"));
        assert!(wrapped.contains("layout(set = 1, binding = 0) uniform texture2D glass_tex0;"));
        assert!(wrapped.contains("#define u_bgTexture sampler2D(glass_tex0, glass_samp0)"));
        assert!(wrapped.contains("void main()"));
    }

    #[test]
    fn empty_layout_generates_no_block() {
        let layout = UniformLayout::from_reflected(&[]);
        assert_eq!(layout.buffer_size(), 0);
        let wrapped = wrap_fragment("void main() { fragColor = vec4(1.0); }", &layout);
        assert!(!wrapped.contains("GlassParams"));
    }
}
