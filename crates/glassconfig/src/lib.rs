//! Configuration for the glasspane application: effect parameters, pointer
//! spring tuning, and the background catalog. Everything is plain data; the
//! renderer treats effect parameters as an opaque uniform source.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to parse parameter preset: {0}")]
    PresetParse(#[from] serde_json::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

const SUPPORTED_VERSION: u32 = 1;

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub effect: EffectParams,
    #[serde(default)]
    pub pointer: PointerParams,
    #[serde(default, rename = "background")]
    pub backgrounds: Vec<BackgroundEntry>,
}

fn default_version() -> u32 {
    SUPPORTED_VERSION
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            effect: EffectParams::default(),
            pointer: PointerParams::default(),
            backgrounds: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {} (expected {SUPPORTED_VERSION})",
                self.version
            )));
        }
        for entry in &self.backgrounds {
            if entry.name.is_empty() {
                return Err(ConfigError::Invalid(
                    "background entries need a non-empty name".into(),
                ));
            }
            match entry.kind {
                BackgroundKind::Pattern => {}
                BackgroundKind::Image | BackgroundKind::Video => {
                    if entry.source.as_deref().unwrap_or("").is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "background '{}' needs a source path or URL",
                            entry.name
                        )));
                    }
                }
            }
        }
        self.effect.validate()?;
        self.pointer.validate()?;
        Ok(())
    }

    /// Looks a background entry up by name.
    pub fn background(&self, name: &str) -> Option<&BackgroundEntry> {
        self.backgrounds.iter().find(|entry| entry.name == name)
    }
}

/// What a background entry renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    /// Procedural pattern drawn by the background shader itself.
    Pattern,
    Image,
    Video,
}

/// One selectable background.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackgroundEntry {
    pub name: String,
    pub kind: BackgroundKind,
    /// Path or http(s) URL for image/video kinds; pattern index selector for
    /// procedural kinds.
    #[serde(default)]
    pub source: Option<String>,
    /// Which procedural pattern the background shader draws when no texture
    /// is bound.
    #[serde(default)]
    pub pattern: u32,
}

/// Pointer spring tuning.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PointerParams {
    /// Spring stiffness in 1/s^2.
    pub stiffness: f32,
    /// 1.0 is critical damping.
    pub damping_ratio: f32,
    /// How strongly pointer speed inflates the glass shape, percent.
    pub size_factor: f32,
}

impl Default for PointerParams {
    fn default() -> Self {
        Self {
            stiffness: 170.0,
            damping_ratio: 1.0,
            size_factor: 40.0,
        }
    }
}

impl PointerParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.stiffness <= 0.0 {
            return Err(ConfigError::Invalid(
                "pointer.stiffness must be positive".into(),
            ));
        }
        if self.damping_ratio < 0.0 {
            return Err(ConfigError::Invalid(
                "pointer.damping_ratio must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// The full set of effect knobs the control surface exposes.
///
/// Field meanings mirror the shader uniforms one-to-one; the pipeline never
/// interprets them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EffectParams {
    pub blur_radius: u32,
    pub shape_width: f32,
    pub shape_height: f32,
    /// Corner radius as a percentage of the smaller shape half-extent.
    pub shape_radius: f32,
    pub shape_roundness: f32,
    pub merge_rate: f32,
    pub show_second_shape: bool,
    /// RGBA, each channel 0..=1.
    pub tint: [f32; 4],
    pub refraction_thickness: f32,
    pub refraction_factor: f32,
    pub refraction_dispersion: f32,
    pub fresnel_range: f32,
    /// Percent.
    pub fresnel_hardness: f32,
    /// Percent.
    pub fresnel_factor: f32,
    /// Degrees.
    pub glare_angle: f32,
    pub glare_range: f32,
    /// Percent.
    pub glare_hardness: f32,
    /// Percent.
    pub glare_convergence: f32,
    /// Percent.
    pub glare_opposite_factor: f32,
    /// Percent.
    pub glare_factor: f32,
    pub blur_edge: bool,
    pub shadow_expand: f32,
    /// Percent.
    pub shadow_factor: f32,
    pub shadow_position: [f32; 2],
    pub debug_step: i32,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            blur_radius: 20,
            shape_width: 200.0,
            shape_height: 200.0,
            shape_radius: 80.0,
            shape_roundness: 5.0,
            merge_rate: 0.05,
            show_second_shape: false,
            tint: [1.0, 1.0, 1.0, 0.2],
            refraction_thickness: 20.0,
            refraction_factor: 1.4,
            refraction_dispersion: 7.0,
            fresnel_range: 30.0,
            fresnel_hardness: 20.0,
            fresnel_factor: 20.0,
            glare_angle: -45.0,
            glare_range: 30.0,
            glare_hardness: 20.0,
            glare_convergence: 50.0,
            glare_opposite_factor: 80.0,
            glare_factor: 90.0,
            blur_edge: true,
            shadow_expand: 25.0,
            shadow_factor: 15.0,
            shadow_position: [0.0, -10.0],
            debug_step: 0,
        }
    }
}

impl EffectParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.blur_radius > MAX_BLUR_RADIUS {
            return Err(ConfigError::Invalid(format!(
                "effect.blur_radius {} exceeds the supported maximum {MAX_BLUR_RADIUS}",
                self.blur_radius
            )));
        }
        if self.tint.iter().any(|channel| !(0.0..=1.0).contains(channel)) {
            return Err(ConfigError::Invalid(
                "effect.tint channels must be within 0..=1".into(),
            ));
        }
        Ok(())
    }

    /// Overlays a JSON preset (a flat name -> number/bool/array map, the
    /// export format of the original control panel) onto these parameters.
    /// Unknown names are rejected so typos surface instead of silently doing
    /// nothing.
    pub fn apply_preset(&mut self, json: &str) -> Result<(), ConfigError> {
        let values: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut merged = serde_json::to_value(&*self).map_err(ConfigError::PresetParse)?;
        let object = merged
            .as_object_mut()
            .ok_or_else(|| ConfigError::Invalid("parameters must serialize to an object".into()))?;
        for (name, value) in values {
            if !object.contains_key(&name) {
                return Err(ConfigError::Invalid(format!(
                    "preset names unknown parameter '{name}'"
                )));
            }
            object.insert(name, value);
        }
        *self = serde_json::from_value(merged).map_err(ConfigError::PresetParse)?;
        self.validate()
    }
}

/// Largest blur radius the blur shaders allocate kernel space for.
pub const MAX_BLUR_RADIUS: u32 = 63;

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[effect]
blur_radius = 24
shape_width = 240.0
tint = [0.9, 0.95, 1.0, 0.25]

[pointer]
stiffness = 210.0
size_factor = 55.0

[[background]]
name = "grid"
kind = "pattern"
pattern = 0

[[background]]
name = "tahoe"
kind = "image"
source = "assets/bg-tahoe.webp"

[[background]]
name = "fish"
kind = "video"
source = "assets/bg-fish.frames"
"#;

    #[test]
    fn parses_sample_config() {
        let config = AppConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.effect.blur_radius, 24);
        assert_eq!(config.effect.shape_width, 240.0);
        // Unset fields keep their defaults.
        assert_eq!(config.effect.shape_height, 200.0);
        assert_eq!(config.pointer.stiffness, 210.0);
        assert_eq!(config.backgrounds.len(), 3);
        assert_eq!(config.background("tahoe").unwrap().kind, BackgroundKind::Image);
        assert!(config.background("nope").is_none());
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = AppConfig::from_toml_str("version = 9").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_image_background_without_source() {
        let config = r#"
version = 1

[[background]]
name = "broken"
kind = "image"
"#;
        let err = AppConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_oversized_blur_radius() {
        let config = r#"
version = 1

[effect]
blur_radius = 200
"#;
        let err = AppConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_stiffness() {
        let config = r#"
version = 1

[pointer]
stiffness = -1.0
"#;
        let err = AppConfig::from_toml_str(config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn preset_overlays_named_parameters() {
        let mut params = EffectParams::default();
        params
            .apply_preset(r#"{"blur_radius": 8, "glare_factor": 25.0, "blur_edge": false}"#)
            .expect("apply preset");
        assert_eq!(params.blur_radius, 8);
        assert_eq!(params.glare_factor, 25.0);
        assert!(!params.blur_edge);
        // Untouched parameters survive.
        assert_eq!(params.shape_width, 200.0);
    }

    #[test]
    fn preset_rejects_unknown_names() {
        let mut params = EffectParams::default();
        let err = params.apply_preset(r#"{"blur_radios": 8}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn preset_values_are_validated() {
        let mut params = EffectParams::default();
        let err = params.apply_preset(r#"{"blur_radius": 500}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
