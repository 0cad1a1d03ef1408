//! Maps effect parameters onto shader uniforms.
//!
//! The renderer treats parameters as opaque; this module is where names,
//! unit conversions (degrees to radians, percentages to factors), and the
//! global vs per-pass split are decided, mirroring how the control surface
//! feeds the chain every frame.

use std::collections::BTreeMap;

use glassconfig::{EffectParams, PointerParams, MAX_BLUR_RADIUS};
use pipeline::{Background, PassOverrides, UniformValue};

/// Pointer-derived values sampled once per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerUniforms {
    /// Raw pointer position, physical pixels, bottom-left origin.
    pub raw: [f32; 2],
    /// Spring-eased position in the same space.
    pub eased: [f32; 2],
    /// Raw velocity estimate, pixels per millisecond.
    pub velocity: [f32; 2],
}

/// One-sided gaussian weights for the separable blur, normalized so the full
/// kernel (center + mirrored tail) sums to one.
pub fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let radius = radius.min(MAX_BLUR_RADIUS);
    if radius == 0 {
        return vec![1.0];
    }
    let sigma = radius as f32 / 3.0;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f32> = (0..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
    weights.into_iter().map(|w| w / total).collect()
}

/// Pointer speed inflates the shape, the faster the larger.
pub fn reactive_shape_size(
    params: &EffectParams,
    pointer: &PointerParams,
    velocity: [f32; 2],
) -> [f32; 2] {
    [
        params.shape_width + velocity[0].abs() * params.shape_width * pointer.size_factor / 100.0,
        params.shape_height + velocity[1].abs() * params.shape_height * pointer.size_factor / 100.0,
    ]
}

/// Uniforms shared by every pass that declares them.
pub fn global_uniforms(
    params: &EffectParams,
    kernel: &[f32],
    resolution: [f32; 2],
    dpr: f32,
    pointer: PointerUniforms,
    shape_size: [f32; 2],
) -> Vec<(String, UniformValue)> {
    let shape_radius = shape_size[0].min(shape_size[1]) / 2.0 * params.shape_radius / 100.0;
    vec![
        ("u_resolution".into(), UniformValue::Vec2(resolution)),
        ("u_dpr".into(), UniformValue::Float(dpr)),
        (
            "u_blurWeights".into(),
            UniformValue::FloatArray(kernel.to_vec()),
        ),
        (
            "u_blurRadius".into(),
            UniformValue::Int(kernel.len() as i32 - 1),
        ),
        ("u_mouse".into(), UniformValue::Vec2(pointer.raw)),
        ("u_mouseSpring".into(), UniformValue::Vec2(pointer.eased)),
        ("u_shapeWidth".into(), UniformValue::Float(shape_size[0])),
        ("u_shapeHeight".into(), UniformValue::Float(shape_size[1])),
        ("u_shapeRadius".into(), UniformValue::Float(shape_radius)),
        (
            "u_shapeRoundness".into(),
            UniformValue::Float(params.shape_roundness),
        ),
        ("u_mergeRate".into(), UniformValue::Float(params.merge_rate)),
        (
            "u_glareAngle".into(),
            UniformValue::Float(params.glare_angle.to_radians()),
        ),
        (
            "u_showShape1".into(),
            UniformValue::Int(params.show_second_shape as i32),
        ),
    ]
}

/// Per-pass overrides for one frame: background state into the `bg` pass,
/// glass material parameters into the `glass` pass.
pub fn pass_overrides(
    params: &EffectParams,
    pattern: u32,
    background: Option<&Background>,
) -> PassOverrides {
    let mut bg: BTreeMap<String, UniformValue> = BTreeMap::new();
    bg.insert("u_bgType".into(), UniformValue::Int(pattern as i32));
    let ready = background.map(|b| b.ready).unwrap_or(false);
    bg.insert("u_bgTextureReady".into(), UniformValue::Int(ready as i32));
    if let Some(background) = background {
        bg.insert(
            "u_bgTexture".into(),
            UniformValue::Texture(background.handle.clone()),
        );
        bg.insert(
            "u_bgTextureRatio".into(),
            UniformValue::Float(background.aspect_ratio),
        );
    }
    bg.insert(
        "u_shadowExpand".into(),
        UniformValue::Float(params.shadow_expand),
    );
    bg.insert(
        "u_shadowFactor".into(),
        UniformValue::Float(params.shadow_factor / 100.0),
    );
    bg.insert(
        "u_shadowPosition".into(),
        UniformValue::Vec2([-params.shadow_position[0], -params.shadow_position[1]]),
    );

    let mut glass: BTreeMap<String, UniformValue> = BTreeMap::new();
    glass.insert("u_tint".into(), UniformValue::Vec4(params.tint));
    glass.insert(
        "u_refThickness".into(),
        UniformValue::Float(params.refraction_thickness),
    );
    glass.insert(
        "u_refFactor".into(),
        UniformValue::Float(params.refraction_factor),
    );
    glass.insert(
        "u_refDispersion".into(),
        UniformValue::Float(params.refraction_dispersion),
    );
    glass.insert(
        "u_refFresnelRange".into(),
        UniformValue::Float(params.fresnel_range),
    );
    glass.insert(
        "u_refFresnelHardness".into(),
        UniformValue::Float(params.fresnel_hardness / 100.0),
    );
    glass.insert(
        "u_refFresnelFactor".into(),
        UniformValue::Float(params.fresnel_factor / 100.0),
    );
    glass.insert(
        "u_glareRange".into(),
        UniformValue::Float(params.glare_range),
    );
    glass.insert(
        "u_glareHardness".into(),
        UniformValue::Float(params.glare_hardness / 100.0),
    );
    glass.insert(
        "u_glareConvergence".into(),
        UniformValue::Float(params.glare_convergence / 100.0),
    );
    glass.insert(
        "u_glareOppositeFactor".into(),
        UniformValue::Float(params.glare_opposite_factor / 100.0),
    );
    glass.insert(
        "u_glareFactor".into(),
        UniformValue::Float(params.glare_factor / 100.0),
    );
    glass.insert(
        "u_blurEdge".into(),
        UniformValue::Int(params.blur_edge as i32),
    );
    glass.insert("u_step".into(), UniformValue::Int(params.debug_step));

    let mut overrides = PassOverrides::new();
    overrides.insert("bg".into(), bg);
    overrides.insert("glass".into(), glass);
    overrides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_sums_to_one() {
        for radius in [0u32, 1, 5, 20, 63] {
            let kernel = gaussian_kernel(radius);
            assert_eq!(kernel.len() as u32, radius + 1);
            let total: f32 = kernel[0] + 2.0 * kernel[1..].iter().sum::<f32>();
            assert!(
                (total - 1.0).abs() < 1e-4,
                "radius {radius} sums to {total}"
            );
        }
    }

    #[test]
    fn kernel_decreases_monotonically() {
        let kernel = gaussian_kernel(16);
        for pair in kernel.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn kernel_clamps_oversized_radius() {
        assert_eq!(gaussian_kernel(500).len() as u32, MAX_BLUR_RADIUS + 1);
    }

    #[test]
    fn stationary_pointer_keeps_configured_shape() {
        let params = EffectParams::default();
        let pointer = PointerParams::default();
        let size = reactive_shape_size(&params, &pointer, [0.0, 0.0]);
        assert_eq!(size, [params.shape_width, params.shape_height]);
    }

    #[test]
    fn fast_pointer_inflates_shape() {
        let params = EffectParams::default();
        let pointer = PointerParams::default();
        let size = reactive_shape_size(&params, &pointer, [2.0, -1.0]);
        assert!(size[0] > params.shape_width);
        assert!(size[1] > params.shape_height);
    }

    #[test]
    fn globals_cover_the_shared_uniforms() {
        let params = EffectParams::default();
        let kernel = gaussian_kernel(params.blur_radius);
        let globals = global_uniforms(
            &params,
            &kernel,
            [1920.0, 1080.0],
            1.0,
            PointerUniforms::default(),
            [200.0, 200.0],
        );
        let names: Vec<&str> = globals.iter().map(|(name, _)| name.as_str()).collect();
        for expected in [
            "u_resolution",
            "u_blurWeights",
            "u_blurRadius",
            "u_mouse",
            "u_mouseSpring",
            "u_shapeWidth",
            "u_shapeHeight",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        let radius = globals
            .iter()
            .find(|(name, _)| name == "u_blurRadius")
            .unwrap();
        assert!(matches!(radius.1, UniformValue::Int(r) if r == params.blur_radius as i32));
    }

    #[test]
    fn overrides_route_to_the_right_passes() {
        let params = EffectParams::default();
        let overrides = pass_overrides(&params, 2, None);
        let bg = overrides.get("bg").expect("bg overrides");
        assert!(matches!(bg.get("u_bgType"), Some(UniformValue::Int(2))));
        assert!(matches!(
            bg.get("u_bgTextureReady"),
            Some(UniformValue::Int(0))
        ));
        assert!(bg.get("u_bgTexture").is_none(), "no texture when slot empty");
        let glass = overrides.get("glass").expect("glass overrides");
        assert!(matches!(glass.get("u_tint"), Some(UniformValue::Vec4(_))));
        assert!(glass.get("u_bgType").is_none(), "no cross-pass leakage");
    }
}
