//! Pass-graph validation.
//!
//! Everything decidable without a GPU lives here: pass-name uniqueness, the
//! inputs-reference-earlier-passes invariant, screen-output placement, and
//! uniform reflection. [`validate`] runs before any device resource is
//! created, so a rejected graph allocates nothing.

use std::collections::BTreeMap;

use crate::types::PassDeclaration;

use super::reflect::{reflect_uniforms, ReflectError, UniformLayout};

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate pass name '{0}'")]
    DuplicatePassName(String),
    #[error("pass '{pass}' binds sampler '{input}' to '{source_pass}', which is not an earlier pass")]
    DanglingInputReference {
        pass: String,
        input: String,
        source_pass: String,
    },
    #[error("no pass is marked as the screen output")]
    MissingScreenOutput,
    #[error("screen output pass '{0}' is not the final pass")]
    MisplacedScreenOutput(String),
    #[error("pass '{pass}' declares input '{input}' which is not a sampler2D uniform of its fragment shader")]
    InputNotASampler { pass: String, input: String },
    #[error("failed to reflect uniforms of pass '{pass}'")]
    Reflect {
        pass: String,
        #[source]
        source: ReflectError,
    },
}

/// Validated per-pass compilation inputs.
#[derive(Debug)]
pub(crate) struct PassPlan {
    /// Uniform descriptor table reflected from the fragment source.
    pub layout: UniformLayout,
    /// Sampler uniform name -> index of the earlier pass feeding it.
    pub input_sources: BTreeMap<String, usize>,
}

/// A validated pass list ready for GPU compilation.
#[derive(Debug)]
pub(crate) struct GraphPlan {
    pub passes: Vec<PassPlan>,
}

impl GraphPlan {
    /// Number of offscreen color targets the compiled graph will own.
    pub fn intermediate_count(&self) -> usize {
        self.passes.len().saturating_sub(1)
    }
}

pub(crate) fn validate(declarations: &[PassDeclaration]) -> Result<GraphPlan, GraphError> {
    for (index, declaration) in declarations.iter().enumerate() {
        if declarations[..index]
            .iter()
            .any(|earlier| earlier.name == declaration.name)
        {
            return Err(GraphError::DuplicatePassName(declaration.name.clone()));
        }
        if declaration.output_to_screen && index + 1 != declarations.len() {
            return Err(GraphError::MisplacedScreenOutput(declaration.name.clone()));
        }
    }
    if !declarations
        .last()
        .map(|last| last.output_to_screen)
        .unwrap_or(false)
    {
        return Err(GraphError::MissingScreenOutput);
    }

    let mut passes = Vec::with_capacity(declarations.len());
    for (index, declaration) in declarations.iter().enumerate() {
        let uniforms =
            reflect_uniforms(&declaration.fragment_source).map_err(|source| GraphError::Reflect {
                pass: declaration.name.clone(),
                source,
            })?;
        let layout = UniformLayout::from_reflected(&uniforms);

        let mut input_sources = BTreeMap::new();
        for (input, source) in &declaration.inputs {
            if !layout.has_sampler(input) {
                return Err(GraphError::InputNotASampler {
                    pass: declaration.name.clone(),
                    input: input.clone(),
                });
            }
            let resolved = declarations[..index]
                .iter()
                .position(|earlier| &earlier.name == source)
                .ok_or_else(|| GraphError::DanglingInputReference {
                    pass: declaration.name.clone(),
                    input: input.clone(),
                    source_pass: source.clone(),
                })?;
            input_sources.insert(input.clone(), resolved);
        }
        passes.push(PassPlan {
            layout,
            input_sources,
        });
    }

    Ok(GraphPlan { passes })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "void main() { gl_Position = vec4(0.0); }";

    fn pass(name: &str, fragment: &str) -> PassDeclaration {
        PassDeclaration::new(name, VERTEX, fragment)
    }

    fn chain() -> Vec<PassDeclaration> {
        vec![
            pass("bg", "uniform vec2 u_resolution;\nvoid main() {}"),
            pass("vblur", "uniform sampler2D u_prevPassTexture;\nvoid main() {}")
                .with_input("u_prevPassTexture", "bg"),
            pass("hblur", "uniform sampler2D u_prevPassTexture;\nvoid main() {}")
                .with_input("u_prevPassTexture", "vblur"),
            pass(
                "main",
                "uniform sampler2D u_blurredBg;\nuniform sampler2D u_bg;\nvoid main() {}",
            )
            .with_input("u_blurredBg", "hblur")
            .with_input("u_bg", "bg")
            .to_screen(),
        ]
    }

    #[test]
    fn valid_chain_plans_one_target_per_offscreen_pass() {
        let plan = validate(&chain()).expect("valid graph");
        assert_eq!(plan.passes.len(), 4);
        assert_eq!(plan.intermediate_count(), 3);
        assert_eq!(plan.passes[1].input_sources.get("u_prevPassTexture"), Some(&0));
        assert_eq!(plan.passes[3].input_sources.get("u_blurredBg"), Some(&2));
        assert_eq!(plan.passes[3].input_sources.get("u_bg"), Some(&0));
    }

    #[test]
    fn rejects_duplicate_pass_names() {
        let mut declarations = chain();
        declarations[1].name = "bg".into();
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::DuplicatePassName(name) if name == "bg"));
    }

    #[test]
    fn rejects_dangling_input() {
        let mut declarations = chain();
        declarations[1].inputs.insert(
            "u_prevPassTexture".into(),
            "nonexistent".into(),
        );
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::DanglingInputReference { source_pass: source, .. } if source == "nonexistent"));
    }

    #[test]
    fn rejects_forward_reference() {
        let mut declarations = chain();
        declarations[1]
            .inputs
            .insert("u_prevPassTexture".into(), "hblur".into());
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::DanglingInputReference { .. }));
    }

    #[test]
    fn rejects_self_reference() {
        let mut declarations = chain();
        declarations[1]
            .inputs
            .insert("u_prevPassTexture".into(), "vblur".into());
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::DanglingInputReference { .. }));
    }

    #[test]
    fn rejects_missing_screen_output() {
        let mut declarations = chain();
        declarations[3].output_to_screen = false;
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::MissingScreenOutput));

        let err = validate(&[]).unwrap_err();
        assert!(matches!(err, GraphError::MissingScreenOutput));
    }

    #[test]
    fn rejects_misplaced_screen_output() {
        let mut declarations = chain();
        declarations[1].output_to_screen = true;
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::MisplacedScreenOutput(name) if name == "vblur"));
    }

    #[test]
    fn rejects_input_bound_to_non_sampler() {
        let mut declarations = chain();
        declarations[1].fragment_source = "uniform float u_prevPassTexture;\nvoid main() {}".into();
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::InputNotASampler { .. }));
    }

    #[test]
    fn reflection_failure_names_the_pass() {
        let mut declarations = chain();
        declarations[0].fragment_source = "uniform mat4 u_model;\nvoid main() {}".into();
        let err = validate(&declarations).unwrap_err();
        assert!(matches!(err, GraphError::Reflect { pass, .. } if pass == "bg"));
    }
}
