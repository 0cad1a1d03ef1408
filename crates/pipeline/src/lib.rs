//! Multi-pass GPU pipeline for the glasspane effect.
//!
//! The crate chains full-screen shader passes through intermediate offscreen
//! targets and keeps a live background texture and a spring-damped pointer in
//! sync with the render loop:
//!
//! ```text
//!   pointer events ──▶ PointerSpring ──▶ per-frame uniforms ─┐
//!   background pick ──▶ BackgroundSlot ──▶ texture uniform ──┤
//!                                                            ▼
//!   [PassDeclaration, ..] ──▶ Pipeline::compile ──▶ Pipeline::render ──▶ screen
//! ```
//!
//! Passes are declared as plain GLSL fragments with ordinary `uniform`
//! declarations plus a map of sampler-name -> earlier-pass bindings; the
//! compiler reflects the uniforms into a typed table, allocates one color
//! target per offscreen pass, and rejects graphs with dangling or forward
//! input references before any GPU resource exists. All GPU work happens on
//! the caller's render thread; the only other threads are detached image
//! decode workers whose results are committed through a generation check.

pub mod gpu;
pub mod spring;
pub mod types;

pub use gpu::{
    Background, BackgroundSlot, GpuContext, GraphError, ImageSource, Pipeline, ReflectError,
    SourceKind, TextureHandle, VideoFrame, VideoSource,
};
pub use spring::{PointerSpring, SpringConfig};
pub use types::{PassDeclaration, PassOverrides, RenderError, UniformValue};
