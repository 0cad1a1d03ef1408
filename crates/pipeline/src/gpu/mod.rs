//! GPU orchestration for the effect chain.
//!
//! - `context` owns wgpu instance/device/surface wiring and knows how to
//!   reconfigure swapchain state when the window resizes.
//! - `reflect` turns plain-GLSL uniform declarations into a typed descriptor
//!   table and wraps fragment sources for wgpu's GLSL frontend.
//! - `graph` validates the ordered pass list before anything touches the
//!   device.
//! - `state` compiles the validated list into render pipelines, uniform
//!   buffers, and offscreen targets, and executes the chain each frame.
//! - `texture` manages the user-selectable background texture: off-thread
//!   image decodes with generation-checked commits, and in-place video frame
//!   uploads.

pub mod context;
pub mod graph;
pub mod reflect;
pub mod state;
pub mod texture;

pub use context::GpuContext;
pub use graph::GraphError;
pub use reflect::{ReflectError, UniformKind};
pub use state::Pipeline;
pub use texture::{
    Background, BackgroundSlot, ImageSource, SourceKind, TextureHandle, VideoFrame, VideoSource,
};
