//! Per-frame intent queue.
//!
//! Event handlers never touch GPU state; they record what happened here and
//! the render step drains it once per frame. Resizes coalesce to the latest
//! layout so uniforms and target dimensions can never disagree within a
//! frame, and a background request is applied exactly once per change.

use std::time::Instant;

use winit::dpi::PhysicalSize;

/// One raw pointer sample in physical pixels, bottom-left origin.
#[derive(Debug, Clone, Copy)]
pub struct PointerSample {
    pub position: [f32; 2],
    pub at: Instant,
}

#[derive(Default)]
pub struct FrameContext {
    pointer_samples: Vec<PointerSample>,
    background: Option<usize>,
    resize: Option<PhysicalSize<u32>>,
    scale_factor: Option<f64>,
}

impl FrameContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pointer(&mut self, position: [f32; 2], at: Instant) {
        self.pointer_samples.push(PointerSample { position, at });
    }

    /// Requests the catalog entry at `index`; a later request in the same
    /// frame wins.
    pub fn request_background(&mut self, index: usize) {
        self.background = Some(index);
    }

    pub fn request_resize(&mut self, size: PhysicalSize<u32>) {
        self.resize = Some(size);
    }

    pub fn record_scale_factor(&mut self, scale_factor: f64) {
        self.scale_factor = Some(scale_factor);
    }

    pub fn take_pointer_samples(&mut self) -> Vec<PointerSample> {
        std::mem::take(&mut self.pointer_samples)
    }

    pub fn take_background_request(&mut self) -> Option<usize> {
        self.background.take()
    }

    pub fn take_resize(&mut self) -> Option<PhysicalSize<u32>> {
        self.resize.take()
    }

    pub fn take_scale_factor(&mut self) -> Option<f64> {
        self.scale_factor.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resizes_coalesce_to_the_latest_layout() {
        let mut ctx = FrameContext::new();
        ctx.request_resize(PhysicalSize::new(800, 600));
        ctx.request_resize(PhysicalSize::new(1024, 768));
        assert_eq!(ctx.take_resize(), Some(PhysicalSize::new(1024, 768)));
        assert_eq!(ctx.take_resize(), None);
    }

    #[test]
    fn background_request_is_taken_once() {
        let mut ctx = FrameContext::new();
        ctx.request_background(1);
        ctx.request_background(3);
        assert_eq!(ctx.take_background_request(), Some(3));
        assert_eq!(ctx.take_background_request(), None);
    }

    #[test]
    fn pointer_samples_drain_in_order() {
        let mut ctx = FrameContext::new();
        let now = Instant::now();
        ctx.push_pointer([1.0, 2.0], now);
        ctx.push_pointer([3.0, 4.0], now);
        let samples = ctx.take_pointer_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].position, [1.0, 2.0]);
        assert_eq!(samples[1].position, [3.0, 4.0]);
        assert!(ctx.take_pointer_samples().is_empty());
    }
}
