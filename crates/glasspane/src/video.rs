//! Procedural looping frame source.
//!
//! Stands in for a decoded video: it yields timestamped RGBA frames at a
//! fixed rate so the texture-upload path (timestamp dedup, in-place writes,
//! pause on swap) is exercised without a container decoder.

use std::time::{Duration, Instant};

use pipeline::{VideoFrame, VideoSource};

pub struct SyntheticVideo {
    width: u32,
    height: u32,
    fps: f32,
    played: Duration,
    resumed_at: Option<Instant>,
    frame: Vec<u8>,
    rendered_index: Option<u64>,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, fps: f32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fps: fps.max(1.0),
            played: Duration::ZERO,
            resumed_at: None,
            frame: vec![0; (width.max(1) * height.max(1) * 4) as usize],
            rendered_index: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.played
            + self
                .resumed_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO)
    }
}

impl VideoSource for SyntheticVideo {
    fn current_frame(&mut self) -> Option<VideoFrame<'_>> {
        let index = frame_index(self.elapsed(), self.fps);
        if self.rendered_index != Some(index) {
            render_pattern(&mut self.frame, self.width, self.height, index);
            self.rendered_index = Some(index);
        }
        Some(VideoFrame {
            data: &self.frame,
            width: self.width,
            height: self.height,
            timestamp: frame_timestamp(index, self.fps),
        })
    }

    fn play(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if let Some(at) = self.resumed_at.take() {
            self.played += at.elapsed();
        }
    }
}

fn frame_index(elapsed: Duration, fps: f32) -> u64 {
    (elapsed.as_secs_f64() * f64::from(fps)) as u64
}

fn frame_timestamp(index: u64, fps: f32) -> Duration {
    Duration::from_secs_f64(index as f64 / f64::from(fps))
}

/// Slow two-axis color wash; cheap, obviously animated, and deterministic per
/// frame index.
fn render_pattern(frame: &mut [u8], width: u32, height: u32, index: u64) {
    let phase = (index % 240) as f32 / 240.0;
    for y in 0..height {
        let fy = y as f32 / height.max(1) as f32;
        for x in 0..width {
            let fx = x as f32 / width.max(1) as f32;
            let at = ((y * width + x) * 4) as usize;
            let wave = ((fx + phase) * std::f32::consts::TAU).sin() * 0.5 + 0.5;
            frame[at] = (wave * 255.0) as u8;
            frame[at + 1] = (fy * 255.0) as u8;
            frame[at + 2] = ((1.0 - phase) * 255.0) as u8;
            frame[at + 3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_advances_with_time() {
        assert_eq!(frame_index(Duration::ZERO, 30.0), 0);
        assert_eq!(frame_index(Duration::from_millis(34), 30.0), 1);
        assert_eq!(frame_index(Duration::from_secs(2), 30.0), 60);
    }

    #[test]
    fn timestamps_are_stable_per_index() {
        let a = frame_timestamp(10, 30.0);
        let b = frame_timestamp(10, 30.0);
        assert_eq!(a, b);
        assert!(frame_timestamp(11, 30.0) > a);
    }

    #[test]
    fn paused_source_repeats_the_same_timestamp() {
        let mut video = SyntheticVideo::new(8, 8, 30.0);
        // Never played: elapsed stays zero, so the timestamp cannot change.
        let first = video.current_frame().map(|f| f.timestamp).unwrap();
        let second = video.current_frame().map(|f| f.timestamp).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn pattern_varies_with_frame_index() {
        let mut a = vec![0u8; 8 * 8 * 4];
        let mut b = vec![0u8; 8 * 8 * 4];
        render_pattern(&mut a, 8, 8, 0);
        render_pattern(&mut b, 8, 8, 60);
        assert_ne!(a, b);
    }

    #[test]
    fn frames_are_fully_opaque() {
        let mut frame = vec![0u8; 4 * 4 * 4];
        render_pattern(&mut frame, 4, 4, 3);
        for pixel in frame.chunks(4) {
            assert_eq!(pixel[3], 255);
        }
    }
}
