//! Background texture resources.
//!
//! [`BackgroundSlot`] owns the one user-selectable background texture: a
//! static image decoded off-thread, a live video-style frame source uploaded
//! in place, or nothing. Image decodes are issued as detached worker threads
//! and their results travel back over a channel; every source change bumps a
//! generation counter, and a completed decode is committed only if the
//! generation it captured is still current. Outdated completions are
//! discarded, never aborted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use image::imageops::flip_vertical_in_place;
use wgpu::util::{DeviceExt, TextureDataOrder};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique id for any GPU texture the pipeline tracks for
/// bind-group change detection.
pub(crate) fn next_texture_id() -> u64 {
    NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)
}

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// What a texture was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Video,
    Empty,
}

struct TextureResource {
    id: u64,
    kind: SourceKind,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

/// Cheap-clone handle over a GPU texture, view, and sampler.
///
/// The `id` is process-unique and changes whenever the underlying texture is
/// replaced, which is what bind-group change detection keys on; in-place
/// frame uploads keep the id stable.
#[derive(Clone)]
pub struct TextureHandle {
    inner: Arc<TextureResource>,
}

impl std::fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureHandle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

impl TextureHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> SourceKind {
        self.inner.kind
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.inner.view
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.inner.sampler
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.inner.texture.width(), self.inner.texture.height())
    }

    /// Uploads RGBA pixels into a freshly created texture.
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        kind: SourceKind,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Self {
        let id = next_texture_id();
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(&format!("background texture #{id}")),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            rgba,
        );
        Self::from_texture(device, id, kind, texture)
    }

    /// A 1x1 transparent texture for sources that have not produced data yet.
    pub fn empty(device: &wgpu::Device, queue: &wgpu::Queue, kind: SourceKind) -> Self {
        Self::from_rgba(device, queue, kind, 1, 1, &[0, 0, 0, 0])
    }

    /// The fallback bound to sampler uniforms with no supplied texture.
    pub(crate) fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::from_rgba(device, queue, SourceKind::Empty, 1, 1, &[255, 255, 255, 255])
    }

    fn from_texture(
        device: &wgpu::Device,
        id: u64,
        kind: SourceKind,
        texture: wgpu::Texture,
    ) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            inner: Arc::new(TextureResource {
                id,
                kind,
                texture,
                view,
                sampler,
            }),
        }
    }

    fn write_rgba(&self, queue: &wgpu::Queue, width: u32, height: u32, rgba: &[u8]) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.inner.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Where a background image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
}

impl ImageSource {
    /// `http(s)` strings become URLs, everything else a filesystem path.
    pub fn parse(spec: &str) -> Self {
        if spec.starts_with("http://") || spec.starts_with("https://") {
            ImageSource::Url(spec.to_string())
        } else {
            ImageSource::Path(PathBuf::from(spec))
        }
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Path(path) => write!(f, "{}", path.display()),
            ImageSource::Url(url) => f.write_str(url),
        }
    }
}

/// One decoded RGBA frame borrowed from a [`VideoSource`].
pub struct VideoFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp of the frame; unchanged timestamp means
    /// unchanged frame and skips the upload.
    pub timestamp: Duration,
}

/// A playable handle that yields decoded frames.
///
/// The pipeline never interprets the content; it only compares timestamps to
/// avoid redundant uploads and pauses the source when the background is
/// swapped away.
pub trait VideoSource: Send {
    /// The frame that should currently be on screen, or `None` while the
    /// source has not produced one yet.
    fn current_frame(&mut self) -> Option<VideoFrame<'_>>;
    fn play(&mut self);
    fn pause(&mut self);
}

/// Decoded image pixels ready for upload, already flipped to bottom-left
/// origin.
pub(crate) struct DecodedImage {
    rgba: Vec<u8>,
    width: u32,
    height: u32,
}

struct PendingImage {
    generation: u64,
    source: ImageSource,
    receiver: Receiver<Result<DecodedImage>>,
}

/// Current background texture plus the metadata shaders consume.
pub struct Background {
    pub handle: TextureHandle,
    pub aspect_ratio: f32,
    /// False until the first valid upload completes.
    pub ready: bool,
}

/// The user-selectable background texture slot.
#[derive(Default)]
pub struct BackgroundSlot {
    generation: u64,
    current: Option<Background>,
    video: Option<Box<dyn VideoSource>>,
    last_video_timestamp: Option<Duration>,
    pending: Vec<PendingImage>,
}

impl BackgroundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter bumped by every source change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn background(&self) -> Option<&Background> {
        self.current.as_ref()
    }

    /// Requests a static image background; decode happens on a worker thread
    /// and commits on a later [`BackgroundSlot::poll`].
    pub fn set_image(&mut self, source: ImageSource) {
        self.teardown();
        self.generation += 1;

        let (sender, receiver) = bounded(1);
        let worker_source = source.clone();
        thread::spawn(move || {
            let result = decode_image(&worker_source);
            let _ = sender.send(result);
        });
        self.pending.push(PendingImage {
            generation: self.generation,
            source,
            receiver,
        });
    }

    /// Swaps in a live frame source; the texture stays not-ready until the
    /// first frame arrives.
    pub fn set_video(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        mut source: Box<dyn VideoSource>,
    ) {
        self.teardown();
        self.generation += 1;
        source.play();
        self.current = Some(Background {
            handle: TextureHandle::empty(device, queue, SourceKind::Video),
            aspect_ratio: 1.0,
            ready: false,
        });
        self.video = Some(source);
    }

    /// Drops the background entirely.
    pub fn clear(&mut self) {
        self.teardown();
        self.generation += 1;
    }

    /// Per-frame service: commits finished image decodes that are still
    /// current and uploads new video frames. Called from the render thread
    /// only.
    pub fn poll(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        for (source, decoded) in drain_completed(&mut self.pending, self.generation) {
            match decoded {
                Ok(image) => {
                    tracing::debug!(source = %source, width = image.width, height = image.height, "background image committed");
                    self.current = Some(Background {
                        handle: TextureHandle::from_rgba(
                            device,
                            queue,
                            SourceKind::Image,
                            image.width,
                            image.height,
                            &image.rgba,
                        ),
                        aspect_ratio: image.width as f32 / image.height.max(1) as f32,
                        ready: true,
                    });
                }
                Err(error) => {
                    tracing::warn!(source = %source, error = %error, "background image failed to load; slot stays not ready");
                }
            }
        }

        let Some(video) = self.video.as_mut() else {
            return;
        };
        let Some(frame) = video.current_frame() else {
            return;
        };
        if self.last_video_timestamp == Some(frame.timestamp) {
            return;
        }
        let timestamp = frame.timestamp;
        let (width, height) = (frame.width, frame.height);
        let aspect_ratio = width as f32 / height.max(1) as f32;

        let needs_realloc = self
            .current
            .as_ref()
            .map(|bg| bg.handle.dimensions() != (width, height))
            .unwrap_or(true);
        if needs_realloc {
            self.current = Some(Background {
                handle: TextureHandle::from_rgba(
                    device,
                    queue,
                    SourceKind::Video,
                    width,
                    height,
                    frame.data,
                ),
                aspect_ratio,
                ready: true,
            });
        } else if let Some(background) = self.current.as_mut() {
            background.handle.write_rgba(queue, width, height, frame.data);
            background.aspect_ratio = aspect_ratio;
            background.ready = true;
        }
        self.last_video_timestamp = Some(timestamp);
    }

    /// Tears the previous source down exactly once, pausing a playing video.
    fn teardown(&mut self) {
        if let Some(mut video) = self.video.take() {
            video.pause();
        }
        self.current = None;
        self.last_video_timestamp = None;
    }
}

/// Pulls finished decodes out of `pending`, keeping only results whose
/// captured generation still matches. Stale completions are dropped here;
/// unfinished loads stay queued.
fn drain_completed(
    pending: &mut Vec<PendingImage>,
    current_generation: u64,
) -> Vec<(ImageSource, Result<DecodedImage>)> {
    let mut completed = Vec::new();
    pending.retain_mut(|entry| match entry.receiver.try_recv() {
        Ok(result) => {
            if entry.generation == current_generation {
                completed.push((entry.source.clone(), result));
            } else {
                tracing::debug!(source = %entry.source, "discarding stale background load");
            }
            false
        }
        Err(TryRecvError::Empty) => true,
        Err(TryRecvError::Disconnected) => {
            tracing::warn!(source = %entry.source, "background decode worker vanished");
            false
        }
    });
    completed
}

fn decode_image(source: &ImageSource) -> Result<DecodedImage> {
    let image = match source {
        ImageSource::Path(path) => image::open(path)
            .with_context(|| format!("failed to open background image at {}", path.display()))?,
        ImageSource::Url(url) => {
            let response = reqwest::blocking::get(url)
                .and_then(reqwest::blocking::Response::error_for_status)
                .with_context(|| format!("failed to fetch background image from {url}"))?;
            let bytes = response
                .bytes()
                .with_context(|| format!("failed to read background image body from {url}"))?;
            image::load_from_memory(&bytes)
                .with_context(|| format!("failed to decode background image from {url}"))?
        }
    };
    let mut rgba = image.to_rgba8();
    flip_vertical_in_place(&mut rgba);
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        rgba: rgba.into_raw(),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn decoded(width: u32, height: u32) -> DecodedImage {
        DecodedImage {
            rgba: vec![0; (width * height * 4) as usize],
            width,
            height,
        }
    }

    fn queued(generation: u64, name: &str) -> (PendingImage, crossbeam_channel::Sender<Result<DecodedImage>>) {
        let (sender, receiver) = bounded(1);
        (
            PendingImage {
                generation,
                source: ImageSource::parse(name),
                receiver,
            },
            sender,
        )
    }

    #[test]
    fn parse_distinguishes_urls_from_paths() {
        assert_eq!(
            ImageSource::parse("https://example.com/bg.png"),
            ImageSource::Url("https://example.com/bg.png".into())
        );
        assert_eq!(
            ImageSource::parse("assets/bg.png"),
            ImageSource::Path(PathBuf::from("assets/bg.png"))
        );
    }

    #[test]
    fn stale_completion_is_discarded() {
        // Load A issued at generation 1, then the user switches to B
        // (generation 2). A finishing later must never be committed.
        let (entry_a, sender_a) = queued(1, "a.png");
        let (entry_b, sender_b) = queued(2, "b.png");
        let mut pending = vec![entry_a, entry_b];

        sender_a.send(Ok(decoded(4, 4))).unwrap();
        let committed = drain_completed(&mut pending, 2);
        assert!(committed.is_empty(), "stale result must not surface");
        assert_eq!(pending.len(), 1, "B stays queued");

        sender_b.send(Ok(decoded(8, 8))).unwrap();
        let committed = drain_completed(&mut pending, 2);
        assert_eq!(committed.len(), 1);
        assert!(matches!(&committed[0].0, ImageSource::Path(p) if p.ends_with("b.png")));
        assert!(pending.is_empty());
    }

    #[test]
    fn unfinished_loads_stay_queued() {
        let (entry, _sender) = queued(1, "slow.png");
        let mut pending = vec![entry];
        assert!(drain_completed(&mut pending, 1).is_empty());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn dead_worker_is_dropped() {
        let (entry, sender) = queued(1, "dead.png");
        drop(sender);
        let mut pending = vec![entry];
        assert!(drain_completed(&mut pending, 1).is_empty());
        assert!(pending.is_empty());
    }

    #[test]
    fn failed_current_load_surfaces_as_error() {
        let (entry, sender) = queued(3, "broken.png");
        let mut pending = vec![entry];
        sender.send(Err(anyhow::anyhow!("decode failed"))).unwrap();
        let completed = drain_completed(&mut pending, 3);
        assert_eq!(completed.len(), 1);
        assert!(completed[0].1.is_err());
    }
}
