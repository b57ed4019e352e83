//! Decoded video frame plumbing.
//!
//! The media engine hands over I420 frames for each active video track.
//! A [`FrameSink`] converts them into a BGRA [`FrameSurface`] and writes
//! that surface into every [`RenderTarget`] currently bound to the track.

use std::sync::Arc;

// ---------------------------------------------------------------------------
// Frames and surfaces
// ---------------------------------------------------------------------------

/// A decoded I420 frame as delivered by the media engine.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub stride_y: u32,
    pub stride_u: u32,
    pub stride_v: u32,
}

impl VideoFrame {
    /// Build a tightly packed I420 frame (strides equal to plane widths).
    pub fn new_i420(width: u32, height: u32, y: Vec<u8>, u: Vec<u8>, v: Vec<u8>) -> Self {
        let chroma_width = width.div_ceil(2);
        Self {
            width,
            height,
            y,
            u,
            v,
            stride_y: width,
            stride_u: chroma_width,
            stride_v: chroma_width,
        }
    }

    /// Check that every plane is large enough for the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        let h = self.height as usize;
        let chroma_h = self.height.div_ceil(2) as usize;
        let chroma_w = self.width.div_ceil(2);
        self.width > 0
            && self.height > 0
            && self.stride_y >= self.width
            && self.stride_u >= chroma_w
            && self.stride_v >= chroma_w
            && self.y.len() >= self.stride_y as usize * h
            && self.u.len() >= self.stride_u as usize * chroma_h
            && self.v.len() >= self.stride_v as usize * chroma_h
    }
}

/// The BGRA backing surface of a sink. Empty (0x0) until the first frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSurface {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameSurface {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Convert an I420 frame into `out` (BGRA, 4 bytes per pixel, BT.601).
///
/// `out` is resized as needed so a sink can reuse its buffer across frames.
/// Returns `false` and leaves `out` untouched if the frame is malformed.
pub fn i420_to_bgra(frame: &VideoFrame, out: &mut FrameSurface) -> bool {
    if !frame.is_well_formed() {
        return false;
    }
    let w = frame.width as usize;
    let h = frame.height as usize;
    out.width = frame.width;
    out.height = frame.height;
    out.data.resize(w * h * 4, 0);

    for row in 0..h {
        for col in 0..w {
            let y_idx = row * frame.stride_y as usize + col;
            let u_idx = (row / 2) * frame.stride_u as usize + (col / 2);
            let v_idx = (row / 2) * frame.stride_v as usize + (col / 2);

            let y = frame.y[y_idx] as f32;
            let u = frame.u[u_idx] as f32 - 128.0;
            let v = frame.v[v_idx] as f32 - 128.0;

            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

            let out_idx = (row * w + col) * 4;
            out.data[out_idx] = b;
            out.data[out_idx + 1] = g;
            out.data[out_idx + 2] = r;
            out.data[out_idx + 3] = 255;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Render targets
// ---------------------------------------------------------------------------

/// A consumer-owned surface that receives decoded frames.
///
/// Targets are identified by [`RenderTarget::id`]; two targets with the
/// same id are the same target as far as binding is concerned.
pub trait RenderTarget: Send + Sync {
    fn id(&self) -> &str;

    /// Called on the consumer thread for every frame of the bound track.
    fn write_frame(&self, surface: &FrameSurface);

    /// Called when the target stops receiving frames from `track_id`.
    fn on_unbound(&self, _track_id: &str) {}
}

// ---------------------------------------------------------------------------
// Frame sink
// ---------------------------------------------------------------------------

/// Owns the latest decoded frame of one video track.
pub struct FrameSink {
    track_id: String,
    surface: FrameSurface,
    targets: Vec<Arc<dyn RenderTarget>>,
    frames_received: u64,
}

impl FrameSink {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            surface: FrameSurface::default(),
            targets: Vec::new(),
            frames_received: 0,
        }
    }

    pub fn surface(&self) -> &FrameSurface {
        &self.surface
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Attach a target. A target already bound under the same id is replaced.
    ///
    /// If a frame has already arrived the target gets it immediately.
    pub fn bind(&mut self, target: Arc<dyn RenderTarget>) {
        self.targets.retain(|t| t.id() != target.id());
        if !self.surface.is_empty() {
            target.write_frame(&self.surface);
        }
        tracing::debug!(track_id = %self.track_id, target = target.id(), "render target bound");
        self.targets.push(target);
    }

    /// Detach the target with `target_id`, returning it if it was bound.
    pub fn unbind(&mut self, target_id: &str) -> Option<Arc<dyn RenderTarget>> {
        let pos = self.targets.iter().position(|t| t.id() == target_id)?;
        let target = self.targets.remove(pos);
        target.on_unbound(&self.track_id);
        tracing::debug!(track_id = %self.track_id, target = target_id, "render target unbound");
        Some(target)
    }

    pub fn is_bound(&self, target_id: &str) -> bool {
        self.targets.iter().any(|t| t.id() == target_id)
    }

    pub fn bound_target_ids(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.id().to_string()).collect()
    }

    /// Convert `frame` into the backing surface and fan it out to all targets.
    pub fn handle_frame(&mut self, frame: &VideoFrame) {
        if !frame.is_well_formed() {
            tracing::warn!(
                track_id = %self.track_id,
                width = frame.width,
                height = frame.height,
                "dropping malformed video frame"
            );
            return;
        }

        self.frames_received += 1;
        if self.frames_received == 1 {
            tracing::info!(
                track_id = %self.track_id,
                width = frame.width,
                height = frame.height,
                "first video frame received"
            );
        }

        i420_to_bgra(frame, &mut self.surface);
        for target in &self.targets {
            target.write_frame(&self.surface);
        }
    }

    /// Tear the sink down, unbinding every target. Returns the unbound ids.
    pub fn release(mut self) -> Vec<String> {
        let ids = self.bound_target_ids();
        for target in self.targets.drain(..) {
            target.on_unbound(&self.track_id);
        }
        tracing::info!(track_id = %self.track_id, frames = self.frames_received, "frame sink released");
        ids
    }
}
