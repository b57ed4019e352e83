use std::collections::HashMap;
use std::sync::Arc;

use confbridge_video::{FrameSink, FrameSurface, RenderTarget, VideoFrame};

use crate::errors::ConfError;
use crate::events::VideoTrack;

struct TrackEntry {
    track: VideoTrack,
    sink: FrameSink,
}

/// Active video tracks, their frame sinks and the render targets bound to them.
///
/// A target is bound to at most one track at a time; binding it elsewhere
/// moves it.
#[derive(Default)]
pub struct TrackRegistry {
    tracks: HashMap<String, TrackEntry>,
    // target id -> track id
    bindings: HashMap<String, String>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new track with a fresh sink. A repeated id replaces the
    /// old entry and releases its sink.
    pub fn on_track_added(&mut self, track: VideoTrack) {
        tracing::info!(
            track_id = %track.id,
            participant_id = %track.participant_id,
            screenshare = track.is_screenshare,
            "video track added"
        );
        let id = track.id.clone();
        let sink = FrameSink::new(id.clone());
        if let Some(old) = self.tracks.insert(id, TrackEntry { track, sink }) {
            self.release(old);
        }
    }

    /// Drop a track, unbinding everything bound to it. Returns the removed
    /// track, or `None` if it was not active.
    pub fn on_track_removed(&mut self, track_id: &str) -> Option<VideoTrack> {
        let entry = self.tracks.remove(track_id)?;
        tracing::info!(track_id, "video track removed");
        let track = entry.track.clone();
        self.release(entry);
        Some(track)
    }

    pub fn on_frame(&mut self, track_id: &str, frame: &VideoFrame) {
        match self.tracks.get_mut(track_id) {
            Some(entry) => entry.sink.handle_frame(frame),
            None => tracing::trace!(track_id, "frame for inactive track dropped"),
        }
    }

    /// Bind `target` to `track_id`, moving it off any previous track.
    pub fn bind(&mut self, target: Arc<dyn RenderTarget>, track_id: &str) -> Result<(), ConfError> {
        if !self.tracks.contains_key(track_id) {
            return Err(ConfError::TrackNotFound(track_id.to_string()));
        }
        let target_id = target.id().to_string();
        if let Some(previous) = self.bindings.get(&target_id).cloned() {
            if previous == track_id {
                return Ok(());
            }
            if let Some(entry) = self.tracks.get_mut(&previous) {
                entry.sink.unbind(&target_id);
            }
        }
        if let Some(entry) = self.tracks.get_mut(track_id) {
            entry.sink.bind(target);
        }
        self.bindings.insert(target_id, track_id.to_string());
        Ok(())
    }

    /// Unbind only if `target_id` is currently bound to exactly `track_id`.
    pub fn unbind(&mut self, target_id: &str, track_id: &str) -> bool {
        if self.bindings.get(target_id).map(String::as_str) != Some(track_id) {
            return false;
        }
        self.bindings.remove(target_id);
        if let Some(entry) = self.tracks.get_mut(track_id) {
            entry.sink.unbind(target_id);
        }
        true
    }

    pub fn surface(&self, track_id: &str) -> Option<&FrameSurface> {
        self.tracks.get(track_id).map(|e| e.sink.surface())
    }

    pub fn track(&self, track_id: &str) -> Option<&VideoTrack> {
        self.tracks.get(track_id).map(|e| &e.track)
    }

    pub fn tracks(&self) -> Vec<VideoTrack> {
        self.tracks.values().map(|e| e.track.clone()).collect()
    }

    pub fn bound_track(&self, target_id: &str) -> Option<&str> {
        self.bindings.get(target_id).map(String::as_str)
    }

    /// Release every sink (session teardown).
    pub fn clear(&mut self) {
        let entries: Vec<TrackEntry> = self.tracks.drain().map(|(_, e)| e).collect();
        for entry in entries {
            self.release(entry);
        }
        self.bindings.clear();
    }

    fn release(&mut self, entry: TrackEntry) {
        for target_id in entry.sink.release() {
            self.bindings.remove(&target_id);
        }
    }
}
