use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bridge::Operation;
use crate::errors::ErrorKind;

/// Events emitted by the core to the host application.
///
/// Always delivered on the consumer thread, from inside
/// `ConferenceClient::process_events` / `process_next`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConferenceEvent {
    TokenNeeded,
    Initialized,
    Connected { participant_id: String, conference_id: String },
    Disconnected,
    ParticipantAdded { status: ParticipantStatus, info: ParticipantInfo },
    ParticipantUpdated { status: ParticipantStatus, info: ParticipantInfo },
    VideoTrackAdded(VideoTrack),
    VideoTrackRemoved(VideoTrack),
    VideoEnabled(String),  // track id
    VideoDisabled(String), // track id
    ScreenshareStarted(String),
    ScreenshareStopped(String),
    ActiveSpeakersChanged(Vec<String>), // participant ids
    AudioLevelsChanged { participant_ids: Vec<String>, levels: Vec<f32> },
    ScreenshareSourcesReceived(Vec<ScreenshareSource>),
    InputDevicesChanged(Vec<AudioDevice>),
    OutputDevicesChanged(Vec<AudioDevice>),
    OperationFailed { operation: Operation, kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub id: String,
    pub display_name: String,
    pub external_id: Option<String>,
    pub avatar_url: Option<String>,
    pub is_listener: bool,
}

/// A roster entry: the latest info plus where it is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub info: ParticipantInfo,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrack {
    pub id: String,
    pub participant_id: String,
    pub is_screenshare: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshareSource {
    pub id: i64,
    pub title: String,
    pub is_screen: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenshareContentType {
    #[default]
    Unspecified,
    Detailed,
    Text,
    Fluid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub direction: DeviceDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioLevel {
    pub participant_id: String,
    pub level: f32,
}

/// Trait for receiving events from the core.
pub trait ConferenceEventListener: Send + Sync {
    fn on_event(&self, event: ConferenceEvent);
}

impl<F> ConferenceEventListener for F
where
    F: Fn(ConferenceEvent) + Send + Sync,
{
    fn on_event(&self, event: ConferenceEvent) {
        self(event)
    }
}

/// Fans events out to registered listeners. Lives on the consumer thread.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<Arc<dyn ConferenceEventListener>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ConferenceEventListener>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: ConferenceEvent) {
        for listener in &self.listeners {
            listener.on_event(event.clone());
        }
    }
}
