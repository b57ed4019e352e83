//! Boundary to the closed communications SDK.
//!
//! The SDK runs its own threads. Every asynchronous call returns a boxed
//! future that resolves off the consumer thread; notifications are pushed
//! into the [`EventBridge`] handed over in [`ConferenceSdk::subscribe`].

use std::fmt;
use std::sync::Arc;

use confbridge_video::VideoFrame;
use futures_util::future::BoxFuture;

use crate::bridge::EventBridge;
use crate::errors::SdkError;
use crate::events::{
    AudioDevice, AudioLevel, ParticipantInfo, ScreenshareContentType, ScreenshareSource, VideoTrack,
};
use crate::logging::LogSettings;
use crate::session::{ConnectionMode, SpatialAudioStyle};
use crate::spatial::{Rotator, Vector3};

pub type SdkFuture<T> = BoxFuture<'static, Result<T, SdkError>>;

/// Everything the SDK needs to join a conference.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectRequest {
    pub conference_name: String,
    pub user_name: String,
    pub external_id: String,
    pub avatar_url: String,
    pub connection_mode: ConnectionMode,
    pub spatial_audio_style: SpatialAudioStyle,
}

impl ConnectRequest {
    pub fn new(conference_name: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            conference_name: conference_name.into(),
            user_name: user_name.into(),
            external_id: String::new(),
            avatar_url: String::new(),
            connection_mode: ConnectionMode::Active,
            spatial_audio_style: SpatialAudioStyle::Shared,
        }
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedConference {
    pub participant_id: String,
    pub conference_id: String,
}

/// Conference status as reported by the SDK's notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkConferenceStatus {
    Creating,
    Created,
    Joining,
    Joined,
    Leaving,
    Left,
    Destroyed,
    Error,
}

impl SdkConferenceStatus {
    /// Whether this status means the local participant is out of the conference.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Left | Self::Destroyed | Self::Error)
    }
}

/// Spatial configuration pushed on connect and whenever the scale changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEnvironment {
    pub scale: Vector3,
    pub forward: Vector3,
    pub up: Vector3,
    pub right: Vector3,
    pub style: SpatialAudioStyle,
}

impl SpatialEnvironment {
    /// Uniform scale in a left-handed, Z-up world (X forward, Y right).
    pub fn new(scale: f32, style: SpatialAudioStyle) -> Self {
        Self {
            scale: Vector3::new(scale, scale, scale),
            forward: Vector3::new(1.0, 0.0, 0.0),
            up: Vector3::new(0.0, 0.0, 1.0),
            right: Vector3::new(0.0, 1.0, 0.0),
            style,
        }
    }
}

/// SDK-side responder waiting for a renewed access token.
#[derive(Clone)]
pub struct RefreshToken(Arc<dyn Fn(String) + Send + Sync>);

impl RefreshToken {
    pub fn new(responder: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self(Arc::new(responder))
    }

    pub fn supply(&self, token: String) {
        (self.0)(token)
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

/// Passed to [`ConferenceSdk::initialize`]; the SDK calls [`request`](Self::request)
/// whenever it wants a fresh token ahead of expiry.
#[derive(Clone)]
pub struct TokenRefreshHook {
    bridge: EventBridge,
}

impl TokenRefreshHook {
    pub(crate) fn new(bridge: EventBridge) -> Self {
        Self { bridge }
    }

    #[track_caller]
    pub fn request(&self, responder: impl Fn(String) + Send + Sync + 'static) {
        self.bridge
            .notify(SdkNotification::TokenRequested(RefreshToken::new(responder)));
    }
}

/// Notifications the SDK pushes through the bridge.
#[derive(Debug)]
pub enum SdkNotification {
    TokenRequested(RefreshToken),
    ConferenceStatusChanged(SdkConferenceStatus),
    ParticipantAdded(ParticipantInfo),
    ParticipantUpdated(ParticipantInfo),
    ParticipantRemoved(ParticipantInfo),
    VideoTrackAdded(VideoTrack),
    VideoTrackRemoved(VideoTrack),
    VideoFrame { track_id: String, frame: VideoFrame },
    ActiveSpeakersChanged(Vec<String>),
    AudioLevelsChanged(Vec<AudioLevel>),
    AudioDeviceAdded(AudioDevice),
    AudioDeviceRemoved(String),
    AudioDeviceChanged(AudioDevice),
}

/// The communications engine as seen by the core.
pub trait ConferenceSdk: Send + Sync {
    /// Install the producer side of the notification channel.
    fn subscribe(&self, bridge: EventBridge);

    fn set_log_settings(&self, settings: &LogSettings) -> Result<(), SdkError>;

    fn initialize(&self, token: String, refresh: TokenRefreshHook) -> SdkFuture<()>;

    fn connect(&self, request: ConnectRequest) -> SdkFuture<ConnectedConference>;

    fn connect_demo(&self, style: SpatialAudioStyle) -> SdkFuture<ConnectedConference>;

    fn disconnect(&self) -> SdkFuture<()>;

    fn set_input_muted(&self, muted: bool) -> SdkFuture<()>;

    fn set_output_muted(&self, muted: bool) -> SdkFuture<()>;

    fn set_participant_muted(&self, participant_id: String, muted: bool) -> SdkFuture<()>;

    /// Resolves with the id of the local camera track.
    fn enable_video(&self) -> SdkFuture<String>;

    fn disable_video(&self) -> SdkFuture<String>;

    fn screenshare_sources(&self) -> SdkFuture<Vec<ScreenshareSource>>;

    /// Resolves with the id of the local screenshare track.
    fn start_screenshare(
        &self,
        source: ScreenshareSource,
        content_type: ScreenshareContentType,
    ) -> SdkFuture<String>;

    fn stop_screenshare(&self) -> SdkFuture<String>;

    fn change_screenshare_content_type(&self, content_type: ScreenshareContentType) -> SdkFuture<()>;

    fn set_listener_position(&self, position: Vector3) -> SdkFuture<()>;

    fn set_listener_rotation(&self, rotation: Rotator) -> SdkFuture<()>;

    fn set_spatial_environment(&self, environment: SpatialEnvironment) -> SdkFuture<()>;

    fn audio_devices(&self) -> SdkFuture<Vec<AudioDevice>>;

    fn set_audio_device(&self, device: AudioDevice) -> SdkFuture<()>;
}
