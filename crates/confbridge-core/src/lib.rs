//! Conference session core.
//!
//! Sits between a host application's single consumer thread and a closed
//! communications SDK that calls back from its own threads. Everything the
//! SDK reports crosses into the core through the event bridge and is
//! applied by [`ConferenceClient`] when the host pumps it.

pub mod auth;
pub mod bridge;
pub mod client;
pub mod devices;
pub mod error_handler;
pub mod errors;
pub mod events;
pub mod logging;
pub mod participants;
pub mod sdk;
pub mod session;
pub mod settings;
pub mod spatial;
pub mod tracks;

pub use auth::{HttpTokenFetcher, TokenFetcher, TokenRequest};
pub use bridge::{EventBridge, FailureCause, FailureReport, Operation};
pub use client::ConferenceClient;
pub use errors::{ConfError, ErrorKind, SdkError};
pub use events::{
    AudioDevice, AudioLevel, ConferenceEvent, ConferenceEventListener, DeviceDirection,
    Participant, ParticipantInfo, ParticipantStatus, ScreenshareContentType, ScreenshareSource,
    VideoTrack,
};
pub use logging::{LogLevel, LogSettings, init_logging};
pub use sdk::{
    ConferenceSdk, ConnectRequest, ConnectedConference, SdkConferenceStatus, SdkFuture,
    SdkNotification, SpatialEnvironment, TokenRefreshHook,
};
pub use session::{ConnectionMode, Session, SessionStatus, SpatialAudioStyle};
pub use settings::{Settings, SettingsStore};
pub use spatial::{Rotator, Vector3, ViewpointSource};

pub use confbridge_video::{FrameSurface, RenderTarget, VideoFrame};
