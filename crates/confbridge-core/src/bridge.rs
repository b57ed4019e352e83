//! Marshals SDK completions and notifications onto the consumer thread.
//!
//! Producers (SDK threads, tokio tasks) hold an [`EventBridge`]; the
//! consumer drains the matching [`EventQueue`]. Deliveries from one
//! producer arrive in the order they were sent. Nothing orders deliveries
//! coming from different producers against each other.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::{ErrorKind, SdkError};
use crate::events::{AudioDevice, ScreenshareSource};
use crate::sdk::{ConnectedConference, SdkNotification};

/// The operation a delivery or failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Startup,
    Initialize,
    FetchToken(Uuid),
    /// Connect or disconnect, tagged with the session attempt it was issued under.
    Connect(u64),
    Disconnect(u64),
    MuteInput,
    MuteOutput,
    MuteParticipant,
    EnableVideo,
    DisableVideo,
    GetScreenshareSources,
    StartScreenshare,
    StopScreenshare,
    ChangeScreenshareContentType,
    SetListenerPosition,
    SetListenerRotation,
    SetSpatialEnvironment,
    GetAudioDevices,
    SetAudioDevice,
    Notification,
}

impl Operation {
    /// Operations whose failure the consumer is told about explicitly.
    pub fn is_connection_class(self) -> bool {
        matches!(
            self,
            Self::Initialize | Self::FetchToken(_) | Self::Connect(_) | Self::Disconnect(_)
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup => f.write_str("startup"),
            Self::Initialize => f.write_str("initialize"),
            Self::FetchToken(id) => write!(f, "fetch-token({id})"),
            Self::Connect(attempt) => write!(f, "connect#{attempt}"),
            Self::Disconnect(attempt) => write!(f, "disconnect#{attempt}"),
            Self::MuteInput => f.write_str("mute-input"),
            Self::MuteOutput => f.write_str("mute-output"),
            Self::MuteParticipant => f.write_str("mute-participant"),
            Self::EnableVideo => f.write_str("enable-video"),
            Self::DisableVideo => f.write_str("disable-video"),
            Self::GetScreenshareSources => f.write_str("get-screenshare-sources"),
            Self::StartScreenshare => f.write_str("start-screenshare"),
            Self::StopScreenshare => f.write_str("stop-screenshare"),
            Self::ChangeScreenshareContentType => f.write_str("change-screenshare-content-type"),
            Self::SetListenerPosition => f.write_str("set-listener-position"),
            Self::SetListenerRotation => f.write_str("set-listener-rotation"),
            Self::SetSpatialEnvironment => f.write_str("set-spatial-environment"),
            Self::GetAudioDevices => f.write_str("get-audio-devices"),
            Self::SetAudioDevice => f.write_str("set-audio-device"),
            Self::Notification => f.write_str("notification"),
        }
    }
}

/// What went wrong while producing a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    Sdk(SdkError),
    Panic(String),
}

impl FailureCause {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sdk(e) => e.kind(),
            Self::Panic(_) => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sdk(e) => write!(f, "{e}"),
            Self::Panic(msg) => write!(f, "panic while producing event: {msg}"),
        }
    }
}

/// A failure intercepted on the producer side, carried to the consumer as a value.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub operation: Operation,
    pub cause: FailureCause,
    pub location: &'static Location<'static>,
}

/// Results of SDK calls issued by the client.
#[derive(Debug)]
pub(crate) enum Completion {
    TokenNeeded,
    Initialized,
    Connected { attempt: u64, conference: ConnectedConference },
    Disconnected { attempt: u64 },
    VideoEnabled(String),
    VideoDisabled(String),
    ScreenshareSources(Vec<ScreenshareSource>),
    ScreenshareStarted(String),
    ScreenshareStopped(String),
    AudioDevices(Vec<AudioDevice>),
    TokenFetched { request_id: Uuid, token: String },
}

#[derive(Debug)]
pub(crate) enum Delivery {
    Notification(SdkNotification),
    Completion(Completion),
    Failure(FailureReport),
    PoseTick,
}

/// Producer side of the bridge. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct EventBridge {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

pub(crate) fn channel() -> (EventBridge, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventBridge { tx }, EventQueue { rx })
}

impl EventBridge {
    /// Queue a ready-made notification.
    #[track_caller]
    pub fn notify(&self, notification: SdkNotification) {
        self.produce(Operation::Notification, Location::caller(), move || {
            Ok(Some(Delivery::Notification(notification)))
        });
    }

    /// Run `producer` here, on the calling thread, and queue its result.
    ///
    /// An error or a panic inside `producer` is turned into a failure report
    /// for the error handler; no notification reaches the consumer then.
    #[track_caller]
    pub fn deliver<F>(&self, producer: F)
    where
        F: FnOnce() -> Result<SdkNotification, SdkError>,
    {
        self.produce(Operation::Notification, Location::caller(), move || {
            producer().map(|n| Some(Delivery::Notification(n)))
        });
    }

    /// Whether the consumer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn complete<F>(
        &self,
        operation: Operation,
        location: &'static Location<'static>,
        producer: F,
    ) where
        F: FnOnce() -> Result<Option<Completion>, SdkError>,
    {
        self.produce(operation, location, move || {
            producer().map(|c| c.map(Delivery::Completion))
        });
    }

    pub(crate) fn tick(&self) -> bool {
        self.tx.send(Delivery::PoseTick).is_ok()
    }

    fn produce<F>(&self, operation: Operation, location: &'static Location<'static>, producer: F)
    where
        F: FnOnce() -> Result<Option<Delivery>, SdkError>,
    {
        let delivery = match panic::catch_unwind(AssertUnwindSafe(producer)) {
            Ok(Ok(Some(delivery))) => delivery,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => Delivery::Failure(FailureReport {
                operation,
                cause: FailureCause::Sdk(e),
                location,
            }),
            Err(payload) => Delivery::Failure(FailureReport {
                operation,
                cause: FailureCause::Panic(panic_message(payload.as_ref())),
                location,
            }),
        };

        if self.tx.send(delivery).is_err() {
            tracing::debug!(%operation, "consumer gone, delivery dropped");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Consumer side of the bridge. Owned by the client.
pub(crate) struct EventQueue {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl EventQueue {
    pub(crate) fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    pub(crate) async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}
