#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use confbridge_core::sdk::SdkFuture;
use confbridge_core::{
    AudioDevice, ConferenceClient, ConferenceEvent, ConferenceSdk, ConnectRequest,
    ConnectedConference, EventBridge, LogSettings, Rotator, ScreenshareContentType,
    ScreenshareSource, SdkError, Settings, SpatialAudioStyle, SpatialEnvironment,
    TokenRefreshHook, Vector3,
};

/// One recorded SDK call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetLogSettings(LogSettings),
    Initialize(String),
    Connect(ConnectRequest),
    ConnectDemo(SpatialAudioStyle),
    Disconnect,
    SetInputMuted(bool),
    SetOutputMuted(bool),
    SetParticipantMuted(String, bool),
    EnableVideo,
    DisableVideo,
    ScreenshareSources,
    StartScreenshare(i64, ScreenshareContentType),
    StopScreenshare,
    ChangeScreenshareContentType(ScreenshareContentType),
    SetListenerPosition(Vector3),
    SetListenerRotation(Rotator),
    SetSpatialEnvironment(SpatialEnvironment),
    AudioDevices,
    SetAudioDevice(String),
}

impl Call {
    fn name(&self) -> &'static str {
        match self {
            Call::SetLogSettings(_) => "set_log_settings",
            Call::Initialize(_) => "initialize",
            Call::Connect(_) => "connect",
            Call::ConnectDemo(_) => "connect_demo",
            Call::Disconnect => "disconnect",
            Call::SetInputMuted(_) => "set_input_muted",
            Call::SetOutputMuted(_) => "set_output_muted",
            Call::SetParticipantMuted(..) => "set_participant_muted",
            Call::EnableVideo => "enable_video",
            Call::DisableVideo => "disable_video",
            Call::ScreenshareSources => "screenshare_sources",
            Call::StartScreenshare(..) => "start_screenshare",
            Call::StopScreenshare => "stop_screenshare",
            Call::ChangeScreenshareContentType(_) => "change_screenshare_content_type",
            Call::SetListenerPosition(_) => "set_listener_position",
            Call::SetListenerRotation(_) => "set_listener_rotation",
            Call::SetSpatialEnvironment(_) => "set_spatial_environment",
            Call::AudioDevices => "audio_devices",
            Call::SetAudioDevice(_) => "set_audio_device",
        }
    }
}

/// Scripted stand-in for the communications SDK.
///
/// Every call is recorded synchronously and resolves immediately, with an
/// error or a panic if one was scripted for that call.
pub struct MockSdk {
    calls: Mutex<Vec<Call>>,
    bridge: Mutex<Option<EventBridge>>,
    refresh_hook: Mutex<Option<TokenRefreshHook>>,
    refreshed: Arc<Mutex<Vec<String>>>,
    failures: Mutex<HashMap<&'static str, SdkError>>,
    panics: Mutex<Vec<&'static str>>,
    conference: Mutex<ConnectedConference>,
    devices: Mutex<Vec<AudioDevice>>,
    sources: Mutex<Vec<ScreenshareSource>>,
}

impl MockSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            bridge: Mutex::new(None),
            refresh_hook: Mutex::new(None),
            refreshed: Arc::new(Mutex::new(Vec::new())),
            failures: Mutex::new(HashMap::new()),
            panics: Mutex::new(Vec::new()),
            conference: Mutex::new(ConnectedConference {
                participant_id: "p1".into(),
                conference_id: "c1".into(),
            }),
            devices: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name() == name)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// The producer side handed over in `subscribe`.
    pub fn bridge(&self) -> EventBridge {
        self.bridge
            .lock()
            .unwrap()
            .clone()
            .expect("client never subscribed")
    }

    /// Make the next call named `name` fail with `error`.
    pub fn fail_next(&self, name: &'static str, error: SdkError) {
        self.failures.lock().unwrap().insert(name, error);
    }

    /// Make the next call named `name` panic inside its future.
    pub fn panic_next(&self, name: &'static str) {
        self.panics.lock().unwrap().push(name);
    }

    /// Ids reported by every later `connect`.
    pub fn set_conference(&self, participant_id: &str, conference_id: &str) {
        *self.conference.lock().unwrap() = ConnectedConference {
            participant_id: participant_id.into(),
            conference_id: conference_id.into(),
        };
    }

    pub fn set_devices(&self, devices: Vec<AudioDevice>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn set_sources(&self, sources: Vec<ScreenshareSource>) {
        *self.sources.lock().unwrap() = sources;
    }

    /// Ask the core for a renewed token, like the SDK does ahead of expiry.
    pub fn request_refresh(&self) {
        let hook = self
            .refresh_hook
            .lock()
            .unwrap()
            .clone()
            .expect("sdk not initialized");
        let sink = self.refreshed.clone();
        hook.request(move |token| sink.lock().unwrap().push(token));
    }

    pub fn refreshed_tokens(&self) -> Vec<String> {
        self.refreshed.lock().unwrap().clone()
    }

    fn record<T: Send + 'static>(&self, call: Call, value: T) -> SdkFuture<T> {
        let name = call.name();
        self.calls.lock().unwrap().push(call);

        let failure = self.failures.lock().unwrap().remove(name);
        let panics = {
            let mut panics = self.panics.lock().unwrap();
            match panics.iter().position(|n| *n == name) {
                Some(i) => {
                    panics.remove(i);
                    true
                }
                None => false,
            }
        };

        Box::pin(async move {
            if panics {
                panic!("mock sdk panicked in {name}");
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(value),
            }
        })
    }
}

impl ConferenceSdk for MockSdk {
    fn subscribe(&self, bridge: EventBridge) {
        *self.bridge.lock().unwrap() = Some(bridge);
    }

    fn set_log_settings(&self, settings: &LogSettings) -> Result<(), SdkError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::SetLogSettings(settings.clone()));
        Ok(())
    }

    fn initialize(&self, token: String, refresh: TokenRefreshHook) -> SdkFuture<()> {
        *self.refresh_hook.lock().unwrap() = Some(refresh);
        self.record(Call::Initialize(token), ())
    }

    fn connect(&self, request: ConnectRequest) -> SdkFuture<ConnectedConference> {
        let conference = self.conference.lock().unwrap().clone();
        self.record(Call::Connect(request), conference)
    }

    fn connect_demo(&self, style: SpatialAudioStyle) -> SdkFuture<ConnectedConference> {
        let conference = self.conference.lock().unwrap().clone();
        self.record(Call::ConnectDemo(style), conference)
    }

    fn disconnect(&self) -> SdkFuture<()> {
        self.record(Call::Disconnect, ())
    }

    fn set_input_muted(&self, muted: bool) -> SdkFuture<()> {
        self.record(Call::SetInputMuted(muted), ())
    }

    fn set_output_muted(&self, muted: bool) -> SdkFuture<()> {
        self.record(Call::SetOutputMuted(muted), ())
    }

    fn set_participant_muted(&self, participant_id: String, muted: bool) -> SdkFuture<()> {
        self.record(Call::SetParticipantMuted(participant_id, muted), ())
    }

    fn enable_video(&self) -> SdkFuture<String> {
        self.record(Call::EnableVideo, "local-camera".to_string())
    }

    fn disable_video(&self) -> SdkFuture<String> {
        self.record(Call::DisableVideo, "local-camera".to_string())
    }

    fn screenshare_sources(&self) -> SdkFuture<Vec<ScreenshareSource>> {
        let sources = self.sources.lock().unwrap().clone();
        self.record(Call::ScreenshareSources, sources)
    }

    fn start_screenshare(
        &self,
        source: ScreenshareSource,
        content_type: ScreenshareContentType,
    ) -> SdkFuture<String> {
        self.record(
            Call::StartScreenshare(source.id, content_type),
            "local-screen".to_string(),
        )
    }

    fn stop_screenshare(&self) -> SdkFuture<String> {
        self.record(Call::StopScreenshare, "local-screen".to_string())
    }

    fn change_screenshare_content_type(&self, content_type: ScreenshareContentType) -> SdkFuture<()> {
        self.record(Call::ChangeScreenshareContentType(content_type), ())
    }

    fn set_listener_position(&self, position: Vector3) -> SdkFuture<()> {
        self.record(Call::SetListenerPosition(position), ())
    }

    fn set_listener_rotation(&self, rotation: Rotator) -> SdkFuture<()> {
        self.record(Call::SetListenerRotation(rotation), ())
    }

    fn set_spatial_environment(&self, environment: SpatialEnvironment) -> SdkFuture<()> {
        self.record(Call::SetSpatialEnvironment(environment), ())
    }

    fn audio_devices(&self) -> SdkFuture<Vec<AudioDevice>> {
        let devices = self.devices.lock().unwrap().clone();
        self.record(Call::AudioDevices, devices)
    }

    fn set_audio_device(&self, device: AudioDevice) -> SdkFuture<()> {
        self.record(Call::SetAudioDevice(device.id), ())
    }
}

pub type Events = Arc<Mutex<Vec<ConferenceEvent>>>;

pub fn client(sdk: &Arc<MockSdk>) -> (ConferenceClient, Events) {
    client_with_settings(sdk, Settings::default())
}

pub fn client_with_settings(sdk: &Arc<MockSdk>, settings: Settings) -> (ConferenceClient, Events) {
    let mut client = ConferenceClient::new(sdk.clone(), settings, tokio::runtime::Handle::current());
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.add_listener(Arc::new(move |e: ConferenceEvent| sink.lock().unwrap().push(e)));
    (client, events)
}

/// Let spawned SDK calls finish and apply everything they delivered.
pub async fn settle(client: &mut ConferenceClient) -> usize {
    let mut handled = 0;
    for _ in 0..16 {
        tokio::task::yield_now().await;
        handled += client.process_events();
    }
    handled
}

pub fn take(events: &Events) -> Vec<ConferenceEvent> {
    std::mem::take(&mut *events.lock().unwrap())
}

/// A client whose SDK is initialized, with the startup events drained.
pub async fn initialized(sdk: &Arc<MockSdk>) -> (ConferenceClient, Events) {
    let (mut client, events) = client(sdk);
    client.set_token("tok1").unwrap();
    settle(&mut client).await;
    take(&events);
    sdk.clear_calls();
    (client, events)
}

/// A client connected to "room" as alice, with all events and calls drained.
pub async fn connected(sdk: &Arc<MockSdk>, style: SpatialAudioStyle) -> (ConferenceClient, Events) {
    let (mut client, events) = initialized(sdk).await;
    let mut request = ConnectRequest::new("room", "alice");
    request.spatial_audio_style = style;
    client.connect(request).unwrap();
    settle(&mut client).await;
    take(&events);
    sdk.clear_calls();
    (client, events)
}
