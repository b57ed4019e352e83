//! The consumer-thread façade.
//!
//! `ConferenceClient` owns every piece of session state. Commands validate
//! against that state, hand the SDK call to the runtime and return at once.
//! Results come back through the event bridge and are applied when the host
//! pumps the client with [`process_events`](ConferenceClient::process_events)
//! or [`process_next`](ConferenceClient::process_next).

use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Arc;

use confbridge_video::{FrameSurface, RenderTarget};
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::auth::{CredentialProvider, HttpTokenFetcher, TokenFetcher, TokenRequest};
use crate::bridge::{self, Completion, Delivery, EventBridge, EventQueue, FailureReport, Operation};
use crate::devices::DeviceManager;
use crate::error_handler::{ErrorHandler, Recovery};
use crate::errors::{ConfError, SdkError};
use crate::events::{
    AudioDevice, AudioLevel, ConferenceEvent, ConferenceEventListener, DeviceDirection,
    EventEmitter, Participant, ParticipantStatus, ScreenshareContentType, ScreenshareSource,
    VideoTrack,
};
use crate::logging::LogSettings;
use crate::participants::RosterManager;
use crate::sdk::{
    ConferenceSdk, ConnectRequest, RefreshToken, SdkFuture, SdkNotification, SpatialEnvironment,
    TokenRefreshHook,
};
use crate::session::{
    SdkState, Session, SessionStateMachine, SessionStatus, SpatialAudioStyle, TokenRoute,
};
use crate::settings::Settings;
use crate::spatial::{PoseUpdate, PoseUpdater, Rotator, Vector3, ViewpointSource};
use crate::tracks::TrackRegistry;

const DEMO_CONFERENCE: &str = "demo";

/// Requested media state. Mute preferences outlive a session; the rest
/// is cleared on teardown.
#[derive(Debug, Default)]
struct MediaToggles {
    input_muted: bool,
    output_muted: bool,
    video_enabled: bool,
    screenshare_track: Option<String>,
}

pub struct ConferenceClient {
    sdk: Arc<dyn ConferenceSdk>,
    runtime: Handle,
    settings: Settings,
    bridge: EventBridge,
    queue: EventQueue,
    emitter: EventEmitter,
    session: SessionStateMachine,
    roster: RosterManager,
    tracks: TrackRegistry,
    devices: DeviceManager,
    pose: PoseUpdater,
    pose_cancel: Option<watch::Sender<bool>>,
    errors: ErrorHandler,
    credentials: CredentialProvider,
    refresh: Option<RefreshToken>,
    media: MediaToggles,
    token_received: bool,
    log_settings_applied: bool,
}

impl ConferenceClient {
    /// Wire the client to `sdk`. SDK calls are driven on `runtime`.
    ///
    /// A `TokenNeeded` event is queued right away so the host is prompted
    /// for the first token on its first pump.
    pub fn new(sdk: Arc<dyn ConferenceSdk>, settings: Settings, runtime: Handle) -> Self {
        let (bridge, queue) = bridge::channel();
        sdk.subscribe(bridge.clone());

        let fetcher = settings
            .auth_endpoint
            .as_deref()
            .and_then(|endpoint| match HttpTokenFetcher::new(endpoint) {
                Ok(f) => Some(Arc::new(f) as Arc<dyn TokenFetcher>),
                Err(e) => {
                    tracing::warn!("auth endpoint ignored: {e}");
                    None
                }
            });

        bridge.complete(Operation::Startup, Location::caller(), || {
            Ok(Some(Completion::TokenNeeded))
        });

        Self {
            sdk,
            runtime,
            session: SessionStateMachine::new(settings.spatial_environment_scale),
            pose: PoseUpdater::new(settings.pose_update_interval()),
            settings,
            bridge,
            queue,
            emitter: EventEmitter::new(),
            roster: RosterManager::new(),
            tracks: TrackRegistry::new(),
            devices: DeviceManager::new(),
            pose_cancel: None,
            errors: ErrorHandler::new(),
            credentials: CredentialProvider::new(fetcher),
            refresh: None,
            media: MediaToggles::default(),
            token_received: false,
            log_settings_applied: false,
        }
    }

    /// Use `fetcher` for `set_token_using_key_and_secret` instead of the
    /// configured HTTP endpoint.
    pub fn with_token_fetcher(mut self, fetcher: Arc<dyn TokenFetcher>) -> Self {
        self.credentials.set_fetcher(fetcher);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ConferenceEventListener>) {
        self.emitter.add_listener(listener);
    }

    pub fn set_viewpoint_source(&mut self, source: Box<dyn ViewpointSource>) {
        self.pose.set_source(source);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self) -> &Session {
        self.session.session()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn sdk_state(&self) -> SdkState {
        self.session.sdk_state()
    }

    pub fn can_connect(&self) -> bool {
        self.session.can_connect()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn is_connected_as_active(&self) -> bool {
        self.session.is_connected_as_active()
    }

    pub fn is_spatial_audio(&self) -> bool {
        self.session.is_spatial_audio()
    }

    pub fn participants(&self) -> &[Participant] {
        self.roster.participants()
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.roster.participant(id)
    }

    pub fn active_speakers(&self) -> &[String] {
        self.roster.active_speakers()
    }

    pub fn audio_levels(&self) -> &[AudioLevel] {
        self.roster.audio_levels()
    }

    pub fn video_tracks(&self) -> Vec<VideoTrack> {
        self.tracks.tracks()
    }

    /// Latest decoded frame of `track_id`. `None` is a normal transient
    /// state: the track has not arrived yet or is already gone.
    pub fn get_render_surface(&self, track_id: &str) -> Option<&FrameSurface> {
        self.tracks.surface(track_id)
    }

    pub fn bound_track(&self, target_id: &str) -> Option<&str> {
        self.tracks.bound_track(target_id)
    }

    pub fn input_devices(&self) -> &[AudioDevice] {
        self.devices.devices(DeviceDirection::Input)
    }

    pub fn output_devices(&self) -> &[AudioDevice] {
        self.devices.devices(DeviceDirection::Output)
    }

    pub fn current_input_device(&self) -> Option<&AudioDevice> {
        self.devices.current(DeviceDirection::Input)
    }

    pub fn current_output_device(&self) -> Option<&AudioDevice> {
        self.devices.current(DeviceDirection::Output)
    }

    pub fn is_input_muted(&self) -> bool {
        self.media.input_muted
    }

    pub fn is_output_muted(&self) -> bool {
        self.media.output_muted
    }

    pub fn is_video_enabled(&self) -> bool {
        self.media.video_enabled
    }

    pub fn screenshare_track(&self) -> Option<&str> {
        self.media.screenshare_track.as_deref()
    }

    pub fn errors_handled(&self) -> usize {
        self.errors.handled()
    }

    pub fn is_pose_cadence_running(&self) -> bool {
        self.pose_cancel.is_some()
    }

    // ── Credentials and SDK lifetime ─────────────────────────────────

    /// Configure SDK logging. Only honored once, before the first token.
    pub fn set_log_settings(&mut self, settings: LogSettings) -> Result<(), ConfError> {
        if self.token_received || self.log_settings_applied {
            return Err(ConfError::InvalidState(
                "log settings can only be set once, before the first token".into(),
            ));
        }
        let settings = settings.normalized();
        self.sdk.set_log_settings(&settings)?;
        self.log_settings_applied = true;
        tracing::info!(
            sdk_level = ?settings.sdk_level,
            media_level = ?settings.media_level,
            directory = ?settings.directory,
            "sdk log settings applied"
        );
        Ok(())
    }

    /// First call initializes the SDK; later calls answer its refresh request.
    pub fn set_token(&mut self, token: impl Into<String>) -> Result<(), ConfError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ConfError::InvalidArgument("token must not be empty".into()));
        }
        self.token_received = true;

        match self.session.route_token() {
            TokenRoute::Initialize => {
                tracing::info!("initializing sdk");
                let hook = TokenRefreshHook::new(self.bridge.clone());
                self.spawn_call(
                    Operation::Initialize,
                    move |sdk| sdk.initialize(token, hook),
                    |()| Some(Completion::Initialized),
                );
            }
            TokenRoute::Refresh => match &self.refresh {
                Some(refresh) => {
                    tracing::debug!("supplying refreshed token");
                    refresh.supply(token);
                }
                None => tracing::warn!("no token refresh pending; token dropped"),
            },
        }
        Ok(())
    }

    /// Fetch a token from the auth endpoint, then continue as `set_token`.
    ///
    /// `ttl_seconds` defaults to the configured token lifetime.
    pub fn set_token_using_key_and_secret(
        &mut self,
        app_key: &str,
        app_secret: &str,
        ttl_seconds: Option<u32>,
    ) -> Result<(), ConfError> {
        let ttl = ttl_seconds.unwrap_or(self.settings.token_ttl_seconds);
        let request = TokenRequest::new(app_key, app_secret, ttl)?;
        let fetcher = self
            .credentials
            .fetcher()
            .ok_or_else(|| ConfError::Auth("no auth endpoint configured".into()))?;

        let Some(request_id) = self.credentials.begin(request.clone()) else {
            return Ok(());
        };
        let call: SdkFuture<String> = fetcher
            .fetch(request)
            .map(|result| result.map_err(token_fetch_error))
            .boxed();
        self.spawn_call(
            Operation::FetchToken(request_id),
            move |_| call,
            move |token| Some(Completion::TokenFetched { request_id, token }),
        );
        Ok(())
    }

    // ── Session ──────────────────────────────────────────────────────

    pub fn connect(&mut self, request: ConnectRequest) -> Result<(), ConfError> {
        let attempt = self.session.begin_connect(&request)?;
        self.spawn_call(
            Operation::Connect(attempt),
            move |sdk| sdk.connect(request),
            move |conference| Some(Completion::Connected { attempt, conference }),
        );
        Ok(())
    }

    /// Join the SDK's demo conference with the given spatial style.
    pub fn demo_conference(&mut self, style: SpatialAudioStyle) -> Result<(), ConfError> {
        let mut request = self.settings.connect_request(DEMO_CONFERENCE);
        request.spatial_audio_style = style;
        let attempt = self.session.begin_connect(&request)?;
        self.spawn_call(
            Operation::Connect(attempt),
            move |sdk| sdk.connect_demo(style),
            move |conference| Some(Completion::Connected { attempt, conference }),
        );
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), ConfError> {
        let attempt = self.session.begin_disconnect()?;
        self.stop_pose_cadence();
        self.spawn_call(
            Operation::Disconnect(attempt),
            |sdk| sdk.disconnect(),
            move |()| Some(Completion::Disconnected { attempt }),
        );
        Ok(())
    }

    pub fn set_spatial_environment_scale(&mut self, scale: f32) -> Result<(), ConfError> {
        self.session.set_spatial_environment_scale(scale)?;
        if self.session.is_spatial_audio() {
            self.push_spatial_environment();
        }
        Ok(())
    }

    // ── Audio ────────────────────────────────────────────────────────

    pub fn mute_input(&mut self) -> Result<(), ConfError> {
        self.set_input_muted(true)
    }

    pub fn unmute_input(&mut self) -> Result<(), ConfError> {
        self.set_input_muted(false)
    }

    pub fn mute_output(&mut self) -> Result<(), ConfError> {
        self.set_output_muted(true)
    }

    pub fn unmute_output(&mut self) -> Result<(), ConfError> {
        self.set_output_muted(false)
    }

    pub fn mute_participant(&mut self, participant_id: &str) -> Result<(), ConfError> {
        self.set_participant_muted(participant_id, true)
    }

    pub fn unmute_participant(&mut self, participant_id: &str) -> Result<(), ConfError> {
        self.set_participant_muted(participant_id, false)
    }

    fn set_input_muted(&mut self, muted: bool) -> Result<(), ConfError> {
        self.media.input_muted = muted;
        if self.session.is_connected_as_active() {
            self.spawn_call(Operation::MuteInput, move |sdk| sdk.set_input_muted(muted), |()| None);
        } else {
            tracing::debug!(muted, "input mute recorded, applied once connected");
        }
        Ok(())
    }

    fn set_output_muted(&mut self, muted: bool) -> Result<(), ConfError> {
        self.media.output_muted = muted;
        if self.session.is_connected() {
            self.spawn_call(Operation::MuteOutput, move |sdk| sdk.set_output_muted(muted), |()| None);
        } else {
            tracing::debug!(muted, "output mute recorded, applied once connected");
        }
        Ok(())
    }

    fn set_participant_muted(&mut self, participant_id: &str, muted: bool) -> Result<(), ConfError> {
        if participant_id.is_empty() {
            return Err(ConfError::InvalidArgument("participant id must not be empty".into()));
        }
        self.require_connected()?;
        let id = participant_id.to_string();
        self.spawn_call(
            Operation::MuteParticipant,
            move |sdk| sdk.set_participant_muted(id, muted),
            |()| None,
        );
        Ok(())
    }

    // ── Video ────────────────────────────────────────────────────────

    pub fn enable_video(&mut self) -> Result<(), ConfError> {
        self.require_active()?;
        if self.media.video_enabled {
            tracing::debug!("video already enabled");
            return Ok(());
        }
        self.spawn_call(
            Operation::EnableVideo,
            |sdk| sdk.enable_video(),
            |track_id| Some(Completion::VideoEnabled(track_id)),
        );
        Ok(())
    }

    pub fn disable_video(&mut self) -> Result<(), ConfError> {
        self.require_active()?;
        if !self.media.video_enabled {
            tracing::debug!("video already disabled");
            return Ok(());
        }
        self.spawn_call(
            Operation::DisableVideo,
            |sdk| sdk.disable_video(),
            |track_id| Some(Completion::VideoDisabled(track_id)),
        );
        Ok(())
    }

    /// Start writing frames of `track_id` into `target`, moving it off any
    /// track it was bound to before.
    pub fn bind_render_target(
        &mut self,
        target: Arc<dyn RenderTarget>,
        track_id: &str,
    ) -> Result<(), ConfError> {
        self.tracks.bind(target, track_id)
    }

    /// Returns false unless `target_id` was bound to exactly `track_id`.
    pub fn unbind_render_target(&mut self, target_id: &str, track_id: &str) -> bool {
        self.tracks.unbind(target_id, track_id)
    }

    // ── Screenshare ──────────────────────────────────────────────────

    pub fn get_screenshare_sources(&mut self) -> Result<(), ConfError> {
        self.require_initialized()?;
        self.spawn_call(
            Operation::GetScreenshareSources,
            |sdk| sdk.screenshare_sources(),
            |sources| Some(Completion::ScreenshareSources(sources)),
        );
        Ok(())
    }

    pub fn start_screenshare(
        &mut self,
        source: ScreenshareSource,
        content_type: ScreenshareContentType,
    ) -> Result<(), ConfError> {
        self.require_active()?;
        tracing::info!(source = %source.title, ?content_type, "starting screenshare");
        self.spawn_call(
            Operation::StartScreenshare,
            move |sdk| sdk.start_screenshare(source, content_type),
            |track_id| Some(Completion::ScreenshareStarted(track_id)),
        );
        Ok(())
    }

    pub fn stop_screenshare(&mut self) -> Result<(), ConfError> {
        self.require_active()?;
        self.require_screenshare()?;
        self.spawn_call(
            Operation::StopScreenshare,
            |sdk| sdk.stop_screenshare(),
            |track_id| Some(Completion::ScreenshareStopped(track_id)),
        );
        Ok(())
    }

    pub fn change_screenshare_content_type(
        &mut self,
        content_type: ScreenshareContentType,
    ) -> Result<(), ConfError> {
        self.require_active()?;
        self.require_screenshare()?;
        self.spawn_call(
            Operation::ChangeScreenshareContentType,
            move |sdk| sdk.change_screenshare_content_type(content_type),
            |()| None,
        );
        Ok(())
    }

    // ── Spatial ──────────────────────────────────────────────────────

    /// Take the listener position away from the periodic tick and push
    /// `location` now. Outside a spatial session the value is kept and
    /// pushed once the next session is up.
    pub fn set_local_player_location(&mut self, location: Vector3) -> Result<(), ConfError> {
        self.pose.pin_location(location);
        if self.pose.fully_overridden() {
            self.stop_pose_cadence();
        }
        if self.session.is_spatial_audio() {
            self.spawn_call(
                Operation::SetListenerPosition,
                move |sdk| sdk.set_listener_position(location),
                |()| None,
            );
        }
        Ok(())
    }

    /// Rotation counterpart of [`set_local_player_location`](Self::set_local_player_location).
    pub fn set_local_player_rotation(&mut self, rotation: Rotator) -> Result<(), ConfError> {
        self.pose.pin_rotation(rotation);
        if self.pose.fully_overridden() {
            self.stop_pose_cadence();
        }
        if self.session.is_spatial_audio() {
            self.spawn_call(
                Operation::SetListenerRotation,
                move |sdk| sdk.set_listener_rotation(rotation),
                |()| None,
            );
        }
        Ok(())
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub fn refresh_audio_devices(&mut self) -> Result<(), ConfError> {
        self.require_initialized()?;
        self.spawn_call(
            Operation::GetAudioDevices,
            |sdk| sdk.audio_devices(),
            |devices| Some(Completion::AudioDevices(devices)),
        );
        Ok(())
    }

    pub fn set_input_device(&mut self, device_id: &str) -> Result<(), ConfError> {
        self.select_device_by_id(DeviceDirection::Input, device_id)
    }

    pub fn set_output_device(&mut self, device_id: &str) -> Result<(), ConfError> {
        self.select_device_by_id(DeviceDirection::Output, device_id)
    }

    pub fn next_input_device(&mut self) -> Result<(), ConfError> {
        self.cycle_device(DeviceDirection::Input, true)
    }

    pub fn previous_input_device(&mut self) -> Result<(), ConfError> {
        self.cycle_device(DeviceDirection::Input, false)
    }

    pub fn next_output_device(&mut self) -> Result<(), ConfError> {
        self.cycle_device(DeviceDirection::Output, true)
    }

    pub fn previous_output_device(&mut self) -> Result<(), ConfError> {
        self.cycle_device(DeviceDirection::Output, false)
    }

    fn select_device_by_id(
        &mut self,
        direction: DeviceDirection,
        device_id: &str,
    ) -> Result<(), ConfError> {
        let device = self
            .devices
            .find(direction, device_id)
            .cloned()
            .ok_or_else(|| ConfError::InvalidArgument(format!("unknown audio device {device_id}")))?;
        self.select_device(device)
    }

    fn cycle_device(&mut self, direction: DeviceDirection, forward: bool) -> Result<(), ConfError> {
        let device = if forward {
            self.devices.next(direction)
        } else {
            self.devices.previous(direction)
        };
        let device = device
            .ok_or_else(|| ConfError::InvalidState(format!("no {direction:?} devices known")))?;
        self.select_device(device)
    }

    fn select_device(&mut self, device: AudioDevice) -> Result<(), ConfError> {
        self.require_initialized()?;
        tracing::info!(device_id = %device.id, name = %device.name, "selecting audio device");
        self.devices.select(&device);
        self.spawn_call(
            Operation::SetAudioDevice,
            move |sdk| sdk.set_audio_device(device),
            |()| None,
        );
        Ok(())
    }

    // ── Event pump ───────────────────────────────────────────────────

    /// Apply everything queued so far without waiting. Returns the number
    /// of deliveries handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(delivery) = self.queue.try_next() {
            self.dispatch(delivery);
            handled += 1;
        }
        handled
    }

    /// Wait for the next delivery and apply it.
    pub async fn process_next(&mut self) -> bool {
        match self.queue.next().await {
            Some(delivery) => {
                self.dispatch(delivery);
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Notification(n) => self.on_notification(n),
            Delivery::Completion(c) => self.on_completion(c),
            Delivery::Failure(report) => self.on_failure(report),
            Delivery::PoseTick => self.on_pose_tick(),
        }
    }

    fn on_notification(&mut self, notification: SdkNotification) {
        match notification {
            SdkNotification::TokenRequested(refresh) => {
                tracing::debug!("sdk requested a token refresh");
                self.refresh = Some(refresh);
                self.emitter.emit(ConferenceEvent::TokenNeeded);
            }
            SdkNotification::ConferenceStatusChanged(status) => {
                tracing::debug!(?status, "conference status changed");
                if status.is_terminal() && self.session.on_left() {
                    self.teardown();
                    self.emitter.emit(ConferenceEvent::Disconnected);
                }
            }
            SdkNotification::ParticipantAdded(info) => {
                if self.ignore_outside_session("participant added") {
                    return;
                }
                let p = self.roster.on_added(info);
                self.emitter.emit(ConferenceEvent::ParticipantAdded {
                    status: p.status,
                    info: p.info,
                });
            }
            SdkNotification::ParticipantUpdated(info) => {
                if let Some(p) = self.roster.on_updated(info) {
                    self.emitter.emit(ConferenceEvent::ParticipantUpdated {
                        status: p.status,
                        info: p.info,
                    });
                }
            }
            SdkNotification::ParticipantRemoved(info) => {
                if let Some(p) = self.roster.on_removed(info) {
                    self.emitter.emit(ConferenceEvent::ParticipantUpdated {
                        status: ParticipantStatus::Removed,
                        info: p.info,
                    });
                }
            }
            SdkNotification::VideoTrackAdded(track) => {
                if self.ignore_outside_session("video track added") {
                    return;
                }
                self.tracks.on_track_added(track.clone());
                self.emitter.emit(ConferenceEvent::VideoTrackAdded(track));
            }
            SdkNotification::VideoTrackRemoved(track) => {
                let Some(known) = self.tracks.track(&track.id).cloned() else {
                    tracing::debug!(track_id = %track.id, "removal of unknown track ignored");
                    return;
                };
                self.emitter.emit(ConferenceEvent::VideoTrackRemoved(known));
                self.tracks.on_track_removed(&track.id);
            }
            SdkNotification::VideoFrame { track_id, frame } => {
                self.tracks.on_frame(&track_id, &frame);
            }
            SdkNotification::ActiveSpeakersChanged(ids) => {
                self.roster.set_active_speakers(ids.clone());
                self.emitter.emit(ConferenceEvent::ActiveSpeakersChanged(ids));
            }
            SdkNotification::AudioLevelsChanged(levels) => {
                let (participant_ids, levels) = self.roster.set_audio_levels(levels);
                self.roster.set_active_speakers(participant_ids.clone());
                self.emitter
                    .emit(ConferenceEvent::ActiveSpeakersChanged(participant_ids.clone()));
                self.emitter.emit(ConferenceEvent::AudioLevelsChanged {
                    participant_ids,
                    levels,
                });
            }
            SdkNotification::AudioDeviceAdded(device) => {
                let direction = device.direction;
                if self.devices.on_added(device) {
                    self.emit_devices(direction);
                }
            }
            SdkNotification::AudioDeviceRemoved(device_id) => {
                if let Some(direction) = self.devices.on_removed(&device_id) {
                    self.emit_devices(direction);
                }
            }
            SdkNotification::AudioDeviceChanged(device) => {
                let direction = device.direction;
                tracing::info!(device_id = %device.id, "sdk switched audio device");
                self.devices.on_current_changed(device);
                self.emit_devices(direction);
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::TokenNeeded => self.emitter.emit(ConferenceEvent::TokenNeeded),
            Completion::Initialized => {
                if self.session.on_initialized() {
                    tracing::info!("sdk initialized");
                    self.emitter.emit(ConferenceEvent::Initialized);
                }
            }
            Completion::Connected { attempt, conference } => {
                if !self.session.on_connected(
                    attempt,
                    &conference.participant_id,
                    &conference.conference_id,
                ) {
                    return;
                }
                let pinned = self.pose.begin_session();
                if self.session.is_spatial_audio() {
                    self.push_spatial_environment();
                    self.push_pose(pinned);
                }
                self.reapply_mutes();
                self.start_pose_cadence();
                self.emitter.emit(ConferenceEvent::Connected {
                    participant_id: conference.participant_id,
                    conference_id: conference.conference_id,
                });
            }
            Completion::Disconnected { attempt } => {
                if self.session.on_disconnected(attempt) {
                    self.teardown();
                    self.emitter.emit(ConferenceEvent::Disconnected);
                } else {
                    tracing::debug!("disconnect completion after session already ended");
                }
            }
            Completion::VideoEnabled(track_id) => {
                self.media.video_enabled = true;
                self.emitter.emit(ConferenceEvent::VideoEnabled(track_id));
            }
            Completion::VideoDisabled(track_id) => {
                self.media.video_enabled = false;
                self.emitter.emit(ConferenceEvent::VideoDisabled(track_id));
            }
            Completion::ScreenshareSources(sources) => {
                self.emitter.emit(ConferenceEvent::ScreenshareSourcesReceived(sources));
            }
            Completion::ScreenshareStarted(track_id) => {
                self.media.screenshare_track = Some(track_id.clone());
                self.emitter.emit(ConferenceEvent::ScreenshareStarted(track_id));
            }
            Completion::ScreenshareStopped(track_id) => {
                self.media.screenshare_track = None;
                self.emitter.emit(ConferenceEvent::ScreenshareStopped(track_id));
            }
            Completion::AudioDevices(devices) => {
                for direction in self.devices.replace_all(devices) {
                    self.emit_devices(direction);
                }
            }
            Completion::TokenFetched { request_id, token } => {
                if !self.credentials.settle(request_id) {
                    return;
                }
                tracing::info!(%request_id, "access token fetched");
                if let Err(e) = self.set_token(token) {
                    tracing::warn!("fetched token rejected: {e}");
                }
            }
        }
    }

    fn on_failure(&mut self, report: FailureReport) {
        if let Operation::FetchToken(request_id) = report.operation {
            if !self.credentials.settle(request_id) {
                return;
            }
        }

        let recovery = self.errors.handle(&report, &mut self.session);
        if recovery == Recovery::Stale {
            return;
        }

        if report.operation.is_connection_class() {
            self.emitter.emit(ConferenceEvent::OperationFailed {
                operation: report.operation,
                kind: report.cause.kind(),
                message: report.cause.to_string(),
            });
        }

        if let Recovery::RolledBack { from } = recovery {
            self.teardown();
            if from == SessionStatus::Disconnecting {
                self.emitter.emit(ConferenceEvent::Disconnected);
            }
        }
    }

    fn on_pose_tick(&mut self) {
        if !self.session.is_spatial_audio() {
            return;
        }
        if self.pose.fully_overridden() {
            self.stop_pose_cadence();
            return;
        }
        if let Some(update) = self.pose.sample() {
            self.push_pose(update);
        }
    }

    fn push_pose(&self, update: PoseUpdate) {
        if let Some(position) = update.position {
            self.spawn_call(
                Operation::SetListenerPosition,
                move |sdk| sdk.set_listener_position(position),
                |()| None,
            );
        }
        if let Some(rotation) = update.rotation {
            self.spawn_call(
                Operation::SetListenerRotation,
                move |sdk| sdk.set_listener_rotation(rotation),
                |()| None,
            );
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Issue an SDK call on the runtime and route its outcome through the
    /// bridge. `on_ok` maps the result to a completion; `None` means the
    /// consumer needs no notification for a success.
    #[track_caller]
    fn spawn_call<T, C, F>(&self, operation: Operation, call: C, on_ok: F)
    where
        T: Send + 'static,
        C: FnOnce(&dyn ConferenceSdk) -> SdkFuture<T>,
        F: FnOnce(T) -> Option<Completion> + Send + 'static,
    {
        let location = Location::caller();
        let bridge = self.bridge.clone();

        let future = match panic::catch_unwind(AssertUnwindSafe(|| call(self.sdk.as_ref()))) {
            Ok(future) => future,
            Err(payload) => {
                bridge.complete(operation, location, move || panic::resume_unwind(payload));
                return;
            }
        };

        self.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            bridge.complete(operation, location, move || match outcome {
                Ok(result) => result.map(on_ok),
                Err(payload) => panic::resume_unwind(payload),
            });
        });
    }

    fn push_spatial_environment(&self) {
        let session = self.session.session();
        let environment =
            SpatialEnvironment::new(session.spatial_environment_scale, session.spatial_audio_style);
        self.spawn_call(
            Operation::SetSpatialEnvironment,
            move |sdk| sdk.set_spatial_environment(environment),
            |()| None,
        );
    }

    fn reapply_mutes(&self) {
        if self.media.input_muted && self.session.is_connected_as_active() {
            self.spawn_call(Operation::MuteInput, |sdk| sdk.set_input_muted(true), |()| None);
        }
        if self.media.output_muted {
            self.spawn_call(Operation::MuteOutput, |sdk| sdk.set_output_muted(true), |()| None);
        }
    }

    fn start_pose_cadence(&mut self) {
        self.stop_pose_cadence();
        if !self.session.is_spatial_audio() || self.pose.fully_overridden() {
            return;
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let bridge = self.bridge.clone();
        let period = self.pose.interval();
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {
                        if !bridge.tick() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("pose cadence stopped");
        });
        tracing::debug!(interval_ms = period.as_millis() as u64, "pose cadence started");
        self.pose_cancel = Some(cancel_tx);
    }

    fn stop_pose_cadence(&mut self) {
        if let Some(cancel) = self.pose_cancel.take() {
            let _ = cancel.send(true);
        }
    }

    /// Drop everything tied to the conference that just ended.
    fn teardown(&mut self) {
        self.stop_pose_cadence();
        self.pose.end_session();
        self.roster.clear();
        self.tracks.clear();
        self.media.video_enabled = false;
        self.media.screenshare_track = None;
    }

    fn emit_devices(&self, direction: DeviceDirection) {
        let devices = self.devices.devices(direction).to_vec();
        let event = match direction {
            DeviceDirection::Input => ConferenceEvent::InputDevicesChanged(devices),
            DeviceDirection::Output => ConferenceEvent::OutputDevicesChanged(devices),
        };
        self.emitter.emit(event);
    }

    fn ignore_outside_session(&self, what: &str) -> bool {
        if self.session.status() == SessionStatus::Idle {
            tracing::debug!("{what} while idle, ignored");
            return true;
        }
        false
    }

    fn require_initialized(&self) -> Result<(), ConfError> {
        if self.session.sdk_state() != SdkState::Initialized {
            return Err(ConfError::InvalidState("sdk not initialized".into()));
        }
        Ok(())
    }

    fn require_connected(&self) -> Result<(), ConfError> {
        if !self.session.is_connected() {
            return Err(ConfError::InvalidState("not connected".into()));
        }
        Ok(())
    }

    fn require_active(&self) -> Result<(), ConfError> {
        if !self.session.is_connected_as_active() {
            return Err(ConfError::InvalidState("not connected as an active participant".into()));
        }
        Ok(())
    }

    fn require_screenshare(&self) -> Result<(), ConfError> {
        if self.media.screenshare_track.is_none() {
            return Err(ConfError::InvalidState("no screenshare in progress".into()));
        }
        Ok(())
    }
}

impl Drop for ConferenceClient {
    fn drop(&mut self) {
        self.stop_pose_cadence();
    }
}

fn token_fetch_error(e: ConfError) -> SdkError {
    match e {
        ConfError::Sdk(e) => e,
        ConfError::InvalidArgument(msg) => SdkError::InvalidArgument(msg),
        other => SdkError::Other(other.to_string()),
    }
}
