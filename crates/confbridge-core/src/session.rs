//! Conference session state.
//!
//! `SessionStateMachine` is the only writer of [`Session`]. Status moves
//! Idle -> Connecting -> Connected -> Disconnecting -> Idle; a terminal
//! status from the SDK (kicked, network loss) may force Idle from anywhere.
//!
//! Every connect, disconnect and forced Idle starts a new attempt. SDK
//! outcomes carry the attempt they were issued under; outcomes of an
//! earlier attempt no longer describe the session and are dropped.

use serde::{Deserialize, Serialize};

use crate::errors::ConfError;
use crate::sdk::ConnectRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

impl SessionStatus {
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    #[default]
    Active,
    Listener,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialAudioStyle {
    #[default]
    Shared,
    Individual,
    Disabled,
}

/// Where the underlying SDK is in its one-time initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkState {
    Uninitialized,
    Initializing,
    Initialized,
}

/// What a `SetToken` call should do with its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRoute {
    Initialize,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub status: SessionStatus,
    pub connection_mode: ConnectionMode,
    pub spatial_audio_style: SpatialAudioStyle,
    pub local_participant_id: Option<String>,
    pub conference_id: Option<String>,
    pub spatial_environment_scale: f32,
}

impl Session {
    fn new(spatial_environment_scale: f32) -> Self {
        Self {
            status: SessionStatus::Idle,
            connection_mode: ConnectionMode::Active,
            spatial_audio_style: SpatialAudioStyle::Shared,
            local_participant_id: None,
            conference_id: None,
            spatial_environment_scale,
        }
    }
}

#[derive(Debug)]
pub struct SessionStateMachine {
    session: Session,
    sdk_state: SdkState,
    attempt: u64,
}

impl SessionStateMachine {
    pub fn new(spatial_environment_scale: f32) -> Self {
        Self {
            session: Session::new(spatial_environment_scale),
            sdk_state: SdkState::Uninitialized,
            attempt: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn sdk_state(&self) -> SdkState {
        self.sdk_state
    }

    /// The attempt the current status belongs to.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt
    }

    // ── Guards ───────────────────────────────────────────────────────

    pub fn can_connect(&self) -> bool {
        self.session.status == SessionStatus::Idle && self.sdk_state == SdkState::Initialized
    }

    pub fn is_connected(&self) -> bool {
        self.session.status == SessionStatus::Connected
    }

    pub fn is_connected_as_active(&self) -> bool {
        self.is_connected() && self.session.connection_mode == ConnectionMode::Active
    }

    pub fn is_spatial_audio(&self) -> bool {
        self.is_connected() && self.session.spatial_audio_style != SpatialAudioStyle::Disabled
    }

    // ── Initialization ───────────────────────────────────────────────

    /// Decide whether a token starts SDK initialization or answers a refresh.
    pub fn route_token(&mut self) -> TokenRoute {
        match self.sdk_state {
            SdkState::Uninitialized => {
                self.sdk_state = SdkState::Initializing;
                TokenRoute::Initialize
            }
            SdkState::Initializing | SdkState::Initialized => TokenRoute::Refresh,
        }
    }

    pub fn on_initialized(&mut self) -> bool {
        if self.sdk_state != SdkState::Initializing {
            tracing::warn!(state = ?self.sdk_state, "unexpected initialization completion");
            return false;
        }
        self.sdk_state = SdkState::Initialized;
        true
    }

    /// Forget a failed initialization so the next token retries it.
    pub fn on_initialize_failed(&mut self) {
        if self.sdk_state == SdkState::Initializing {
            self.sdk_state = SdkState::Uninitialized;
        }
    }

    // ── Connect / disconnect ─────────────────────────────────────────

    /// Move to Connecting. Returns the attempt the connect call belongs to.
    pub fn begin_connect(&mut self, request: &ConnectRequest) -> Result<u64, ConfError> {
        if request.conference_name.trim().is_empty() {
            return Err(ConfError::InvalidArgument("conference name must not be empty".into()));
        }
        if !self.can_connect() {
            return Err(ConfError::InvalidState(format!(
                "cannot connect while {:?} (sdk {:?})",
                self.session.status, self.sdk_state
            )));
        }
        self.session.status = SessionStatus::Connecting;
        self.session.connection_mode = request.connection_mode;
        self.session.spatial_audio_style = request.spatial_audio_style;
        self.attempt += 1;
        tracing::info!(
            attempt = self.attempt,
            conference = %request.conference_name,
            mode = ?request.connection_mode,
            style = ?request.spatial_audio_style,
            "connecting"
        );
        Ok(self.attempt)
    }

    /// Record a successful join. Ignored unless `attempt` is the connect
    /// still in flight.
    pub fn on_connected(&mut self, attempt: u64, participant_id: &str, conference_id: &str) -> bool {
        if self.session.status != SessionStatus::Connecting || !self.is_current(attempt) {
            tracing::warn!(
                status = ?self.session.status,
                attempt,
                current = self.attempt,
                "dropping late connect completion"
            );
            return false;
        }
        self.session.status = SessionStatus::Connected;
        self.session.local_participant_id = Some(participant_id.to_string());
        self.session.conference_id = Some(conference_id.to_string());
        tracing::info!(participant_id, conference_id, "connected");
        true
    }

    pub fn begin_disconnect(&mut self) -> Result<u64, ConfError> {
        if self.session.status != SessionStatus::Connected {
            return Err(ConfError::InvalidState(format!(
                "cannot disconnect while {:?}",
                self.session.status
            )));
        }
        self.session.status = SessionStatus::Disconnecting;
        self.attempt += 1;
        tracing::info!(attempt = self.attempt, "disconnecting");
        Ok(self.attempt)
    }

    /// Force Idle after the conference was left for any reason.
    ///
    /// Returns `false` when already Idle, so a second arrival (explicit
    /// disconnect completion racing a status notification) is dropped.
    pub fn on_left(&mut self) -> bool {
        if self.session.status == SessionStatus::Idle {
            return false;
        }
        self.reset_to_idle();
        tracing::info!("session ended");
        true
    }

    /// Completion of the disconnect issued under `attempt`.
    pub fn on_disconnected(&mut self, attempt: u64) -> bool {
        if !self.is_current(attempt) {
            tracing::debug!(attempt, current = self.attempt, "dropping late disconnect completion");
            return false;
        }
        self.on_left()
    }

    /// Roll a transitional status back to Idle after the call issued under
    /// `attempt` failed. Returns the status left behind.
    pub fn rollback_transitional(&mut self, attempt: u64) -> Option<SessionStatus> {
        let from = self.session.status;
        if !from.is_transitional() || !self.is_current(attempt) {
            return None;
        }
        self.reset_to_idle();
        tracing::warn!(from = ?from, "rolled back to idle");
        Some(from)
    }

    pub fn set_spatial_environment_scale(&mut self, scale: f32) -> Result<(), ConfError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfError::InvalidArgument(format!(
                "spatial environment scale must be positive, got {scale}"
            )));
        }
        self.session.spatial_environment_scale = scale;
        Ok(())
    }

    fn reset_to_idle(&mut self) {
        self.attempt += 1;
        self.session.status = SessionStatus::Idle;
        self.session.local_participant_id = None;
        self.session.conference_id = None;
    }
}
