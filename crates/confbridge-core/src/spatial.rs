//! Listener pose for spatial audio.
//!
//! While connected, a periodic tick samples the host's default viewpoint and
//! pushes position and rotation to the SDK. Explicitly setting either one
//! pins that axis and takes it away from the tick. A pin made during a
//! session lasts until that session ends; a pin made outside one is kept
//! and pushed when each following session starts.

use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Rotation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }
}

/// Supplies the host's default listener viewpoint (e.g. the first local player).
pub trait ViewpointSource: Send {
    fn viewpoint(&self) -> Option<(Vector3, Rotator)>;
}

impl<F> ViewpointSource for F
where
    F: Fn() -> Option<(Vector3, Rotator)> + Send,
{
    fn viewpoint(&self) -> Option<(Vector3, Rotator)> {
        self()
    }
}

/// The axes a tick should push. `None` means the axis is not driven.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseUpdate {
    pub position: Option<Vector3>,
    pub rotation: Option<Rotator>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Pin<T> {
    value: T,
    session_scoped: bool,
}

pub struct PoseUpdater {
    interval: Duration,
    source: Option<Box<dyn ViewpointSource>>,
    location: Option<Pin<Vector3>>,
    rotation: Option<Pin<Rotator>>,
    in_session: bool,
}

impl PoseUpdater {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            source: None,
            location: None,
            rotation: None,
            in_session: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_source(&mut self, source: Box<dyn ViewpointSource>) {
        self.source = Some(source);
    }

    pub fn pin_location(&mut self, value: Vector3) {
        if self.location.is_none() {
            tracing::debug!(in_session = self.in_session, "listener location now set explicitly");
        }
        self.location = Some(Pin {
            value,
            session_scoped: self.in_session,
        });
    }

    pub fn pin_rotation(&mut self, value: Rotator) {
        if self.rotation.is_none() {
            tracing::debug!(in_session = self.in_session, "listener rotation now set explicitly");
        }
        self.rotation = Some(Pin {
            value,
            session_scoped: self.in_session,
        });
    }

    /// Whether the periodic tick has nothing left to drive.
    pub fn fully_overridden(&self) -> bool {
        self.location.is_some() && self.rotation.is_some()
    }

    /// A session went live. Returns the pinned axes to push right away.
    pub fn begin_session(&mut self) -> PoseUpdate {
        self.in_session = true;
        PoseUpdate {
            position: self.location.map(|p| p.value),
            rotation: self.rotation.map(|p| p.value),
        }
    }

    /// Drop the pins made during the session that just ended.
    pub fn end_session(&mut self) {
        if !self.in_session {
            return;
        }
        self.in_session = false;
        self.location = self.location.filter(|p| !p.session_scoped);
        self.rotation = self.rotation.filter(|p| !p.session_scoped);
    }

    /// Sample the default viewpoint for the axes still driven automatically.
    pub fn sample(&self) -> Option<PoseUpdate> {
        if self.fully_overridden() {
            return None;
        }
        let (position, rotation) = self.source.as_ref()?.viewpoint()?;
        Some(PoseUpdate {
            position: self.location.is_none().then_some(position),
            rotation: self.rotation.is_none().then_some(rotation),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn updater() -> PoseUpdater {
        let mut u = PoseUpdater::new(Duration::from_millis(30));
        u.set_source(Box::new(|| {
            Some((Vector3::new(1.0, 2.0, 3.0), Rotator::new(0.0, 90.0, 0.0)))
        }));
        u
    }

    #[test]
    fn samples_both_axes_by_default() {
        let update = updater().sample().unwrap();
        assert_eq!(update.position, Some(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(update.rotation, Some(Rotator::new(0.0, 90.0, 0.0)));
    }

    #[test]
    fn no_source_means_no_update() {
        let u = PoseUpdater::new(Duration::from_millis(30));
        assert!(u.sample().is_none());
    }

    #[test]
    fn source_without_viewpoint_means_no_update() {
        let mut u = PoseUpdater::new(Duration::from_millis(30));
        u.set_source(Box::new(|| -> Option<(Vector3, Rotator)> { None }));
        assert!(u.sample().is_none());
    }

    #[test]
    fn pinning_location_keeps_rotation_driven() {
        let mut u = updater();
        u.begin_session();
        u.pin_location(Vector3::new(5.0, 5.0, 5.0));
        let update = u.sample().unwrap();
        assert_eq!(update.position, None);
        assert!(update.rotation.is_some());
    }

    #[test]
    fn session_pins_end_with_the_session() {
        let mut u = updater();
        u.begin_session();
        u.pin_location(Vector3::default());
        u.pin_rotation(Rotator::default());
        assert!(u.fully_overridden());
        assert!(u.sample().is_none());
        u.end_session();
        assert!(!u.fully_overridden());
        assert!(u.sample().is_some());
    }

    #[test]
    fn pins_made_outside_a_session_outlive_it() {
        let mut u = updater();
        let manual = Vector3::new(4.0, 5.0, 6.0);
        u.pin_location(manual);
        u.end_session();

        let pinned = u.begin_session();
        assert_eq!(pinned.position, Some(manual));
        assert_eq!(pinned.rotation, None);
        u.end_session();

        assert_eq!(u.begin_session().position, Some(manual));
        assert_eq!(u.sample().unwrap().position, None);
    }
}
