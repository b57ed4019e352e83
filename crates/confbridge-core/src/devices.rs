use crate::events::{AudioDevice, DeviceDirection};

#[derive(Debug, Default)]
struct DeviceList {
    devices: Vec<AudioDevice>,
    current: Option<String>,
}

impl DeviceList {
    fn position(&self, id: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.id == id)
    }

    fn current(&self) -> Option<&AudioDevice> {
        let id = self.current.as_deref()?;
        self.devices.iter().find(|d| d.id == id)
    }

    fn step(&self, forward: bool) -> Option<AudioDevice> {
        let len = self.devices.len();
        if len == 0 {
            return None;
        }
        let index = match self.current.as_deref().and_then(|id| self.position(id)) {
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
            None if forward => 0,
            None => len - 1,
        };
        self.devices.get(index).cloned()
    }
}

/// Input and output device lists with the current selection of each.
#[derive(Debug, Default)]
pub struct DeviceManager {
    inputs: DeviceList,
    outputs: DeviceList,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, direction: DeviceDirection) -> &DeviceList {
        match direction {
            DeviceDirection::Input => &self.inputs,
            DeviceDirection::Output => &self.outputs,
        }
    }

    fn list_mut(&mut self, direction: DeviceDirection) -> &mut DeviceList {
        match direction {
            DeviceDirection::Input => &mut self.inputs,
            DeviceDirection::Output => &mut self.outputs,
        }
    }

    pub fn devices(&self, direction: DeviceDirection) -> &[AudioDevice] {
        &self.list(direction).devices
    }

    pub fn current(&self, direction: DeviceDirection) -> Option<&AudioDevice> {
        self.list(direction).current()
    }

    pub fn find(&self, direction: DeviceDirection, id: &str) -> Option<&AudioDevice> {
        self.devices(direction).iter().find(|d| d.id == id)
    }

    /// Replace both lists with a fresh enumeration. Returns the directions
    /// whose list actually changed.
    pub fn replace_all(&mut self, devices: Vec<AudioDevice>) -> Vec<DeviceDirection> {
        let (inputs, outputs): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .partition(|d| d.direction == DeviceDirection::Input);

        let mut changed = Vec::new();
        for (direction, fresh) in [(DeviceDirection::Input, inputs), (DeviceDirection::Output, outputs)] {
            let list = self.list_mut(direction);
            if list.devices != fresh {
                list.devices = fresh;
                if list.current.as_deref().is_some_and(|id| list.position(id).is_none()) {
                    list.current = None;
                }
                changed.push(direction);
            }
        }
        changed
    }

    /// Returns true if the device was not already listed.
    pub fn on_added(&mut self, device: AudioDevice) -> bool {
        let list = self.list_mut(device.direction);
        match list.position(&device.id) {
            Some(i) => {
                list.devices[i] = device;
                false
            }
            None => {
                tracing::debug!(device_id = %device.id, name = %device.name, "audio device added");
                list.devices.push(device);
                true
            }
        }
    }

    /// Drop a device from whichever list holds it.
    pub fn on_removed(&mut self, device_id: &str) -> Option<DeviceDirection> {
        for direction in [DeviceDirection::Input, DeviceDirection::Output] {
            let list = self.list_mut(direction);
            if let Some(i) = list.position(device_id) {
                list.devices.remove(i);
                if list.current.as_deref() == Some(device_id) {
                    list.current = None;
                }
                tracing::debug!(device_id, "audio device removed");
                return Some(direction);
            }
        }
        None
    }

    /// The SDK switched its active device. Returns true if the list grew.
    pub fn on_current_changed(&mut self, device: AudioDevice) -> bool {
        let direction = device.direction;
        let id = device.id.clone();
        let added = self.on_added(device);
        self.list_mut(direction).current = Some(id);
        added
    }

    pub fn select(&mut self, device: &AudioDevice) {
        self.list_mut(device.direction).current = Some(device.id.clone());
    }

    /// The device after the current one, wrapping around.
    pub fn next(&self, direction: DeviceDirection) -> Option<AudioDevice> {
        self.list(direction).step(true)
    }

    /// The device before the current one, wrapping around.
    pub fn previous(&self, direction: DeviceDirection) -> Option<AudioDevice> {
        self.list(direction).step(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str) -> AudioDevice {
        AudioDevice {
            id: id.to_string(),
            name: format!("Mic {id}"),
            direction: DeviceDirection::Input,
        }
    }

    fn output(id: &str) -> AudioDevice {
        AudioDevice {
            id: id.to_string(),
            name: format!("Speaker {id}"),
            direction: DeviceDirection::Output,
        }
    }

    #[test]
    fn replace_all_splits_by_direction() {
        let mut m = DeviceManager::new();
        let changed = m.replace_all(vec![input("m1"), output("s1"), input("m2")]);
        assert_eq!(changed, vec![DeviceDirection::Input, DeviceDirection::Output]);
        assert_eq!(m.devices(DeviceDirection::Input).len(), 2);
        assert_eq!(m.devices(DeviceDirection::Output).len(), 1);

        let changed = m.replace_all(vec![input("m1"), output("s1"), input("m2")]);
        assert!(changed.is_empty());
    }

    #[test]
    fn replace_all_drops_vanished_selection() {
        let mut m = DeviceManager::new();
        m.replace_all(vec![input("m1"), input("m2")]);
        m.select(&input("m2"));
        m.replace_all(vec![input("m1")]);
        assert!(m.current(DeviceDirection::Input).is_none());
    }

    #[test]
    fn next_and_previous_wrap_around() {
        let mut m = DeviceManager::new();
        m.replace_all(vec![input("m1"), input("m2"), input("m3")]);
        assert_eq!(m.next(DeviceDirection::Input).unwrap().id, "m1");
        assert_eq!(m.previous(DeviceDirection::Input).unwrap().id, "m3");

        m.select(&input("m3"));
        assert_eq!(m.next(DeviceDirection::Input).unwrap().id, "m1");
        assert_eq!(m.previous(DeviceDirection::Input).unwrap().id, "m2");
    }

    #[test]
    fn cycling_an_empty_list_yields_nothing() {
        let m = DeviceManager::new();
        assert!(m.next(DeviceDirection::Output).is_none());
        assert!(m.previous(DeviceDirection::Output).is_none());
    }

    #[test]
    fn removal_clears_current_selection() {
        let mut m = DeviceManager::new();
        assert!(m.on_added(output("s1")));
        assert!(!m.on_added(output("s1")));
        m.select(&output("s1"));
        assert_eq!(m.on_removed("s1"), Some(DeviceDirection::Output));
        assert!(m.current(DeviceDirection::Output).is_none());
        assert_eq!(m.on_removed("s1"), None);
    }

    #[test]
    fn current_changed_adds_unknown_device() {
        let mut m = DeviceManager::new();
        assert!(m.on_current_changed(input("usb")));
        assert_eq!(m.current(DeviceDirection::Input).unwrap().id, "usb");
        assert!(!m.on_current_changed(input("usb")));
    }
}
