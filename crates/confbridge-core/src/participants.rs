use crate::events::{AudioLevel, Participant, ParticipantInfo, ParticipantStatus};

/// Cached roster of the current conference.
///
/// Updated from SDK notifications after they reach the consumer thread.
/// Read by the host through `ConferenceClient`.
#[derive(Debug, Clone, Default)]
pub struct RosterManager {
    participants: Vec<Participant>,
    active_speakers: Vec<String>,
    audio_levels: Vec<AudioLevel>,
}

impl RosterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or re-insert a participant. Always yields the cached entry.
    pub fn on_added(&mut self, info: ParticipantInfo) -> Participant {
        let entry = Participant {
            info,
            status: ParticipantStatus::Added,
        };
        match self.participant_mut(&entry.info.id) {
            Some(existing) => *existing = entry.clone(),
            None => self.participants.push(entry.clone()),
        }
        entry
    }

    /// Update a known participant in place.
    ///
    /// Returns `None` for ids that are not in the roster; such updates are
    /// dropped rather than resurrecting a removed participant.
    pub fn on_updated(&mut self, info: ParticipantInfo) -> Option<Participant> {
        let Some(existing) = self.participant_mut(&info.id) else {
            tracing::debug!(participant_id = %info.id, "update for unknown participant ignored");
            return None;
        };
        existing.info = info;
        existing.status = ParticipantStatus::Updated;
        Some(existing.clone())
    }

    /// Erase a participant. Returns the final entry with `Removed` status.
    pub fn on_removed(&mut self, info: ParticipantInfo) -> Option<Participant> {
        let Some(pos) = self.participants.iter().position(|p| p.info.id == info.id) else {
            tracing::debug!(participant_id = %info.id, "removal of unknown participant ignored");
            return None;
        };
        self.participants.remove(pos);
        self.active_speakers.retain(|id| id != &info.id);
        self.audio_levels.retain(|l| l.participant_id != info.id);
        Some(Participant {
            info,
            status: ParticipantStatus::Removed,
        })
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.info.id == id)
    }

    fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.info.id == id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn set_active_speakers(&mut self, ids: Vec<String>) {
        self.active_speakers = ids;
    }

    pub fn active_speakers(&self) -> &[String] {
        &self.active_speakers
    }

    /// Store the latest levels and return them as parallel id/level arrays.
    pub fn set_audio_levels(&mut self, levels: Vec<AudioLevel>) -> (Vec<String>, Vec<f32>) {
        let split = levels
            .iter()
            .map(|l| (l.participant_id.clone(), l.level))
            .unzip();
        self.audio_levels = levels;
        split
    }

    pub fn audio_levels(&self) -> &[AudioLevel] {
        &self.audio_levels
    }

    pub fn clear(&mut self) {
        self.participants.clear();
        self.active_speakers.clear();
        self.audio_levels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, name: &str) -> ParticipantInfo {
        ParticipantInfo {
            id: id.to_string(),
            display_name: name.to_string(),
            external_id: None,
            avatar_url: None,
            is_listener: false,
        }
    }

    #[test]
    fn add_and_retrieve_participant() {
        let mut roster = RosterManager::new();
        roster.on_added(info("p1", "Alice"));
        assert_eq!(roster.participant_count(), 1);
        let p = roster.participant("p1").unwrap();
        assert_eq!(p.info.display_name, "Alice");
        assert_eq!(p.status, ParticipantStatus::Added);
    }

    #[test]
    fn re_adding_replaces_instead_of_duplicating() {
        let mut roster = RosterManager::new();
        roster.on_added(info("p1", "Alice"));
        roster.on_added(info("p1", "Alice B."));
        assert_eq!(roster.participant_count(), 1);
        assert_eq!(roster.participant("p1").unwrap().info.display_name, "Alice B.");
    }

    #[test]
    fn update_changes_cached_entry() {
        let mut roster = RosterManager::new();
        roster.on_added(info("p1", "Alice"));
        let updated = roster.on_updated(info("p1", "Alicia")).unwrap();
        assert_eq!(updated.status, ParticipantStatus::Updated);
        assert_eq!(roster.participant("p1").unwrap().info.display_name, "Alicia");
    }

    #[test]
    fn update_for_unknown_id_is_ignored() {
        let mut roster = RosterManager::new();
        assert!(roster.on_updated(info("ghost", "Nobody")).is_none());
        assert_eq!(roster.participant_count(), 0);
    }

    #[test]
    fn removal_is_terminal_until_added_again() {
        let mut roster = RosterManager::new();
        roster.on_added(info("p1", "Alice"));
        let removed = roster.on_removed(info("p1", "Alice")).unwrap();
        assert_eq!(removed.status, ParticipantStatus::Removed);
        assert!(roster.participant("p1").is_none());

        assert!(roster.on_updated(info("p1", "Alice")).is_none());
        assert!(roster.participant("p1").is_none());

        roster.on_added(info("p1", "Alice"));
        assert_eq!(roster.participant("p1").unwrap().status, ParticipantStatus::Added);
    }

    #[test]
    fn roster_reflects_latest_non_removed_state() {
        let mut roster = RosterManager::new();
        let script: &[(&str, &str)] = &[
            ("add", "A"),
            ("update", "B"),
            ("remove", "B"),
            ("update", "C"),
            ("add", "D"),
            ("update", "E"),
        ];
        for (op, name) in script {
            match *op {
                "add" => {
                    roster.on_added(info("p1", name));
                }
                "update" => {
                    roster.on_updated(info("p1", name));
                }
                _ => {
                    roster.on_removed(info("p1", name));
                }
            }
        }
        let p = roster.participant("p1").unwrap();
        assert_eq!(p.info.display_name, "E");
        assert_eq!(p.status, ParticipantStatus::Updated);
    }

    #[test]
    fn removal_drops_speaker_state() {
        let mut roster = RosterManager::new();
        roster.on_added(info("p1", "Alice"));
        roster.set_active_speakers(vec!["p1".to_string()]);
        roster.set_audio_levels(vec![AudioLevel { participant_id: "p1".into(), level: 0.4 }]);
        roster.on_removed(info("p1", "Alice"));
        assert!(roster.active_speakers().is_empty());
        assert!(roster.audio_levels().is_empty());
    }

    #[test]
    fn audio_levels_split_positionally() {
        let mut roster = RosterManager::new();
        let (ids, levels) = roster.set_audio_levels(vec![
            AudioLevel { participant_id: "p2".into(), level: 0.9 },
            AudioLevel { participant_id: "p1".into(), level: 0.1 },
        ]);
        assert_eq!(ids, vec!["p2".to_string(), "p1".to_string()]);
        assert_eq!(levels, vec![0.9, 0.1]);
        assert_eq!(ids.len(), levels.len());
    }

    #[test]
    fn clear_resets_everything() {
        let mut roster = RosterManager::new();
        roster.on_added(info("p1", "Alice"));
        roster.set_active_speakers(vec!["p1".to_string()]);
        roster.clear();
        assert_eq!(roster.participant_count(), 0);
        assert!(roster.active_speakers().is_empty());
    }
}
