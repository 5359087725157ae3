//! Dynamic channel map - the discovery results, live-updatable.
//!
//! Same locking discipline as the console model: exclusive writes,
//! shared cloned reads, silent no-ops on out-of-range indices. Writes
//! must stay cheap because name-change reclassification happens on the
//! adapter's receive thread.

use parking_lot::RwLock;

use mix_core::InstrumentRole;

use crate::discovery::profile::ChannelProfile;

#[derive(Default)]
pub struct ChannelMap {
    channels: RwLock<Vec<ChannelProfile>>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resize(&self, count: u16) {
        let mut channels = self.channels.write();
        *channels = (1..=count).map(ChannelProfile::new).collect();
    }

    pub fn update_profile(&self, profile: ChannelProfile) {
        let mut channels = self.channels.write();
        if profile.index < 1 || profile.index as usize > channels.len() {
            return;
        }
        let idx = profile.index as usize - 1;
        channels[idx] = profile;
    }

    pub fn profile(&self, ch: u16) -> Option<ChannelProfile> {
        let channels = self.channels.read();
        if ch < 1 {
            return None;
        }
        channels.get(ch as usize - 1).cloned()
    }

    pub fn by_role(&self, role: InstrumentRole) -> Vec<ChannelProfile> {
        self.channels.read().iter().filter(|c| c.role == role).cloned().collect()
    }

    pub fn by_group(&self, group: &str) -> Vec<ChannelProfile> {
        self.channels.read().iter().filter(|c| c.group == group).cloned().collect()
    }

    /// Channels with signal that are not muted.
    pub fn active(&self) -> Vec<ChannelProfile> {
        self.channels
            .read()
            .iter()
            .filter(|c| c.fingerprint.has_signal && !c.muted)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ChannelProfile> {
        self.channels.read().clone()
    }

    pub fn len(&self) -> u16 {
        self.channels.read().len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mix_core::Confidence;

    #[test]
    fn test_resize_assigns_indices() {
        let map = ChannelMap::new();
        map.resize(8);
        assert_eq!(map.len(), 8);
        assert_eq!(map.profile(1).unwrap().index, 1);
        assert_eq!(map.profile(8).unwrap().index, 8);
        assert!(map.profile(0).is_none());
        assert!(map.profile(9).is_none());
    }

    #[test]
    fn test_update_and_query() {
        let map = ChannelMap::new();
        map.resize(4);

        let mut p = ChannelProfile::new(2);
        p.console_name = "Kick".into();
        p.role = InstrumentRole::Kick;
        p.group = "drums".into();
        p.confidence = Confidence::High;
        map.update_profile(p);

        assert_eq!(map.profile(2).unwrap().role, InstrumentRole::Kick);
        assert_eq!(map.by_role(InstrumentRole::Kick).len(), 1);
        assert_eq!(map.by_group("drums").len(), 1);
        assert_eq!(map.by_role(InstrumentRole::Snare).len(), 0);
    }

    #[test]
    fn test_out_of_range_update_ignored() {
        let map = ChannelMap::new();
        map.resize(4);
        map.update_profile(ChannelProfile::new(0));
        map.update_profile(ChannelProfile::new(99));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_active_filters_signal_and_mute() {
        let map = ChannelMap::new();
        map.resize(3);

        let mut with_signal = ChannelProfile::new(1);
        with_signal.fingerprint.has_signal = true;
        map.update_profile(with_signal);

        let mut muted = ChannelProfile::new(2);
        muted.fingerprint.has_signal = true;
        muted.muted = true;
        map.update_profile(muted);

        let active = map.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].index, 1);
    }
}
