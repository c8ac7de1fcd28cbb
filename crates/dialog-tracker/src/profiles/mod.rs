//! Dialog profiles
//!
//! Named groups of dialogs used for counting, e.g. concurrent calls per
//! account. A profile is declared either with values (membership is keyed
//! by a string such as the caller's account) or without. Membership ends
//! automatically when a dialog is deleted.

use dashmap::DashMap;
use tracing::debug;

use crate::errors::{DialogError, DialogResult};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Member {
    uid: u64,
    value: Option<String>,
}

#[derive(Debug, Default)]
struct Profile {
    with_value: bool,
    members: Vec<Member>,
}

/// Declared profiles and their members
#[derive(Debug, Default)]
pub struct DialogProfiles {
    profiles: DashMap<String, Profile>,
}

impl DialogProfiles {
    /// Declare profiles by name
    pub fn new(with_value: &[String], no_value: &[String]) -> Self {
        let profiles = DashMap::new();
        for name in with_value {
            profiles.insert(name.clone(), Profile { with_value: true, members: Vec::new() });
        }
        for name in no_value {
            profiles.insert(name.clone(), Profile { with_value: false, members: Vec::new() });
        }
        Self { profiles }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Add dialog `uid` to a profile
    pub fn add(&self, name: &str, value: Option<&str>, uid: u64) -> DialogResult<()> {
        let mut profile = self
            .profiles
            .get_mut(name)
            .ok_or_else(|| DialogError::profile(format!("profile '{}' is not declared", name)))?;
        match (profile.with_value, value) {
            (true, None) => {
                return Err(DialogError::profile(format!("profile '{}' requires a value", name)));
            }
            (false, Some(_)) => {
                return Err(DialogError::profile(format!("profile '{}' takes no value", name)));
            }
            _ => {}
        }
        let member = Member { uid, value: value.map(str::to_string) };
        if !profile.members.contains(&member) {
            profile.members.push(member);
        }
        Ok(())
    }

    /// Remove dialog `uid` from a profile; with no value, every membership goes
    pub fn remove(&self, name: &str, value: Option<&str>, uid: u64) -> bool {
        let Some(mut profile) = self.profiles.get_mut(name) else {
            return false;
        };
        let before = profile.members.len();
        profile
            .members
            .retain(|m| !(m.uid == uid && (value.is_none() || m.value.as_deref() == value)));
        before != profile.members.len()
    }

    /// Whether dialog `uid` is in a profile, optionally with a given value
    pub fn contains(&self, name: &str, value: Option<&str>, uid: u64) -> bool {
        self.profiles.get(name).is_some_and(|profile| {
            profile
                .members
                .iter()
                .any(|m| m.uid == uid && (value.is_none() || m.value.as_deref() == value))
        })
    }

    /// Number of members, optionally restricted to one value
    pub fn size(&self, name: &str, value: Option<&str>) -> DialogResult<usize> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| DialogError::profile(format!("profile '{}' is not declared", name)))?;
        Ok(profile
            .members
            .iter()
            .filter(|m| value.is_none() || m.value.as_deref() == value)
            .count())
    }

    /// Drop every membership of a deleted dialog
    pub fn remove_dialog(&self, uid: u64) {
        for mut profile in self.profiles.iter_mut() {
            let before = profile.members.len();
            profile.members.retain(|m| m.uid != uid);
            if before != profile.members.len() {
                debug!("dialog uid={} left profile '{}'", uid, profile.key());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles() -> DialogProfiles {
        DialogProfiles::new(&["caller".to_string()], &["inbound".to_string()])
    }

    #[test]
    fn test_value_rules() {
        let p = profiles();
        assert!(p.add("caller", None, 1).is_err());
        assert!(p.add("inbound", Some("x"), 1).is_err());
        assert!(p.add("missing", None, 1).is_err());
        assert!(p.add("caller", Some("alice"), 1).is_ok());
        assert!(p.add("inbound", None, 1).is_ok());
    }

    #[test]
    fn test_sizes_and_membership() {
        let p = profiles();
        p.add("caller", Some("alice"), 1).unwrap();
        p.add("caller", Some("alice"), 1).unwrap();
        p.add("caller", Some("alice"), 2).unwrap();
        p.add("caller", Some("bob"), 3).unwrap();

        assert_eq!(p.size("caller", None).unwrap(), 3);
        assert_eq!(p.size("caller", Some("alice")).unwrap(), 2);
        assert!(p.contains("caller", Some("bob"), 3));
        assert!(!p.contains("caller", Some("bob"), 1));

        assert!(p.remove("caller", Some("alice"), 2));
        assert!(!p.remove("caller", Some("alice"), 2));
        assert_eq!(p.size("caller", Some("alice")).unwrap(), 1);

        p.remove_dialog(1);
        assert_eq!(p.size("caller", None).unwrap(), 1);
    }
}
