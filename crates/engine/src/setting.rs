//! User-setting persistence and extraction.
//!
//! The setting is the scene a persona frames its replies inside. Users
//! rarely configure it explicitly, so session completion also scans user
//! turns for setting hints ("let's meet at the pier", "around 3 AM").

use regex::Regex;
use std::sync::LazyLock;

use counterforce_core::session::{SessionMessage, SessionRole};
use counterforce_core::setting::UserSetting;

static TIME_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:at|around)\s+(\d{1,2}\s?(?:am|pm))\b").unwrap());

static VENUE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blet'?s (?:always )?meet (?:at|in) (?P<venue>[a-z0-9' ]{3,60}?)(?:[.,!?]|$)")
        .unwrap()
});

/// Scan user turns for setting hints. Returns `None` when nothing was
/// found; otherwise the fields to merge into the stored setting.
pub fn extract_setting_hints(messages: &[SessionMessage]) -> Option<SettingHints> {
    let mut hints = SettingHints::default();
    for message in messages {
        if message.role != SessionRole::User {
            continue;
        }
        if hints.meeting_time.is_none() {
            if let Some(captures) = TIME_HINT.captures(&message.content) {
                hints.meeting_time = Some(captures[1].to_uppercase());
            }
        }
        if hints.venue.is_none() {
            if let Some(captures) = VENUE_HINT.captures(&message.content) {
                hints.venue = Some(captures["venue"].trim().to_string());
            }
        }
    }
    if hints.meeting_time.is_none() && hints.venue.is_none() {
        None
    } else {
        Some(hints)
    }
}

/// Fields extracted from a transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingHints {
    pub meeting_time: Option<String>,
    pub venue: Option<String>,
}

impl SettingHints {
    /// Merge into an existing setting; extracted hints never overwrite a
    /// field the user set explicitly.
    pub fn merge_into(self, setting: &mut UserSetting) -> bool {
        let mut changed = false;
        if setting.meeting_time.is_none() {
            if let Some(time) = self.meeting_time {
                setting.meeting_time = Some(time);
                changed = true;
            }
        }
        if setting.venue.is_none() {
            if let Some(venue) = self.venue {
                setting.venue = Some(venue);
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_time_and_venue() {
        let messages = vec![
            SessionMessage::user("let's meet at the abandoned observatory, like before"),
            SessionMessage::user("come find me around 3 am"),
        ];
        let hints = extract_setting_hints(&messages).unwrap();
        assert_eq!(hints.venue.as_deref(), Some("the abandoned observatory"));
        assert_eq!(hints.meeting_time.as_deref(), Some("3 AM"));
    }

    #[test]
    fn persona_turns_are_ignored() {
        let messages = vec![SessionMessage::persona("let's meet at the pier at 4 am")];
        assert!(extract_setting_hints(&messages).is_none());
    }

    #[test]
    fn no_hints_returns_none() {
        let messages = vec![SessionMessage::user("tell me about the rocket")];
        assert!(extract_setting_hints(&messages).is_none());
    }

    #[test]
    fn merge_respects_explicit_fields() {
        let mut setting = UserSetting {
            meeting_time: Some("2 AM".into()),
            ..UserSetting::new("p1", "u1")
        };
        let hints = SettingHints {
            meeting_time: Some("5 PM".into()),
            venue: Some("the pier".into()),
        };
        let changed = hints.merge_into(&mut setting);
        assert!(changed);
        // Explicit time survives; empty venue is filled
        assert_eq!(setting.meeting_time.as_deref(), Some("2 AM"));
        assert_eq!(setting.venue.as_deref(), Some("the pier"));
    }

    #[test]
    fn merge_reports_no_change_when_all_fields_set() {
        let mut setting = UserSetting {
            meeting_time: Some("2 AM".into()),
            venue: Some("the diner".into()),
            ..UserSetting::new("p1", "u1")
        };
        let hints = SettingHints {
            meeting_time: Some("5 PM".into()),
            venue: Some("the pier".into()),
        };
        assert!(!hints.merge_into(&mut setting));
    }
}
