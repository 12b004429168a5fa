//! User setting — the scene a persona frames its conversation inside.
//!
//! Unset fields fall back to documented defaults at compile time: the
//! meeting time defaults to "2 AM" and the venue to the back booth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default meeting time when the user never picked one.
pub const DEFAULT_MEETING_TIME: &str = "2 AM";

/// Default venue when the user never picked one.
pub const DEFAULT_VENUE: &str = "the back booth of an all-night diner";

/// Per (persona, user) scene configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSetting {
    pub persona_id: String,
    pub user_id: String,

    /// Time of day the scene is framed at, e.g. `"2 AM"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_time: Option<String>,

    /// Where the scene is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,

    /// Free-form atmosphere notes appended to the compiled setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atmosphere: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserSetting {
    pub fn new(persona_id: &str, user_id: &str) -> Self {
        Self {
            persona_id: persona_id.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Compile the setting into a single scene line, applying defaults for
    /// unset fields.
    pub fn compile(&self) -> String {
        let time = self.meeting_time.as_deref().unwrap_or(DEFAULT_MEETING_TIME);
        let venue = self.venue.as_deref().unwrap_or(DEFAULT_VENUE);
        match self.atmosphere.as_deref() {
            Some(atmosphere) => format!("It is {time}, in {venue}. {atmosphere}"),
            None => format!("It is {time}, in {venue}."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_applies_defaults() {
        let setting = UserSetting::new("p1", "u1");
        let compiled = setting.compile();
        assert!(compiled.contains("2 AM"));
        assert!(compiled.contains("all-night diner"));
    }

    #[test]
    fn compile_reflects_every_saved_field() {
        let setting = UserSetting {
            meeting_time: Some("dusk".into()),
            venue: Some("a rooftop greenhouse".into()),
            atmosphere: Some("Rain against the glass.".into()),
            ..UserSetting::new("p1", "u1")
        };
        let compiled = setting.compile();
        assert!(compiled.contains("dusk"));
        assert!(compiled.contains("rooftop greenhouse"));
        assert!(compiled.contains("Rain against the glass."));
        assert!(!compiled.contains("2 AM"));
    }

    #[test]
    fn partial_setting_mixes_saved_and_default() {
        let setting = UserSetting {
            venue: Some("the station platform".into()),
            ..UserSetting::new("p1", "u1")
        };
        let compiled = setting.compile();
        assert!(compiled.contains("2 AM"));
        assert!(compiled.contains("station platform"));
    }
}
