//! Per-user application settings

use serde::{Deserialize, Serialize};

use crate::store::OfflineEntity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

/// A user's app preferences. Singleton per user, keyed by the fixed natural
/// key `"settings"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub unit_system: UnitSystem,
    pub locale: String,
    pub week_starts_monday: bool,
    pub reminders_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            unit_system: UnitSystem::Metric,
            locale: "en".to_string(),
            week_starts_monday: true,
            reminders_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppSettingsUpdate {
    pub unit_system: Option<UnitSystem>,
    pub locale: Option<String>,
    pub week_starts_monday: Option<bool>,
    pub reminders_enabled: Option<bool>,
}

pub struct SettingsEntity;

impl OfflineEntity for SettingsEntity {
    const TABLE: &'static str = "app_settings";
    // Settings changes should reach the server before bulk measurement data
    const PRIORITY: i64 = 10;

    type Payload = AppSettings;
    type CreateInput = AppSettings;
    type UpdateInput = AppSettingsUpdate;

    fn payload_from_create(input: Self::CreateInput) -> Self::Payload {
        input
    }

    fn apply_update(payload: &mut Self::Payload, update: Self::UpdateInput) {
        if let Some(unit_system) = update.unit_system {
            payload.unit_system = unit_system;
        }
        if let Some(locale) = update.locale {
            payload.locale = locale;
        }
        if let Some(week_starts_monday) = update.week_starts_monday {
            payload.week_starts_monday = week_starts_monday;
        }
        if let Some(reminders_enabled) = update.reminders_enabled {
            payload.reminders_enabled = reminders_enabled;
        }
    }

    fn natural_key(_payload: &Self::Payload) -> String {
        "settings".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_singleton_natural_key() {
        let a = AppSettings::default();
        let b = AppSettings {
            locale: "de".to_string(),
            ..AppSettings::default()
        };
        assert_eq!(SettingsEntity::natural_key(&a), SettingsEntity::natural_key(&b));
    }

    #[test]
    fn test_unit_system_serializes_snake_case() {
        let json = serde_json::to_string(&UnitSystem::Imperial).unwrap();
        assert_eq!(json, "\"imperial\"");
    }
}
