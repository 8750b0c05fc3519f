//! Device identity, capabilities and sync settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The form factor of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Phone client.
    Mobile,
    /// Tablet client.
    Tablet,
    /// Native desktop client.
    Desktop,
    /// Browser client.
    Web,
}

/// Capability flags a device advertises at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    /// Device can sync while backgrounded.
    pub background_sync: bool,
    /// Device accepts push tokens.
    pub push_notifications: bool,
    /// Device can hold encrypted local backups.
    pub encrypted_backup: bool,
}

/// Per-device sync preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Sync automatically without an explicit user action.
    pub auto_sync: bool,
    /// Include threads in sync rounds.
    pub sync_threads: bool,
    /// Include notifications in sync rounds.
    pub sync_notifications: bool,
    /// Only sync on unmetered networks.
    pub wifi_only: bool,
    /// Only sync while charging.
    pub charging_only: bool,
    /// Maximum operations buffered in the offline queue.
    pub max_queued_operations: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_threads: true,
            sync_notifications: true,
            wifi_only: false,
            charging_only: false,
            max_queued_operations: 1000,
        }
    }
}

/// A field-wise patch for `SyncSettings`; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettingsPatch {
    /// New auto-sync flag.
    pub auto_sync: Option<bool>,
    /// New thread toggle.
    pub sync_threads: Option<bool>,
    /// New notification toggle.
    pub sync_notifications: Option<bool>,
    /// New wifi-only flag.
    pub wifi_only: Option<bool>,
    /// New charging-only flag.
    pub charging_only: Option<bool>,
    /// New queue bound.
    pub max_queued_operations: Option<u32>,
}

impl SyncSettings {
    /// Returns settings with the patch's present fields applied.
    pub fn merged(&self, patch: &SyncSettingsPatch) -> Self {
        Self {
            auto_sync: patch.auto_sync.unwrap_or(self.auto_sync),
            sync_threads: patch.sync_threads.unwrap_or(self.sync_threads),
            sync_notifications: patch.sync_notifications.unwrap_or(self.sync_notifications),
            wifi_only: patch.wifi_only.unwrap_or(self.wifi_only),
            charging_only: patch.charging_only.unwrap_or(self.charging_only),
            max_queued_operations: patch
                .max_queued_operations
                .unwrap_or(self.max_queued_operations),
        }
    }

    /// Returns true if the given kind is enabled for this device.
    pub fn syncs_kind(&self, kind: crate::ResourceKind) -> bool {
        match kind {
            crate::ResourceKind::Thread => self.sync_threads,
            crate::ResourceKind::Notification => self.sync_notifications,
        }
    }
}

/// A registered device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Device id, unique across the platform.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Client-supplied fingerprint, unique per user.
    pub fingerprint: String,
    /// Human-readable name.
    pub name: String,
    /// Form factor.
    pub device_type: DeviceType,
    /// Platform string (e.g. "ios-17.4").
    pub platform: String,
    /// Client user agent.
    pub user_agent: String,
    /// Advertised capabilities.
    pub capabilities: DeviceCapabilities,
    /// False once deactivated; the record is retained.
    pub active: bool,
    /// Last time the device was seen syncing.
    pub last_seen_at: DateTime<Utc>,
    /// Push token, when the device accepts pushes.
    pub push_token: Option<String>,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    /// Sync preferences.
    pub settings: SyncSettings,
}

/// Registration request for a new or returning device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice {
    /// Durable client-supplied fingerprint.
    pub fingerprint: String,
    /// Human-readable name.
    pub device_name: String,
    /// Form factor.
    pub device_type: DeviceType,
    /// Platform string.
    pub platform: String,
    /// Client user agent.
    pub user_agent: String,
    /// Push token, if any.
    pub push_token: Option<String>,
    /// Advertised capabilities.
    pub capabilities: DeviceCapabilities,
}

/// Owner-scoped update for a device's mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    /// New name.
    pub name: Option<String>,
    /// New platform string.
    pub platform: Option<String>,
    /// New user agent.
    pub user_agent: Option<String>,
    /// New push token.
    pub push_token: Option<String>,
    /// New capabilities.
    pub capabilities: Option<DeviceCapabilities>,
    /// Settings patch, merged field-wise.
    pub settings: Option<SyncSettingsPatch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceKind;

    #[test]
    fn settings_patch_merges_fieldwise() {
        let settings = SyncSettings::default();
        let patch = SyncSettingsPatch {
            wifi_only: Some(true),
            max_queued_operations: Some(50),
            ..Default::default()
        };

        let merged = settings.merged(&patch);
        assert!(merged.wifi_only);
        assert_eq!(merged.max_queued_operations, 50);
        // Untouched fields keep their values.
        assert!(merged.auto_sync);
        assert!(merged.sync_threads);
    }

    #[test]
    fn empty_patch_is_identity() {
        let settings = SyncSettings::default();
        assert_eq!(settings.merged(&SyncSettingsPatch::default()), settings);
    }

    #[test]
    fn per_kind_toggles() {
        let settings = SyncSettings {
            sync_notifications: false,
            ..Default::default()
        };
        assert!(settings.syncs_kind(ResourceKind::Thread));
        assert!(!settings.syncs_kind(ResourceKind::Notification));
    }

    #[test]
    fn device_serializes_camel_case() {
        let device = Device {
            id: "d1".into(),
            user_id: "u1".into(),
            fingerprint: "fp".into(),
            name: "Pixel".into(),
            device_type: DeviceType::Mobile,
            platform: "android-15".into(),
            user_agent: "banter-android/3.2".into(),
            capabilities: DeviceCapabilities::default(),
            active: true,
            last_seen_at: Utc::now(),
            push_token: None,
            registered_at: Utc::now(),
            settings: SyncSettings::default(),
        };

        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("userId"));
        assert!(json.contains("lastSeenAt"));
        assert!(json.contains("\"deviceType\":\"mobile\""));
    }
}
