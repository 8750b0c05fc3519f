//! Device identity and access validation.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::DeviceStore;
use banter_sync_protocol::{Device, DevicePatch, RegisterDevice, SyncSettings};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// The device registry: registration, updates, deactivation and the
/// access guard every sync operation passes through first.
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
    config: EngineConfig,
}

impl DeviceRegistry {
    /// Creates a registry over a device store.
    pub fn new(store: Arc<dyn DeviceStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Registers a device for a user.
    ///
    /// Re-registering the same (user, fingerprint) updates the mutable
    /// fields, reactivates the record and refreshes last-seen instead of
    /// duplicating it.
    pub fn register(&self, user_id: &str, request: RegisterDevice) -> SyncResult<Device> {
        if let Some(mut existing) = self
            .store
            .find_by_fingerprint(user_id, &request.fingerprint)?
        {
            existing.name = request.device_name;
            existing.device_type = request.device_type;
            existing.platform = request.platform;
            existing.user_agent = request.user_agent;
            existing.push_token = request.push_token;
            existing.capabilities = request.capabilities;
            existing.active = true;
            existing.last_seen_at = Utc::now();

            debug!(device_id = %existing.id, user_id, "reactivated existing device");
            self.store.upsert(existing.clone())?;
            return Ok(existing);
        }

        let now = Utc::now();
        let device = Device {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            fingerprint: request.fingerprint,
            name: request.device_name,
            device_type: request.device_type,
            platform: request.platform,
            user_agent: request.user_agent,
            capabilities: request.capabilities,
            active: true,
            last_seen_at: now,
            push_token: request.push_token,
            registered_at: now,
            settings: SyncSettings::default(),
        };

        info!(device_id = %device.id, user_id, "registered new device");
        self.store.upsert(device.clone())?;
        Ok(device)
    }

    /// Updates a device's mutable fields, scoped to its owner.
    ///
    /// A settings patch merges field-wise rather than replacing the
    /// whole settings block.
    pub fn update(
        &self,
        device_id: &str,
        user_id: &str,
        patch: DevicePatch,
    ) -> SyncResult<Device> {
        let mut device = self.owned_device(device_id, user_id)?;

        if let Some(name) = patch.name {
            device.name = name;
        }
        if let Some(platform) = patch.platform {
            device.platform = platform;
        }
        if let Some(user_agent) = patch.user_agent {
            device.user_agent = user_agent;
        }
        if let Some(push_token) = patch.push_token {
            device.push_token = Some(push_token);
        }
        if let Some(capabilities) = patch.capabilities {
            device.capabilities = capabilities;
        }
        if let Some(settings_patch) = patch.settings {
            device.settings = device.settings.merged(&settings_patch);
        }

        self.store.upsert(device.clone())?;
        Ok(device)
    }

    /// Soft-deactivates a device; the record and its history remain.
    pub fn deactivate(&self, device_id: &str, user_id: &str) -> SyncResult<()> {
        let mut device = self.owned_device(device_id, user_id)?;
        device.active = false;
        info!(device_id, user_id, "deactivated device");
        self.store.upsert(device)
    }

    /// Returns true when the device exists, belongs to the user and is
    /// active. The mandatory guard before any other sync operation.
    pub fn validate_access(&self, device_id: &str, user_id: &str) -> SyncResult<bool> {
        Ok(self
            .store
            .get(device_id)?
            .map(|d| d.user_id == user_id && d.active)
            .unwrap_or(false))
    }

    /// Fetches an owned device.
    pub fn get(&self, device_id: &str, user_id: &str) -> SyncResult<Device> {
        self.owned_device(device_id, user_id)
    }

    /// Lists all of a user's devices.
    pub fn list_for_user(&self, user_id: &str) -> SyncResult<Vec<Device>> {
        self.store.list_for_user(user_id)
    }

    /// Refreshes a device's last-seen time.
    pub fn touch(&self, device_id: &str) -> SyncResult<()> {
        let mut device =
            self.store
                .get(device_id)?
                .ok_or_else(|| SyncError::DeviceNotFound {
                    device_id: device_id.to_string(),
                })?;
        device.last_seen_at = Utc::now();
        self.store.upsert(device)
    }

    /// Batch-deactivates devices unseen for longer than the threshold.
    ///
    /// Returns the number of devices affected. `None` uses the
    /// configured threshold.
    pub fn cleanup_inactive(&self, threshold_days: Option<i64>) -> SyncResult<usize> {
        let days = threshold_days.unwrap_or(self.config.inactive_threshold_days);
        let cutoff = Utc::now() - Duration::days(days);

        let mut affected = 0;
        for mut device in self.store.list_active()? {
            if device.last_seen_at < cutoff {
                device.active = false;
                self.store.upsert(device)?;
                affected += 1;
            }
        }

        if affected > 0 {
            info!(affected, days, "swept inactive devices");
        }
        Ok(affected)
    }

    /// Generates a one-way device fingerprint from a user agent and
    /// extra entropy.
    ///
    /// The digest mixes in the current time and a random salt, so it is
    /// not reproducible across calls; callers should prefer durable
    /// client-supplied fingerprints.
    pub fn generate_fingerprint(user_agent: &str, extra: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_agent.as_bytes());
        hasher.update(extra.as_bytes());
        hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(rand::random::<u64>().to_le_bytes());

        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn owned_device(&self, device_id: &str, user_id: &str) -> SyncResult<Device> {
        let device = self
            .store
            .get(device_id)?
            .ok_or_else(|| SyncError::DeviceNotFound {
                device_id: device_id.to_string(),
            })?;
        if device.user_id != user_id {
            return Err(SyncError::Unauthorized {
                device_id: device_id.to_string(),
            });
        }
        Ok(device)
    }
}
