//! Access to provisioning and platform settings.
//!
//! The [`SettingsProvider`] trait is implemented by the embedding platform.
//! Every call may fail (typically when there is no active subscription), so
//! the engine always goes through [`SettingsReader`], which logs the failure
//! and falls back to a documented default.

use std::{sync::Arc, time::Duration};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Default minimum spacing between two PUBLISH requests (60 seconds).
pub const DEFAULT_PUBLISH_THROTTLE: Duration = Duration::from_millis(60_000);

/// Provisioning value meaning "enabled".
pub const PROVISIONING_VALUE_ENABLED: i32 = 1;

/// Integer provisioning items read by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningKey {
    /// Minimum time between two published messages, in milliseconds.
    SourceThrottlePublish,
    /// Provisioning status for the enhanced address book (RCS presence).
    EabSettingEnabled,
}

/// Per-capability provisioning status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionedCapability {
    /// Voice over LTE.
    Volte,
    /// Voice over Wi-Fi.
    VoWifi,
    /// Video over LTE.
    Lvc,
}

/// Platform and user toggles that gate the announced capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub volte_enabled_by_platform: bool,
    pub wfc_enabled_by_platform: bool,
    pub vt_enabled_by_platform: bool,
    /// "Enhanced 4G LTE mode" user switch.
    pub volte_enabled_by_user: bool,
    pub wfc_enabled_by_user: bool,
    /// Carrier requires VoLTE/RCS provisioning before publishing.
    pub requires_provisioning: bool,
}

impl PlatformSettings {
    /// The voice gate is fully closed: nothing on the platform or user side
    /// allows IP voice.
    pub fn voice_gate_closed(&self) -> bool {
        (!self.volte_enabled_by_platform && !self.wfc_enabled_by_platform)
            || (!self.volte_enabled_by_user && !self.wfc_enabled_by_user)
    }
}

/// TTY mode as reported by the telecom stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtyMode {
    #[default]
    Off,
    Full,
    Hco,
    Vco,
}

impl TtyMode {
    pub fn is_enabled(self) -> bool {
        self != TtyMode::Off
    }
}

/// Source of settings for the current subscription.
pub trait SettingsProvider: Send + Sync {
    fn provisioning_int(&self, key: ProvisioningKey) -> Result<i32, SettingsError>;

    fn is_provisioned(&self, capability: ProvisionedCapability) -> Result<bool, SettingsError>;

    fn platform(&self) -> Result<PlatformSettings, SettingsError>;

    fn is_mobile_data_enabled(&self) -> Result<bool, SettingsError>;

    fn is_airplane_mode_on(&self) -> Result<bool, SettingsError> {
        Ok(false)
    }

    /// Whether the radio currently reports any data network.
    fn has_data_network(&self) -> Result<bool, SettingsError> {
        Ok(true)
    }

    fn tty_mode(&self) -> Result<TtyMode, SettingsError> {
        Ok(TtyMode::Off)
    }

    fn is_vt_enabled_by_user(&self) -> Result<bool, SettingsError>;
}

/// Provisioning status of the three IP calling capabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisioningStatus {
    pub volte: bool,
    pub vowifi: bool,
    pub lvc: bool,
}

/// Wraps a [`SettingsProvider`] and applies safe defaults on failure.
#[derive(Clone)]
pub struct SettingsReader {
    provider: Arc<dyn SettingsProvider>,
}

impl SettingsReader {
    pub fn new(provider: Arc<dyn SettingsProvider>) -> Self {
        Self { provider }
    }

    /// Minimum spacing between publishes. Defaults to 60 seconds.
    pub fn publish_throttle(&self) -> Duration {
        match self
            .provider
            .provisioning_int(ProvisioningKey::SourceThrottlePublish)
        {
            Ok(ms) if ms >= 0 => Duration::from_millis(ms as u64),
            Ok(ms) => {
                debug!("[publish_throttle] Negative throttle {ms}, using default");
                DEFAULT_PUBLISH_THROTTLE
            }
            Err(e) => {
                debug!("[publish_throttle] {e}, using default");
                DEFAULT_PUBLISH_THROTTLE
            }
        }
    }

    /// Defaults to `false`.
    pub fn is_provisioned(&self, capability: ProvisionedCapability) -> bool {
        self.provider
            .is_provisioned(capability)
            .unwrap_or_else(|e| {
                debug!("[is_provisioned] {capability:?}: {e}");
                false
            })
    }

    pub fn provisioning(&self) -> ProvisioningStatus {
        ProvisioningStatus {
            volte: self.is_provisioned(ProvisionedCapability::Volte),
            vowifi: self.is_provisioned(ProvisionedCapability::VoWifi),
            lvc: self.is_provisioned(ProvisionedCapability::Lvc),
        }
    }

    /// Defaults to everything disabled.
    pub fn platform(&self) -> PlatformSettings {
        self.provider.platform().unwrap_or_else(|e| {
            debug!("[platform] {e}, treating every feature as disabled");
            PlatformSettings::default()
        })
    }

    /// RCS presence is provisioned when the carrier does not require
    /// provisioning at all, or the EAB item is enabled. Defaults to `false`.
    pub fn is_eab_provisioned(&self) -> bool {
        if let Ok(platform) = self.provider.platform() {
            if !platform.requires_provisioning {
                return true;
            }
        }
        match self
            .provider
            .provisioning_int(ProvisioningKey::EabSettingEnabled)
        {
            Ok(value) => value == PROVISIONING_VALUE_ENABLED,
            Err(e) => {
                debug!("[is_eab_provisioned] {e}");
                false
            }
        }
    }

    /// Defaults to `false`.
    pub fn is_mobile_data_enabled(&self) -> bool {
        self.provider.is_mobile_data_enabled().unwrap_or_else(|e| {
            debug!("[is_mobile_data_enabled] {e}");
            false
        })
    }

    /// Defaults to `false`.
    pub fn is_airplane_mode_on(&self) -> bool {
        self.provider.is_airplane_mode_on().unwrap_or(false)
    }

    /// Defaults to `true`, so a missing radio report never hides a capability
    /// that the technology triggers already announced.
    pub fn has_data_network(&self) -> bool {
        self.provider.has_data_network().unwrap_or(true)
    }

    /// Defaults to [`TtyMode::Off`].
    pub fn tty_mode(&self) -> TtyMode {
        self.provider.tty_mode().unwrap_or_default()
    }

    /// Defaults to `false`.
    pub fn is_vt_enabled_by_user(&self) -> bool {
        self.provider.is_vt_enabled_by_user().unwrap_or(false)
    }
}

/// Fixed settings, deserializable from JSON. Used by the scenario runner and
/// as a test double.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSettings {
    /// `false` simulates a device without an active subscription.
    pub subscription_active: bool,
    pub platform: PlatformSettings,
    pub provisioned: Vec<ProvisionedCapability>,
    pub eab_provisioned: bool,
    pub publish_throttle_ms: i32,
    pub mobile_data_enabled: bool,
    pub airplane_mode_on: bool,
    pub data_network: bool,
    pub tty_mode: TtyMode,
    pub vt_enabled_by_user: bool,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            subscription_active: true,
            platform: PlatformSettings {
                volte_enabled_by_platform: true,
                wfc_enabled_by_platform: true,
                vt_enabled_by_platform: true,
                volte_enabled_by_user: true,
                wfc_enabled_by_user: true,
                requires_provisioning: true,
            },
            provisioned: vec![
                ProvisionedCapability::Volte,
                ProvisionedCapability::VoWifi,
                ProvisionedCapability::Lvc,
            ],
            eab_provisioned: true,
            publish_throttle_ms: DEFAULT_PUBLISH_THROTTLE.as_millis() as i32,
            mobile_data_enabled: true,
            airplane_mode_on: false,
            data_network: true,
            tty_mode: TtyMode::Off,
            vt_enabled_by_user: true,
        }
    }
}

impl StaticSettings {
    fn active(&self) -> Result<(), SettingsError> {
        if self.subscription_active {
            Ok(())
        } else {
            Err(SettingsError::NoActiveSubscription)
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn provisioning_int(&self, key: ProvisioningKey) -> Result<i32, SettingsError> {
        self.active()?;
        Ok(match key {
            ProvisioningKey::SourceThrottlePublish => self.publish_throttle_ms,
            ProvisioningKey::EabSettingEnabled => self.eab_provisioned as i32,
        })
    }

    fn is_provisioned(&self, capability: ProvisionedCapability) -> Result<bool, SettingsError> {
        self.active()?;
        Ok(self.provisioned.contains(&capability))
    }

    fn platform(&self) -> Result<PlatformSettings, SettingsError> {
        self.active()?;
        Ok(self.platform)
    }

    fn is_mobile_data_enabled(&self) -> Result<bool, SettingsError> {
        Ok(self.mobile_data_enabled)
    }

    fn is_airplane_mode_on(&self) -> Result<bool, SettingsError> {
        Ok(self.airplane_mode_on)
    }

    fn has_data_network(&self) -> Result<bool, SettingsError> {
        Ok(self.data_network)
    }

    fn tty_mode(&self) -> Result<TtyMode, SettingsError> {
        Ok(self.tty_mode)
    }

    fn is_vt_enabled_by_user(&self) -> Result<bool, SettingsError> {
        Ok(self.vt_enabled_by_user)
    }
}
