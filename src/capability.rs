//! Capability evaluation.
//!
//! Decides whether IP voice and IP video should be announced as supported,
//! given the radio state, the per-transport feature availability and the
//! platform/user/provisioning settings. Evaluation is a pure function and is
//! re-run right before every submission so the announcement always reflects
//! the freshest state.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::settings::{PlatformSettings, ProvisioningStatus};

/// Network technology reported by the IMS stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkTechnology {
    LteVopsEnabled,
    LteVopsDisabled,
    Iwlan,
    Ehrpd,
    HspaPlus,
    Umts,
    Gsm,
    Wlan,
    Unknown,
}

impl NetworkTechnology {
    /// Technologies on which the stack only reports while IMS is registered.
    pub fn implies_ims_registered(self) -> bool {
        matches!(
            self,
            NetworkTechnology::LteVopsEnabled
                | NetworkTechnology::LteVopsDisabled
                | NetworkTechnology::Iwlan
                | NetworkTechnology::Ehrpd
        )
    }
}

/// Transport a feature-availability report applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImsTransport {
    /// Cellular.
    Wwan,
    /// Wi-Fi.
    Wlan,
}

/// Radio state accumulated from technology triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioState {
    pub on_lte: bool,
    pub vops_enabled: bool,
    pub on_iwlan: bool,
}

impl RadioState {
    /// Apply a technology change. Technologies the stack does not classify
    /// (`Wlan`, `Unknown`) leave the state untouched.
    pub fn apply(&mut self, tech: NetworkTechnology) {
        *self = match tech {
            NetworkTechnology::LteVopsEnabled => RadioState {
                on_lte: true,
                vops_enabled: true,
                on_iwlan: false,
            },
            NetworkTechnology::LteVopsDisabled => RadioState {
                on_lte: true,
                vops_enabled: false,
                on_iwlan: false,
            },
            NetworkTechnology::Iwlan => RadioState {
                on_lte: false,
                vops_enabled: false,
                on_iwlan: true,
            },
            NetworkTechnology::Ehrpd
            | NetworkTechnology::HspaPlus
            | NetworkTechnology::Umts
            | NetworkTechnology::Gsm => RadioState::default(),
            NetworkTechnology::Wlan | NetworkTechnology::Unknown => *self,
        };
    }

    /// Classify the current network. A reported technology only counts while
    /// the radio still has a data network.
    pub fn network_class(&self, has_data_network: bool) -> NetworkClass {
        if !has_data_network {
            return NetworkClass::Other;
        }
        if self.on_iwlan {
            NetworkClass::Iwlan
        } else if self.on_lte && self.vops_enabled {
            NetworkClass::LteWithVops
        } else if self.on_lte {
            NetworkClass::LteWithoutVops
        } else {
            NetworkClass::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkClass {
    LteWithVops,
    LteWithoutVops,
    Iwlan,
    Other,
}

/// Per-transport voice/video availability reported by the IMS feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityFlags {
    pub volte: bool,
    pub video: bool,
    pub vowifi: bool,
    pub viwifi: bool,
}

impl AvailabilityFlags {
    /// Flags after a report for `transport`; the other transport's pair is
    /// cleared.
    pub fn from_report(transport: ImsTransport, voice: bool, video: bool) -> Self {
        match transport {
            ImsTransport::Wwan => AvailabilityFlags {
                volte: voice,
                video,
                vowifi: false,
                viwifi: false,
            },
            ImsTransport::Wlan => AvailabilityFlags {
                volte: false,
                video: false,
                vowifi: voice,
                viwifi: video,
            },
        }
    }
}

/// Everything the evaluator looks at.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityInputs {
    pub network: NetworkClass,
    pub availability: AvailabilityFlags,
    pub platform: PlatformSettings,
    pub provisioning: ProvisioningStatus,
    pub vt_enabled_by_user: bool,
    pub tty_enabled: bool,
    pub mobile_data_enabled: bool,
}

/// Capability content of a PUBLISH.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublishContent {
    pub voice_capable: bool,
    pub video_capable: bool,
}

pub fn evaluate(inputs: &CapabilityInputs) -> PublishContent {
    PublishContent {
        voice_capable: is_voice_capable(inputs),
        video_capable: is_video_capable(inputs),
    }
}

pub fn is_voice_capable(inputs: &CapabilityInputs) -> bool {
    let platform = &inputs.platform;
    // volte and wfc can be enabled separately
    if !platform.volte_enabled_by_platform && !platform.wfc_enabled_by_platform {
        debug!("[is_voice_capable] Disabled by platform");
        return false;
    }

    if !inputs.provisioning.volte && !inputs.provisioning.vowifi {
        debug!("[is_voice_capable] Not provisioned");
        return false;
    }

    if !platform.volte_enabled_by_user && !platform.wfc_enabled_by_user {
        debug!("[is_voice_capable] User enabled neither VoLTE nor Wi-Fi calling");
        return false;
    }

    match inputs.network {
        NetworkClass::Iwlan => {
            let capable = inputs.availability.volte || inputs.availability.vowifi;
            debug!("[is_voice_capable] On IWLAN, voice_capable={capable}");
            capable
        }
        NetworkClass::LteWithVops => true,
        NetworkClass::LteWithoutVops => {
            debug!("[is_voice_capable] VoPS disabled");
            false
        }
        NetworkClass::Other => {
            debug!("[is_voice_capable] Not on LTE");
            false
        }
    }
}

pub fn is_video_capable(inputs: &CapabilityInputs) -> bool {
    let platform = &inputs.platform;
    // viwifi follows volte and vt
    if !platform.volte_enabled_by_platform || !platform.vt_enabled_by_platform {
        debug!("[is_video_capable] Disabled by platform");
        return false;
    }

    if !inputs.provisioning.volte || !inputs.provisioning.lvc {
        debug!("[is_video_capable] Not provisioned");
        return false;
    }

    if !platform.volte_enabled_by_user || !inputs.vt_enabled_by_user {
        debug!("[is_video_capable] User disabled VoLTE or VT");
        return false;
    }

    if inputs.tty_enabled {
        debug!("[is_video_capable] TTY is on");
        return false;
    }

    if inputs.network == NetworkClass::Iwlan {
        let capable = inputs.availability.video || inputs.availability.viwifi;
        debug!("[is_video_capable] On IWLAN, video_capable={capable}");
        return capable;
    }

    if !inputs.mobile_data_enabled {
        debug!("[is_video_capable] Mobile data disabled");
        return false;
    }

    match inputs.network {
        NetworkClass::LteWithVops => true,
        NetworkClass::LteWithoutVops => {
            debug!("[is_video_capable] VoPS disabled");
            false
        }
        _ => {
            debug!("[is_video_capable] Not on LTE");
            false
        }
    }
}
