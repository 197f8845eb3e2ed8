//! Bridge state machine.
//!
//! Lifecycle changes go through [`transition`]; connectivity and the
//! installing/controlled flags are updated directly by [`ClientStatus::apply`].

use serde::Serialize;
use sitekit_sw::ClientMessage;

use crate::connectivity::{ConnectionQuality, Connectivity};

/// Relationship between the page and its router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "kebab-case")]
pub enum LifecycleState {
    /// The host cannot run service workers. Terminal.
    Unsupported,
    Unregistered,
    Registering,
    RegisteredActive,
    /// A newer router is waiting; reload to pick it up.
    UpdateAvailable,
    Error(String),
}

/// Everything that can move the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Registration began.
    RegistrationStarted,
    /// The host accepted the registration.
    Registered,
    /// Preflight or registration failed.
    RegistrationError(String),
    /// The registration was torn down.
    Unregistered,
    /// A new worker started installing.
    InstallFound,
    /// The installing worker reached `installed`.
    WorkerInstalled { controller_present: bool },
    /// A different worker now controls the page.
    ControllerChanged,
    /// The router posted a message.
    MessageReceived(ClientMessage),
    Online,
    Offline,
    ConnectionChanged(Option<ConnectionQuality>),
}

impl BridgeEvent {
    /// Event for a JSON message posted by the router. Unknown payloads are
    /// ignored.
    pub fn from_message_json(json: &str) -> Option<Self> {
        ClientMessage::from_json(json).map(BridgeEvent::MessageReceived)
    }
}

/// Next lifecycle state, or `None` when the event does not apply.
pub fn transition(state: &LifecycleState, event: &BridgeEvent) -> Option<LifecycleState> {
    use BridgeEvent as E;
    use LifecycleState as S;

    match (state, event) {
        (S::Unsupported, _) => None,

        (S::Unregistered | S::Error(_), E::RegistrationStarted) => Some(S::Registering),
        (S::Registering, E::Registered) => Some(S::RegisteredActive),
        (_, E::RegistrationError(message)) => Some(S::Error(message.clone())),
        (S::RegisteredActive | S::UpdateAvailable | S::Error(_), E::Unregistered) => {
            Some(S::Unregistered)
        }

        // An installed worker next to an existing controller is waiting to
        // take over; without a controller it is the first install.
        (S::RegisteredActive, E::WorkerInstalled { controller_present: true }) => {
            Some(S::UpdateAvailable)
        }
        (S::RegisteredActive, E::MessageReceived(ClientMessage::UpdateAvailable { .. })) => {
            Some(S::UpdateAvailable)
        }

        _ => None,
    }
}

/// The bridge's published status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatus {
    pub lifecycle: LifecycleState,
    pub connectivity: Connectivity,
    /// A new worker is installing.
    pub installing: bool,
    /// A worker controls the page.
    pub controlled: bool,
}

impl ClientStatus {
    pub fn new(lifecycle: LifecycleState, connectivity: Connectivity, controlled: bool) -> Self {
        Self {
            lifecycle,
            connectivity,
            installing: false,
            controlled,
        }
    }

    pub fn update_available(&self) -> bool {
        self.lifecycle == LifecycleState::UpdateAvailable
    }

    /// Error message, if registration failed.
    pub fn error(&self) -> Option<&str> {
        match &self.lifecycle {
            LifecycleState::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Apply an event. Returns whether anything changed.
    pub fn apply(&mut self, event: &BridgeEvent) -> bool {
        let before = self.clone();

        match event {
            BridgeEvent::Online => self.connectivity.online = true,
            BridgeEvent::Offline => self.connectivity.online = false,
            BridgeEvent::ConnectionChanged(quality) => self.connectivity.quality = quality.clone(),
            BridgeEvent::InstallFound => self.installing = true,
            BridgeEvent::WorkerInstalled { .. } => self.installing = false,
            BridgeEvent::ControllerChanged => self.controlled = true,
            BridgeEvent::Unregistered => {
                self.installing = false;
                self.controlled = false;
            }
            _ => {}
        }

        if let Some(next) = transition(&self.lifecycle, event) {
            self.lifecycle = next;
        }

        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_message() -> BridgeEvent {
        BridgeEvent::MessageReceived(ClientMessage::UpdateAvailable { version: None })
    }

    #[test]
    fn test_registration_path() {
        let registering =
            transition(&LifecycleState::Unregistered, &BridgeEvent::RegistrationStarted).unwrap();
        assert_eq!(registering, LifecycleState::Registering);

        let active = transition(&registering, &BridgeEvent::Registered).unwrap();
        assert_eq!(active, LifecycleState::RegisteredActive);

        let failed = transition(&registering, &BridgeEvent::RegistrationError("boom".into()));
        assert_eq!(failed, Some(LifecycleState::Error("boom".into())));
    }

    #[test]
    fn test_unsupported_is_terminal() {
        for event in [
            BridgeEvent::RegistrationStarted,
            BridgeEvent::RegistrationError("x".into()),
            update_message(),
        ] {
            assert_eq!(transition(&LifecycleState::Unsupported, &event), None);
        }
    }

    #[test]
    fn test_update_paths() {
        let active = LifecycleState::RegisteredActive;

        let installed = BridgeEvent::WorkerInstalled {
            controller_present: true,
        };
        assert_eq!(
            transition(&active, &installed),
            Some(LifecycleState::UpdateAvailable)
        );
        assert_eq!(
            transition(&active, &update_message()),
            Some(LifecycleState::UpdateAvailable)
        );

        let first_install = BridgeEvent::WorkerInstalled {
            controller_present: false,
        };
        assert_eq!(transition(&active, &first_install), None);
    }

    #[test]
    fn test_apply_tracks_connectivity() {
        let mut status = ClientStatus::new(LifecycleState::Unregistered, Connectivity::online(), false);
        assert!(status.apply(&BridgeEvent::Offline));
        assert!(!status.connectivity.online);
        assert!(!status.apply(&BridgeEvent::Offline));

        let quality = ConnectionQuality {
            downlink_mbps: 1.5,
            rtt_ms: 300,
            effective_type: "3g".into(),
            ..Default::default()
        };
        assert!(status.apply(&BridgeEvent::ConnectionChanged(Some(quality))));
        assert!(status.apply(&BridgeEvent::Online));
        assert_eq!(status.connectivity.summary(), "Online (3G) 1.5 Mbps • 300ms");
    }

    #[test]
    fn test_unknown_message_ignored() {
        assert_eq!(BridgeEvent::from_message_json(r#"{"type":"CACHE_CLEARED"}"#), None);
        assert_eq!(
            BridgeEvent::from_message_json(r#"{"type":"SW_UPDATE_AVAILABLE"}"#),
            Some(update_message())
        );
    }
}
