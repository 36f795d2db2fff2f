//! Configuration types for room sessions

use serde::{Deserialize, Serialize};

use crate::signaling::protocol::{ParticipantId, RoomId};

/// Main configuration for a [`RoomSession`](crate::room::RoomSession)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// WebSocket signaling server URL (ws:// or wss://)
    pub signaling_url: String,

    /// Room to negotiate in
    pub room_id: RoomId,

    /// Local participant id (auto-generated if None)
    pub participant_id: Option<ParticipantId>,

    /// STUN server URLs
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Attach a local audio track (default: true)
    pub enable_audio: bool,

    /// Attach a local video track (default: true)
    pub enable_video: bool,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            room_id: String::new(),
            participant_id: None,
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            turn_servers: Vec::new(),
            enable_audio: true,
            enable_video: true,
        }
    }
}

impl RoomConfig {
    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.room_id.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "room_id must not be empty".to_string(),
            ));
        }

        if self.signaling_url.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "signaling_url must not be empty".to_string(),
            ));
        }

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(crate::Error::InvalidConfig(format!(
                "signaling_url must be ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if let Some(id) = &self.participant_id {
            if id.is_empty() {
                return Err(crate::Error::InvalidConfig(
                    "participant_id must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Resolve the local participant id, generating one if not configured
    pub fn resolve_participant_id(&self) -> ParticipantId {
        self.participant_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_stun_servers() {
        let config = RoomConfig::default();
        assert!(!config.stun_servers.is_empty());
        assert!(config.enable_audio);
        assert!(config.enable_video);
    }

    #[test]
    fn test_validate_rejects_empty_room() {
        let config = RoomConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_ws_url() {
        let config = RoomConfig {
            room_id: "r1".to_string(),
            signaling_url: "http://localhost:8080".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_wss() {
        let config = RoomConfig {
            room_id: "r1".to_string(),
            signaling_url: "wss://signal.example.com/rooms".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_participant_id_generates_when_unset() {
        let config = RoomConfig::default();
        let a = config.resolve_participant_id();
        let b = config.resolve_participant_id();
        assert!(!a.is_empty());
        assert_ne!(a, b);

        let config = RoomConfig {
            participant_id: Some("alice".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_participant_id(), "alice");
    }
}
