use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -----------------------------------------------------------------------------
// Channels / Streams
// -----------------------------------------------------------------------------

pub const CHANNEL_ORCHESTRATOR_COMMANDS: &str = "orchestrator_events";

// -----------------------------------------------------------------------------
// Commands (CMD:*)
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CommandType {
    #[serde(rename = "CMD:SYNC_PORT_MAPPINGS")]
    SyncPortMappings,
    #[serde(rename = "CMD:SYNC_ALL_PROVIDERS")]
    SyncAllProviders,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::SyncPortMappings => "CMD:SYNC_PORT_MAPPINGS",
            CommandType::SyncAllProviders => "CMD:SYNC_ALL_PROVIDERS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CMD:SYNC_PORT_MAPPINGS" => Some(CommandType::SyncPortMappings),
            "CMD:SYNC_ALL_PROVIDERS" => Some(CommandType::SyncAllProviders),
            _ => None,
        }
    }
}

/// Payload of `CMD:SYNC_PORT_MAPPINGS`. When `task_id` is set, the caller has
/// already created the task row and progress is reported against it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CommandSyncPortMappings {
    pub provider_id: Uuid,
    #[serde(default)]
    pub task_id: Option<Uuid>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

impl CommandSyncPortMappings {
    pub fn to_message(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        value["type"] = serde_json::Value::String(CommandType::SyncPortMappings.as_str().to_string());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_command_message_carries_type_tag() {
        let cmd = CommandSyncPortMappings {
            provider_id: Uuid::nil(),
            task_id: None,
            correlation_id: Some("abc".into()),
        };
        let msg = cmd.to_message();
        assert_eq!(msg["type"], "CMD:SYNC_PORT_MAPPINGS");

        let parsed: CommandSyncPortMappings = serde_json::from_value(msg).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn command_type_parse() {
        assert_eq!(
            CommandType::parse("CMD:SYNC_ALL_PROVIDERS"),
            Some(CommandType::SyncAllProviders)
        );
        assert_eq!(CommandType::parse("CMD:PROVISION"), None);
    }
}
