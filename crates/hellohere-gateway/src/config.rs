use std::str::FromStr;
use std::time::Duration;

/// What leaving an accepted 1:1 room does to the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeavePolicy {
    /// Remove the row along with its messages and read markers.
    #[default]
    Delete,
    /// Keep the row (and its history) with status `left`.
    Retain,
}

impl FromStr for LeavePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "retain" => Ok(Self::Retain),
            other => Err(format!("unknown leave policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Wall-clock budget for handling one inbound action.
    pub handler_timeout: Duration,
    pub leave_policy: LeavePolicy,
    /// History page size when the client does not send `limit`.
    pub history_default_limit: u32,
    pub history_max_limit: u32,
    /// Period of the `updateUserLocation` ping to every live connection.
    pub location_ping_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(10),
            leave_policy: LeavePolicy::Delete,
            history_default_limit: 50,
            history_max_limit: 200,
            location_ping_interval: Duration::from_secs(30),
        }
    }
}
