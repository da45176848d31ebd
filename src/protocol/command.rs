use std::fmt;

/// Commands the hub pushes to a single device's command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Round length in seconds; must reach the device before `Start`.
    SetRoundDuration(u32),
    Start,
}

impl DeviceCommand {
    pub fn encode(&self) -> String {
        match self {
            DeviceCommand::SetRoundDuration(seconds) => format!("TIME,{seconds}"),
            DeviceCommand::Start => "START".to_string(),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_encode_as_bare_tokens() {
        assert_eq!(DeviceCommand::SetRoundDuration(90).encode(), "TIME,90");
        assert_eq!(DeviceCommand::Start.to_string(), "START");
    }
}
