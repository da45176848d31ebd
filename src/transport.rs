//! Boundary with the pub/sub transport.
//!
//! The broker client itself lives outside this crate: it pushes every message
//! it receives as an [`InboundFrame`] and drains [`OutboundFrame`]s produced
//! by a [`CommandPublisher`].

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use crate::protocol::DeviceCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub topic: String,
    pub payload: String,
}

impl InboundFrame {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Parses the `topic payload` line format used by the stdio bridge.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let (topic, payload) = line.split_once(char::is_whitespace)?;
        let payload = payload.trim();
        if topic.is_empty() || payload.is_empty() {
            return None;
        }
        Some(Self::new(topic, payload))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub topic: String,
    pub payload: String,
}

/// Send-only path to a device's command topic.
pub trait CommandPublisher: Send + Sync {
    fn publish(&self, device_number: &str, command: DeviceCommand) -> Result<()>;
}

/// Publishes onto an unbounded channel drained by the transport.
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<OutboundFrame>,
    topic_prefix: String,
}

impl ChannelPublisher {
    pub fn new(topic_prefix: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                topic_prefix: topic_prefix.into(),
            },
            receiver,
        )
    }
}

impl CommandPublisher for ChannelPublisher {
    fn publish(&self, device_number: &str, command: DeviceCommand) -> Result<()> {
        let frame = OutboundFrame {
            topic: format!("{}/{}", self.topic_prefix, device_number),
            payload: command.encode(),
        };
        self.sender
            .send(frame)
            .map_err(|_| anyhow!("outbound channel closed; dropped {command} for {device_number}"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures published commands in order. Devices listed in `failing`
    /// reject every publish.
    #[derive(Default)]
    pub struct RecordingPublisher {
        sent: Mutex<Vec<(String, DeviceCommand)>>,
        failing: Vec<String>,
    }

    impl RecordingPublisher {
        pub fn failing_for(devices: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: devices.iter().map(|d| d.to_string()).collect(),
            }
        }

        pub fn sent(&self) -> Vec<(String, DeviceCommand)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, device_number: &str) -> Vec<DeviceCommand> {
            self.sent()
                .into_iter()
                .filter(|(device, _)| device == device_number)
                .map(|(_, command)| command)
                .collect()
        }
    }

    impl CommandPublisher for RecordingPublisher {
        fn publish(&self, device_number: &str, command: DeviceCommand) -> Result<()> {
            if self.failing.iter().any(|device| device == device_number) {
                return Err(anyhow!("device {device_number} unreachable"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((device_number.to_string(), command));
            Ok(())
        }
    }
}
