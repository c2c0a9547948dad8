//! Messages between the control surface and the engine
//!
//! Inbound wire shape: `{"action": "updateSetting", "setting": <key>, "value": <bool>}`.
//! Anything else is not a message this engine understands and is ignored.

use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::types::FeatureFlag;

/// Action tag for single-setting updates.
pub const UPDATE_SETTING: &str = "updateSetting";

/// A message the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMessage {
    UpdateSetting { flag: FeatureFlag, value: bool },
}

impl InboundMessage {
    /// Decode a raw message. Unknown actions, unknown setting keys and
    /// non-boolean values all yield `None`.
    pub fn parse(raw: &Value) -> Option<Self> {
        match raw.get("action")?.as_str()? {
            UPDATE_SETTING => {
                let flag = FeatureFlag::from_key(raw.get("setting")?.as_str()?)?;
                let value = raw.get("value")?.as_bool()?;
                Some(Self::UpdateSetting { flag, value })
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::UpdateSetting { flag, value } => json!({
                "action": UPDATE_SETTING,
                "setting": flag.key(),
                "value": value,
            }),
        }
    }
}

/// Delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// No listening engine on the receiving side (e.g. a non-matching tab).
    #[error("No receiver is listening")]
    NoReceiver,
    #[error("Message transport failed: {0}")]
    Transport(String),
}

/// Outbound path from a control surface to a running engine.
pub trait Channel {
    fn send(&mut self, message: &Value) -> Result<(), MessageError>;
}

/// Tell the engine about a flag change.
///
/// A missing receiver is not an error: the setting is persisted elsewhere and
/// the engine picks it up on its next load.
pub fn notify_setting<C: Channel + ?Sized>(
    channel: &mut C,
    flag: FeatureFlag,
    value: bool,
) -> Result<(), MessageError> {
    let message = InboundMessage::UpdateSetting { flag, value }.to_value();
    match channel.send(&message) {
        Err(MessageError::NoReceiver) => {
            log::debug!("No engine listening for {} update", flag);
            Ok(())
        }
        other => other,
    }
}

/// Queue-backed channel for in-process delivery.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    queue: VecDeque<Value>,
    connected: bool,
}

impl MemoryChannel {
    pub fn connected() -> Self {
        Self {
            queue: VecDeque::new(),
            connected: true,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Take every queued message in send order.
    pub fn drain(&mut self) -> Vec<Value> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, message: &Value) -> Result<(), MessageError> {
        if !self.connected {
            return Err(MessageError::NoReceiver);
        }
        self.queue.push_back(message.clone());
        Ok(())
    }
}
