use std::str::FromStr;

use serde::Deserialize;

/// What a failing record does to the rest of its batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchMode {
    /// Stop at the first record that is neither acked nor released
    #[default]
    FailFast,
    /// Process every record and report each outcome
    BestEffort,
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(Self::FailFast),
            "best-effort" => Ok(Self::BestEffort),
            other => Err(format!(
                "unknown batch mode '{other}', expected fail-fast or best-effort"
            )),
        }
    }
}

/// When a record is deleted from the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckTiming {
    /// Right after the command validates. A crash before the send loses
    /// the message.
    BeforeSend,
    /// Only once the record's fate is settled. A crash after the send but
    /// before the delete sends the email twice.
    #[default]
    AfterSend,
}

impl FromStr for AckTiming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "before_send" => Ok(Self::BeforeSend),
            "after_send" => Ok(Self::AfterSend),
            other => Err(format!(
                "unknown ack timing '{other}', expected before_send or after_send"
            )),
        }
    }
}
