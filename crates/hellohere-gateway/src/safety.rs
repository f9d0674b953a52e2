//! Content screening for outgoing chat messages.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    /// Text to store and deliver in place of the original when unsafe.
    pub filtered_message: String,
}

impl SafetyVerdict {
    pub fn safe(text: &str) -> Self {
        Self {
            is_safe: true,
            risk_level: RiskLevel::Low,
            filtered_message: text.to_string(),
        }
    }
}

/// A content filter consulted before a message is stored.
///
/// Implementations backed by a remote classifier are expected to enforce
/// their own deadline and fall back to a verdict instead of failing.
#[async_trait]
pub trait SafetyCheck: Send + Sync {
    async fn check(&self, text: &str) -> SafetyVerdict;
}

/// Lets every message through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl SafetyCheck for AllowAll {
    async fn check(&self, text: &str) -> SafetyVerdict {
        SafetyVerdict::safe(text)
    }
}
