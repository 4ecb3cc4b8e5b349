use std::fmt;

/// Messaging-platform user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Messaging-platform chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Messaging-platform message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a delivered message (used as the reply target).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Registration serial number. Unique by intent only; see
/// `SequentialRegistry::allocate_serial`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Serial(pub u64);

impl Serial {
    /// Parse a user-supplied serial (`"12"`, `" 12 "`). Zero is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(Self(n)),
        }
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing state of a registration, stored in the sheet as its label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistrationStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "待處理",
            Self::Processing => "處理中",
            Self::Completed => "已完成",
            Self::Cancelled => "已取消",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One registration as written to the remote table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub serial: Serial,
    pub requester_id: String,
    pub display_name: String,
    pub timestamp: String,
    pub status: RegistrationStatus,
}
