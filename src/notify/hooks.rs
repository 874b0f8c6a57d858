//! Named handler channels referenced by auto-response rules
//!
//! Channels are a closed set: unknown names are rejected when a rule is
//! validated, never stored and resolved later.

use std::fmt;
use std::str::FromStr;

/// Handler channel an auto-response rule can fan its hits into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookChannel {
    /// Inbound message matched the rule
    MessageIn,
    /// Outbound message matched the rule
    MessageOut,
    /// A member joined a watched chat
    MemberJoin,
    /// A member left a watched chat
    MemberLeave,
    /// Rule fired from an explicit command
    Command,
    /// Rule fired from the scheduler
    Schedule,
}

impl HookChannel {
    pub const ALL: [HookChannel; 6] = [
        HookChannel::MessageIn,
        HookChannel::MessageOut,
        HookChannel::MemberJoin,
        HookChannel::MemberLeave,
        HookChannel::Command,
        HookChannel::Schedule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookChannel::MessageIn => "message_in",
            HookChannel::MessageOut => "message_out",
            HookChannel::MemberJoin => "member_join",
            HookChannel::MemberLeave => "member_leave",
            HookChannel::Command => "command",
            HookChannel::Schedule => "schedule",
        }
    }
}

impl fmt::Display for HookChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HookChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message_in" => Ok(HookChannel::MessageIn),
            "message_out" => Ok(HookChannel::MessageOut),
            "member_join" => Ok(HookChannel::MemberJoin),
            "member_leave" => Ok(HookChannel::MemberLeave),
            "command" => Ok(HookChannel::Command),
            "schedule" => Ok(HookChannel::Schedule),
            _ => Err(format!("unknown hook channel: {}", s)),
        }
    }
}
