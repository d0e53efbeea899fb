//! Interception results

use crate::cache::Payload;
use crate::policy::BypassReason;
use crate::tags::TagSet;
use std::fmt;

/// Terminal state reached by an intercepted statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Served from the cache without executing
    ReadHit,
    /// Executed; `stored` tells whether the result was kept
    ReadMiss { stored: bool },
    /// Executed, then these tags were flushed
    WriteInvalidate { flushed: TagSet },
    /// Executed without touching the cache
    Bypass(BypassReason),
}

impl Outcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::ReadHit)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadHit => write!(f, "hit"),
            Self::ReadMiss { stored: true } => write!(f, "miss (stored)"),
            Self::ReadMiss { stored: false } => write!(f, "miss (not stored)"),
            Self::WriteInvalidate { flushed } => write!(f, "invalidated {} tag(s)", flushed.len()),
            Self::Bypass(reason) => write!(f, "bypass: {}", reason),
        }
    }
}

/// Statement result plus how the cache handled it
#[derive(Debug, Clone, PartialEq)]
pub struct Interception {
    pub payload: Payload,
    pub outcome: Outcome,
}
