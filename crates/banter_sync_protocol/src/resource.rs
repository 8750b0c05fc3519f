//! Resource kinds participating in sync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A syncable resource kind.
///
/// The set is deliberately closed: conflict merge functions and fetch
/// dispatch match on it exhaustively, so adding a kind is a compile-time
/// checklist rather than a runtime registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A conversation thread.
    Thread,
    /// A user-facing notification.
    Notification,
}

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Thread, ResourceKind::Notification];

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Thread => "thread",
            ResourceKind::Notification => "notification",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
