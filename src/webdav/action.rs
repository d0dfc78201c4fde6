//! Request classification

use hyper::Method;

/// What the bridge does for a request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    /// Refresh the mirror from a remote listing, then forward
    Propfind,
    /// Fetch the remote file into the mirror, then forward
    Get,
    /// Stream the body to the remote file (PUT and POST)
    Upload,
    Delete,
    Mkcol,
    Move,
    Lock,
    Unlock,
    /// Refused with 501
    Copy,
    /// Answered by the mirror alone
    Forward,
}

impl BridgeAction {
    pub fn from_method(method: &Method) -> Self {
        match method.as_str() {
            "PROPFIND" => BridgeAction::Propfind,
            "GET" => BridgeAction::Get,
            "PUT" | "POST" => BridgeAction::Upload,
            "DELETE" => BridgeAction::Delete,
            "MKCOL" => BridgeAction::Mkcol,
            "MOVE" => BridgeAction::Move,
            "LOCK" => BridgeAction::Lock,
            "UNLOCK" => BridgeAction::Unlock,
            "COPY" => BridgeAction::Copy,
            _ => BridgeAction::Forward,
        }
    }

    /// Whether the action changes the remote host
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            BridgeAction::Upload | BridgeAction::Delete | BridgeAction::Mkcol | BridgeAction::Move
        )
    }
}
