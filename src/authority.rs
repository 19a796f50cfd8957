use serde::{Deserialize, Serialize};

/// Who is ground truth for an entity's transform.
///
/// Modeled as an exhaustive variant rather than scattered boolean checks so
/// every authority-dependent behavior is enumerable and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityMode {
    /// The server samples its own transform and broadcasts on dirty
    /// detection; every receiver buffers and interpolates.
    ServerControlled,
    /// The owning client samples itself and sends at a capped rate; the
    /// server forwards its updates as ground truth without re-validation.
    ClientControlled,
}

/// Per-entity authority state machine. Transition triggers (grant/revoke)
/// arrive from outside; this tracks the current mode and answers the
/// runtime questions each mode implies.
#[derive(Debug, Clone, Copy)]
pub struct AuthorityReconciler {
    mode: AuthorityMode,
}

impl AuthorityReconciler {
    pub fn new(mode: AuthorityMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> AuthorityMode {
        self.mode
    }

    /// Hand authority to the owning client. Returns `true` if the mode
    /// actually changed.
    pub fn grant(&mut self) -> bool {
        let changed = self.mode != AuthorityMode::ClientControlled;
        self.mode = AuthorityMode::ClientControlled;
        changed
    }

    /// Return authority to the server. Returns `true` if the mode actually
    /// changed; the caller must then clear the entity's interpolation
    /// history, since samples produced under the old authority must never be
    /// blended with samples produced under the new one.
    pub fn revoke(&mut self) -> bool {
        let changed = self.mode != AuthorityMode::ServerControlled;
        self.mode = AuthorityMode::ServerControlled;
        changed
    }

    /// Whether this side should run the dirty detector and transmit.
    pub fn samples_locally(&self, is_server: bool) -> bool {
        match self.mode {
            AuthorityMode::ServerControlled => is_server,
            AuthorityMode::ClientControlled => !is_server,
        }
    }

    /// Whether a received authoritative update from the client side is
    /// legitimate. Anything else is a protocol violation to be signalled,
    /// not a crash.
    pub fn accepts_client_updates(&self) -> bool {
        self.mode == AuthorityMode::ClientControlled
    }

    /// Whether this side renders the entity from its snapshot buffer.
    ///
    /// An authoritative owner renders its simulated transform directly,
    /// skipping the buffer to avoid added input latency; everyone else
    /// interpolates.
    pub fn interpolates_locally(&self, is_owner: bool) -> bool {
        !is_owner
    }
}
