use jobgate_core::{SessionId, UserId};

/// Authenticated caller for a request.
///
/// Inserted by the route guard; present for every protected route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session_id: SessionId,
    user_id: UserId,
}

impl SessionContext {
    pub fn new(session_id: SessionId, user_id: UserId) -> Self {
        Self { session_id, user_id }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Owner of the jobs this caller may see.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
