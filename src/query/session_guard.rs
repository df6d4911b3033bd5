use crate::network::transport::Session;
use crate::protocol::consts::DisconnectType;

/// Scoped owner of a session
///
/// The session is closed by [`SessionGuard::close`], or on drop if the query
/// future was cancelled before reaching it. Either way it is closed once.
pub(super) struct SessionGuard {
    session: Box<dyn Session>,
    closed: bool,
}

impl SessionGuard {
    pub(super) fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    pub(super) fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    pub(super) fn close(&mut self, code: u32, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.session.close(code, reason);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.close(DisconnectType::Crash.code(), "status query cancelled");
    }
}
