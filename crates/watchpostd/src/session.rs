//! Session and navigation state.
//!
//! One explicit state value instead of scattered flags: either nobody is
//! logged in, or exactly one user is, on exactly one tab. Nothing here is
//! persisted; a restart always comes back `Unauthenticated`.

use watchpost_store::Origin;

/// Main view tabs available after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    /// Local camera capture view.
    Camera,
    /// Simulated remote file intake view.
    Intake,
}

impl Tab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Camera => "camera",
            Tab::Intake => "intake",
        }
    }

    pub fn parse(s: &str) -> Option<Tab> {
        match s {
            "camera" => Some(Tab::Camera),
            "intake" => Some(Tab::Intake),
            _ => None,
        }
    }

    /// The gallery partition shown by this tab.
    pub fn origin(&self) -> Origin {
        match self {
            Tab::Camera => Origin::Local,
            Tab::Intake => Origin::Intake,
        }
    }
}

/// Top-level session state machine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated {
        username: String,
        tab: Tab,
    },
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the authenticated state on the camera tab.
    pub fn authenticate(&mut self, username: String) {
        tracing::info!(username = %username, "session authenticated");
        *self = SessionState::Authenticated {
            username,
            tab: Tab::Camera,
        };
    }

    /// Drop back to unauthenticated; returns whether a session ended.
    pub fn logout(&mut self) -> bool {
        match std::mem::take(self) {
            SessionState::Unauthenticated => false,
            SessionState::Authenticated { username, .. } => {
                tracing::info!(username = %username, "session ended");
                true
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated { username, .. } => Some(username),
            SessionState::Unauthenticated => None,
        }
    }

    pub fn tab(&self) -> Option<Tab> {
        match self {
            SessionState::Authenticated { tab, .. } => Some(*tab),
            SessionState::Unauthenticated => None,
        }
    }

    /// Switch the active tab; returns the previous tab, or `None` when no
    /// session is active (the switch is ignored).
    pub fn switch_tab(&mut self, next: Tab) -> Option<Tab> {
        match self {
            SessionState::Authenticated { tab, .. } => {
                let previous = *tab;
                *tab = next;
                Some(previous)
            }
            SessionState::Unauthenticated => None,
        }
    }
}
