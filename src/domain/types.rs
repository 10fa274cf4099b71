use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SessionState {
    Active,
    Paused,
    Blocked,
    Finished,
    Abandoned,
}

impl SessionState {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Abandoned)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Blocked => "blocked",
            SessionState::Finished => "finished",
            SessionState::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AbandonCause {
    Expired,
    Left,
}

impl AbandonCause {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AbandonCause::Expired => "expired",
            AbandonCause::Left => "left",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EventKind {
    FocusLost,
    FocusRegained,
    PasteDetected,
    TabSwitch,
    FullscreenExit,
    Disconnect,
    Other,
}

impl EventKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            EventKind::FocusLost => "focus_lost",
            EventKind::FocusRegained => "focus_regained",
            EventKind::PasteDetected => "paste_detected",
            EventKind::TabSwitch => "tab_switch",
            EventKind::FullscreenExit => "fullscreen_exit",
            EventKind::Disconnect => "disconnect",
            EventKind::Other => "other",
        }
    }
}
