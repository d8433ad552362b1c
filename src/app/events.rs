//! Trigger events fired by the server.
//!
//! The set of event kinds is fixed; each carries exactly the arguments its
//! automation hook receives.  Listeners are registered per kind on
//! [`Triggers`](super::dispatch::Triggers).

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ClientConnected,
    PinpadAccepted,
    PinpadRejected,
    UserSelected,
    UserCommandReceived,
}

/// One occurrence of a trigger, borrowing its arguments from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent<'a> {
    /// A central connected.  `mac` is `AA:BB:CC:DD:EE:FF`.
    ClientConnected { mac: &'a str },
    /// Passcode accepted for `user`; `cmd` is the pending command, if any.
    PinpadAccepted { user: &'a str, cmd: &'a str },
    PinpadRejected { user: &'a str, cmd: &'a str },
    /// A user identity was presented (pinpad frame or gated write).
    UserSelected { user: &'a str },
    /// An authenticated client wrote a command.
    UserCommandReceived { mac: &'a str, cmd: &'a str },
}

impl ServerEvent<'_> {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ClientConnected { .. } => EventKind::ClientConnected,
            Self::PinpadAccepted { .. } => EventKind::PinpadAccepted,
            Self::PinpadRejected { .. } => EventKind::PinpadRejected,
            Self::UserSelected { .. } => EventKind::UserSelected,
            Self::UserCommandReceived { .. } => EventKind::UserCommandReceived,
        }
    }
}

impl fmt::Display for ServerEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientConnected { mac } => write!(f, "client_connected({mac})"),
            Self::PinpadAccepted { user, cmd } => write!(f, "pinpad_accepted({user}, {cmd:?})"),
            Self::PinpadRejected { user, cmd } => write!(f, "pinpad_rejected({user}, {cmd:?})"),
            Self::UserSelected { user } => write!(f, "user_selected({user})"),
            Self::UserCommandReceived { mac, cmd } => {
                write!(f, "user_command_received({mac}, {cmd:?})")
            }
        }
    }
}
