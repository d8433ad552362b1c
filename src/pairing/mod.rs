//! Pairing gate: passcode challenge guarding writes.
//!
//! ```text
//!                  gated write
//!  Unauthenticated ───────────▶ AwaitingChallenge ──(match)──▶ Authenticated
//!        ▲                          │      ▲
//!        │                   (mismatch,    │ cooldown elapsed
//!        │                    cooldown>0)  │
//!        │                          ▼      │
//!        └───── disconnect ───── Rejected ─┘
//! ```
//!
//! Each connection owns its [`PairingState`]; the [`PairingGate`] holds the
//! secret, the security mode and the attempt policy, and drives the state
//! transitions.  Callbacks and forced disconnects are the caller's job.

pub mod frame;
pub mod otp;
pub mod passcode;

use log::{debug, info, warn};

use crate::app::ports::Clock;
use crate::config::{SecurityMode, ServerConfig};
use crate::error::PairingError;

/// Number of counters past the current one accepted in HOTP mode.
pub const HOTP_LOOK_AHEAD: u64 = 3;

/// Longest command text remembered while a challenge is pending.
pub const MAX_PENDING_COMMAND: usize = frame::MAX_COMMAND_LEN;

pub type PendingCommand = heapless::String<MAX_PENDING_COMMAND>;

// ── Per-connection state ──────────────────────────────────────

/// An outstanding passcode challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    /// Wrong passcodes submitted so far.
    pub attempts: u8,
    /// Command the peer was trying to run when challenged.
    pub command: PendingCommand,
}

impl Challenge {
    fn with_command(command: &str) -> Self {
        let mut c = Self::default();
        c.set_command(command);
        c
    }

    fn set_command(&mut self, command: &str) {
        self.command.clear();
        for ch in command.chars() {
            if self.command.push(ch).is_err() {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PairingState {
    #[default]
    Unauthenticated,
    AwaitingChallenge(Challenge),
    /// Last submission was wrong; retries are refused until the cooldown ends.
    Rejected { challenge: Challenge, at_ms: u64 },
    Authenticated,
}

impl PairingState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    pub fn attempts(&self) -> u8 {
        match self {
            Self::AwaitingChallenge(c) | Self::Rejected { challenge: c, .. } => c.attempts,
            _ => 0,
        }
    }

    /// Command captured by the pending challenge, or `""`.
    pub fn pending_command(&self) -> &str {
        match self {
            Self::AwaitingChallenge(c) | Self::Rejected { challenge: c, .. } => &c.command,
            _ => "",
        }
    }

    fn take_challenge(&mut self) -> Challenge {
        match core::mem::take(self) {
            Self::AwaitingChallenge(c) | Self::Rejected { challenge: c, .. } => c,
            _ => Challenge::default(),
        }
    }
}

/// Result of a rejected submission, for the caller's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub error: PairingError,
    pub attempts: u8,
}

// ── Gate ──────────────────────────────────────────────────────

enum Scheme {
    Static,
    Hotp { counter: u64 },
    Totp,
}

pub struct PairingGate {
    secret: Vec<u8>,
    scheme: Scheme,
    digits: u8,
    max_attempts: u8,
    cooldown_ms: u64,
}

impl PairingGate {
    pub fn new(config: &ServerConfig) -> Self {
        let scheme = match config.security_mode {
            SecurityMode::Static => Scheme::Static,
            SecurityMode::Hotp => Scheme::Hotp { counter: 0 },
            SecurityMode::Totp => Scheme::Totp,
        };
        Self {
            secret: config.secret_passcode.as_bytes().to_vec(),
            scheme,
            digits: config.otp_digits,
            max_attempts: config.max_passcode_attempts.max(1),
            cooldown_ms: u64::from(config.rejection_cooldown_ms),
        }
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    /// Current HOTP counter, if running in HOTP mode.
    pub fn hotp_counter(&self) -> Option<u64> {
        match self.scheme {
            Scheme::Hotp { counter } => Some(counter),
            _ => None,
        }
    }

    /// A gated operation hit an unauthenticated link: open (or refresh) the
    /// challenge and remember what the peer tried to do.
    pub fn challenge(&self, state: &mut PairingState, command: &str) -> PairingError {
        match state {
            PairingState::Authenticated => {}
            PairingState::Unauthenticated => {
                *state = PairingState::AwaitingChallenge(Challenge::with_command(command));
                debug!("pairing: challenge opened");
            }
            PairingState::AwaitingChallenge(c) | PairingState::Rejected { challenge: c, .. } => {
                c.set_command(command);
            }
        }
        PairingError::NotAuthenticated
    }

    /// Verify a submitted passcode and advance `state`.
    ///
    /// On success the link is authenticated and the attempt counter cleared.
    /// A wrong code counts as one attempt; reaching the configured maximum
    /// yields [`PairingError::TooManyAttempts`], after which the caller must
    /// drop the link.  Cooldown and clock failures do not count.
    pub fn submit(
        &mut self,
        state: &mut PairingState,
        submitted: &[u8],
        clock: &dyn Clock,
    ) -> Result<(), Rejection> {
        let now = clock.uptime_ms();
        if let PairingState::Rejected { challenge, at_ms } = state {
            if now.saturating_sub(*at_ms) < self.cooldown_ms {
                warn!("pairing: submission during cooldown");
                return Err(Rejection {
                    error: PairingError::CoolingDown,
                    attempts: challenge.attempts,
                });
            }
        }

        match self.verify(submitted, clock) {
            Ok(true) => {
                *state = PairingState::Authenticated;
                info!("pairing: passcode accepted");
                Ok(())
            }
            Ok(false) => {
                let mut challenge = state.take_challenge();
                challenge.attempts = challenge.attempts.saturating_add(1);
                let attempts = challenge.attempts;
                warn!("pairing: passcode rejected ({}/{})", attempts, self.max_attempts);

                let error = if attempts >= self.max_attempts {
                    PairingError::TooManyAttempts
                } else {
                    PairingError::AuthenticationFailed
                };
                *state = if self.cooldown_ms > 0 {
                    PairingState::Rejected {
                        challenge,
                        at_ms: now,
                    }
                } else {
                    PairingState::AwaitingChallenge(challenge)
                };
                Err(Rejection { error, attempts })
            }
            Err(error) => Err(Rejection {
                error,
                attempts: state.attempts(),
            }),
        }
    }

    fn verify(&mut self, submitted: &[u8], clock: &dyn Clock) -> Result<bool, PairingError> {
        let digits = self.digits;
        match &mut self.scheme {
            Scheme::Static => Ok(passcode::codes_match(&self.secret, submitted)),
            Scheme::Hotp { counter } => {
                // Every candidate is checked so timing does not reveal the offset.
                let mut matched = None;
                for c in *counter..counter.saturating_add(HOTP_LOOK_AHEAD) {
                    let code = otp::format_code(otp::hotp(&self.secret, c, digits), digits);
                    if passcode::codes_match(code.as_bytes(), submitted) && matched.is_none() {
                        matched = Some(c);
                    }
                }
                if let Some(c) = matched {
                    *counter = c + 1;
                    debug!("pairing: HOTP counter advanced to {}", *counter);
                }
                Ok(matched.is_some())
            }
            Scheme::Totp => {
                let Some(now) = clock.unix_time_secs() else {
                    warn!("pairing: TOTP submission without wall clock");
                    return Err(PairingError::ClockUnavailable);
                };
                let step = otp::totp_counter(now);
                let mut ok = false;
                for c in [step, step.saturating_sub(1)] {
                    let code = otp::format_code(otp::hotp(&self.secret, c, digits), digits);
                    ok |= passcode::codes_match(code.as_bytes(), submitted);
                }
                Ok(ok)
            }
        }
    }
}
