//! Pinpad frame parser.
//!
//! A pinpad write carries `user:passcode[:command]` as ASCII.  The command
//! part is optional and may itself contain `:`.  A trailing CR/LF is
//! ignored so that terminals can send lines.

use crate::connection::MAX_USER_LEN;
use crate::error::PairingError;

/// Field separator within a frame.
pub const SEPARATOR: char = ':';

/// Longest accepted command part.
pub const MAX_COMMAND_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinpadFrame<'a> {
    pub user: &'a str,
    pub passcode: &'a str,
    pub command: &'a str,
}

pub fn parse(raw: &[u8]) -> Result<PinpadFrame<'_>, PairingError> {
    let text = core::str::from_utf8(raw).map_err(|_| PairingError::MalformedFrame)?;
    let text = text.trim_end_matches(['\r', '\n']);
    if !text.is_ascii() {
        return Err(PairingError::MalformedFrame);
    }

    let mut parts = text.splitn(3, SEPARATOR);
    let user = parts.next().unwrap_or_default();
    let passcode = parts.next().ok_or(PairingError::MalformedFrame)?;
    let command = parts.next().unwrap_or_default();

    if user.is_empty() || user.len() > MAX_USER_LEN || passcode.is_empty() {
        return Err(PairingError::MalformedFrame);
    }
    if command.len() > MAX_COMMAND_LEN {
        return Err(PairingError::MalformedFrame);
    }
    Ok(PinpadFrame {
        user,
        passcode,
        command,
    })
}
