//! Inbound command decoding
//!
//! The controller writes one command per burst of bytes:
//!
//! ```text
//! ┌───────────┬───────────┬──────────────────────┐
//! │ Action    │ Separator │ Payload              │
//! │ (1 digit) │ (1 byte)  │ (rest, Rename only)  │
//! └───────────┴───────────┴──────────────────────┘
//! ```
//!
//! Everything that arrived before a decode attempt is treated as a single
//! command and the accumulation buffer is cleared afterwards, whether the
//! command was understood or not.

use crate::domain::models::{Command, ProtocolVariant};
use heapless::Vec;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on bytes accumulated for a single command
pub const MAX_COMMAND_LEN: usize = 64;

/// Action digit plus separator
const HEADER_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unrecognized action code {code}")]
    UnrecognizedCommand { code: u8 },
    #[error("malformed command input {input:?}")]
    MalformedInput { input: String },
    #[error("command input exceeded {limit} bytes, dropped")]
    AccumulationOverflow { limit: usize },
}

/// Accumulates transport bytes and turns them into commands
pub struct CommandChannel {
    variant: ProtocolVariant,
    pending: Vec<u8, MAX_COMMAND_LEN>,
    // Set after an overflow; the rest of the burst is discarded.
    discarding: bool,
}

impl CommandChannel {
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Append one inbound byte.
    ///
    /// On overflow the accumulated bytes are dropped and every further byte
    /// is ignored until the next [`try_decode`](Self::try_decode).
    pub fn feed(&mut self, byte: u8) -> Result<(), CommandError> {
        if self.discarding {
            return Ok(());
        }

        if self.pending.push(byte).is_err() {
            self.pending.clear();
            self.discarding = true;
            return Err(CommandError::AccumulationOverflow {
                limit: MAX_COMMAND_LEN,
            });
        }
        Ok(())
    }

    /// Number of bytes waiting to be decoded
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode whatever has accumulated into at most one command.
    ///
    /// Always leaves the accumulation buffer empty.
    pub fn try_decode(&mut self) -> Option<Command> {
        if self.discarding {
            self.discarding = false;
            self.pending.clear();
            debug!("Discarded remainder of oversized command input");
            return None;
        }

        if self.pending.is_empty() {
            return None;
        }

        debug!(
            "Received command input: {:?}",
            String::from_utf8_lossy(&self.pending)
        );

        let result = decode(self.variant, &self.pending);
        self.pending.clear();

        match result {
            Ok(command) => Some(command),
            Err(e) => {
                warn!("Ignoring command: {}", e);
                None
            }
        }
    }
}

/// Decode one complete command for the given protocol variant
pub fn decode(variant: ProtocolVariant, input: &[u8]) -> Result<Command, CommandError> {
    let malformed = || CommandError::MalformedInput {
        input: String::from_utf8_lossy(input).into_owned(),
    };

    let first = *input.first().ok_or_else(malformed)?;
    if !first.is_ascii_digit() {
        return Err(malformed());
    }
    let code = first - b'0';

    let payload = input.get(HEADER_LEN..).unwrap_or_default();
    let payload = String::from_utf8_lossy(payload);
    let payload = payload.trim_end_matches(['\r', '\n']);

    variant
        .command_for(code, payload)
        .ok_or(CommandError::UnrecognizedCommand { code })
}
