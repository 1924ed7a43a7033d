// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Etiqueta.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for all Etiqueta operations.
#[derive(Debug, Error)]
pub enum EtiquetaError {
    // -- Preconditions --
    #[error("Bluetooth adapter not present on this device")]
    AdapterMissing,

    #[error("Bluetooth is disabled")]
    RadioDisabled,

    #[error("required Bluetooth permissions are missing")]
    PermissionDenied,

    #[error("label text is empty")]
    EmptyLabel,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no async runtime available: {0}")]
    Runtime(String),

    // -- Transport --
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("print failed: {0}")]
    Write(String),

    #[error("error while closing connection: {0}")]
    Close(String),

    #[error("pairing failed: {0}")]
    Pairing(String),

    #[error("pairing handler not registered")]
    NotRegistered,

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("no active connection")]
    NotConnected,

    // -- Encoding --
    #[error("barcode payload is {len} bytes; the length field holds at most 255")]
    BarcodeTooLong { len: usize },

    #[error("label text cannot be encoded: {0}")]
    InvalidText(String),

    // -- Busy --
    #[error("printer busy: {0}")]
    Busy(String),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,

    // -- Plumbing --
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification carried on every `Error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Radio disabled, adapter absent, permission missing, bad input. Not retried.
    Precondition,
    /// I/O failure on open/write/close. The link is torn down afterwards.
    Transport,
    /// Connect or write exceeded its configured deadline.
    Timeout,
    /// The job cannot be expressed in the selected dialect.
    Encoding,
    /// Another operation is in flight; the caller must retry explicitly.
    Busy,
    /// `print` issued with no open link.
    NoConnection,
    /// Informational: the platform scan ran to completion.
    DiscoveryFinished,
}

impl ErrorKind {
    /// Whether this kind reports a failure, as opposed to a completion notice.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::DiscoveryFinished)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Precondition => "precondition",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Encoding => "encoding",
            Self::Busy => "busy",
            Self::NoConnection => "no-connection",
            Self::DiscoveryFinished => "discovery-finished",
        };
        f.write_str(name)
    }
}

impl EtiquetaError {
    /// Classify this error for the event sink.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AdapterMissing
            | Self::RadioDisabled
            | Self::PermissionDenied
            | Self::EmptyLabel
            | Self::Config(_)
            | Self::Runtime(_)
            | Self::PlatformUnavailable
            | Self::Serialization(_) => ErrorKind::Precondition,

            Self::Connect(_)
            | Self::Write(_)
            | Self::Close(_)
            | Self::Pairing(_)
            | Self::NotRegistered
            | Self::Bridge(_)
            | Self::Io(_) => ErrorKind::Transport,

            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotConnected => ErrorKind::NoConnection,
            Self::BarcodeTooLong { .. } | Self::InvalidText(_) => ErrorKind::Encoding,
            Self::Busy(_) => ErrorKind::Busy,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EtiquetaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preconditions_classify_as_precondition() {
        assert_eq!(EtiquetaError::RadioDisabled.kind(), ErrorKind::Precondition);
        assert_eq!(EtiquetaError::PermissionDenied.kind(), ErrorKind::Precondition);
        assert_eq!(EtiquetaError::AdapterMissing.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn io_errors_are_transport_failures() {
        let err = EtiquetaError::from(std::io::Error::other("socket closed"));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn discovery_finished_is_not_a_failure() {
        assert!(!ErrorKind::DiscoveryFinished.is_failure());
        assert!(ErrorKind::Busy.is_failure());
        assert!(ErrorKind::Timeout.is_failure());
    }

    #[test]
    fn not_connected_message() {
        assert_eq!(EtiquetaError::NotConnected.to_string(), "no active connection");
        assert_eq!(EtiquetaError::NotConnected.kind(), ErrorKind::NoConnection);
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = EtiquetaError::Timeout {
            operation: "connect",
            seconds: 15,
        };
        assert_eq!(err.to_string(), "connect timed out after 15s");
    }
}
