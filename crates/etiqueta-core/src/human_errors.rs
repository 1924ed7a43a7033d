// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for front ends.
//
// Every technical error is mapped to plain language with a clear suggestion.
// The severity drives how a UI presents it.

use crate::error::EtiquetaError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The same action may work if tried again.
    Transient,
    /// User must do something first (turn Bluetooth on, grant access, pick a printer).
    ActionRequired,
    /// Retrying will not help with this input.
    Permanent,
}

/// A human-readable error with a plain message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether re-invoking the same operation can succeed unchanged.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert an `EtiquetaError` into a `HumanError`.
pub fn humanize_error(err: &EtiquetaError) -> HumanError {
    match err {
        EtiquetaError::AdapterMissing => HumanError {
            message: "This device has no Bluetooth.".into(),
            suggestion: "Label printing needs a phone, tablet or computer with Bluetooth.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        EtiquetaError::RadioDisabled => HumanError {
            message: "Bluetooth is turned off.".into(),
            suggestion: "Turn Bluetooth on, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        EtiquetaError::PermissionDenied => HumanError {
            message: "The app isn't allowed to use Bluetooth.".into(),
            suggestion: "Allow the Bluetooth (and, on older phones, location) permissions in Settings.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        EtiquetaError::EmptyLabel => HumanError {
            message: "The label is empty.".into(),
            suggestion: "Type some text for the label.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        EtiquetaError::NotConnected => HumanError {
            message: "No printer is connected.".into(),
            suggestion: "Pick a printer from the list and wait until it shows as connected.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        EtiquetaError::Busy(_) => HumanError {
            message: "The printer is still busy.".into(),
            suggestion: "Wait for the current label to finish, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        EtiquetaError::Timeout { operation, .. } => HumanError {
            message: "The printer didn't respond in time.".into(),
            suggestion: format!(
                "Check the printer is switched on and close by, then try again. ({operation})"
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        EtiquetaError::Connect(detail) | EtiquetaError::Bridge(detail) => {
            humanize_transport_detail(detail)
        }

        EtiquetaError::Write(detail) => HumanError {
            message: "The label didn't reach the printer.".into(),
            suggestion: format!("Reconnect to the printer and print again. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        EtiquetaError::Close(_) | EtiquetaError::NotRegistered => HumanError {
            message: "The printer connection didn't close cleanly.".into(),
            suggestion: "Nothing to do; the connection has been released.".into(),
            retriable: false,
            severity: Severity::Transient,
        },

        EtiquetaError::Pairing(_) => HumanError {
            message: "Pairing with the printer failed.".into(),
            suggestion: "Turn the printer off and on, then connect again. If it asks for a code, check the pairing PIN in Settings.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        EtiquetaError::BarcodeTooLong { len } => HumanError {
            message: "The barcode is too long.".into(),
            suggestion: format!("Barcodes can hold at most 255 bytes; this one has {len}."),
            retriable: false,
            severity: Severity::Permanent,
        },

        EtiquetaError::InvalidText(_) => HumanError {
            message: "The label contains characters the printer can't print.".into(),
            suggestion: "Remove tabs and other special characters from the text.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        EtiquetaError::Config(detail) => HumanError {
            message: "The printer settings are invalid.".into(),
            suggestion: format!("Fix the settings and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        EtiquetaError::Runtime(_) | EtiquetaError::Serialization(_) => HumanError {
            message: "The app had an internal problem.".into(),
            suggestion: "Restart the app. If this keeps happening, please report it.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        EtiquetaError::PlatformUnavailable => HumanError {
            message: "This feature isn't available on your device.".into(),
            suggestion: "Some Bluetooth features only work on phones and tablets.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        EtiquetaError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "The app can't open the printer port.".into(),
                suggestion: "On Linux, add your user to the 'dialout' group and log in again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::NotFound => HumanError {
                message: "The printer port doesn't exist.".into(),
                suggestion: "Bind the printer first, e.g. `sudo rfcomm bind 0 <address> 1`.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => humanize_transport_detail(&io_err.to_string()),
        },
    }
}

/// Parse free-form transport failure text into a human-readable message.
fn humanize_transport_detail(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("refused") || lower.contains("host is down") || lower.contains("unreachable") {
        HumanError {
            message: "The printer can't be reached.".into(),
            suggestion: "Make sure the printer is switched on, in range, and not connected to another phone.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else if lower.contains("reset") || lower.contains("broken pipe") || lower.contains("closed") {
        HumanError {
            message: "The connection to the printer was interrupted.".into(),
            suggestion: "Move closer to the printer and connect again.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else {
        HumanError {
            message: "Connecting to the printer failed.".into(),
            suggestion: format!("Try again. If this keeps happening, restart the printer. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_off_is_action_required() {
        let human = humanize_error(&EtiquetaError::RadioDisabled);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn busy_is_transient() {
        let human = humanize_error(&EtiquetaError::Busy("job in progress".into()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn refused_connection_is_transient() {
        let human = humanize_error(&EtiquetaError::Connect("connection refused".into()));
        assert_eq!(human.message, "The printer can't be reached.");
    }

    #[test]
    fn oversized_barcode_is_permanent() {
        let human = humanize_error(&EtiquetaError::BarcodeTooLong { len: 300 });
        assert_eq!(human.severity, Severity::Permanent);
        assert!(human.suggestion.contains("300"));
    }

    #[test]
    fn missing_port_points_at_rfcomm_bind() {
        let err = EtiquetaError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        let human = humanize_error(&err);
        assert!(human.suggestion.contains("rfcomm bind"));
    }
}
