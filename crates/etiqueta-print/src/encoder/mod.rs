// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command encoder: stateless mapping from a print job to printer bytes.

pub mod escpos;
pub mod tspl;

use etiqueta_core::config::LabelGeometry;
use etiqueta_core::error::Result;
use etiqueta_core::types::{Dialect, EncodedCommand, PrintJob};
use tracing::debug;

/// Encode `job` in `dialect`. `label` only affects TSPL.
pub fn encode(job: &PrintJob, dialect: Dialect, label: &LabelGeometry) -> Result<EncodedCommand> {
    let bytes = match dialect {
        Dialect::EscPos => escpos::encode(job)?,
        Dialect::Tspl => tspl::encode(job, label)?,
    };
    debug!(dialect = dialect.display_name(), bytes = bytes.len(), "job encoded");
    Ok(EncodedCommand::new(dialect, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use etiqueta_core::error::ErrorKind;

    #[test]
    fn command_remembers_dialect() {
        let job = PrintJob::new("HELLO");
        let label = LabelGeometry::default();
        let esc = encode(&job, Dialect::EscPos, &label).expect("escpos");
        let tspl = encode(&job, Dialect::Tspl, &label).expect("tspl");
        assert_eq!(esc.dialect(), Dialect::EscPos);
        assert_eq!(esc.len(), 14);
        assert_eq!(tspl.dialect(), Dialect::Tspl);
        assert!(tspl.bytes().starts_with(b"SIZE "));
    }

    #[test]
    fn oversized_barcode_is_an_encoding_error() {
        let job = PrintJob::new("x").with_barcode("1".repeat(300));
        let err = encode(&job, Dialect::EscPos, &LabelGeometry::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }
}
