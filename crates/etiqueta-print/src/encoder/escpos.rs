// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ESC/POS binary dialect.
//
// Job layout, byte-exact:
//
// | Step            | Bytes                           |
// |-----------------|---------------------------------|
// | Initialize      | `1B 40`                         |
// | Align left      | `1B 61 00`                      |
// | Label text      | UTF-8 of the text, then `0A`    |
// | Barcode (opt.)  | `1D 6B 49 <len>` + data + `0A`  |
// | Full cut        | `1D 56 00`                      |
//
// The barcode uses function B (length-prefixed) with system 73 (CODE128).
// Its length field is one byte, so payloads of 256 bytes or more are
// rejected rather than truncated.

use etiqueta_core::error::{EtiquetaError, Result};
use etiqueta_core::types::PrintJob;

/// Command prefix.
pub const ESC: u8 = 0x1B;
/// Extended command prefix.
pub const GS: u8 = 0x1D;
/// Print buffer and feed one line.
pub const LF: u8 = 0x0A;

/// CODE128 barcode system id for `GS k` function B.
pub const BARCODE_CODE128: u8 = 0x49;

/// Largest barcode payload the one-byte length field can describe.
pub const MAX_BARCODE_LEN: usize = u8::MAX as usize;

/// `ESC @`: reset to power-on defaults.
pub fn initialize() -> [u8; 2] {
    [ESC, b'@']
}

/// `ESC a 0`: left justification.
pub fn align_left() -> [u8; 3] {
    [ESC, b'a', 0x00]
}

/// `GS V 0`: full cut.
pub fn cut() -> [u8; 3] {
    [GS, b'V', 0x00]
}

/// `GS k 73 n d1..dn LF`: CODE128 barcode followed by a line feed.
pub fn barcode_code128(data: &[u8]) -> Result<Vec<u8>> {
    let len = u8::try_from(data.len())
        .map_err(|_| EtiquetaError::BarcodeTooLong { len: data.len() })?;
    let mut out = Vec::with_capacity(data.len() + 5);
    out.extend_from_slice(&[GS, b'k', BARCODE_CODE128, len]);
    out.extend_from_slice(data);
    out.push(LF);
    Ok(out)
}

/// Encode `job` as an ESC/POS byte stream.
pub fn encode(job: &PrintJob) -> Result<Vec<u8>> {
    let text = job.label_text.as_bytes();
    let barcode = match job.barcode_text.as_deref() {
        Some(data) => Some(barcode_code128(data.as_bytes())?),
        None => None,
    };

    let mut out = Vec::with_capacity(text.len() + barcode.as_ref().map_or(0, Vec::len) + 9);
    out.extend_from_slice(&initialize());
    out.extend_from_slice(&align_left());
    out.extend_from_slice(text);
    out.push(LF);
    if let Some(barcode) = barcode {
        out.extend_from_slice(&barcode);
    }
    out.extend_from_slice(&cut());
    Ok(out)
}
