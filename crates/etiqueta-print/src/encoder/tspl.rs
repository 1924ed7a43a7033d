// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TSPL text dialect.
//
// A job is a short script, one directive per line, each ending in CRLF:
//
//   SIZE 50 mm,30 mm
//   GAP 2 mm,0 mm
//   CLS
//   TEXT 10,10,"3",0,1,1,"first line"
//   TEXT 10,40,"3",0,1,1,"second line"
//   BARCODE 10,70,"128",48,1,0,2,2,"12345"
//   PRINT 1
//
// Quoted operands escape `"` as `\["]`. Other control characters would break
// the directive framing and are rejected.

use std::fmt::Write as _;

use etiqueta_core::config::LabelGeometry;
use etiqueta_core::error::{EtiquetaError, Result};
use etiqueta_core::types::PrintJob;

/// Directive terminator.
pub const LINE_END: &str = "\r\n";

/// Vertical position of the first text line, in dots.
pub const FIRST_LINE_Y: u32 = 10;

/// Vertical distance between text lines, in dots.
pub const LINE_PITCH: u32 = 30;

/// Barcode height, in dots.
pub const BARCODE_HEIGHT: u32 = 48;

/// Vertical position of text line `index`.
pub fn line_y(index: usize) -> u32 {
    FIRST_LINE_Y + LINE_PITCH * index as u32
}

/// Escape a value for use inside a quoted operand.
pub fn escape_operand(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\[\"]"),
            c if c.is_control() => {
                return Err(EtiquetaError::InvalidText(format!(
                    "control character U+{:04X} is not allowed in a TSPL operand",
                    c as u32
                )));
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Split label text into logical lines. A trailing `\r` on each line is
/// dropped so CRLF input behaves like LF input.
fn logical_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// Encode `job` as a TSPL script for the given label geometry.
pub fn encode(job: &PrintJob, label: &LabelGeometry) -> Result<Vec<u8>> {
    let font = escape_operand(&label.font)?;
    let mut script = String::new();

    // Writing into a String cannot fail.
    let _ = write!(
        script,
        "SIZE {} mm,{} mm{LINE_END}",
        label.width_mm, label.height_mm
    );
    let _ = write!(script, "GAP {} mm,0 mm{LINE_END}", label.gap_mm);
    let _ = write!(script, "CLS{LINE_END}");

    let mut lines = 0;
    for (index, line) in logical_lines(&job.label_text).enumerate() {
        let line = escape_operand(line)?;
        let _ = write!(
            script,
            "TEXT {},{},\"{font}\",0,1,1,\"{line}\"{LINE_END}",
            label.x_dots,
            line_y(index)
        );
        lines = index + 1;
    }

    if let Some(barcode) = job.barcode_text.as_deref() {
        let data = escape_operand(barcode)?;
        let _ = write!(
            script,
            "BARCODE {},{},\"128\",{BARCODE_HEIGHT},1,0,2,2,\"{data}\"{LINE_END}",
            label.x_dots,
            line_y(lines)
        );
    }

    let _ = write!(script, "PRINT 1{LINE_END}");
    Ok(script.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(job: &PrintJob) -> String {
        let bytes = encode(job, &LabelGeometry::default()).expect("encode");
        String::from_utf8(bytes).expect("utf-8")
    }

    #[test]
    fn single_line_script() {
        assert_eq!(
            script(&PrintJob::new("HELLO")),
            "SIZE 50 mm,30 mm\r\nGAP 2 mm,0 mm\r\nCLS\r\nTEXT 10,10,\"3\",0,1,1,\"HELLO\"\r\nPRINT 1\r\n"
        );
    }

    #[test]
    fn second_line_sits_thirty_dots_lower() {
        let out = script(&PrintJob::new("first\nsecond"));
        assert!(out.contains("TEXT 10,10,\"3\",0,1,1,\"first\"\r\n"));
        assert!(out.contains("TEXT 10,40,\"3\",0,1,1,\"second\"\r\n"));
    }

    #[test]
    fn crlf_input_matches_lf_input() {
        assert_eq!(
            script(&PrintJob::new("a\r\nb")),
            script(&PrintJob::new("a\nb"))
        );
    }

    #[test]
    fn barcode_goes_below_last_line() {
        let out = script(&PrintJob::new("a\nb").with_barcode("12345"));
        assert!(out.contains("BARCODE 10,70,\"128\",48,1,0,2,2,\"12345\"\r\n"));
        assert!(out.ends_with("BARCODE 10,70,\"128\",48,1,0,2,2,\"12345\"\r\nPRINT 1\r\n"));
    }

    #[test]
    fn quotes_are_escaped() {
        let out = script(&PrintJob::new("say \"hi\""));
        assert!(out.contains("\"say \\[\"]hi\\[\"]\""));
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = encode(&PrintJob::new("tab\there"), &LabelGeometry::default()).unwrap_err();
        assert!(matches!(err, EtiquetaError::InvalidText(_)));
        let err = encode(&PrintJob::new("ok").with_barcode("1\r2"), &LabelGeometry::default())
            .unwrap_err();
        assert!(matches!(err, EtiquetaError::InvalidText(_)));
    }

    #[test]
    fn geometry_is_configurable() {
        let label = LabelGeometry {
            width_mm: 40,
            height_mm: 20,
            gap_mm: 3,
            x_dots: 24,
            font: "TSS24.BF2".into(),
        };
        let out = String::from_utf8(encode(&PrintJob::new("x"), &label).expect("encode"))
            .expect("utf-8");
        assert!(out.starts_with("SIZE 40 mm,20 mm\r\nGAP 3 mm,0 mm\r\n"));
        assert!(out.contains("TEXT 24,10,\"TSS24.BF2\",0,1,1,\"x\""));
    }
}
