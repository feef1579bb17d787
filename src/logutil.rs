//! Logging utilities that keep link traffic readable on a single log line.

/// Hex dump of at most `max` bytes, with an ellipsis when truncated.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let shown = data.len().min(max);
    let mut out = data[..shown]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > shown {
        out.push_str(" …");
    }
    out
}

/// Bytes or characters shown by [`payload_preview`]; a DLT payload never exceeds 255.
pub const PREVIEW_LIMIT: usize = 64;

/// Escape payload text so it stays on one log line, showing at most
/// `max_chars` characters. Control characters other than `\n`, `\r` and `\t`
/// are printed as `\xNN`.
pub fn escape_log(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars) + 4);
    let mut chars = text.chars();
    for ch in chars.by_ref().take(max_chars) {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    if chars.next().is_some() {
        out.push_str(" …");
    }
    out
}

/// Render a payload for humans: escaped text when it is valid UTF-8, hex otherwise.
/// Both forms stop after [`PREVIEW_LIMIT`].
pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => format!("\"{}\"", escape_log(text, PREVIEW_LIMIT)),
        Err(_) => format!("[{}]", hex_snippet(payload, PREVIEW_LIMIT)),
    }
}
