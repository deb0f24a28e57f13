use anyhow::Context;
use std::path::Path;

/// Header row of a CSV template, cells trimmed. Blank cells are kept so
/// column positions still line up with data rows.
pub fn read_headers(path: &Path) -> anyhow::Result<Vec<String>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read template {}", path.to_string_lossy()))?;
    let text = String::from_utf8_lossy(&bytes);
    let headers = parse_header_row(&text);
    if headers.iter().all(|h| h.is_empty()) {
        anyhow::bail!("template {} has no header row", path.to_string_lossy());
    }
    Ok(headers)
}

/// First CSV record of `text`. Quoted cells may contain commas, doubled
/// quotes and line breaks.
pub fn parse_header_row(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf).trim().to_string()),
            '\r' | '\n' if !in_quotes => break,
            _ => buf.push(ch),
        }
    }
    out.push(buf.trim().to_string());
    out
}
