pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json").trim_end_matches("```").trim().to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

/// Isolates the JSON payload of a model reply: drops code fences and any prose
/// before the first `{`/`[` or after the matching last `}`/`]`.
pub fn extract_json(s: &str) -> String {
    let s = strip_code_blocks(s);
    let start = s.find(['{', '[']);
    let end = s.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if end >= start => s[start..=end].to_string(),
        _ => s,
    }
}

/// Cleans one line of a name list: list numbering, bullets and quotes are dropped.
pub fn clean_name_line(line: &str) -> Option<String> {
    let name = line
        .trim()
        .trim_start_matches(|c: char| {
            c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | ' ')
        })
        .trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | ' '))
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}
