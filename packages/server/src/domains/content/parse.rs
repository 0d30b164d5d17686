//! Forgiving JSON parsing for model responses.
//!
//! Text models asked for "raw JSON only" still occasionally wrap the
//! document in a markdown code fence or leave a trailing comma. Both are
//! repaired here before handing the text to serde; casing differences are
//! handled by serde aliases on the result types. Anything beyond that is a
//! malformed response and belongs to the retry policy.

use serde::de::DeserializeOwned;

/// Parse a model response into `T`, tolerating code fences and trailing
/// commas.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let stripped = strip_code_fences(raw.trim());
    let sanitized = remove_trailing_commas(stripped);
    serde_json::from_str(&sanitized)
}

/// Drop a surrounding markdown code fence (``` or ```json) if present.
fn strip_code_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Remove commas that directly precede a closing brace or bracket,
/// outside of string literals.
fn remove_trailing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Look past whitespace; drop the comma if the container ends.
                let mut j = i + 1;
                while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                    j += 1;
                }
                if j < bytes.len() && (bytes[j] == b'}' || bytes[j] == b']') {
                    // skip the comma
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}
