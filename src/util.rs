//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values in a
/// single pass: substituted values are never re-scanned, so user text that
/// happens to contain `{answer}` stays literal. Unknown `{...}` are kept as-is.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after
      .find('}')
      .and_then(|close| pairs.iter().find(|(k, _)| *k == &after[..close]).map(|(_, v)| (close, *v)));
    match value {
      Some((close, v)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings (model output, user answers).
/// Cuts on a char boundary so multi-byte text never panics.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// First line of `s` that has visible content, trimmed. Empty if there is none.
pub fn first_nonempty_line(s: &str) -> &str {
  s.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

/// `None` for empty/whitespace-only strings, trimmed `Some` otherwise.
pub fn non_blank(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|t| !t.is_empty())
}
