//! JSON-with-comments support for the config file.
//!
//! [`strip`] removes `//` and `/* */` comments and trailing commas so the
//! result parses as strict JSON. Newlines inside comments are preserved so
//! parse errors still point at the right line.

/// Strip comments and trailing commas from JSONC text.
pub fn strip(input: &str) -> String {
    remove_trailing_commas(&remove_comments(input))
}

fn remove_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());

    let mut in_string = false;
    let mut in_single_line = false;
    let mut in_multi_line = false;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if in_single_line {
            if c == '\n' {
                in_single_line = false;
                out.push('\n');
            }
            i += 1;
            continue;
        }

        if in_multi_line {
            if c == '*' && chars.get(i + 1) == Some(&'/') {
                in_multi_line = false;
                i += 2;
            } else {
                // Keep line numbers stable for JSON parse errors.
                if c == '\n' {
                    out.push('\n');
                }
                i += 1;
            }
            continue;
        }

        if in_string {
            if c == '"' && !is_escaped(&chars, i) {
                in_string = false;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                in_single_line = true;
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                in_multi_line = true;
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// A quote at `idx` is escaped iff it is preceded by an odd run of backslashes.
fn is_escaped(chars: &[char], idx: usize) -> bool {
    let mut backslashes = 0;
    let mut j = idx;
    while j > 0 && chars[j - 1] == '\\' {
        backslashes += 1;
        j -= 1;
    }
    backslashes % 2 == 1
}

/// Remove commas whose next non-whitespace character is `}` or `]`.
fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());

    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if in_string {
            if c == '"' && !is_escaped(&chars, i) {
                in_string = false;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ',' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if matches!(chars.get(j), Some('}') | Some(']')) {
                    // Drop the comma, keep the whitespace.
                    i += 1;
                } else {
                    out.push(c);
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_is_untouched() {
        let src = r#"{"a": 1, "b": [true, null], "c": "text"}"#;
        assert_eq!(strip(src), src);
    }

    #[test]
    fn single_line_comments_removed() {
        let src = "{\n  // comment\n  \"a\": 1\n}";
        let stripped = strip(src);
        assert!(!stripped.contains("comment"));
        let v: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn multi_line_comments_removed_newlines_kept() {
        let src = "{\n  /* one\n     two */\n  \"a\": 1\n}";
        let stripped = strip(src);
        assert!(!stripped.contains("two"));
        // Both comment lines still contribute a newline.
        assert_eq!(stripped.matches('\n').count(), src.matches('\n').count());
        let v: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn slashes_inside_strings_survive() {
        let src = r#"{"url": "https://example.com//path", "glob": "/* keep */"}"#;
        assert_eq!(strip(src), src);
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let src = r#"{"a": "he said \"hi\" // not a comment"}"#;
        assert_eq!(strip(src), src);
    }

    #[test]
    fn backslash_run_parity() {
        // "\\" is a complete string containing one backslash; the comment after
        // it must be removed.
        let src = "{\"a\": \"\\\\\"} // trailing";
        let stripped = strip(src);
        assert!(!stripped.contains("trailing"));
        let v: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(v["a"], "\\");
    }

    #[test]
    fn trailing_commas_removed() {
        let src = "{\"a\": [1, 2, 3,], \"b\": {\"c\": 1,},}";
        let v: serde_json::Value = serde_json::from_str(&strip(src)).unwrap();
        assert_eq!(v["a"].as_array().unwrap().len(), 3);
        assert_eq!(v["b"]["c"], 1);
    }

    #[test]
    fn trailing_comma_after_comment() {
        let src = "{\n  \"a\": 1, // note\n}";
        let v: serde_json::Value = serde_json::from_str(&strip(src)).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn comma_inside_string_kept() {
        let src = r#"{"a": "x,}"}"#;
        assert_eq!(strip(src), src);
    }

    #[test]
    fn non_trailing_commas_kept() {
        let src = "[1,\n 2,\n 3]";
        assert_eq!(strip(src), src);
    }
}
