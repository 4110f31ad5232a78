//! Prefix extraction for anchored regular expressions.
//!
//! A pattern like `^foo` constrains an indexed string field to the range
//! `["foo", "fop")`, letting the scanner skip everything else. Only a
//! conservative subset of patterns is reduced; anything else yields an
//! empty prefix and the caller falls back to the trivial range with the
//! regex applied as a residual filter.

/// Extract a literal prefix from an anchored regex pattern.
///
/// Returns `(prefix, pure_prefix)`. The prefix is empty when the pattern is
/// not reducible: not anchored with `^` or `\A`, or carrying flags other
/// than `x` (and `m`, tolerated only with `\A` since `^` under multiline
/// matches at every line start). `pure_prefix` is true iff the whole
/// pattern is exhausted by the literal, i.e. the range alone is an exact
/// match and no residual regex filter is needed.
pub fn simple_regex(pattern: &str, flags: &str) -> (String, bool) {
    let (rest, multiline_ok) = if let Some(r) = pattern.strip_prefix("\\A") {
        (r, true)
    } else if let Some(r) = pattern.strip_prefix('^') {
        (r, false)
    } else {
        return (String::new(), false);
    };

    let mut extended = false;
    for flag in flags.chars() {
        match flag {
            'm' if multiline_ok => {}
            'x' => extended = true,
            _ => return (String::new(), false),
        }
    }

    let mut literal = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' | '?' => {
                // these make the preceding char optional; drop it
                literal.pop();
                return (literal, false);
            }
            '\\' => match chars.next() {
                // backslash-alphanumeric is a character class, not a literal
                Some(next) if next.is_ascii_alphanumeric() => return (literal, false),
                Some(next) => literal.push(next),
                None => return (literal, false),
            },
            '^' | '$' | '.' | '[' | '(' | ')' | '+' | '{' => return (literal, false),
            '#' if extended => return (literal, false),
            c if extended && c.is_whitespace() => {}
            c => literal.push(c),
        }
    }

    let pure = !literal.is_empty();
    (literal, pure)
}

/// The smallest string strictly greater than every string with `prefix` as
/// a prefix: bump the last character, carrying left by dropping trailing
/// maximal characters. `None` when the whole prefix carries away (no finite
/// upper bound exists).
pub fn simple_regex_end(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(bumped) = next_char(last) {
            chars.push(bumped);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

fn next_char(c: char) -> Option<char> {
    let mut code = c as u32;
    loop {
        code += 1;
        if code > char::MAX as u32 {
            return None;
        }
        if let Some(next) = char::from_u32(code) {
            return Some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_literal_is_pure_prefix() {
        assert_eq!(simple_regex("^foo", ""), ("foo".to_string(), true));
    }

    #[test]
    fn slash_a_anchor_works() {
        assert_eq!(simple_regex("\\Afoo", ""), ("foo".to_string(), true));
    }

    #[test]
    fn unanchored_is_not_reducible() {
        assert_eq!(simple_regex("foo", ""), (String::new(), false));
    }

    #[test]
    fn case_insensitive_flag_blocks_reduction() {
        assert_eq!(simple_regex("^foo", "i"), (String::new(), false));
    }

    #[test]
    fn multiline_blocks_caret_but_not_slash_a() {
        assert_eq!(simple_regex("^foo", "m"), (String::new(), false));
        assert_eq!(simple_regex("\\Afoo", "m"), ("foo".to_string(), true));
    }

    #[test]
    fn metacharacter_ends_literal() {
        assert_eq!(simple_regex("^foo.*", ""), ("foo".to_string(), false));
        assert_eq!(simple_regex("^foo(bar)", ""), ("foo".to_string(), false));
        assert_eq!(simple_regex("^foo$", ""), ("foo".to_string(), false));
    }

    #[test]
    fn star_and_question_drop_last_char() {
        assert_eq!(simple_regex("^fooz*", ""), ("foo".to_string(), false));
        assert_eq!(simple_regex("^a?", ""), (String::new(), false));
    }

    #[test]
    fn escaped_punctuation_is_literal() {
        assert_eq!(simple_regex("^a\\.b", ""), ("a.b".to_string(), true));
        assert_eq!(simple_regex("^a\\d", ""), ("a".to_string(), false));
    }

    #[test]
    fn extended_mode_skips_whitespace_and_stops_at_comment() {
        assert_eq!(simple_regex("^f o o", "x"), ("foo".to_string(), true));
        assert_eq!(simple_regex("^foo # tail", "x"), ("foo".to_string(), false));
    }

    #[test]
    fn regex_end_bumps_last_char() {
        assert_eq!(simple_regex_end("foo"), Some("fop".to_string()));
        assert_eq!(simple_regex_end("a"), Some("b".to_string()));
    }

    #[test]
    fn regex_end_carries_over_maximal_chars() {
        let prefix = format!("a{}", char::MAX);
        assert_eq!(simple_regex_end(&prefix), Some("b".to_string()));
        assert_eq!(simple_regex_end(&char::MAX.to_string()), None);
    }

    #[test]
    fn derived_range_brackets_exactly_the_prefixed_strings() {
        let (prefix, pure) = simple_regex("^foo", "");
        assert!(pure);
        let end = simple_regex_end(&prefix).unwrap();
        let re = regex::Regex::new("^foo").unwrap();
        for s in ["foo", "foobar", "foo\u{10FFFF}", "fon", "fop", "fox", "fo"] {
            let in_range = s >= prefix.as_str() && s < end.as_str();
            assert_eq!(re.is_match(s), in_range, "{s:?}");
        }
    }
}
