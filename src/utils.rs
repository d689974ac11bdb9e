//! Composite ID helpers.
//!
//! Resources without a single-field primary key store their identity as two
//! parts joined by `:`. Each part is escaped first (`\` → `\\`, `:` → `\:`),
//! so any pair of strings survives a build/parse round trip.

use crate::error::ProviderError;

const SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// Join two ID parts with `:`, escaping separators inside the parts.
pub fn build_two_part_id(first: &str, second: &str) -> String {
    let mut id = String::with_capacity(first.len() + second.len() + 1);
    escape_into(&mut id, first);
    id.push(SEPARATOR);
    escape_into(&mut id, second);
    id
}

/// Split an ID on its first unescaped `:` and unescape both parts.
///
/// `expected` names the format in the error, e.g. `<project>:<domain>`.
pub fn parse_two_part_id(
    id: &str,
    expected: &'static str,
) -> Result<(String, String), ProviderError> {
    let invalid = |reason: &str| ProviderError::InvalidId {
        id: id.to_string(),
        expected,
        reason: reason.to_string(),
    };

    let mut first = String::new();
    let mut chars = id.chars();
    loop {
        match chars.next() {
            None => return Err(invalid("missing ':' separator")),
            Some(ESCAPE) => match chars.next() {
                Some(c) => first.push(c),
                None => return Err(invalid("dangling escape character")),
            },
            Some(SEPARATOR) => break,
            Some(c) => first.push(c),
        }
    }

    let mut second = String::new();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some(escaped) => second.push(escaped),
                None => return Err(invalid("dangling escape character")),
            }
        } else {
            second.push(c);
        }
    }

    Ok((first, second))
}

fn escape_into(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: &str = "<project>:<domain>";

    #[test]
    fn test_build_plain_parts() {
        assert_eq!(build_two_part_id("42", "example.com"), "42:example.com");
        assert_eq!(
            build_two_part_id("group/site", "docs.example.com"),
            "group/site:docs.example.com"
        );
    }

    #[test]
    fn test_parse_plain_parts() {
        let (project, domain) = parse_two_part_id("42:example.com", FORMAT).unwrap();
        assert_eq!(project, "42");
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn test_separator_inside_parts_round_trips() {
        let pairs = [
            ("a:b", "c"),
            ("a", "c:d:e"),
            ("back\\slash", "x"),
            ("", ""),
            ("trailing\\", ":leading"),
        ];
        for (first, second) in pairs {
            let id = build_two_part_id(first, second);
            let parsed = parse_two_part_id(&id, FORMAT).unwrap();
            assert_eq!(parsed, (first.to_string(), second.to_string()), "id: {}", id);
        }
    }

    #[test]
    fn test_parse_splits_on_first_separator() {
        let (project, domain) = parse_two_part_id("42:host:8080", FORMAT).unwrap();
        assert_eq!(project, "42");
        assert_eq!(domain, "host:8080");
    }

    #[test]
    fn test_missing_separator_is_error() {
        let err = parse_two_part_id("example.com", FORMAT).unwrap_err();
        match err {
            ProviderError::InvalidId {
                id,
                expected,
                reason,
            } => {
                assert_eq!(id, "example.com");
                assert_eq!(expected, FORMAT);
                assert!(reason.contains("separator"));
            },
            other => panic!("unexpected error: {:?}", other),
        }

        // An escaped separator does not count.
        assert!(parse_two_part_id("a\\:b", FORMAT).is_err());
    }

    #[test]
    fn test_dangling_escape_is_error() {
        assert!(parse_two_part_id("a\\", FORMAT).is_err());
        assert!(parse_two_part_id("a:b\\", FORMAT).is_err());
    }
}
