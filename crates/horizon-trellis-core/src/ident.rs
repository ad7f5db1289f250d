//! Effective-id addressing.
//!
//! Every runtime object of a form session is named by an *effective id*
//! composed of three parts:
//!
//! - a *prefix* describing the component-nesting path, segments joined by
//!   `$` (e.g. `foo$bar$`),
//! - a *static id*, the id written in the form definition,
//! - an optional *suffix* describing the repeat-iteration path, introduced
//!   by `.` and with nested levels joined by `-` (e.g. `.3-7-2`).
//!
//! `foo$bar$my-input.1-2` therefore names the `my-input` object inside the
//! `foo`/`bar` component chain, at iteration 1 of the outer repeat and
//! iteration 2 of the inner one.
//!
//! Everything in this module is pure string algebra: no function resolves an
//! id against live object registries (that is the model's job), and the only
//! failure mode is malformed input.

use std::fmt;

/// Separator between component-nesting segments and the static id.
pub const COMPONENT_SEPARATOR: char = '$';

/// Separator introducing the repeat-iteration suffix (first level).
pub const REPEAT_SEPARATOR: char = '.';

/// Separator between nested repeat-iteration indices within the suffix.
pub const REPEAT_INDEX_SEPARATOR: char = '-';

/// Synthetic static-id segment appended to a repeat's id to name one of its
/// iterations.
pub const ITERATION_SEGMENT: &str = "~iteration";

/// Errors raised on malformed id input.
///
/// These signal programming errors on the caller's side: ids crossing the
/// public API are expected to follow the separator grammar above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedId {
    /// A repeat-iteration suffix segment was not a positive integer.
    NonNumericSuffix {
        /// The id being parsed.
        id: String,
        /// The offending suffix segment.
        segment: String,
    },
    /// An absolute id did not start with `/`.
    NotAbsolute {
        /// The id being converted.
        id: String,
    },
}

impl fmt::Display for MalformedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonNumericSuffix { id, segment } => {
                write!(f, "Non-numeric suffix segment '{segment}' in id '{id}'")
            }
            Self::NotAbsolute { id } => {
                write!(f, "Absolute id must start with '/': '{id}'")
            }
        }
    }
}

impl std::error::Error for MalformedId {}

/// Return the prefix of an effective id, including the trailing separator,
/// e.g. `"foo$bar$"`. Returns `""` when the id has no prefix.
pub fn prefix(effective_id: &str) -> &str {
    match effective_id.rfind(COMPONENT_SEPARATOR) {
        Some(index) => &effective_id[..=index],
        None => "",
    }
}

/// Return the prefix of an effective id without the trailing separator,
/// e.g. `"foo$bar"`. Returns `""` when the id has no prefix.
pub fn prefix_no_separator(effective_id: &str) -> &str {
    match effective_id.rfind(COMPONENT_SEPARATOR) {
        Some(index) => &effective_id[..index],
        None => "",
    }
}

/// Return the segments of an effective id's prefix, e.g. `["foo", "bar"]`
/// for `foo$bar$my-input`. Empty when the id has no prefix.
pub fn prefix_parts(effective_id: &str) -> Vec<&str> {
    let prefix = prefix_no_separator(effective_id);
    if prefix.is_empty() {
        Vec::new()
    } else {
        prefix.split(COMPONENT_SEPARATOR).collect()
    }
}

/// Whether the effective id carries a repeat-iteration suffix.
pub fn has_suffix(effective_id: &str) -> bool {
    effective_id.contains(REPEAT_SEPARATOR)
}

/// Return the suffix of an effective id without the leading separator,
/// e.g. `"2-5-1"`. Returns `""` when the id has no suffix.
pub fn suffix(effective_id: &str) -> &str {
    match effective_id.find(REPEAT_SEPARATOR) {
        Some(index) => &effective_id[index + 1..],
        None => "",
    }
}

/// Return the suffix of an effective id including the leading separator,
/// e.g. `".2-5-1"`. Returns `""` when the id has no suffix.
pub fn suffix_with_separator(effective_id: &str) -> &str {
    match effective_id.find(REPEAT_SEPARATOR) {
        Some(index) => &effective_id[index..],
        None => "",
    }
}

/// Return an effective id's prefixed id, i.e. the id without its suffix:
/// `foo$bar$my-input.1-2` becomes `foo$bar$my-input`.
pub fn prefixed_id(effective_id: &str) -> &str {
    match effective_id.find(REPEAT_SEPARATOR) {
        Some(index) => &effective_id[..index],
        None => effective_id,
    }
}

/// Return an effective id without its prefix:
/// `foo$bar$my-input.1-2` becomes `my-input.1-2`.
pub fn no_prefix(effective_id: &str) -> &str {
    match effective_id.rfind(COMPONENT_SEPARATOR) {
        Some(index) => &effective_id[index + 1..],
        None => effective_id,
    }
}

/// Return the static id embedded in any id, removing prefix and suffix:
/// `foo$bar.1-2` becomes `bar`.
pub fn static_id_of(id: &str) -> &str {
    prefixed_id(no_prefix(id))
}

/// Parse the dash-delimited suffix into iteration indices:
/// `foo$bar.3-1-5` yields `[3, 1, 5]`. Empty when the id has no suffix.
///
/// Iteration indices are 1-based; a segment that is not a positive integer
/// fails with [`MalformedId::NonNumericSuffix`] rather than producing a
/// partial sequence.
pub fn suffix_parts(effective_id: &str) -> Result<Vec<u32>, MalformedId> {
    let suffix = suffix(effective_id);
    if suffix.is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    for segment in suffix.split(REPEAT_INDEX_SEPARATOR) {
        match segment.parse::<u32>() {
            Ok(index) if index > 0 => parts.push(index),
            _ => {
                return Err(MalformedId::NonNumericSuffix {
                    id: effective_id.to_string(),
                    segment: segment.to_string(),
                });
            }
        }
    }
    Ok(parts)
}

/// Compute an effective id based on an existing effective id and a static
/// id, preserving prefix and suffix:
/// `foo$bar.1-2` and `my-static` give `foo$my-static.1-2`.
///
/// This addresses a sibling object under the same repeat context.
pub fn related_effective_id(base_effective_id: &str, static_id: &str) -> String {
    format!(
        "{}{}{}",
        prefix(base_effective_id),
        static_id,
        suffix_with_separator(base_effective_id)
    )
}

/// Given a repeat's effective id, compute the effective id of one of its
/// iterations.
///
/// The separator for the new index depends on whether the repeat already has
/// a suffix: the first repeat level introduces the suffix with
/// [`REPEAT_SEPARATOR`], nested levels extend it with
/// [`REPEAT_INDEX_SEPARATOR`]:
///
/// - `foobar` with index 3 gives `foobar~iteration.3`
/// - `foobar.3-7` with index 2 gives `foobar~iteration.3-7-2`
pub fn iteration_effective_id(repeat_effective_id: &str, iteration_index: u32) -> String {
    let parent_suffix = suffix_with_separator(repeat_effective_id);
    let iteration_prefixed_id = format!("{}{}", prefixed_id(repeat_effective_id), ITERATION_SEGMENT);
    if parent_suffix.is_empty() {
        format!("{iteration_prefixed_id}{REPEAT_SEPARATOR}{iteration_index}")
    } else {
        format!("{iteration_prefixed_id}{parent_suffix}{REPEAT_INDEX_SEPARATOR}{iteration_index}")
    }
}

/// Append a new ending to an effective id's static part, keeping the suffix
/// in place: `foo$bar.1-2` and `-end` give `foo$bar-end.1-2`.
pub fn append_to_effective_id(effective_id: &str, ending: &str) -> String {
    format!(
        "{}{}{}",
        prefixed_id(effective_id),
        ending,
        suffix_with_separator(effective_id)
    )
}

/// Whether the id is a static id, i.e. contains neither a component nor a
/// repeat-hierarchy separator.
///
/// Resolution targets passed across the public API must be static ids; this
/// is the check used to validate them.
pub fn is_static_id(id: &str) -> bool {
    !id.contains(COMPONENT_SEPARATOR) && !id.contains(REPEAT_SEPARATOR)
}

/// Whether the id is an effective id, i.e. carries a prefix or a suffix.
pub fn is_effective_id(id: &str) -> bool {
    id.contains(COMPONENT_SEPARATOR) || id.contains(REPEAT_SEPARATOR)
}

/// Whether the id is an absolute id (`/`-rooted path form).
pub fn is_absolute_id(id: &str) -> bool {
    id.starts_with('/')
}

/// Convert an absolute id to an effective id: `/foo/bar` becomes `foo$bar`.
pub fn absolute_id_to_effective_id(absolute_id: &str) -> Result<String, MalformedId> {
    if !is_absolute_id(absolute_id) {
        return Err(MalformedId::NotAbsolute {
            id: absolute_id.to_string(),
        });
    }
    Ok(absolute_id[1..].replace('/', "$"))
}

/// Whether the id names a top-level object, i.e. its static id equals the
/// whole id.
pub fn is_top_level_id(id: &str) -> bool {
    id == static_id_of(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_decomposition() {
        assert_eq!(prefix("foo$bar$my-input.1-2"), "foo$bar$");
        assert_eq!(prefix_no_separator("foo$bar$my-input.1-2"), "foo$bar");
        assert_eq!(prefix("my-input"), "");
        assert_eq!(prefix_parts("foo$bar$my-input"), vec!["foo", "bar"]);
        assert!(prefix_parts("my-input").is_empty());
    }

    #[test]
    fn test_suffix_decomposition() {
        assert_eq!(suffix("foo$bar.2-5-1"), "2-5-1");
        assert_eq!(suffix_with_separator("foo$bar.2-5-1"), ".2-5-1");
        assert_eq!(suffix("foo$bar"), "");
        assert!(has_suffix("a.1"));
        assert!(!has_suffix("a"));
    }

    #[test]
    fn test_prefixed_id_plus_suffix_is_identity() {
        for id in ["p$s.1-2", "s", "p$q$s", "s.3", "p$s"] {
            let recomposed = format!("{}{}", prefixed_id(id), suffix_with_separator(id));
            assert_eq!(recomposed, id);
        }
    }

    #[test]
    fn test_static_id_of() {
        assert_eq!(static_id_of("foo$bar.1-2"), "bar");
        assert_eq!(static_id_of("bar"), "bar");
        assert_eq!(static_id_of("foo$bar"), "bar");
        assert_eq!(static_id_of("bar.7"), "bar");
    }

    #[test]
    fn test_suffix_parts() {
        assert_eq!(suffix_parts("foo$bar.3-1-5").unwrap(), vec![3, 1, 5]);
        assert!(suffix_parts("foo$bar").unwrap().is_empty());
    }

    #[test]
    fn test_suffix_parts_rejects_non_numeric() {
        let err = suffix_parts("foo.bar.baz").unwrap_err();
        match err {
            MalformedId::NonNumericSuffix { segment, .. } => {
                assert_eq!(segment, "bar.baz");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_suffix_parts_rejects_zero() {
        assert!(suffix_parts("foo.0").is_err());
    }

    #[test]
    fn test_related_effective_id() {
        assert_eq!(related_effective_id("foo$bar.1-2", "my-static"), "foo$my-static.1-2");
        assert_eq!(related_effective_id("bar", "other"), "other");
        assert_eq!(related_effective_id("foo$bar", "other"), "foo$other");
    }

    #[test]
    fn test_iteration_effective_id_separator_choice() {
        // No suffix: the first repeat level introduces the suffix with '.'.
        assert_eq!(iteration_effective_id("r", 3), "r~iteration.3");
        // Existing suffix: nested levels extend it with '-'.
        assert_eq!(iteration_effective_id("r.3-7", 2), "r~iteration.3-7-2");
        assert_eq!(iteration_effective_id("foo$r.1", 4), "foo$r~iteration.1-4");
    }

    #[test]
    fn test_append_to_effective_id() {
        assert_eq!(append_to_effective_id("foo$bar.1-2", "-end"), "foo$bar-end.1-2");
        assert_eq!(append_to_effective_id("bar", "-end"), "bar-end");
    }

    #[test]
    fn test_id_kind_checks() {
        assert!(is_static_id("my-input"));
        assert!(!is_static_id("foo$my-input"));
        assert!(!is_static_id("my-input.1"));
        assert!(is_effective_id("foo$my-input.1"));
        assert!(!is_effective_id("my-input"));
        assert!(is_absolute_id("/foo/bar"));
        assert!(!is_absolute_id("foo$bar"));
        assert!(is_top_level_id("my-input"));
        assert!(!is_top_level_id("foo$my-input"));
    }

    #[test]
    fn test_absolute_id_conversion() {
        assert_eq!(absolute_id_to_effective_id("/foo/bar").unwrap(), "foo$bar");
        assert!(absolute_id_to_effective_id("foo$bar").is_err());
    }
}
