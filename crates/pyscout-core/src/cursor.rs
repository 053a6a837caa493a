//! Extraction of the dotted expression under a cursor.
//!
//! Completion and hover need to know what `Foo().bar().ba` means at the
//! cursor without parsing the (usually syntactically broken) buffer. The
//! extractor scans backwards from the cursor over the logical line, splitting
//! on dots, balancing parentheses, and marking called segments, and returns
//! the chain as [`TypeReference`]s plus the partial segment still being
//! typed.
//!
//! The scan is intentionally shallow: any character that cannot be part of a
//! dotted call chain ends identifier collection, and everything inside a
//! balanced argument list is skipped without inspection.

use crate::descriptor::{ReferenceKind, TypeReference};

// ============================================================================
// CursorContext
// ============================================================================

/// What sits immediately left of the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorContext {
    /// The dotted segments before the partial one, in source order.
    /// `Foo().bar` yields one `scope_call` reference to `Foo`.
    pub references: Vec<TypeReference>,
    /// The final, possibly empty, segment being typed. Completion filters
    /// proposals against this.
    pub prefix: String,
    /// Leading whitespace of the logical line, used to guess the local scope.
    pub line_indent: u32,
}

// ============================================================================
// Extraction
// ============================================================================

/// Scans backwards from `position` (a character offset) and returns the
/// expression context there, or `None` when the cursor does not sit after
/// anything completable.
pub fn context_at(source: &str, position: usize) -> Option<CursorContext> {
    let chars: Vec<char> = source.chars().collect();
    let mut pos = position.min(chars.len());

    // Parts are discovered last-segment-first; names accumulate reversed.
    let mut parts: Vec<TypeReference> = Vec::new();
    let mut name: Vec<char> = Vec::new();
    let mut kind = ReferenceKind::ScopeLookup;
    let mut paren_depth = 0u32;
    let mut whitespace_run = 0u32;
    let mut taking = true;

    let flush = |parts: &mut Vec<TypeReference>, name: &mut Vec<char>, kind: &mut ReferenceKind| {
        parts.push(TypeReference {
            kind: *kind,
            name: name.iter().rev().collect(),
        });
        name.clear();
        *kind = ReferenceKind::ScopeLookup;
    };

    while pos > 0 {
        pos -= 1;
        let c = chars[pos];
        if c == '(' {
            if paren_depth > 0 {
                paren_depth -= 1;
            } else {
                // The cursor is inside this call's argument list.
                taking = false;
            }
        } else if c == ')' {
            paren_depth += 1;
            if taking {
                kind = ReferenceKind::ScopeCall;
            }
        } else if paren_depth > 0 {
            // Skip over the argument list of a completed call.
        } else if c.is_alphanumeric() || c == '_' {
            if whitespace_run > 0 {
                // A space separated two identifiers; only the right-hand
                // one belongs to the expression.
                taking = false;
                whitespace_run = 0;
            } else if taking {
                name.push(c);
            }
        } else if c == ' ' || c == '\t' {
            whitespace_run += 1;
            if taking && !name.is_empty() {
                flush(&mut parts, &mut name, &mut kind);
            }
        } else if c == '.' {
            whitespace_run = 0;
            if taking {
                flush(&mut parts, &mut name, &mut kind);
            }
        } else if c == '\n' || c == '\r' {
            let mut before = pos;
            if c == '\n' && before > 0 && chars[before - 1] == '\r' {
                before -= 1;
            }
            if before > 0 && chars[before - 1] == '\\' {
                // Explicit line join; the logical line continues above.
                whitespace_run = 0;
                pos = before - 1;
            } else {
                break;
            }
        } else {
            taking = false;
        }
    }

    if taking && !name.is_empty() {
        flush(&mut parts, &mut name, &mut kind);
    }

    parts.reverse();
    let prefix = parts.pop()?;
    Some(CursorContext {
        references: parts,
        prefix: prefix.name,
        line_indent: whitespace_run,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn context(source: &str) -> CursorContext {
        context_at(source, source.chars().count()).unwrap()
    }

    mod chain_tests {
        use super::*;

        #[test]
        fn plain_name_is_all_prefix() {
            let ctx = context("valu");
            assert!(ctx.references.is_empty());
            assert_eq!(ctx.prefix, "valu");
        }

        #[test]
        fn dotted_member_access_splits_into_chain_and_prefix() {
            let ctx = context("value.memb");
            assert_eq!(ctx.references, vec![TypeReference::lookup("value")]);
            assert_eq!(ctx.prefix, "memb");
        }

        #[test]
        fn trailing_dot_leaves_an_empty_prefix() {
            let ctx = context("value.");
            assert_eq!(ctx.references, vec![TypeReference::lookup("value")]);
            assert_eq!(ctx.prefix, "");
        }

        #[test]
        fn called_segments_are_marked_as_calls() {
            let ctx = context("Foo().bar");
            assert_eq!(ctx.references, vec![TypeReference::call("Foo")]);
            assert_eq!(ctx.prefix, "bar");
        }

        #[test]
        fn chained_calls_keep_their_order_and_kinds() {
            let ctx = context("Foo().bar().bar");
            assert_eq!(
                ctx.references,
                vec![TypeReference::call("Foo"), TypeReference::call("bar")]
            );
            assert_eq!(ctx.prefix, "bar");
        }

        #[test]
        fn argument_lists_are_skipped_without_inspection() {
            let ctx = context("foo(a, b.c(d)).bar");
            assert_eq!(ctx.references, vec![TypeReference::call("foo")]);
            assert_eq!(ctx.prefix, "bar");
        }

        #[test]
        fn operators_cut_the_chain_but_keep_the_prefix() {
            let ctx = context("a+foo.b");
            assert!(ctx.references.is_empty());
            assert_eq!(ctx.prefix, "b");
        }

        #[test]
        fn leading_keyword_is_not_part_of_the_expression() {
            let ctx = context("return value.memb");
            assert_eq!(ctx.references, vec![TypeReference::lookup("value")]);
            assert_eq!(ctx.prefix, "memb");
        }

        #[test]
        fn cursor_inside_an_open_call_has_no_context() {
            assert!(context_at("foo(", 4).is_none());
            assert!(context_at("foo(ba", 6).is_none());
        }

        #[test]
        fn empty_source_has_no_context() {
            assert!(context_at("", 0).is_none());
        }
    }

    mod line_tests {
        use super::*;

        #[test]
        fn scan_stops_at_the_previous_line() {
            let ctx = context("other.thing\nvalue.memb");
            assert_eq!(ctx.references, vec![TypeReference::lookup("value")]);
            assert_eq!(ctx.prefix, "memb");
        }

        #[test]
        fn indentation_of_the_logical_line_is_reported() {
            let ctx = context("def f():\n        value.memb");
            assert_eq!(ctx.line_indent, 8);
            assert_eq!(ctx.prefix, "memb");
        }

        #[test]
        fn module_level_lines_have_zero_indent() {
            let ctx = context("x = 1\nvalu");
            assert_eq!(ctx.line_indent, 0);
            assert_eq!(ctx.prefix, "valu");
        }

        #[test]
        fn backslash_joins_continue_the_logical_line() {
            let ctx = context("value\\\n    .memb");
            assert_eq!(ctx.references, vec![TypeReference::lookup("value")]);
            assert_eq!(ctx.prefix, "memb");
        }

        #[test]
        fn crlf_line_endings_terminate_the_scan() {
            let ctx = context("other\r\n    value.memb");
            assert_eq!(ctx.references, vec![TypeReference::lookup("value")]);
            assert_eq!(ctx.line_indent, 4);
        }

        #[test]
        fn position_may_point_mid_line() {
            let source = "value.memb = 1";
            let ctx = context_at(source, 10).unwrap();
            assert_eq!(ctx.references, vec![TypeReference::lookup("value")]);
            assert_eq!(ctx.prefix, "memb");
        }
    }
}
