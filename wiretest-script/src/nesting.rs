//! The single body-nesting algorithm shared by assembly-time validation and
//! interpretation-time body extraction (spec §4.1, §4.2, §9).

use wiretest_core::Line;

/// Commands that carry the `BODY` flag: opening one of these nests the
/// `ends` counter one level deeper (spec §4.1).
pub const BODY_OPENERS: &[&str] = &[
    "_IF", "_LOOP", "_FOR", "_BPS", "_RPS", "_SOCKET", "_ERROR", "_PROCESS",
];

pub fn is_body_opener(command: &str) -> bool {
    BODY_OPENERS.contains(&command)
}

/// Checked at assembly time over a worker's fully-collected flat line list:
/// every body opener must have a matching `_END`, and no `_END` may appear
/// without an open body (spec §8: "the assembler terminates and produces
/// the same number of `_END`/`END` tokens as body openers").
pub fn validate_balanced(lines: &[Line]) -> Result<(), String> {
    let mut depth: i32 = 0;
    for line in lines {
        let cmd = line.command();
        if is_body_opener(cmd) {
            depth += 1;
        } else if cmd == "_END" {
            depth -= 1;
            if depth < 0 {
                return Err(format!("{}: unexpected _END with no open body", line.origin));
            }
        }
    }
    if depth != 0 {
        return Err(format!(
            "unterminated body: {depth} construct(s) never closed by _END"
        ));
    }
    Ok(())
}

/// `lines` must start right after an already-consumed body opener. Returns
/// the index of the `_END` line that matches it (exclusive upper bound of
/// the nested body), using the same depth counter as [`validate_balanced`]
/// but starting at 1 since one body is already open (spec §4.2).
pub fn find_matching_end(lines: &[Line]) -> Option<usize> {
    let mut depth: i32 = 1;
    for (i, line) in lines.iter().enumerate() {
        let cmd = line.command();
        if is_body_opener(cmd) {
            depth += 1;
        } else if cmd == "_END" {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Within an `_IF` body (`lines[..end_idx]`, found via [`find_matching_end`]),
/// locate a sibling `_ELSE` at nesting depth 1 — i.e. not inside a further
/// nested body (spec §4.2: "locates `_ELSE` (at nesting depth 1)").
pub fn find_else(lines: &[Line], end_idx: usize) -> Option<usize> {
    let mut depth: i32 = 1;
    for (i, line) in lines.iter().enumerate().take(end_idx) {
        let cmd = line.command();
        if depth == 1 && cmd == "_ELSE" {
            return Some(i);
        }
        if is_body_opener(cmd) {
            depth += 1;
        } else if cmd == "_END" {
            depth -= 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiretest_core::Origin;

    fn line(text: &str) -> Line {
        Line::new(Origin::new("t.htt", 1), text)
    }

    #[test]
    fn balanced_siblings_validate() {
        let lines = vec![
            line("_IF \"a\" EQUAL \"a\""),
            line("_SET X=1"),
            line("_END IF"),
            line("_LOOP 3"),
            line("_SET Y=2"),
            line("_END LOOP"),
        ];
        assert!(validate_balanced(&lines).is_ok());
    }

    #[test]
    fn unterminated_body_is_rejected() {
        let lines = vec![line("_IF \"a\" EQUAL \"a\""), line("_SET X=1")];
        assert!(validate_balanced(&lines).is_err());
    }

    #[test]
    fn stray_end_is_rejected() {
        let lines = vec![line("_SET X=1"), line("_END IF")];
        assert!(validate_balanced(&lines).is_err());
    }

    #[test]
    fn find_matching_end_skips_nested_bodies() {
        let lines = vec![
            line("_LOOP 2"),
            line("_SET X=1"),
            line("_END LOOP"),
            line("_SET Y=2"),
            line("_END IF"),
        ];
        assert_eq!(find_matching_end(&lines), Some(4));
    }

    #[test]
    fn find_else_at_top_depth_only() {
        let lines = vec![
            line("_LOOP 1"),
            line("_ELSE"), // nested, must not count
            line("_END LOOP"),
            line("_ELSE"), // top-level, this is the real one
            line("_SET Y=2"),
            line("_END IF"),
        ];
        let end = find_matching_end(&lines).unwrap();
        assert_eq!(find_else(&lines, end), Some(3));
    }
}
