//! Boundary parser for `git pull` output.
//!
//! The textual output of the merge is the real interface git gives us, so
//! all raw-text sniffing is isolated here instead of being scattered
//! through the sync workflow.

use std::sync::OnceLock;

use regex_lite::Regex;

/// Marker git prints at the start of each conflict report line.
const CONFLICT_MARKER: &str = "CONFLICT";

/// Extract the conflicting file paths from merge output.
///
/// A line counts as a conflict report when its trimmed content starts with
/// the `CONFLICT` marker; the path is the final whitespace-delimited token
/// of the line. Paths are passed through verbatim, in output order, without
/// deduplication. A marker line with no trailing token yields an empty
/// string entry.
pub fn conflict_files(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| line.trim().starts_with(CONFLICT_MARKER))
        .map(|line| match line.rfind(' ') {
            Some(i) => line[i + 1..].to_string(),
            None => line.to_string(),
        })
        .collect()
}

/// True if the pull output reports that there was nothing to merge.
///
/// Matches both the spaced phrase modern git prints ("Already up to date.")
/// and the hyphenated variant of older releases ("Already up-to-date.").
pub fn is_already_up_to_date(output: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"Already up[ -]to[ -]date").expect("up-to-date pattern is valid")
    });
    re.is_match(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CONFLICTS: &str = "Auto-merging docs/a.md\n\
        CONFLICT (content): Merge conflict in docs/a.md\n\
        Auto-merging docs/b.md\n\
        CONFLICT (content): Merge conflict in docs/b.md\n\
        Automatic merge failed; fix conflicts and then commit the result.\n";

    #[test]
    fn test_extracts_paths_in_output_order() {
        assert_eq!(conflict_files(TWO_CONFLICTS), vec!["docs/a.md", "docs/b.md"]);
    }

    #[test]
    fn test_count_matches_marker_lines() {
        let extracted = conflict_files(TWO_CONFLICTS);
        let marker_lines = TWO_CONFLICTS
            .lines()
            .filter(|l| l.trim().starts_with("CONFLICT"))
            .count();
        assert_eq!(extracted.len(), marker_lines);
    }

    #[test]
    fn test_empty_input() {
        assert!(conflict_files("").is_empty());
    }

    #[test]
    fn test_no_marker_lines() {
        let output = "Updating 1a2b3c4..5d6e7f8\nFast-forward\n docs/a.md | 2 +-\n";
        assert!(conflict_files(output).is_empty());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let output = "CONFLICT (content): Merge conflict in docs/a.md\n\
                      CONFLICT (modify/delete): docs/a.md\n";
        assert_eq!(conflict_files(output), vec!["docs/a.md", "docs/a.md"]);
    }

    #[test]
    fn test_indented_marker_line_is_retained() {
        let output = "  CONFLICT (content): Merge conflict in docs/c.md\n";
        assert_eq!(conflict_files(output), vec!["docs/c.md"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let output = "CONFLICT (content): Merge conflict in docs/a.md\r\n";
        assert_eq!(conflict_files(output), vec!["docs/a.md"]);
    }

    // Known defect class: a marker line with no trailing path produces an
    // empty-string entry rather than being dropped.
    #[test]
    fn test_marker_line_with_trailing_space_yields_empty_entry() {
        let output = "CONFLICT (content): Merge conflict in \n";
        assert_eq!(conflict_files(output), vec![""]);
    }

    #[test]
    fn test_bare_marker_line_passes_through() {
        assert_eq!(conflict_files("CONFLICT\n"), vec!["CONFLICT"]);
    }

    #[test]
    fn test_up_to_date_spaced_variant() {
        assert!(is_already_up_to_date("Already up to date.\n"));
    }

    #[test]
    fn test_up_to_date_hyphenated_variant() {
        assert!(is_already_up_to_date("Already up-to-date.\n"));
    }

    #[test]
    fn test_up_to_date_absent() {
        assert!(!is_already_up_to_date(TWO_CONFLICTS));
        assert!(!is_already_up_to_date(""));
    }
}
