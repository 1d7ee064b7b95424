//! Line-level diffs between two revisions of a prompt field.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOp {
    Unchanged,
    Added,
    Removed,
}

/// One line of an edit script. Positions are 1-based; `old_line` is absent
/// for additions and `new_line` for removals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub op: LineOp,
    pub text: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "lines", rename_all = "lowercase")]
pub enum DiffOutcome {
    /// Both sides are identical
    Unchanged,
    Edited(Vec<DiffLine>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub field: String,
    pub outcome: DiffOutcome,
}

impl DiffResult {
    pub fn is_unchanged(&self) -> bool {
        matches!(self.outcome, DiffOutcome::Unchanged)
    }

    pub fn lines(&self) -> &[DiffLine] {
        match &self.outcome {
            DiffOutcome::Unchanged => &[],
            DiffOutcome::Edited(lines) => lines,
        }
    }

    pub fn added(&self) -> usize {
        self.lines().iter().filter(|l| l.op == LineOp::Added).count()
    }

    pub fn removed(&self) -> usize {
        self.lines().iter().filter(|l| l.op == LineOp::Removed).count()
    }

    /// Render in unified style, or `(no changes)`.
    pub fn unified(&self) -> String {
        match &self.outcome {
            DiffOutcome::Unchanged => "(no changes)\n".to_string(),
            DiffOutcome::Edited(lines) => {
                let mut out = String::from("--- current\n+++ proposed\n");
                for line in lines {
                    let marker = match line.op {
                        LineOp::Unchanged => ' ',
                        LineOp::Added => '+',
                        LineOp::Removed => '-',
                    };
                    out.push(marker);
                    out.push_str(&line.text);
                    out.push('\n');
                }
                out
            }
        }
    }
}

/// Diff `original` against `proposed` line by line.
///
/// Alignment is a longest common subsequence. Equal leading lines are always
/// matched, so the unchanged prefix is as long as possible; inside a change
/// run removals come before additions.
///
/// Texts with the same lines are unchanged even if they differ in a trailing
/// newline or `\r\n` endings.
pub fn diff(field: &str, original: &str, proposed: &str) -> DiffResult {
    let old: Vec<&str> = original.lines().collect();
    let new: Vec<&str> = proposed.lines().collect();
    if old == new {
        return DiffResult {
            field: field.to_string(),
            outcome: DiffOutcome::Unchanged,
        };
    }

    let (n, m) = (old.len(), new.len());

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut lines = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && old[i] == new[j] {
            lines.push(DiffLine {
                op: LineOp::Unchanged,
                text: old[i].to_string(),
                old_line: Some(i + 1),
                new_line: Some(j + 1),
            });
            i += 1;
            j += 1;
        } else if i < n && (j == m || lcs[i + 1][j] >= lcs[i][j + 1]) {
            lines.push(DiffLine {
                op: LineOp::Removed,
                text: old[i].to_string(),
                old_line: Some(i + 1),
                new_line: None,
            });
            i += 1;
        } else {
            lines.push(DiffLine {
                op: LineOp::Added,
                text: new[j].to_string(),
                old_line: None,
                new_line: Some(j + 1),
            });
            j += 1;
        }
    }

    DiffResult {
        field: field.to_string(),
        outcome: DiffOutcome::Edited(lines),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(result: &DiffResult) -> Vec<(LineOp, &str)> {
        result.lines().iter().map(|l| (l.op, l.text.as_str())).collect()
    }

    #[test]
    fn test_identical_text_reports_no_changes() {
        for text in ["", "one line", "a\nb\nc\n"] {
            let result = diff("system", text, text);
            assert!(result.is_unchanged());
            assert_eq!(result.unified(), "(no changes)\n");
        }
    }

    #[test]
    fn test_trailing_newline_alone_is_no_change() {
        let result = diff("system_message", "Be kind.\n", "Be kind.");
        assert!(result.is_unchanged());
        assert_eq!(result.unified(), "(no changes)\n");

        let result = diff("user_template", "a\r\nb", "a\nb\n");
        assert!(result.is_unchanged());
    }

    #[test]
    fn test_single_changed_line() {
        let result = diff("system", "You are helpful.", "You are an expert.");
        assert_eq!(result.field, "system");
        assert_eq!(
            ops(&result),
            vec![
                (LineOp::Removed, "You are helpful."),
                (LineOp::Added, "You are an expert."),
            ]
        );
        assert_eq!((result.removed(), result.added()), (1, 1));
    }

    #[test]
    fn test_cleared_field_is_not_no_changes() {
        let result = diff("user", "{{q}}", "");
        assert!(!result.is_unchanged());
        assert_eq!(ops(&result), vec![(LineOp::Removed, "{{q}}")]);
    }

    #[test]
    fn test_insertion_keeps_common_lines() {
        let result = diff("user", "a\nb\nc", "a\nx\nb\nc");
        assert_eq!(
            ops(&result),
            vec![
                (LineOp::Unchanged, "a"),
                (LineOp::Added, "x"),
                (LineOp::Unchanged, "b"),
                (LineOp::Unchanged, "c"),
            ]
        );
        let added = &result.lines()[1];
        assert_eq!((added.old_line, added.new_line), (None, Some(2)));
    }

    #[test]
    fn test_prefers_longest_unchanged_prefix() {
        // "a" could align with either the first or the last line of the
        // proposed text; the prefix alignment wins.
        let result = diff("user", "a", "a\nb\na");
        assert_eq!(
            ops(&result),
            vec![
                (LineOp::Unchanged, "a"),
                (LineOp::Added, "b"),
                (LineOp::Added, "a"),
            ]
        );
    }

    #[test]
    fn test_reversal_swaps_added_and_removed() {
        let original = "intro\nkeep me\nold rule\nshared\nfooter";
        let proposed = "intro\nnew rule\nshared\nextra\nfooter";

        let forward = diff("system", original, proposed);
        let backward = diff("system", proposed, original);

        let mut flipped: Vec<DiffLine> = backward
            .lines()
            .iter()
            .map(|l| DiffLine {
                op: match l.op {
                    LineOp::Added => LineOp::Removed,
                    LineOp::Removed => LineOp::Added,
                    LineOp::Unchanged => LineOp::Unchanged,
                },
                text: l.text.clone(),
                old_line: l.new_line,
                new_line: l.old_line,
            })
            .collect();
        let mut expected = forward.lines().to_vec();

        // Only the order inside a change run depends on direction.
        let key = |l: &DiffLine| (l.old_line.or(l.new_line), l.op as u8, l.text.clone());
        flipped.sort_by_key(key);
        expected.sort_by_key(key);
        assert_eq!(flipped, expected);
    }

    #[test]
    fn test_unified_rendering() {
        let result = diff("system", "a\nb", "a\nc");
        assert_eq!(result.unified(), "--- current\n+++ proposed\n a\n-b\n+c\n");
    }
}
