//! # Diff Engine
//!
//! Compares a stored statement with a proposed one after both went through
//! [`normalize`](crate::normalize::normalize) and were lower-cased.
//!
//! The comparison is a character-level diff. Consecutive characters sharing a
//! tag form one hunk, hunks made only of whitespace are dropped, and every
//! remaining added or removed hunk counts as one difference. A count of zero
//! is the only signal that two statements are "unchanged".
//!
//! This is textual equivalence, not semantic equivalence: reordered `WITH`
//! properties or columns count as changes.

use crate::normalize::normalize;
use similar::{ChangeTag, TextDiff};
use std::fmt::{self, Display};

/// How a hunk relates the stored text to the proposed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  /// Present only in the proposed statement.
  Added,
  /// Present only in the stored statement.
  Removed,
  /// Present in both.
  Unchanged,
}

/// One hunk of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
  /// Hunk kind.
  pub kind: ChangeKind,
  /// Hunk text, normalized and lower-cased.
  pub text: String,
}

/// Result of [`compare`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Comparison {
  /// Number of added or removed hunks that are not pure whitespace.
  pub difference_count: usize,
  /// Annotated hunks, only present when `difference_count > 0`.
  pub changes: Option<Vec<Change>>,
}

impl Comparison {
  /// Returns true when the statements differ.
  pub fn is_different(&self) -> bool {
    self.difference_count > 0
  }
}

impl Display for Comparison {
  /// Renders removed text as `[-text-]` and added text as `{+text+}`.
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(changes) = &self.changes else {
      return write!(f, "no changes");
    };
    for change in changes {
      match change.kind {
        ChangeKind::Added => write!(f, "{{+{}+}}", change.text)?,
        ChangeKind::Removed => write!(f, "[-{}-]", change.text)?,
        ChangeKind::Unchanged => write!(f, "{}", change.text)?,
      }
    }
    Ok(())
  }
}

/// Compares two statements textually.
pub fn compare(current: &str, proposed: &str) -> Comparison {
  let current = normalize(current).to_lowercase();
  let proposed = normalize(proposed).to_lowercase();

  let diff = TextDiff::from_chars(&current, &proposed);
  let mut hunks: Vec<Change> = Vec::new();
  for change in diff.iter_all_changes() {
    let kind = match change.tag() {
      ChangeTag::Insert => ChangeKind::Added,
      ChangeTag::Delete => ChangeKind::Removed,
      ChangeTag::Equal => ChangeKind::Unchanged,
    };
    match hunks.last_mut() {
      Some(last) if last.kind == kind => last.text.push_str(change.value()),
      _ => hunks.push(Change {
        kind,
        text: change.value().to_string(),
      }),
    }
  }

  let changes: Vec<Change> = hunks
    .into_iter()
    .filter(|hunk| !hunk.text.trim().is_empty())
    .collect();
  let difference_count = changes
    .iter()
    .filter(|change| change.kind != ChangeKind::Unchanged)
    .count();

  Comparison {
    difference_count,
    changes: (difference_count > 0).then_some(changes),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn test_identical_statements() {
    let comparison = compare("CREATE STREAM s1 (id INT);", "CREATE STREAM s1 (id INT);");
    assert_eq!(comparison.difference_count, 0);
    assert!(comparison.changes.is_none());
    assert!(!comparison.is_different());
  }

  #[test]
  fn test_layout_and_case_are_ignored() {
    let comparison = compare(
      "CREATE STREAM S1 (ID INT) WITH (KAFKA_TOPIC='t1');",
      "create stream s1 (\n  id int\n)\nwith (kafka_topic = 't1')",
    );
    assert_eq!(comparison.difference_count, 0);
  }

  #[test]
  fn test_changed_statement() {
    let comparison = compare(
      "CREATE STREAM s1 (id INT) WITH (KAFKA_TOPIC='t1');",
      "CREATE STREAM s1 (id BIGINT) WITH (KAFKA_TOPIC='t1');",
    );
    assert!(comparison.is_different());
    let changes = comparison.changes.as_ref().unwrap();
    assert!(changes.iter().any(|c| c.kind == ChangeKind::Added));
    assert!(
      changes
        .iter()
        .filter(|c| c.kind != ChangeKind::Unchanged)
        .all(|c| !c.text.trim().is_empty())
    );

    let rendered = comparison.to_string();
    assert!(rendered.contains("{+"));
    assert!(rendered.starts_with("create stream s1(id "));
  }

  #[test]
  fn test_reordering_counts_as_change() {
    let comparison = compare(
      "CREATE STREAM s1 (id INT) WITH (KAFKA_TOPIC='t1', VALUE_FORMAT='JSON')",
      "CREATE STREAM s1 (id INT) WITH (VALUE_FORMAT='JSON', KAFKA_TOPIC='t1')",
    );
    assert!(comparison.is_different());
  }

  #[test]
  fn test_display_without_changes() {
    assert_eq!(Comparison::default().to_string(), "no changes");
  }

  proptest! {
    #[test]
    fn test_compare_with_itself_has_no_differences(text in ".*") {
      prop_assert_eq!(compare(&text, &text).difference_count, 0);
    }

    #[test]
    fn test_compare_sql_like_text_with_itself(
      name in "[a-z_]{1,12}",
      columns in prop::collection::vec("[a-z]{1,8} (INT|VARCHAR|DOUBLE)", 1..5)
    ) {
      let statement = format!(
        "CREATE STREAM {} ({}) WITH (KAFKA_TOPIC='{}');",
        name,
        columns.join(", "),
        name
      );
      prop_assert_eq!(compare(&statement, &statement).difference_count, 0);
    }
  }
}
