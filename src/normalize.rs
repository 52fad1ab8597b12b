//! # Statement Normalizer
//!
//! Rewrites a statement into a canonical single-line form so that two
//! statements differing only in layout, comments or keyword case compare equal
//! as text.
//!
//! Normalization runs these passes in order:
//!
//! 1. Remove `--` comments, both whole-line and trailing ones. String
//!    literals are respected.
//! 2. Replace line breaks with spaces.
//! 3. Join adjacent string literals separated only by whitespace or `+`
//!    (`'abc' + 'def'` becomes `'abcdef'`).
//! 4. Collapse whitespace runs and trim.
//! 5. Minify: drop block comments, remove whitespace around `( ) , ; =`,
//!    upper-case reserved words and strip trailing semicolons. Literals and
//!    quoted identifiers pass through untouched.

use regex::Regex;
use std::sync::LazyLock;

static LINE_BREAKS: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\r\n|\n|\r").expect("valid line break regex"));

static SPLIT_STRING: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r#"['"][\s+]+['"]"#).expect("valid split string regex"));

static WHITESPACE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Punctuation that never needs surrounding whitespace.
const TIGHT_PUNCTUATION: &[char] = &['(', ')', ',', ';', '='];

/// Reserved words upper-cased by the minifier.
const KEYWORDS: &[&str] = &[
  "ADVANCE", "AND", "ARRAY", "AS", "BETWEEN", "BIGINT", "BOOLEAN", "BY", "BYTES", "CASE", "CAST",
  "CHANGES", "CREATE", "DATE", "DECIMAL", "DEFINE", "DELETE", "DESCRIBE", "DOUBLE", "DROP",
  "ELSE", "EMIT", "END", "EXISTS", "EXTENDED", "FALSE", "FINAL", "FROM", "FULL", "GROUP",
  "HAVING", "HOPPING", "IF", "IN", "INNER", "INSERT", "INT", "INTEGER", "INTO", "IS", "JOIN",
  "KEY", "LEFT", "LIKE", "LIMIT", "MAP", "NOT", "NULL", "ON", "OR", "OUTER", "PARTITION",
  "PRIMARY", "QUERIES", "REPLACE", "RIGHT", "SELECT", "SESSION", "SHOW", "SIZE", "SOURCE",
  "STREAM", "STREAMS", "STRING", "STRUCT", "TABLE", "TABLES", "TERMINATE", "THEN", "TIME",
  "TIMESTAMP", "TOPIC", "TRUE", "TUMBLING", "UNDEFINE", "VALUES", "VARCHAR", "WHEN", "WHERE",
  "WINDOW", "WITH", "WITHIN",
];

/// Normalizes a statement for textual comparison.
pub fn normalize(statement: &str) -> String {
  let uncommented = strip_line_comments(statement);
  let single_line = LINE_BREAKS.replace_all(&uncommented, " ");
  let joined = SPLIT_STRING.replace_all(&single_line, "");
  let collapsed = WHITESPACE.replace_all(&joined, " ");
  minify(collapsed.trim())
}

/// Removes `--` comments from every line, leaving literals intact.
///
/// A line left blank by removing its comment is dropped. Other lines,
/// blank ones and line breaks inside literals included, are kept as written.
pub fn strip_line_comments(statement: &str) -> String {
  let mut out = String::with_capacity(statement.len());
  let mut line = String::new();
  let mut stripped = false;
  let mut quote: Option<char> = None;
  let mut chars = statement.chars().peekable();

  while let Some(c) = chars.next() {
    match quote {
      Some(q) => {
        if c == q {
          quote = None;
        }
      }
      None if is_quote(c) => quote = Some(c),
      None if c == '-' && chars.peek() == Some(&'-') => {
        while chars.next_if(|next| *next != '\n' && *next != '\r').is_some() {}
        stripped = true;
        continue;
      }
      None => {}
    }

    if c == '\n' {
      if !(stripped && line.trim().is_empty()) {
        out.push_str(&line);
        out.push('\n');
      }
      line.clear();
      stripped = false;
    } else {
      line.push(c);
    }
  }

  if !(stripped && line.trim().is_empty()) {
    out.push_str(&line);
  }
  out
}

/// Canonicalizes whitespace, punctuation and keyword case.
pub fn minify(statement: &str) -> String {
  let mut out = String::with_capacity(statement.len());
  let mut chars = statement.chars().peekable();
  let mut pending_space = false;

  while let Some(c) = chars.next() {
    if is_quote(c) {
      push_space(&mut out, &mut pending_space);
      out.push(c);
      for next in chars.by_ref() {
        out.push(next);
        if next == c {
          break;
        }
      }
    } else if c == '-' && chars.peek() == Some(&'-') {
      break;
    } else if c == '/' && chars.peek() == Some(&'*') {
      chars.next();
      let mut previous = '\0';
      for next in chars.by_ref() {
        if previous == '*' && next == '/' {
          break;
        }
        previous = next;
      }
      pending_space = !out.is_empty();
    } else if c.is_whitespace() {
      pending_space = !out.is_empty();
    } else if TIGHT_PUNCTUATION.contains(&c) {
      pending_space = false;
      out.push(c);
      while chars.peek().is_some_and(|n| n.is_whitespace()) {
        chars.next();
      }
    } else if is_word_char(c) {
      push_space(&mut out, &mut pending_space);
      let mut word = String::from(c);
      while let Some(&next) = chars.peek() {
        if !is_word_char(next) {
          break;
        }
        word.push(next);
        chars.next();
      }
      let upper = word.to_uppercase();
      if KEYWORDS.contains(&upper.as_str()) {
        out.push_str(&upper);
      } else {
        out.push_str(&word);
      }
    } else {
      push_space(&mut out, &mut pending_space);
      out.push(c);
    }
  }

  let trimmed = out.trim_end_matches([';', ' ']);
  trimmed.to_string()
}

fn push_space(out: &mut String, pending: &mut bool) {
  if *pending && !out.ends_with(TIGHT_PUNCTUATION) {
    out.push(' ');
  }
  *pending = false;
}

fn is_quote(c: char) -> bool {
  matches!(c, '\'' | '"' | '`')
}

fn is_word_char(c: char) -> bool {
  c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '{' | '}')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_strip_line_comments() {
    let text = "-- header\nCREATE STREAM s1 -- trailing\n  (id INT);\n   -- indented\n";
    assert_eq!(strip_line_comments(text), "CREATE STREAM s1 \n  (id INT);\n");
  }

  #[test]
  fn test_blank_lines_kept_unless_a_comment_was_removed() {
    let text = "INSERT INTO s1 VALUES ('a\n\nb');\n\n-- next\nSHOW TOPICS;";
    assert_eq!(
      strip_line_comments(text),
      "INSERT INTO s1 VALUES ('a\n\nb');\n\nSHOW TOPICS;"
    );
  }

  #[test]
  fn test_comment_markers_inside_literals_survive() {
    let text = "SELECT '--not a comment' FROM s1";
    assert_eq!(strip_line_comments(text), text);
  }

  #[test]
  fn test_normalize_layout() {
    let text = "create stream  s1 (\n  id INT,\n  name VARCHAR\n)\nwith (kafka_topic = 't1', value_format='JSON');";
    assert_eq!(
      normalize(text),
      "CREATE STREAM s1(id INT,name VARCHAR)WITH(kafka_topic='t1',value_format='JSON')"
    );
  }

  #[test]
  fn test_normalize_joins_split_strings() {
    let text = "SELECT 'abc' +\n 'def' AS x FROM s1;";
    assert_eq!(normalize(text), "SELECT 'abcdef' AS x FROM s1");
  }

  #[test]
  fn test_normalize_strips_block_comments() {
    let text = "CREATE TABLE t1 /* owned by ops */ AS SELECT * FROM s1;";
    assert_eq!(normalize(text), "CREATE TABLE t1 AS SELECT * FROM s1");
  }

  #[test]
  fn test_literal_case_preserved() {
    assert_eq!(
      normalize("select 'Select From' from s1"),
      "SELECT 'Select From' FROM s1"
    );
  }

  #[test]
  fn test_equivalent_layouts_match() {
    let stored = "CREATE STREAM S1 (ID INTEGER) WITH (KAFKA_TOPIC='t1', VALUE_FORMAT='JSON');";
    let proposed = "-- orders\ncreate stream s1 (\n  id integer\n) with (\n  kafka_topic='t1',\n  value_format='JSON'\n)";
    assert_eq!(
      normalize(stored).to_lowercase(),
      normalize(proposed).to_lowercase()
    );
  }
}
