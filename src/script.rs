//! Splitting of multi-statement scripts.

use crate::normalize::normalize;

/// Splits a script into statements on top-level semicolons.
///
/// Semicolons inside string literals, quoted identifiers and comments do not
/// split. Each statement keeps its terminating `;`. Statements that contain
/// nothing but whitespace or comments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
  let mut statements = Vec::new();
  let mut current = String::new();
  let mut quote: Option<char> = None;
  let mut chars = script.chars().peekable();

  while let Some(c) = chars.next() {
    current.push(c);
    match quote {
      Some(q) => {
        if c == q {
          quote = None;
        }
      }
      None => match c {
        '\'' | '"' | '`' => quote = Some(c),
        '-' if chars.peek() == Some(&'-') => {
          while let Some(&next) = chars.peek() {
            if next == '\n' {
              break;
            }
            current.push(next);
            chars.next();
          }
        }
        '/' if chars.peek() == Some(&'*') => {
          let mut previous = '\0';
          for next in chars.by_ref() {
            current.push(next);
            if previous == '*' && next == '/' {
              break;
            }
            previous = next;
          }
        }
        ';' => push_statement(&mut statements, &mut current),
        _ => {}
      },
    }
  }
  push_statement(&mut statements, &mut current);
  statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
  let statement = current.trim().to_string();
  current.clear();
  if normalize(&statement).is_empty() {
    return;
  }
  statements.push(statement);
}
