//! Turning arbitrary text into a storage-safe [`Identifier`].

use formtable_core::{Identifier, field::SYSTEM_COLUMNS, identifier::MAX_LEN};

/// Words SQLite (or a later move to another SQL engine) would trip over as a
/// bare column or table name.
const RESERVED: &[&str] = &[
  "abort", "action", "add", "after", "all", "alter", "analyze", "and", "as", "asc", "attach",
  "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast", "check",
  "collate", "column", "commit", "conflict", "constraint", "create", "cross", "current",
  "current_date", "current_time", "current_timestamp", "database", "default", "deferrable",
  "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each", "else", "end",
  "escape", "except", "exclusive", "exists", "explain", "fail", "filter", "following", "for",
  "foreign", "from", "full", "glob", "group", "having", "if", "ignore", "immediate", "in",
  "index", "indexed", "initially", "inner", "insert", "instead", "intersect", "into", "is",
  "isnull", "join", "key", "left", "like", "limit", "match", "natural", "no", "not", "nothing",
  "notnull", "null", "of", "offset", "on", "or", "order", "outer", "over", "partition", "plan",
  "pragma", "preceding", "primary", "query", "raise", "range", "recursive", "references",
  "regexp", "reindex", "release", "rename", "replace", "restrict", "returning", "right",
  "rollback", "row", "rows", "savepoint", "select", "set", "table", "temp", "temporary", "then",
  "to", "transaction", "trigger", "union", "unique", "update", "user", "using", "vacuum",
  "values", "view", "virtual", "when", "where", "window", "with", "without",
];

pub fn is_reserved(name: &str) -> bool {
  RESERVED.binary_search(&name).is_ok() || SYSTEM_COLUMNS.contains(&name)
}

/// Lowercase, map every run of non-alphanumeric ASCII to a single `_`, and
/// trim leading/trailing separators. Non-ASCII characters are dropped.
pub fn slugify(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut pending_sep = false;
  for c in text.chars() {
    if c.is_ascii_alphanumeric() {
      if pending_sep && !out.is_empty() {
        out.push('_');
      }
      pending_sep = false;
      out.push(c.to_ascii_lowercase());
    } else if c.is_ascii() {
      pending_sep = true;
    }
  }
  out
}

/// Make a slug storage-safe: prefix names that start with a digit or with
/// `sqlite_`, suffix reserved words, and truncate to the identifier limit.
/// Returns `None` for an empty slug.
pub fn sanitize(slug: &str, prefix: &str) -> Option<Identifier> {
  if slug.is_empty() {
    return None;
  }
  let mut name = if slug.starts_with(|c: char| c.is_ascii_digit()) || slug.starts_with("sqlite_") {
    format!("{prefix}_{slug}")
  } else if is_reserved(slug) {
    format!("{slug}_{prefix}")
  } else {
    slug.to_owned()
  };

  truncate(&mut name, MAX_LEN);
  Identifier::parse(name).ok()
}

/// Truncate an ASCII name to `max` bytes without leaving a trailing `_`.
pub(crate) fn truncate(name: &mut String, max: usize) {
  if name.len() > max {
    name.truncate(max);
  }
  while name.ends_with('_') && name.len() > 1 {
    name.pop();
  }
}
