//! Definition differ: two field snapshots → structural change intents.
//!
//! Fields are matched on `field_id` only. A field that the authoring workflow
//! deletes and recreates under a new id is therefore seen as DROP + ADD;
//! [`suspected_renames`] reports such pairs so the caller can be warned, but
//! the differ never rewrites them.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{
  Error, Result,
  field::FieldDefinition,
  identifier::{Identifier, MAX_LEN},
  intent::ChangeIntent,
};

/// Compute the intents that transform the table for `old` into the table for
/// `new`.
///
/// Ordering: all DROPs (in `old` order), then RENAMEs, then RETYPEs (in `new`
/// order, against the final names), then ADDs (in `new` order). Dropping first
/// frees column names that later ADDs or RENAMEs may reuse. RENAMEs run so that
/// no target is still held by a column yet to move; a cycle such as a swap
/// parks one column under a temporary name.
pub fn diff(old: &[FieldDefinition], new: &[FieldDefinition]) -> Result<Vec<ChangeIntent>> {
  check_snapshot(old, "old")?;
  check_snapshot(new, "new")?;

  let old_by_id: HashMap<&str, &FieldDefinition> =
    old.iter().map(|f| (f.field_id.as_str(), f)).collect();
  let new_ids: HashSet<&str> = new.iter().map(|f| f.field_id.as_str()).collect();

  let mut drops = Vec::new();
  let mut renames = Vec::new();
  let mut retypes = Vec::new();
  let mut adds = Vec::new();

  for field in old {
    if new_ids.contains(field.field_id.as_str()) {
      continue;
    }
    // A field that never received a column has nothing to drop.
    if let Some(column) = &field.column_name {
      drops.push(ChangeIntent::drop(&field.field_id, column.clone(), Some(field.logical_type)));
    }
  }

  for field in new {
    let Some(prev) = old_by_id.get(field.field_id.as_str()) else {
      adds.push(ChangeIntent::add(
        &field.field_id,
        &field.label,
        field.column_name.clone(),
        field.logical_type,
      ));
      continue;
    };

    // Never materialised: the new shape is a fresh column.
    let Some(from) = &prev.column_name else {
      adds.push(ChangeIntent::add(
        &field.field_id,
        &field.label,
        field.column_name.clone(),
        field.logical_type,
      ));
      continue;
    };

    let current = match &field.column_name {
      Some(to) if to != from => {
        renames.push((field.field_id.as_str(), from.clone(), to.clone()));
        to.clone()
      }
      _ => from.clone(),
    };

    if prev.logical_type != field.logical_type {
      retypes.push(ChangeIntent::retype(
        &field.field_id,
        current,
        prev.logical_type,
        field.logical_type,
      ));
    }
  }

  let mut taken: HashSet<String> = old
    .iter()
    .chain(new)
    .filter_map(|f| f.column_name.as_ref().map(Identifier::to_string))
    .collect();

  drops.extend(order_renames(renames, &mut taken)?);
  drops.extend(retypes);
  drops.extend(adds);
  Ok(drops)
}

/// Sequence `(field_id, from, to)` renames so each target is free when its
/// turn comes.
fn order_renames(
  mut pending: Vec<(&str, Identifier, Identifier)>,
  taken: &mut HashSet<String>,
) -> Result<Vec<ChangeIntent>> {
  let mut out = Vec::with_capacity(pending.len());
  while !pending.is_empty() {
    let ready = pending
      .iter()
      .position(|(_, _, to)| !pending.iter().any(|(_, from, _)| from == to));

    if let Some(i) = ready {
      let (field_id, from, to) = pending.remove(i);
      out.push(ChangeIntent::rename(field_id, from, to));
      continue;
    }

    // Only cycles remain.
    let parked = temporary_name(&pending[0].1, taken)?;
    let entry = &mut pending[0];
    out.push(ChangeIntent::rename(entry.0, entry.1.clone(), parked.clone()));
    entry.1 = parked;
  }
  Ok(out)
}

/// `_mv_<column>`, or `_mv_<column>_<n>`, avoiding every name in `taken`.
fn temporary_name(column: &Identifier, taken: &mut HashSet<String>) -> Result<Identifier> {
  let base = format!("_mv_{column}");
  for n in 0..100u32 {
    let suffix = if n == 0 { String::new() } else { format!("_{n}") };
    let mut name = base.clone();
    name.truncate(MAX_LEN - suffix.len());
    name.push_str(&suffix);
    if taken.insert(name.clone()) {
      return Identifier::parse(name);
    }
  }
  Err(Error::Validation(format!("no free temporary column for moving {column}")))
}

fn check_snapshot(fields: &[FieldDefinition], which: &str) -> Result<()> {
  let mut ids = HashSet::new();
  let mut columns: HashSet<&Identifier> = HashSet::new();
  for f in fields {
    if !ids.insert(f.field_id.as_str()) {
      return Err(Error::Validation(format!(
        "duplicate field_id {:?} in {which} snapshot",
        f.field_id
      )));
    }
    if let Some(c) = &f.column_name
      && !columns.insert(c)
    {
      return Err(Error::Validation(format!("duplicate column_name {c} in {which} snapshot")));
    }
  }
  Ok(())
}

// ─── Lost-rename detection ───────────────────────────────────────────────────

/// A DROP + ADD pair that looks like a rename whose field id was lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspectedRename {
  pub dropped_field_id: String,
  pub dropped_label:    String,
  pub added_field_id:   String,
  pub added_label:      String,
  pub similarity:       f64,
}

/// Labels at or above this bigram similarity are reported.
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Report removed/added field pairs with matching types and near-identical
/// labels. Each removed field is paired with at most one added field.
pub fn suspected_renames(old: &[FieldDefinition], new: &[FieldDefinition]) -> Vec<SuspectedRename> {
  let old_ids: HashSet<&str> = old.iter().map(|f| f.field_id.as_str()).collect();
  let new_ids: HashSet<&str> = new.iter().map(|f| f.field_id.as_str()).collect();

  let removed: Vec<&FieldDefinition> =
    old.iter().filter(|f| !new_ids.contains(f.field_id.as_str())).collect();
  let mut added: Vec<&FieldDefinition> =
    new.iter().filter(|f| !old_ids.contains(f.field_id.as_str())).collect();

  let mut out = Vec::new();
  for gone in removed {
    let best = added
      .iter()
      .enumerate()
      .filter(|(_, f)| f.logical_type == gone.logical_type)
      .map(|(i, f)| (i, label_similarity(&gone.label, &f.label)))
      .filter(|(_, s)| *s >= SIMILARITY_THRESHOLD)
      .max_by(|a, b| a.1.total_cmp(&b.1));

    if let Some((i, similarity)) = best {
      let candidate = added.remove(i);
      out.push(SuspectedRename {
        dropped_field_id: gone.field_id.clone(),
        dropped_label: gone.label.clone(),
        added_field_id: candidate.field_id.clone(),
        added_label: candidate.label.clone(),
        similarity,
      });
    }
  }
  out
}

fn normalize(label: &str) -> Vec<char> {
  label
    .chars()
    .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation())
    .flat_map(char::to_lowercase)
    .collect()
}

/// Dice coefficient over character bigrams of the normalised labels.
fn label_similarity(a: &str, b: &str) -> f64 {
  let a = normalize(a);
  let b = normalize(b);
  if a == b {
    return 1.0;
  }
  if a.len() < 2 || b.len() < 2 {
    return 0.0;
  }

  let bigrams = |s: &[char]| -> HashMap<(char, char), usize> {
    let mut m = HashMap::new();
    for w in s.windows(2) {
      *m.entry((w[0], w[1])).or_insert(0) += 1;
    }
    m
  };
  let ba = bigrams(&a);
  let mut bb = bigrams(&b);

  let mut shared = 0usize;
  for (k, n) in ba {
    if let Some(m) = bb.get_mut(&k) {
      let common = n.min(*m);
      shared += common;
      *m -= common;
    }
  }
  (2 * shared) as f64 / ((a.len() - 1) + (b.len() - 1)) as f64
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{field::LogicalType, intent::ChangeKind};

  fn field(id: &str, column: &str, ty: LogicalType) -> FieldDefinition {
    FieldDefinition {
      field_id:     id.into(),
      label:        column.replace('_', " "),
      logical_type: ty,
      column_name:  Some(Identifier::parse(column).unwrap()),
      order:        0,
    }
  }

  #[test]
  fn rename_only() {
    let old = vec![field("f1", "full_name", LogicalType::ShortText)];
    let new = vec![field("f1", "name", LogicalType::ShortText)];

    let intents = diff(&old, &new).unwrap();
    assert_eq!(intents.len(), 1);
    let i = &intents[0];
    assert_eq!(i.kind, ChangeKind::Rename);
    assert_eq!(i.field_id, "f1");
    assert_eq!(i.old_column_name.as_ref().unwrap().as_str(), "full_name");
    assert_eq!(i.new_column_name.as_ref().unwrap().as_str(), "name");
  }

  #[test]
  fn retype_only() {
    let old = vec![field("1", "a", LogicalType::ShortText)];
    let new = vec![field("1", "a", LogicalType::Number)];

    let intents = diff(&old, &new).unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].kind, ChangeKind::Retype);
    assert_eq!(intents[0].old_type, Some(LogicalType::ShortText));
    assert_eq!(intents[0].new_type, Some(LogicalType::Number));
  }

  #[test]
  fn rename_and_retype_are_ordered() {
    let old = vec![field("1", "a", LogicalType::ShortText)];
    let new = vec![field("1", "b", LogicalType::Number)];

    let kinds: Vec<_> = diff(&old, &new).unwrap().iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Rename, ChangeKind::Retype]);

    let retype = &diff(&old, &new).unwrap()[1];
    assert_eq!(retype.retype_column().unwrap().as_str(), "b");
  }

  #[test]
  fn chained_renames_free_each_target_first() {
    let old = vec![
      field("1", "a", LogicalType::ShortText),
      field("2", "b", LogicalType::ShortText),
    ];
    let new = vec![
      field("1", "b", LogicalType::ShortText),
      field("2", "c", LogicalType::ShortText),
    ];

    let moves: Vec<(String, String)> = diff(&old, &new)
      .unwrap()
      .iter()
      .map(|i| {
        let from = i.old_column_name.as_ref().unwrap().to_string();
        (from, i.new_column_name.as_ref().unwrap().to_string())
      })
      .collect();
    assert_eq!(moves, vec![("b".into(), "c".into()), ("a".into(), "b".into())]);
  }

  #[test]
  fn swapped_columns_go_through_a_temporary_name() {
    let old = vec![
      field("1", "a", LogicalType::ShortText),
      field("2", "b", LogicalType::Number),
    ];
    let new = vec![
      field("1", "b", LogicalType::ShortText),
      field("2", "a", LogicalType::LongText),
    ];

    let intents = diff(&old, &new).unwrap();
    let moves: Vec<(&str, &str, &str)> = intents
      .iter()
      .filter(|i| i.kind == ChangeKind::Rename)
      .map(|i| {
        let from = i.old_column_name.as_ref().unwrap().as_str();
        (i.field_id.as_str(), from, i.new_column_name.as_ref().unwrap().as_str())
      })
      .collect();
    assert_eq!(moves, vec![("1", "a", "_mv_a"), ("2", "b", "a"), ("1", "_mv_a", "b")]);

    // The retype follows every rename and names the final column.
    let last = intents.last().unwrap();
    assert_eq!(last.kind, ChangeKind::Retype);
    assert_eq!(last.retype_column().unwrap().as_str(), "a");
  }

  #[test]
  fn temporary_names_avoid_snapshot_columns() {
    let old = vec![
      field("1", "a", LogicalType::ShortText),
      field("2", "b", LogicalType::ShortText),
      field("3", "_mv_a", LogicalType::ShortText),
    ];
    let new = vec![
      field("1", "b", LogicalType::ShortText),
      field("2", "a", LogicalType::ShortText),
      field("3", "_mv_a", LogicalType::ShortText),
    ];

    let first = &diff(&old, &new).unwrap()[0];
    assert_eq!(first.new_column_name.as_ref().unwrap().as_str(), "_mv_a_1");
  }

  #[test]
  fn add_and_drop() {
    let old = vec![field("1", "a", LogicalType::ShortText)];
    let new = vec![field("2", "b", LogicalType::Number)];

    let intents = diff(&old, &new).unwrap();
    let kinds: Vec<_> = intents.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Drop, ChangeKind::Add]);
  }

  #[test]
  fn unchanged_fields_produce_nothing() {
    let fields = vec![
      field("1", "a", LogicalType::ShortText),
      field("2", "b", LogicalType::Date),
    ];
    assert!(diff(&fields, &fields).unwrap().is_empty());
  }

  #[test]
  fn order_changes_are_ignored() {
    let old = vec![field("1", "a", LogicalType::ShortText)];
    let mut moved = old.clone();
    moved[0].order = 7;
    moved[0].label = "Something else".into();
    assert!(diff(&old, &moved).unwrap().is_empty());
  }

  #[test]
  fn missing_new_column_name_is_not_a_rename() {
    let old = vec![field("1", "a", LogicalType::ShortText)];
    let mut new = old.clone();
    new[0].column_name = None;
    assert!(diff(&old, &new).unwrap().is_empty());
  }

  #[test]
  fn duplicate_ids_are_rejected() {
    let new = vec![
      field("1", "a", LogicalType::ShortText),
      field("1", "b", LogicalType::ShortText),
    ];
    assert!(diff(&[], &new).is_err());
  }

  #[test]
  fn duplicate_columns_are_rejected() {
    let new = vec![
      field("1", "a", LogicalType::ShortText),
      field("2", "a", LogicalType::ShortText),
    ];
    assert!(diff(&[], &new).is_err());
  }

  #[test]
  fn recreated_field_is_drop_plus_add_and_flagged() {
    let mut old = field("1", "full_name", LogicalType::ShortText);
    old.label = "Full name".into();
    let mut new = field("9", "full_name_2", LogicalType::ShortText);
    new.label = "Full Name".into();

    let intents = diff(&[old.clone()], &[new.clone()]).unwrap();
    let kinds: Vec<_> = intents.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![ChangeKind::Drop, ChangeKind::Add]);

    let suspects = suspected_renames(&[old], &[new]);
    assert_eq!(suspects.len(), 1);
    assert_eq!(suspects[0].dropped_field_id, "1");
    assert_eq!(suspects[0].added_field_id, "9");
  }

  #[test]
  fn different_types_are_not_suspected() {
    let old = field("1", "age", LogicalType::Number);
    let new = field("2", "age", LogicalType::Date);
    assert!(suspected_renames(&[old], &[new]).is_empty());
  }

  #[test]
  fn similarity_of_unrelated_labels_is_low() {
    assert!(label_similarity("Email address", "Birth date") < SIMILARITY_THRESHOLD);
    assert_eq!(label_similarity("Phone", "phone"), 1.0);
  }
}
