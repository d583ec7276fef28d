//! Migration planner: a resolved [`ChangeIntent`] → an ordered list of
//! [`Step`]s plus the forward and rollback SQL shown to operators.
//!
//! Planning is pure. It validates the intent against a [`SchemaView`] of the
//! live table but touches nothing; storage backends execute the steps inside a
//! single transaction.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  field::{LogicalType, OwnerKind, SYSTEM_COLUMNS, TableTarget},
  identifier::{Identifier, MAX_LEN},
  intent::{ChangeIntent, ChangeKind},
  record::MigrationRecord,
  types::{ColumnType, Conversion, column_conversion, physical_type},
};

// ─── Schema view ─────────────────────────────────────────────────────────────

/// The columns of one table, by name. Used both for the live schema and for
/// simulating a sequence of intents during preview.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaView {
  columns: BTreeMap<String, ColumnType>,
}

impl SchemaView {
  pub fn new(columns: impl IntoIterator<Item = (String, ColumnType)>) -> Self {
    Self { columns: columns.into_iter().collect() }
  }

  pub fn contains(&self, column: &str) -> bool { self.columns.contains_key(column) }

  pub fn column_type(&self, column: &str) -> Option<ColumnType> {
    self.columns.get(column).copied()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> { self.columns.keys().map(String::as_str) }

  /// Advance the view as if `plan` had been executed.
  pub fn apply(&mut self, plan: &MigrationPlan) {
    let intent = &plan.intent;
    match intent.kind {
      ChangeKind::Add => {
        if let (Some(c), Some(t)) = (&intent.new_column_name, plan.column_type) {
          self.columns.insert(c.to_string(), t);
        }
      }
      ChangeKind::Drop => {
        if let Some(c) = &intent.old_column_name {
          self.columns.remove(c.as_str());
        }
      }
      ChangeKind::Rename => {
        if let (Some(from), Some(to)) = (&intent.old_column_name, &intent.new_column_name)
          && let Some(t) = self.columns.remove(from.as_str())
        {
          self.columns.insert(to.to_string(), t);
        }
      }
      ChangeKind::Retype => {
        if let (Some(c), Some(t)) = (intent.retype_column(), plan.column_type) {
          self.columns.insert(c.to_string(), t);
        }
      }
    }
  }
}

// ─── Plan ────────────────────────────────────────────────────────────────────

/// One unit of work inside a migration transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
  /// Snapshot `column` into a new backup with id `id`. Always precedes DDL.
  Backup {
    id:          Uuid,
    column:      Identifier,
    column_type: ColumnType,
  },
  /// Execute one DDL statement verbatim.
  Ddl { sql: String },
  /// Copy every row of `source` into `dest`, cast to `target`. The first row
  /// that fails conversion aborts the transaction.
  Convert {
    source: Identifier,
    dest:   Identifier,
    target: ColumnType,
  },
  /// Write a backup's values back into `column` by row id and mark the backup
  /// consumed.
  Restore { backup_id: Uuid, column: Identifier },
}

impl Step {
  fn render(&self, table: &Identifier) -> String {
    match self {
      Self::Backup { id, column, .. } => {
        format!("-- backup {}.{} as '{id}'", table.quoted(), column.quoted())
      }
      Self::Ddl { sql } => sql.clone(),
      Self::Convert { source, dest, target } => format!(
        "-- convert each row of {t}.{} into {t}.{} as {target}; the first row that fails aborts",
        source.quoted(),
        dest.quoted(),
        t = table.quoted(),
      ),
      Self::Restore { backup_id, column } => restore_sql(table, column, *backup_id),
    }
  }
}

/// Everything needed to execute or preview one intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationPlan {
  pub table:        Identifier,
  /// The intent with all names resolved.
  pub intent:       ChangeIntent,
  pub steps:        Vec<Step>,
  pub forward_sql:  String,
  pub rollback_sql: Option<String>,
  /// Set when the plan takes a backup.
  pub backup_id:    Option<Uuid>,
  /// Physical type of the affected column after the plan runs.
  pub column_type:  Option<ColumnType>,
  /// Set for RETYPE plans.
  pub conversion:   Option<Conversion>,
  pub warnings:     Vec<String>,
}

fn render(table: &Identifier, steps: &[Step]) -> String {
  if steps.is_empty() {
    return "-- no physical change".into();
  }
  steps.iter().map(|s| format!("{};", s.render(table))).collect::<Vec<_>>().join("\n")
}

fn restore_sql(table: &Identifier, column: &Identifier, backup_id: Uuid) -> String {
  format!("RESTORE BACKUP '{backup_id}' INTO {}.{}", table.quoted(), column.quoted())
}

fn add_column(table: &Identifier, column: &Identifier, ty: ColumnType) -> Step {
  Step::Ddl {
    sql: format!("ALTER TABLE {} ADD COLUMN {} {}", table.quoted(), column.quoted(), ty.sql()),
  }
}

fn drop_column(table: &Identifier, column: &Identifier) -> Step {
  Step::Ddl { sql: format!("ALTER TABLE {} DROP COLUMN {}", table.quoted(), column.quoted()) }
}

fn rename_column(table: &Identifier, from: &Identifier, to: &Identifier) -> Step {
  Step::Ddl {
    sql: format!(
      "ALTER TABLE {} RENAME COLUMN {} TO {}",
      table.quoted(),
      from.quoted(),
      to.quoted()
    ),
  }
}

/// DDL for a fresh dynamic table carrying only the system columns.
pub fn create_table_sql(target: &TableTarget) -> String {
  let parent = match target.owner_kind {
    OwnerKind::Form => "",
    OwnerKind::SubForm => ",\n  \"parent_id\" INTEGER NOT NULL",
  };
  format!(
    "CREATE TABLE {} (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
     \"created_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,\n  \
     \"updated_at\" TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP{parent}\n)",
    target.table_name.quoted()
  )
}

/// Name of the temporary column a RETYPE converts into: `_rt_<column>`, or
/// `_rt_<column>_<n>` when that is taken.
fn shadow_name(schema: &SchemaView, column: &Identifier) -> Result<Identifier> {
  let base = format!("_rt_{column}");
  for n in 0..100u32 {
    let suffix = if n == 0 { String::new() } else { format!("_{n}") };
    let mut name = base.clone();
    name.truncate(MAX_LEN - suffix.len());
    name.push_str(&suffix);
    let candidate = Identifier::parse(name)?;
    if require_free(schema, &candidate).is_ok() {
      return Ok(candidate);
    }
  }
  Err(Error::Validation(format!("no free temporary column for retyping {column}")))
}

/// The statements that move `column` from its current type to `target`.
fn retype_steps(
  table: &Identifier,
  schema: &SchemaView,
  column: &Identifier,
  target: ColumnType,
) -> Result<Vec<Step>> {
  let shadow = shadow_name(schema, column)?;
  Ok(vec![
    add_column(table, &shadow, target),
    Step::Convert { source: column.clone(), dest: shadow.clone(), target },
    drop_column(table, column),
    rename_column(table, &shadow, column),
  ])
}

fn require<'a>(schema: &SchemaView, column: &'a Identifier) -> Result<&'a Identifier> {
  if SYSTEM_COLUMNS.contains(&column.as_str()) {
    return Err(Error::Validation(format!("column {column} is managed by the engine")));
  }
  if !schema.contains(column.as_str()) {
    return Err(Error::not_found("column", column));
  }
  Ok(column)
}

fn require_free(schema: &SchemaView, column: &Identifier) -> Result<()> {
  if SYSTEM_COLUMNS.contains(&column.as_str()) || schema.contains(column.as_str()) {
    return Err(Error::Validation(format!("column {column} already exists")));
  }
  Ok(())
}

fn unresolved(kind: ChangeKind) -> Error {
  Error::InvalidIntent(format!("{kind} intent has no resolved column name"))
}

// ─── Forward planning ────────────────────────────────────────────────────────

/// Plan a forward change. `intent` must already carry resolved column names.
pub fn plan(table: &Identifier, intent: &ChangeIntent, schema: &SchemaView) -> Result<MigrationPlan> {
  intent.validate()?;

  let mut warnings = Vec::new();
  let mut backup_id = None;
  let mut conversion = None;

  let (steps, rollback_sql, column_type) = match intent.kind {
    ChangeKind::Add => {
      let column = intent.new_column_name.as_ref().ok_or_else(|| unresolved(intent.kind))?;
      require_free(schema, column)?;
      let ty = intent.new_type.map(physical_type).unwrap_or(ColumnType::Text);
      let rollback = render(table, &[drop_column(table, column)]);
      (vec![add_column(table, column, ty)], Some(rollback), Some(ty))
    }

    ChangeKind::Drop => {
      let column = require(schema, intent.old_column_name.as_ref().ok_or_else(|| unresolved(intent.kind))?)?;
      let declared = schema.column_type(column.as_str()).unwrap_or(ColumnType::Text);
      if let Some(old) = intent.old_type
        && physical_type(old) != declared
      {
        warnings.push(format!(
          "column {column} is declared {declared}, not {} as the intent states",
          physical_type(old)
        ));
      }
      let id = Uuid::new_v4();
      backup_id = Some(id);
      let steps = vec![
        Step::Backup { id, column: column.clone(), column_type: declared },
        drop_column(table, column),
      ];
      warnings.push(format!("column {column} will be backed up before it is dropped"));
      (steps, Some(restore_sql(table, column, id)), None)
    }

    ChangeKind::Rename => {
      let from = require(schema, intent.old_column_name.as_ref().ok_or_else(|| unresolved(intent.kind))?)?;
      let to = intent.new_column_name.as_ref().ok_or_else(|| unresolved(intent.kind))?;
      require_free(schema, to)?;
      let rollback = render(table, &[rename_column(table, to, from)]);
      (vec![rename_column(table, from, to)], Some(rollback), schema.column_type(from.as_str()))
    }

    ChangeKind::Retype => {
      let column = require(schema, intent.retype_column().ok_or_else(|| unresolved(intent.kind))?)?;
      let declared = schema.column_type(column.as_str()).unwrap_or(ColumnType::Text);
      let target = intent.new_type.map(physical_type).unwrap_or(ColumnType::Text);
      let kind = column_conversion(declared, target);
      conversion = Some(kind);

      match kind {
        Conversion::Unsupported => {
          return Err(Error::UnsupportedConversion {
            from: declared.sql(),
            to:   target.sql(),
          });
        }
        Conversion::Identity => (Vec::new(), Some(render(table, &[])), Some(target)),
        Conversion::Widening => {
          let back = rollback_retype_sql(table, schema, column, target, declared)?;
          (retype_steps(table, schema, column, target)?, Some(back), Some(target))
        }
        Conversion::Narrowing => {
          let id = Uuid::new_v4();
          backup_id = Some(id);
          warnings.push(format!(
            "{declared} to {target} is a narrowing conversion: every row of {column} is \
             validated and the column is backed up first"
          ));
          let mut steps = vec![Step::Backup { id, column: column.clone(), column_type: declared }];
          steps.extend(retype_steps(table, schema, column, target)?);
          let back = format!(
            "{}\n{};",
            rollback_retype_sql(table, schema, column, target, declared)?,
            restore_sql(table, column, id)
          );
          (steps, Some(back), Some(target))
        }
      }
    }
  };

  Ok(MigrationPlan {
    table: table.clone(),
    intent: intent.clone(),
    forward_sql: render(table, &steps),
    steps,
    rollback_sql,
    backup_id,
    column_type,
    conversion,
    warnings,
  })
}

fn rollback_retype_sql(
  table: &Identifier,
  schema: &SchemaView,
  column: &Identifier,
  current: ColumnType,
  original: ColumnType,
) -> Result<String> {
  if column_conversion(current, original) == Conversion::Unsupported {
    return Ok(format!("-- {current} to {original} cannot be reversed in place"));
  }
  Ok(render(table, &retype_steps(table, schema, column, original)?))
}

/// An ADD plan that recreates `column` with an exact declared type, as taken
/// from a backup rather than mapped from a logical type.
pub fn plan_recreate(
  table:        &Identifier,
  field_id:     &str,
  column:       &Identifier,
  logical_type: Option<LogicalType>,
  column_type:  ColumnType,
  schema:       &SchemaView,
) -> Result<MigrationPlan> {
  require_free(schema, column)?;

  let intent = ChangeIntent {
    kind:            ChangeKind::Add,
    field_id:        field_id.to_owned(),
    old_column_name: None,
    new_column_name: Some(column.clone()),
    old_type:        None,
    new_type:        logical_type,
    label:           None,
  };
  let steps = vec![add_column(table, column, column_type)];
  Ok(MigrationPlan {
    table:        table.clone(),
    intent,
    forward_sql:  render(table, &steps),
    steps,
    rollback_sql: Some(render(table, &[drop_column(table, column)])),
    backup_id:    None,
    column_type:  Some(column_type),
    conversion:   None,
    warnings:     Vec::new(),
  })
}

// ─── Reversal planning ───────────────────────────────────────────────────────

/// A backup a reversal will read from. Gating (expiry, consumption) is the
/// caller's job; the planner only needs its shape.
#[derive(Debug, Clone, Copy)]
pub struct BackupRef {
  pub id:          Uuid,
  pub column_type: ColumnType,
}

/// Plan the reversal of a successful forward record.
///
/// `backup` must be supplied when `record.backup_id` is set.
pub fn plan_reversal(
  table: &Identifier,
  record: &MigrationRecord,
  backup: Option<BackupRef>,
  schema: &SchemaView,
) -> Result<MigrationPlan> {
  let done = &record.intent;
  match done.kind {
    ChangeKind::Add => {
      let column = done.new_column_name.clone().ok_or_else(|| unresolved(done.kind))?;
      plan(table, &ChangeIntent::drop(&done.field_id, column, done.new_type), schema)
    }

    ChangeKind::Drop => {
      let column = done.old_column_name.clone().ok_or_else(|| unresolved(done.kind))?;
      let backup = backup.ok_or_else(|| {
        Error::Irreversible(format!("no backup of {column} is available"))
      })?;
      let mut reversal =
        plan_recreate(table, &done.field_id, &column, done.old_type, backup.column_type, schema)?;
      reversal.steps.push(Step::Restore { backup_id: backup.id, column });
      reversal.forward_sql = render(table, &reversal.steps);
      Ok(reversal)
    }

    ChangeKind::Rename => {
      let from = done.old_column_name.clone().ok_or_else(|| unresolved(done.kind))?;
      let to = done.new_column_name.clone().ok_or_else(|| unresolved(done.kind))?;
      plan(table, &ChangeIntent::rename(&done.field_id, to, from), schema)
    }

    ChangeKind::Retype => {
      let column = done.retype_column().cloned().ok_or_else(|| unresolved(done.kind))?;
      let (Some(from), Some(to)) = (done.old_type, done.new_type) else {
        return Err(unresolved(done.kind));
      };
      let mut reversal = plan(table, &ChangeIntent::retype(&done.field_id, column.clone(), to, from), schema)?;

      if let Some(id) = record.backup_id {
        let backup = backup.filter(|b| b.id == id).ok_or_else(|| {
          Error::Irreversible(format!("backup {id} of {column} is no longer available"))
        })?;
        // The cast back is lossy; the backup holds the exact prior values.
        reversal.steps.push(Step::Restore { backup_id: backup.id, column });
        reversal.forward_sql = render(table, &reversal.steps);
      }
      Ok(reversal)
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::store::ExecContext;

  fn id(s: &str) -> Identifier { Identifier::parse(s).unwrap() }

  fn schema() -> SchemaView {
    SchemaView::new([
      ("id".to_string(), ColumnType::Integer),
      ("name".to_string(), ColumnType::VarChar(255)),
      ("age".to_string(), ColumnType::VarChar(255)),
    ])
  }

  fn record_for(plan: &MigrationPlan) -> MigrationRecord {
    let ctx = ExecContext {
      executed_by: "test".into(),
      executed_at: Utc::now(),
      job_id:      None,
      rollback_of: None,
      retention:   chrono::Duration::days(90),
    };
    MigrationRecord::succeeded(plan, &ctx)
  }

  #[test]
  fn add_renders_typed_column() {
    let intent = ChangeIntent::add("f1", "Email", Some(id("email")), LogicalType::Email);
    let p = plan(&id("form_a"), &intent, &schema()).unwrap();
    assert_eq!(p.forward_sql, "ALTER TABLE \"form_a\" ADD COLUMN \"email\" VARCHAR(255);");
    assert_eq!(p.rollback_sql.as_deref(), Some("ALTER TABLE \"form_a\" DROP COLUMN \"email\";"));
    assert!(p.backup_id.is_none());
  }

  #[test]
  fn add_existing_column_is_rejected() {
    let intent = ChangeIntent::add("f1", "Name", Some(id("name")), LogicalType::ShortText);
    assert!(plan(&id("t"), &intent, &schema()).is_err());
  }

  #[test]
  fn add_without_resolved_name_is_rejected() {
    let intent = ChangeIntent::add("f1", "Name", None, LogicalType::ShortText);
    assert!(matches!(plan(&id("t"), &intent, &schema()), Err(Error::InvalidIntent(_))));
  }

  #[test]
  fn drop_takes_backup_first() {
    let intent = ChangeIntent::drop("f2", id("age"), Some(LogicalType::ShortText));
    let p = plan(&id("t"), &intent, &schema()).unwrap();
    assert!(matches!(p.steps[0], Step::Backup { .. }));
    assert!(matches!(p.steps[1], Step::Ddl { .. }));
    let backup = p.backup_id.unwrap();
    assert!(p.rollback_sql.unwrap().contains(&backup.to_string()));
  }

  #[test]
  fn drop_missing_column_is_not_found() {
    let intent = ChangeIntent::drop("f9", id("nope"), None);
    assert!(matches!(plan(&id("t"), &intent, &schema()), Err(Error::NotFound { .. })));
  }

  #[test]
  fn system_columns_are_protected() {
    let intent = ChangeIntent::drop("f9", id("id"), None);
    assert!(matches!(plan(&id("t"), &intent, &schema()), Err(Error::Validation(_))));
  }

  #[test]
  fn rename_renders_both_directions() {
    let intent = ChangeIntent::rename("f1", id("name"), id("full_name"));
    let p = plan(&id("t"), &intent, &schema()).unwrap();
    assert_eq!(p.forward_sql, "ALTER TABLE \"t\" RENAME COLUMN \"name\" TO \"full_name\";");
    assert_eq!(
      p.rollback_sql.as_deref(),
      Some("ALTER TABLE \"t\" RENAME COLUMN \"full_name\" TO \"name\";")
    );
  }

  #[test]
  fn narrowing_retype_backs_up_and_converts() {
    let intent = ChangeIntent::retype("f2", id("age"), LogicalType::ShortText, LogicalType::Number);
    let p = plan(&id("t"), &intent, &schema()).unwrap();
    assert_eq!(p.conversion, Some(Conversion::Narrowing));
    assert!(p.backup_id.is_some());
    assert!(matches!(p.steps[0], Step::Backup { .. }));
    assert!(p.steps.iter().any(|s| matches!(s, Step::Convert { target: ColumnType::Numeric, .. })));
    assert_eq!(p.column_type, Some(ColumnType::Numeric));
    assert!(!p.warnings.is_empty());
  }

  #[test]
  fn convert_step_renders_as_a_row_conversion() {
    let intent = ChangeIntent::retype("f2", id("age"), LogicalType::ShortText, LogicalType::Number);
    let p = plan(&id("t"), &intent, &schema()).unwrap();
    assert!(!p.forward_sql.contains("CAST"));
    assert!(p.forward_sql.contains(
      "-- convert each row of \"t\".\"age\" into \"t\".\"_rt_age\" as NUMERIC; the first row that fails aborts;"
    ));
  }

  #[test]
  fn retype_shadow_skips_taken_names() {
    let schema = SchemaView::new([
      ("age".to_string(), ColumnType::VarChar(255)),
      ("_rt_age".to_string(), ColumnType::Text),
    ]);
    let intent = ChangeIntent::retype("f2", id("age"), LogicalType::ShortText, LogicalType::Number);
    let p = plan(&id("t"), &intent, &schema).unwrap();

    let dest = p.steps.iter().find_map(|s| match s {
      Step::Convert { dest, .. } => Some(dest.as_str()),
      _ => None,
    });
    assert_eq!(dest, Some("_rt_age_1"));
    assert!(p.forward_sql.contains("RENAME COLUMN \"_rt_age_1\" TO \"age\""));
    assert!(!p.forward_sql.contains("DROP COLUMN \"_rt_age\""));
  }

  #[test]
  fn widening_retype_has_no_backup() {
    let schema = SchemaView::new([("score".to_string(), ColumnType::Numeric)]);
    let intent = ChangeIntent::retype("f3", id("score"), LogicalType::Number, LogicalType::LongText);
    let p = plan(&id("t"), &intent, &schema).unwrap();
    assert_eq!(p.conversion, Some(Conversion::Widening));
    assert!(p.backup_id.is_none());
  }

  #[test]
  fn identity_retype_has_no_steps() {
    let intent = ChangeIntent::retype("f1", id("name"), LogicalType::ShortText, LogicalType::Email);
    let p = plan(&id("t"), &intent, &schema()).unwrap();
    assert!(p.steps.is_empty());
    assert_eq!(p.conversion, Some(Conversion::Identity));
  }

  #[test]
  fn unsupported_retype_is_rejected() {
    let schema = SchemaView::new([("score".to_string(), ColumnType::Numeric)]);
    let intent = ChangeIntent::retype("f3", id("score"), LogicalType::Number, LogicalType::Date);
    assert!(matches!(
      plan(&id("t"), &intent, &schema),
      Err(Error::UnsupportedConversion { .. })
    ));
  }

  #[test]
  fn schema_view_follows_plans() {
    let mut view = schema();
    let rename = plan(&id("t"), &ChangeIntent::rename("f1", id("name"), id("full_name")), &view).unwrap();
    view.apply(&rename);
    assert!(view.contains("full_name"));
    assert!(!view.contains("name"));

    // A RETYPE of the renamed column now validates against the simulated view.
    let retype = ChangeIntent::retype("f1", id("full_name"), LogicalType::ShortText, LogicalType::LongText);
    let p = plan(&id("t"), &retype, &view).unwrap();
    view.apply(&p);
    assert_eq!(view.column_type("full_name"), Some(ColumnType::Text));
  }

  #[test]
  fn sub_form_tables_carry_parent_id() {
    let target = TableTarget {
      table_name: id("sub_items"),
      owner_kind: OwnerKind::SubForm,
      owner_id:   "sf1".into(),
    };
    let sql = create_table_sql(&target);
    assert!(sql.starts_with("CREATE TABLE \"sub_items\""));
    assert!(sql.contains("\"parent_id\""));

    let form = TableTarget { owner_kind: OwnerKind::Form, ..target };
    assert!(!create_table_sql(&form).contains("parent_id"));
  }

  #[test]
  fn reversal_of_add_is_drop() {
    let view = schema();
    let add = plan(&id("t"), &ChangeIntent::add("f5", "Note", Some(id("note")), LogicalType::LongText), &view).unwrap();
    let mut after = view.clone();
    after.apply(&add);
    let rev = plan_reversal(&id("t"), &record_for(&add), None, &after).unwrap();
    assert_eq!(rev.intent.kind, ChangeKind::Drop);
  }

  #[test]
  fn reversal_of_drop_requires_backup() {
    let view = schema();
    let drop = plan(&id("t"), &ChangeIntent::drop("f2", id("age"), Some(LogicalType::ShortText)), &view).unwrap();
    let mut after = view.clone();
    after.apply(&drop);
    let record = record_for(&drop);

    assert!(matches!(
      plan_reversal(&id("t"), &record, None, &after),
      Err(Error::Irreversible(_))
    ));

    let backup = BackupRef { id: drop.backup_id.unwrap(), column_type: ColumnType::VarChar(255) };
    let rev = plan_reversal(&id("t"), &record, Some(backup), &after).unwrap();
    assert_eq!(rev.intent.kind, ChangeKind::Add);
    assert!(matches!(rev.steps.last(), Some(Step::Restore { .. })));
  }

  #[test]
  fn reversal_of_narrowing_retype_restores_backup() {
    let view = schema();
    let retype = plan(
      &id("t"),
      &ChangeIntent::retype("f2", id("age"), LogicalType::ShortText, LogicalType::Number),
      &view,
    )
    .unwrap();
    let mut after = view.clone();
    after.apply(&retype);
    let record = record_for(&retype);
    let backup = BackupRef { id: retype.backup_id.unwrap(), column_type: ColumnType::VarChar(255) };

    let rev = plan_reversal(&id("t"), &record, Some(backup), &after).unwrap();
    assert_eq!(rev.intent.new_type, Some(LogicalType::ShortText));
    assert!(matches!(rev.steps.last(), Some(Step::Restore { .. })));
  }
}
