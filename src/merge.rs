//! Sparse-update merging shared by every update handler.
//!
//! Each entity declares a table of [`FieldSpec`]s; the same table drives row
//! reads, patch merging, and UPDATE statement generation so the column/field
//! mapping lives in exactly one place.
//!
//! Two merge rules exist, matching what the desktop-era API actually did:
//! string-ish fields only change when the patch carries a non-empty string
//! (an empty string keeps the stored value, so such a field cannot be
//! blanked through an update), while everything merged under [`MergeRule::Explicit`]
//! changes whenever the patch supplies a non-null value, including `0` and
//! `false`. The split is per field, not per type, and is deliberately kept
//! as observed.

use rusqlite::types::Value;
use serde_json::{Map, Value as Json};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    /// 0/1 column exposed as a JSON bool.
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeRule {
    /// Proposed value wins only when it is a non-empty string.
    NonEmptyText,
    /// Any present, non-null proposed value wins.
    Explicit,
}

pub struct FieldSpec {
    pub field: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub rule: MergeRule,
    /// Column consulted when the primary one reads NULL (legacy layouts).
    pub read_fallback: Option<&'static str>,
    /// Extra column written with the same value on update (legacy layouts).
    pub mirror: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeError {
    pub field: &'static str,
    pub expected: &'static str,
}

impl MergeError {
    pub fn message(&self) -> String {
        format!("patch.{} must be {}", self.field, self.expected)
    }
}

/// Read one mapped row into a JSON object keyed by wire field names.
pub fn row_to_json(row: &rusqlite::Row, specs: &[FieldSpec]) -> rusqlite::Result<Map<String, Json>> {
    let mut out = Map::new();
    for spec in specs {
        let value = match spec.kind {
            FieldKind::Text => {
                let mut v: Option<String> = row.get(spec.column)?;
                if v.is_none() {
                    if let Some(fb) = spec.read_fallback {
                        v = row.get(fb)?;
                    }
                }
                match v {
                    Some(s) => Json::String(s),
                    None => Json::Null,
                }
            }
            FieldKind::Integer => {
                let v: Option<i64> = row.get(spec.column)?;
                match v {
                    Some(n) => Json::from(n),
                    None => Json::Null,
                }
            }
            FieldKind::Real => {
                let v: Option<f64> = row.get(spec.column)?;
                match v {
                    Some(n) => Json::from(n),
                    None => Json::Null,
                }
            }
            FieldKind::Flag => {
                let v: Option<i64> = row.get(spec.column)?;
                Json::Bool(v.unwrap_or(0) != 0)
            }
        };
        out.insert(spec.field.to_string(), value);
    }
    Ok(out)
}

/// Merge a sparse patch over the current values. Unknown patch keys are
/// ignored; mapped keys must carry the declared JSON type (or null).
pub fn merge_patch(
    current: &Map<String, Json>,
    patch: &Map<String, Json>,
    specs: &[FieldSpec],
) -> Result<Map<String, Json>, MergeError> {
    let mut merged = current.clone();

    for spec in specs {
        let Some(proposed) = patch.get(spec.field) else {
            continue;
        };
        if proposed.is_null() {
            continue;
        }

        match spec.rule {
            MergeRule::NonEmptyText => {
                let Some(s) = proposed.as_str() else {
                    return Err(MergeError {
                        field: spec.field,
                        expected: "a string",
                    });
                };
                if !s.is_empty() {
                    merged.insert(spec.field.to_string(), Json::String(s.to_string()));
                }
            }
            MergeRule::Explicit => {
                let value = match spec.kind {
                    FieldKind::Text => match proposed.as_str() {
                        Some(s) => Json::String(s.to_string()),
                        None => {
                            return Err(MergeError {
                                field: spec.field,
                                expected: "a string",
                            })
                        }
                    },
                    FieldKind::Integer => match proposed.as_i64() {
                        Some(n) => Json::from(n),
                        None => {
                            return Err(MergeError {
                                field: spec.field,
                                expected: "an integer",
                            })
                        }
                    },
                    FieldKind::Real => match proposed.as_f64() {
                        Some(n) => Json::from(n),
                        None => {
                            return Err(MergeError {
                                field: spec.field,
                                expected: "a number",
                            })
                        }
                    },
                    FieldKind::Flag => match proposed.as_bool() {
                        Some(b) => Json::Bool(b),
                        None => {
                            return Err(MergeError {
                                field: spec.field,
                                expected: "a boolean",
                            })
                        }
                    },
                };
                merged.insert(spec.field.to_string(), value);
            }
        }
    }

    Ok(merged)
}

/// Staff accounts keep a denormalized display name. When a patch touches the
/// name parts without supplying a display name of its own, the display name
/// is rebuilt from the merged parts; an explicit non-empty display name in
/// the patch always wins instead.
pub fn recomputed_full_name(
    patch: &Map<String, Json>,
    merged: &Map<String, Json>,
) -> Option<String> {
    let supplied = |field: &str| {
        patch
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    };

    if supplied("full_name") || (!supplied("first_name") && !supplied("surname")) {
        return None;
    }

    let first = merged.get("first_name").and_then(|v| v.as_str()).unwrap_or("");
    let surname = merged.get("surname").and_then(|v| v.as_str()).unwrap_or("");
    Some(format!("{} {}", first, surname).trim().to_string())
}

/// `UPDATE <table> SET ... WHERE id = ?N` over the spec columns, in spec
/// order, with any mirror columns bound to the same parameter and extra
/// columns appended after. The id parameter comes last.
pub fn update_sql(table: &str, specs: &[FieldSpec], extra_columns: &[&str]) -> String {
    let mut set_parts: Vec<String> = Vec::new();
    for (i, spec) in specs.iter().enumerate() {
        set_parts.push(format!("{} = ?{}", spec.column, i + 1));
        if let Some(mirror) = spec.mirror {
            set_parts.push(format!("{} = ?{}", mirror, i + 1));
        }
    }
    for (j, col) in extra_columns.iter().enumerate() {
        set_parts.push(format!("{} = ?{}", col, specs.len() + 1 + j));
    }
    format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table,
        set_parts.join(", "),
        specs.len() + extra_columns.len() + 1
    )
}

/// Bind values for [`update_sql`], in spec order. Extra columns and the id
/// are appended by the caller.
pub fn update_params(
    merged: &Map<String, Json>,
    specs: &[FieldSpec],
) -> Result<Vec<Value>, MergeError> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        let v = merged.get(spec.field).unwrap_or(&Json::Null);
        let bound = match spec.kind {
            FieldKind::Text => match v {
                Json::Null => Value::Null,
                Json::String(s) => Value::Text(s.clone()),
                _ => {
                    return Err(MergeError {
                        field: spec.field,
                        expected: "a string",
                    })
                }
            },
            FieldKind::Integer => match v {
                Json::Null => Value::Null,
                _ => match v.as_i64() {
                    Some(n) => Value::Integer(n),
                    None => {
                        return Err(MergeError {
                            field: spec.field,
                            expected: "an integer",
                        })
                    }
                },
            },
            FieldKind::Real => match v {
                Json::Null => Value::Null,
                _ => match v.as_f64() {
                    Some(n) => Value::Real(n),
                    None => {
                        return Err(MergeError {
                            field: spec.field,
                            expected: "a number",
                        })
                    }
                },
            },
            FieldKind::Flag => match v {
                Json::Null => Value::Null,
                Json::Bool(b) => Value::Integer(if *b { 1 } else { 0 }),
                _ => {
                    return Err(MergeError {
                        field: spec.field,
                        expected: "a boolean",
                    })
                }
            },
        };
        out.push(bound);
    }
    Ok(out)
}
