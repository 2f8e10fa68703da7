//! Schema translation between domain types and backend rows
//!
//! Every entity kind owns a [`FieldMap`] naming its fields and the backend
//! column each one is stored in. Rows are only ever read through a
//! [`RowReader`] and built through a [`RowWriter`], so wire column names never
//! leak past this module.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    backend::{Collection, Row},
    models::EntityKind,
};

mod entities;
mod records;

pub use records::{
    NewProfile, new_activity_row, new_organization_row, new_profile_row, profile_update_row,
};

/// Columns shared by every tenant-scoped collection
pub mod columns {
    pub const ID: &str = "id";
    pub const ORGANIZATION_ID: &str = "organization_id";
    pub const CREATED_BY: &str = "created_by";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("{entity}: missing required field `{field}`")]
    Missing { entity: &'static str, field: String },

    #[error("{entity}: field `{field}` has an invalid value: {reason}")]
    Invalid {
        entity: &'static str,
        field: String,
        reason: String,
    },

    #[error("{entity}: field `{field}` has no column mapping")]
    Unmapped { entity: &'static str, field: String },
}

/// Mapping table between the fields of one entity and its backend columns
///
/// Fields are stored under their own name unless listed in `renames`.
#[derive(Debug)]
pub struct FieldMap {
    entity: &'static str,
    fields: &'static [&'static str],
    renames: &'static [(&'static str, &'static str)],
}

impl FieldMap {
    pub const fn new(
        entity: &'static str,
        fields: &'static [&'static str],
        renames: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            entity,
            fields,
            renames,
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    /// Backend column holding `field`
    pub fn column(&self, field: &str) -> Result<&'static str, SchemaError> {
        if let Some((_, column)) = self.renames.iter().find(|(f, _)| *f == field) {
            return Ok(*column);
        }
        self.fields
            .iter()
            .find(|f| **f == field)
            .copied()
            .ok_or_else(|| SchemaError::Unmapped {
                entity: self.entity,
                field: field.to_string(),
            })
    }

    /// Field stored in `column`, if the column belongs to this entity
    pub fn field(&self, column: &str) -> Option<&'static str> {
        if let Some((field, _)) = self.renames.iter().find(|(_, c)| *c == column) {
            return Some(*field);
        }
        self.fields
            .iter()
            .find(|f| **f == column && !self.renames.iter().any(|(r, _)| r == *f))
            .copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().copied()
    }
}

/// Typed access to the columns of a backend row
pub struct RowReader<'a> {
    map: &'static FieldMap,
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    pub fn new(map: &'static FieldMap, row: &'a Row) -> Self {
        Self { map, row }
    }

    fn raw(&self, field: &str) -> Result<Option<&'a Value>, SchemaError> {
        let column = self.map.column(field)?;
        Ok(self.row.get(column).filter(|v| !v.is_null()))
    }

    fn decode<T: DeserializeOwned>(&self, field: &str, value: &Value) -> Result<T, SchemaError> {
        serde_json::from_value(value.clone()).map_err(|e| SchemaError::Invalid {
            entity: self.map.entity,
            field: field.to_string(),
            reason: e.to_string(),
        })
    }

    /// A field that must be present and non-null
    pub fn required<T: DeserializeOwned>(&self, field: &str) -> Result<T, SchemaError> {
        match self.raw(field)? {
            Some(value) => self.decode(field, value),
            None => Err(SchemaError::Missing {
                entity: self.map.entity,
                field: field.to_string(),
            }),
        }
    }

    /// A nullable field; absent and null both read as `None`
    pub fn optional<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, SchemaError> {
        self.raw(field)?
            .map(|value| self.decode(field, value))
            .transpose()
    }

    /// A field that falls back to its type's default when absent or null
    pub fn or_default<T: DeserializeOwned + Default>(&self, field: &str) -> Result<T, SchemaError> {
        Ok(self.optional(field)?.unwrap_or_default())
    }
}

/// Sparse update ready to send, with the fields it touches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchRow {
    pub row: Row,
    pub changed: Vec<&'static str>,
}

impl PatchRow {
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }
}

/// Builds a backend row field by field
///
/// The first failure is kept and reported by [`finish`](Self::finish), which
/// keeps the per-entity translation code a flat list of `set` calls.
pub struct RowWriter {
    map: &'static FieldMap,
    row: Row,
    changed: Vec<&'static str>,
    error: Option<SchemaError>,
}

impl RowWriter {
    pub fn new(map: &'static FieldMap) -> Self {
        Self {
            map,
            row: Row::new(),
            changed: Vec::new(),
            error: None,
        }
    }

    /// Write `value` into the column of `field`
    pub fn set<T: Serialize>(&mut self, field: &str, value: T) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let column = match self.map.column(field) {
            Ok(column) => column,
            Err(e) => {
                self.error = Some(e);
                return self;
            }
        };
        match serde_json::to_value(value) {
            Ok(value) => {
                self.row.insert(column.to_string(), value);
                if let Some(field) = self.map.field(column) {
                    self.changed.push(field);
                }
            }
            Err(e) => {
                self.error = Some(SchemaError::Invalid {
                    entity: self.map.entity,
                    field: field.to_string(),
                    reason: e.to_string(),
                })
            }
        }
        self
    }

    /// Write `value` only when present
    pub fn set_opt<T: Serialize>(&mut self, field: &str, value: Option<T>) -> &mut Self {
        match value {
            Some(value) => self.set(field, value),
            None => self,
        }
    }

    pub fn finish(&mut self) -> Result<Row, SchemaError> {
        self.finish_patch().map(|patch| patch.row)
    }

    pub fn finish_patch(&mut self) -> Result<PatchRow, SchemaError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        Ok(PatchRow {
            row: std::mem::take(&mut self.row),
            changed: std::mem::take(&mut self.changed),
        })
    }
}

/// A record type stored in one backend collection
pub trait RowShape: Sized + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn fields() -> &'static FieldMap;

    fn from_row(row: &Row) -> Result<Self, SchemaError>;
}

/// A tenant-scoped business entity with creation and update payloads
pub trait EntityShape: RowShape + Clone {
    type New: Send + Sync;
    type Patch: Send + Sync;

    const KIND: EntityKind;

    fn id(&self) -> Uuid;

    fn organization_id(&self) -> Uuid;

    /// Name used in activity descriptions
    fn display_name(&self) -> String;

    fn insert_row(new: &Self::New) -> Result<Row, SchemaError>;

    fn patch_row(patch: &Self::Patch) -> Result<PatchRow, SchemaError>;
}
