//! Typed access checks.
//!
//! Callers that map rows onto static record types describe the shape
//! they expect with [`FieldDescriptor`]s; the checks here compare that
//! against the server's column metadata and produce
//! [`ClientError::MetadataCheckFailed`] with a human-readable reason on
//! mismatch. Field extraction goes through [`FromField`], which
//! produces [`ClientError::StaticRowParsingError`].

use std::fmt::Write;

use crate::error::{ClientError, Error, Result};
use crate::protocol::ColumnMeta;
use crate::resultset::Results;
use crate::row::Row;
use crate::value::{ColumnType, Date, DateTime, FieldRef, TimeDelta};

/// The shape one output column is expected to have.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: Option<Box<str>>,
    kind: ColumnType,
    nullable: bool,
}

impl FieldDescriptor {
    pub fn new(kind: ColumnType) -> Self {
        Self {
            name: None,
            kind,
            nullable: false,
        }
    }

    /// Require the column to carry this name (alias).
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Accept NULL values in this column.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

// Column types that decode into the same field representation are
// interchangeable for checking purposes.
fn compatible(expected: ColumnType, actual: ColumnType) -> bool {
    use ColumnType::*;

    if expected == actual {
        return true;
    }

    matches!(
        (expected, actual),
        (DateTime, Timestamp)
            | (Timestamp, DateTime)
            | (Char | VarChar | Text, Char | VarChar | Text)
            | (Binary | VarBinary | Blob, Binary | VarBinary | Blob)
            | (TinyInt | SmallInt | MediumInt | Int | BigInt, TinyInt | SmallInt | MediumInt | Int | BigInt)
    )
}

/// Checks column metadata against the caller's descriptors.
pub fn check_metadata(columns: &[ColumnMeta], expected: &[FieldDescriptor]) -> Result<()> {
    let mut reasons = String::new();

    if columns.len() != expected.len() {
        let _ = write!(
            reasons,
            "expected {} columns, the resultset has {}",
            expected.len(),
            columns.len()
        );
    } else {
        for (index, (column, descriptor)) in columns.iter().zip(expected).enumerate() {
            if let Some(name) = &descriptor.name {
                if &**name != column.name() {
                    let _ = write!(
                        reasons,
                        "column {}: expected name {:?}, found {:?}; ",
                        index,
                        name,
                        column.name()
                    );
                    continue;
                }
            }

            if !compatible(descriptor.kind, column.column_type()) {
                let _ = write!(
                    reasons,
                    "column {} ({:?}): expected type {:?}, found {:?}; ",
                    index,
                    column.name(),
                    descriptor.kind,
                    column.column_type()
                );
            }

            if !descriptor.nullable && !column.is_not_null() {
                let _ = write!(
                    reasons,
                    "column {} ({:?}): may be NULL but the target is not nullable; ",
                    index,
                    column.name()
                );
            }
        }
    }

    if reasons.is_empty() {
        return Ok(());
    }

    Err(Error::TypeCheck {
        code: ClientError::MetadataCheckFailed,
        reason: reasons.trim_end_matches(&[' ', ';'][..]).into(),
    })
}

/// Checks that a command produced exactly `expected` resultsets.
pub fn check_resultset_count(results: &Results, expected: usize) -> Result<()> {
    if results.resultsets().len() != expected {
        return Err(Error::TypeCheck {
            code: ClientError::NumResultsetsMismatch,
            reason: format!(
                "expected {} resultsets, the command produced {}",
                expected,
                results.resultsets().len()
            )
            .into(),
        });
    }

    Ok(())
}

/// Extraction of one field into a static type.
pub trait FromField: Sized {
    fn from_field(field: FieldRef<'_>) -> Result<Self>;
}

fn parse_error(expected: &str, field: &FieldRef<'_>) -> Error {
    Error::TypeCheck {
        code: ClientError::StaticRowParsingError,
        reason: format!("cannot parse {:?} as {}", field, expected).into(),
    }
}

impl FromField for i64 {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        field.as_i64().ok_or_else(|| parse_error("i64", &field))
    }
}

impl FromField for u64 {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        field.as_u64().ok_or_else(|| parse_error("u64", &field))
    }
}

impl FromField for f32 {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        match field {
            FieldRef::Float(v) => Ok(v),
            _ => Err(parse_error("f32", &field)),
        }
    }
}

impl FromField for f64 {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        match field {
            FieldRef::Double(v) => Ok(v),
            FieldRef::Float(v) => Ok(v.into()),
            _ => Err(parse_error("f64", &field)),
        }
    }
}

impl FromField for String {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        field
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| parse_error("String", &field))
    }
}

impl FromField for Vec<u8> {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        field
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| parse_error("Vec<u8>", &field))
    }
}

impl FromField for Date {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        match field {
            FieldRef::Date(v) => Ok(v),
            _ => Err(parse_error("Date", &field)),
        }
    }
}

impl FromField for DateTime {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        match field {
            FieldRef::DateTime(v) => Ok(v),
            _ => Err(parse_error("DateTime", &field)),
        }
    }
}

impl FromField for TimeDelta {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        match field {
            FieldRef::Time(v) => Ok(v),
            _ => Err(parse_error("TimeDelta", &field)),
        }
    }
}

impl<T: FromField> FromField for Option<T> {
    fn from_field(field: FieldRef<'_>) -> Result<Self> {
        if field.is_null() {
            Ok(None)
        } else {
            T::from_field(field).map(Some)
        }
    }
}

/// Extracts field `index` of `row` as `T`.
pub fn get<T: FromField>(row: &Row, index: usize) -> Result<T> {
    T::from_field(row.field(index)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::column_meta;
    use crate::protocol::{ColumnFlags, TypeId};

    #[test]
    fn matching_metadata_passes() {
        let columns = [
            column_meta("id", TypeId::LONG_LONG, 63, ColumnFlags::NOT_NULL),
            column_meta("name", TypeId::VAR_STRING, 45, ColumnFlags::empty()),
        ];

        let expected = [
            FieldDescriptor::new(ColumnType::BigInt).name("id"),
            FieldDescriptor::new(ColumnType::VarChar)
                .name("name")
                .nullable(true),
        ];

        check_metadata(&columns, &expected).unwrap();
    }

    #[test]
    fn mismatches_carry_a_readable_reason() {
        let columns = [column_meta("id", TypeId::VAR_STRING, 45, ColumnFlags::empty())];
        let expected = [FieldDescriptor::new(ColumnType::BigInt).name("id")];

        let err = check_metadata(&columns, &expected).unwrap_err();
        assert_eq!(err.code(), Some(ClientError::MetadataCheckFailed));
        assert!(err.to_string().contains("expected type BigInt"));
    }

    #[test]
    fn column_count_mismatch_is_reported() {
        let columns = [column_meta("id", TypeId::LONG, 63, ColumnFlags::NOT_NULL)];
        let err = check_metadata(&columns, &[]).unwrap_err();
        assert_eq!(err.code(), Some(ClientError::MetadataCheckFailed));
    }

    #[test]
    fn resultset_count_mismatch_is_reported() {
        let results = Results::default();
        let err = check_resultset_count(&results, 2).unwrap_err();
        assert_eq!(err.code(), Some(ClientError::NumResultsetsMismatch));
    }
}
