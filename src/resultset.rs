//! Resultset containers and statement handles.

use std::sync::Arc;

use crate::protocol::{ColumnMeta, OkPacket, Status};
use crate::row::Row;

/// Completion data of one resultset (or of a command with no rows),
/// taken from the terminating OK packet.
#[derive(Debug, Clone)]
pub struct ResultsetInfo {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
    pub status: Status,
    pub info: Box<str>,
}

impl ResultsetInfo {
    pub(crate) fn from_ok(ok: &OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status: ok.status,
            info: ok.info.clone(),
        }
    }
}

/// One resultset: column metadata, rows, and the completion record.
///
/// A command with no rows (e.g. an UPDATE) still yields a resultset,
/// with empty metadata.
#[derive(Debug, Default)]
pub struct Resultset {
    pub(crate) columns: Option<Arc<[ColumnMeta]>>,
    pub(crate) rows: Vec<Row>,
    pub(crate) info: Option<ResultsetInfo>,
}

impl Resultset {
    pub fn columns(&self) -> &[ColumnMeta] {
        self.columns.as_deref().unwrap_or(&[])
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Completion data. Present on every fully-read resultset.
    pub fn info(&self) -> Option<&ResultsetInfo> {
        self.info.as_ref()
    }

    pub fn affected_rows(&self) -> u64 {
        self.info.as_ref().map_or(0, |info| info.affected_rows)
    }

    pub fn last_insert_id(&self) -> u64 {
        self.info.as_ref().map_or(0, |info| info.last_insert_id)
    }

    pub fn warnings(&self) -> u16 {
        self.info.as_ref().map_or(0, |info| info.warnings)
    }
}

/// The ordered resultset chain one command produced.
///
/// Plain statements yield exactly one entry; multi-queries and stored
/// procedures may yield several.
#[derive(Debug, Default)]
pub struct Results {
    pub(crate) resultsets: Vec<Resultset>,
}

impl Results {
    pub fn resultsets(&self) -> &[Resultset] {
        &self.resultsets
    }

    /// The first (often only) resultset.
    pub fn first(&self) -> Option<&Resultset> {
        self.resultsets.first()
    }

    /// Rows of the first resultset.
    pub fn rows(&self) -> &[Row] {
        self.first().map_or(&[], Resultset::rows)
    }

    pub fn affected_rows(&self) -> u64 {
        self.first().map_or(0, Resultset::affected_rows)
    }

    pub fn last_insert_id(&self) -> u64 {
        self.first().map_or(0, Resultset::last_insert_id)
    }
}

/// A server-side prepared statement handle.
///
/// Owning a handle obligates the caller to close it
/// ([`Connection::close_statement`]); the server deallocates all handles
/// implicitly on reset or session close.
///
/// [`Connection::close_statement`]: crate::Connection::close_statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement {
    pub(crate) id: u32,
    pub(crate) num_params: u16,
    pub(crate) num_columns: u16,
}

impl Statement {
    /// The server-assigned statement id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of `?` placeholders the statement declares.
    pub fn num_params(&self) -> u16 {
        self.num_params
    }

    /// Number of columns the statement produces.
    pub fn num_columns(&self) -> u16 {
        self.num_columns
    }
}
