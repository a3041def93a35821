//! Decoded row storage.
//!
//! A row owns a copy of its packet payload plus one byte range per
//! cell; fields are decoded on access and borrow from that buffer, so a
//! row stays valid after the session's read buffer moves on.

use std::ops::Range;
use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::io::{Buf, BufExt};
use crate::protocol::{null_bitmap, ColumnMeta};
use crate::value::{decode_binary_field, decode_text_field, FieldRef, ValueFormat};

use byteorder::LittleEndian;

pub struct Row {
    buffer: Box<[u8]>,
    cells: Box<[Option<Range<usize>>]>,
    columns: Arc<[ColumnMeta]>,
    format: ValueFormat,
}

impl Row {
    /// Number of fields.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Metadata of the resultset this row belongs to.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Decodes field `index`, borrowing strings and blobs from the row.
    pub fn field(&self, index: usize) -> Result<FieldRef<'_>> {
        let range = match self.cells.get(index) {
            None => return Err(ClientError::RowTypeMismatch.into()),
            Some(None) => return Ok(FieldRef::Null),
            Some(Some(range)) => range.clone(),
        };

        let raw = &self.buffer[range];
        match self.format {
            ValueFormat::Text => decode_text_field(raw, &self.columns[index]),
            ValueFormat::Binary => decode_binary_field(&mut { raw }, &self.columns[index]),
        }
    }

    /// All fields of the row, in column order.
    pub fn fields(&self) -> Result<Vec<FieldRef<'_>>> {
        (0..self.len()).map(|index| self.field(index)).collect()
    }

    /// Decodes a row packet against the current metadata. Every cell is
    /// fully decoded once so malformed rows surface here, not at access
    /// time.
    pub(crate) fn decode(
        payload: &[u8],
        columns: Arc<[ColumnMeta]>,
        format: ValueFormat,
    ) -> Result<Self> {
        match format {
            ValueFormat::Text => Self::decode_text(payload, columns),
            ValueFormat::Binary => Self::decode_binary(payload, columns),
        }
    }

    fn decode_text(payload: &[u8], columns: Arc<[ColumnMeta]>) -> Result<Self> {
        let mut cells = Vec::with_capacity(columns.len());
        let mut buf = payload;

        for _ in 0..columns.len() {
            let offset = payload.len() - buf.len();

            match buf.get_bytes_lenenc::<LittleEndian>()? {
                None => cells.push(None),
                Some(raw) => {
                    let prefix = payload.len() - buf.len() - raw.len() - offset;
                    let start = offset + prefix;
                    cells.push(Some(start..start + raw.len()));
                }
            }
        }

        if !buf.is_empty() {
            return Err(ClientError::ExtraBytes.into());
        }

        let row = Self {
            buffer: payload.into(),
            cells: cells.into_boxed_slice(),
            columns,
            format: ValueFormat::Text,
        };

        row.check_cells()?;
        Ok(row)
    }

    fn decode_binary(payload: &[u8], columns: Arc<[ColumnMeta]>) -> Result<Self> {
        let mut buf = payload;

        let header = buf.get_u8()?;
        if header != 0 {
            return Err(protocol_err!("expected row (0x00); received 0x{:02X}", header));
        }

        let bitmap_len = null_bitmap::byte_count(columns.len(), null_bitmap::ROW_BIT_OFFSET);
        let bitmap = buf.get_bytes(bitmap_len)?;

        let mut cells = Vec::with_capacity(columns.len());

        for (index, column) in columns.iter().enumerate() {
            if null_bitmap::is_null(bitmap, index, null_bitmap::ROW_BIT_OFFSET) {
                cells.push(None);
                continue;
            }

            let start = payload.len() - buf.len();
            decode_binary_field(&mut buf, column)?;
            let end = payload.len() - buf.len();

            cells.push(Some(start..end));
        }

        if !buf.is_empty() {
            return Err(ClientError::ExtraBytes.into());
        }

        Ok(Self {
            buffer: payload.into(),
            cells: cells.into_boxed_slice(),
            columns,
            format: ValueFormat::Binary,
        })
    }

    // Text cells are only range-split above; decode each once so bad
    // cells fail the row, not a later access.
    fn check_cells(&self) -> Result<()> {
        for index in 0..self.len() {
            self.field(index)?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for index in 0..self.len() {
            match self.field(index) {
                Ok(field) => list.entry(&field),
                Err(_) => list.entry(&"<invalid>"),
            };
        }
        list.finish()
    }
}
