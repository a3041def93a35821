//! The execution response parser.
//!
//! Tracks one command's resultset chain: head packet, column metadata,
//! rows, and the OK/EOF terminators, across as many resultsets as the
//! server announces via `MORE_RESULTS_EXISTS`.

use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::io::BufExt;
use crate::protocol::{ColumnDefinition, ColumnMeta, ErrPacket, MetadataMode, OkPacket};
use crate::resultset::ResultsetInfo;
use crate::row::Row;
use crate::value::ValueFormat;

use byteorder::LittleEndian;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Expecting a head packet: OK, ERR, or a column count.
    ReadingHead,

    /// Expecting column definition packets.
    ReadingMeta,

    /// Expecting row packets or the terminator.
    ReadingRows,

    /// The final OK packet has been processed.
    Complete,
}

/// What a head packet turned out to be.
pub(crate) enum HeadEvent {
    /// OK with no resultset data (e.g. an UPDATE); carries the packet so
    /// the caller can apply session flags and record completion info.
    NoRows(OkPacket),

    /// A resultset begins; metadata packets follow.
    Columns(u64),
}

/// What a packet in the row phase turned out to be.
pub(crate) enum RowEvent {
    Row(Row),

    /// Terminator; the resultset (and possibly the command) is done.
    End(OkPacket),
}

pub(crate) struct ExecutionProcessor {
    pub(crate) seqnum: u8,
    phase: Phase,
    format: ValueFormat,
    meta_mode: MetadataMode,

    columns: Vec<ColumnMeta>,
    meta_remaining: u64,
    current_columns: Option<Arc<[ColumnMeta]>>,
    last_info: Option<ResultsetInfo>,
}

impl ExecutionProcessor {
    pub(crate) fn new(format: ValueFormat, meta_mode: MetadataMode) -> Self {
        Self {
            seqnum: 0,
            phase: Phase::ReadingHead,
            format,
            meta_mode,
            columns: Vec::new(),
            meta_remaining: 0,
            current_columns: None,
            last_info: None,
        }
    }

    pub(crate) fn is_reading_head(&self) -> bool {
        self.phase == Phase::ReadingHead
    }

    pub(crate) fn is_reading_meta(&self) -> bool {
        self.phase == Phase::ReadingMeta
    }

    pub(crate) fn is_reading_rows(&self) -> bool {
        self.phase == Phase::ReadingRows
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Metadata of the resultset currently being read.
    pub(crate) fn columns(&self) -> &[ColumnMeta] {
        self.current_columns.as_deref().unwrap_or(&[])
    }

    pub(crate) fn shared_columns(&self) -> Option<Arc<[ColumnMeta]>> {
        self.current_columns.clone()
    }

    /// Completion info of the most recently terminated resultset.
    pub(crate) fn last_info(&self) -> Option<&ResultsetInfo> {
        self.last_info.as_ref()
    }

    pub(crate) fn on_head_message(&mut self, msg: &[u8]) -> Result<HeadEvent> {
        debug_assert_eq!(self.phase, Phase::ReadingHead);

        let header = *msg.first().ok_or(ClientError::IncompleteMessage)?;

        match header {
            0x00 => {
                let ok = OkPacket::read(msg)?;
                self.finish_resultset(&ok);
                Ok(HeadEvent::NoRows(ok))
            }

            // deprecated-EOF acting as OK
            0xFE if msg.len() < 9 => {
                let ok = OkPacket::read(msg)?;
                self.finish_resultset(&ok);
                Ok(HeadEvent::NoRows(ok))
            }

            0xFF => Err(ErrPacket::read(msg)?.into_server_error().into()),

            // LOCAL INFILE request; not supported
            0xFB => Err(ClientError::Unsupported.into()),

            _ => {
                let mut buf = msg;
                let count = buf
                    .get_uint_lenenc::<LittleEndian>()?
                    .ok_or(ClientError::ProtocolValueError)?;

                if count == 0 || !buf.is_empty() {
                    return Err(ClientError::ProtocolValueError.into());
                }

                self.columns.clear();
                self.columns.reserve(count.min(1024) as usize);
                self.meta_remaining = count;
                self.current_columns = None;
                self.phase = Phase::ReadingMeta;

                Ok(HeadEvent::Columns(count))
            }
        }
    }

    pub(crate) fn on_meta_message(&mut self, msg: &[u8]) -> Result<()> {
        debug_assert_eq!(self.phase, Phase::ReadingMeta);

        let def = ColumnDefinition::read(msg)?;
        self.columns
            .push(ColumnMeta::from_definition(&def, self.meta_mode));

        self.meta_remaining -= 1;
        if self.meta_remaining == 0 {
            // With deprecate-EOF negotiated, rows follow immediately.
            self.current_columns = Some(std::mem::take(&mut self.columns).into());
            self.phase = Phase::ReadingRows;
        }

        Ok(())
    }

    pub(crate) fn on_row_message(&mut self, msg: &[u8]) -> Result<RowEvent> {
        debug_assert_eq!(self.phase, Phase::ReadingRows);

        if msg.first() == Some(&0xFF) {
            return Err(ErrPacket::read(msg)?.into_server_error().into());
        }

        if msg.first() == Some(&0xFE) && msg.len() < 9 {
            let ok = OkPacket::read(msg)?;
            self.finish_resultset(&ok);
            return Ok(RowEvent::End(ok));
        }

        let columns = self
            .current_columns
            .clone()
            .ok_or(ClientError::ProtocolValueError)?;

        Ok(RowEvent::Row(Row::decode(msg, columns, self.format)?))
    }

    fn finish_resultset(&mut self, ok: &OkPacket) {
        self.last_info = Some(ResultsetInfo::from_ok(ok));
        self.phase = if ok.more_results() {
            Phase::ReadingHead
        } else {
            Phase::Complete
        };
    }
}
