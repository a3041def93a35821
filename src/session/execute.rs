//! Query / statement execution machines: the aggregate `execute`, the
//! multi-function `start_execution` / `read_resultset_head` /
//! `read_some_rows` family, and `prepare_statement`.
//!
//! The read side is factored into data-only sub-machines
//! ([`ResponseReader`], [`PrepareReader`]) so pipeline stages can reuse
//! them verbatim.

use crate::error::{ClientError, Error, Result};
use crate::protocol::statement::{ComStmtExecute, ComStmtPrepare, ComStmtPrepareOk};
use crate::protocol::text::ComQuery;
use crate::protocol::{ColumnDefinition, ColumnMeta, ErrPacket, MetadataMode};
use crate::resultset::{Results, Resultset, ResultsetInfo, Statement};
use crate::row::Row;
use crate::session::processor::{ExecutionProcessor, HeadEvent, RowEvent};
use crate::session::{NextAction, SessionAlgo, SessionState, SessionStatus};
use crate::value::{Field, ValueFormat};

/// What to execute: a textual query or a prepared statement with bound
/// parameters.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ExecRequest<'a> {
    Query(&'a str),
    Statement {
        statement: Statement,
        params: &'a [Field],
    },
}

impl ExecRequest<'_> {
    pub(crate) fn format(&self) -> ValueFormat {
        match self {
            ExecRequest::Query(_) => ValueFormat::Text,
            ExecRequest::Statement { .. } => ValueFormat::Binary,
        }
    }

    /// Serializes the request as the command packet, checking the bound
    /// parameter count first.
    pub(crate) fn write(&self, st: &mut SessionState, seqnum: &mut u8) -> Result<()> {
        match *self {
            ExecRequest::Query(sql) => st.write_packet(ComQuery(sql), seqnum),

            ExecRequest::Statement { statement, params } => {
                if params.len() != usize::from(statement.num_params()) {
                    return Err(ClientError::WrongNumParams.into());
                }

                st.write_packet(
                    ComStmtExecute {
                        statement_id: statement.id(),
                        params,
                    },
                    seqnum,
                )
            }
        }
    }
}

/// The caller-held handle of a multi-function operation.
///
/// Produced empty (or by `start_execution`) and fed back into
/// `read_some_rows` / `read_resultset_head` until
/// [`is_complete`](Self::is_complete).
pub struct ExecutionState {
    pub(crate) processor: ExecutionProcessor,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionState {
    /// A fresh, idle execution state. `start_execution` resets it.
    pub fn new() -> Self {
        Self::with_format(ValueFormat::Text, MetadataMode::default())
    }

    pub(crate) fn with_format(format: ValueFormat, meta_mode: MetadataMode) -> Self {
        Self {
            processor: ExecutionProcessor::new(format, meta_mode),
        }
    }

    /// Metadata of the resultset currently being read.
    pub fn columns(&self) -> &[ColumnMeta] {
        self.processor.columns()
    }

    /// Whether the whole resultset chain has been consumed.
    pub fn is_complete(&self) -> bool {
        self.processor.is_complete()
    }

    /// Whether the operation sits between resultsets, waiting for
    /// `read_resultset_head`.
    pub fn should_read_head(&self) -> bool {
        self.processor.is_reading_head()
    }

    /// Whether rows remain to be read with `read_some_rows`.
    pub fn should_read_rows(&self) -> bool {
        self.processor.is_reading_rows()
    }

    /// Completion info of the most recently finished resultset.
    pub fn last_info(&self) -> Option<&ResultsetInfo> {
        self.processor.last_info()
    }
}

/// Result of resuming a data-only sub-machine.
pub(crate) enum StepResult {
    /// The sub-machine needs I/O.
    Action(NextAction),

    /// The sub-machine finished.
    Done(Result<()>),
}

// ---------------------------------------------------------------------
// read one resultset head (head packet + column metadata)

#[derive(Debug, Clone, Copy)]
enum ReadHeadState {
    Initial,
    Head,
    Meta,
}

impl ReadHeadState {
    fn resume(
        &mut self,
        st: &mut SessionState,
        proc: &mut ExecutionProcessor,
        mut err: Option<Error>,
    ) -> StepResult {
        loop {
            match *self {
                ReadHeadState::Initial => {
                    // Nothing to do unless a head is actually expected.
                    if !proc.is_reading_head() {
                        return StepResult::Done(Ok(()));
                    }

                    if let Err(e) = st.begin_read(proc.seqnum, false) {
                        return StepResult::Done(Err(e));
                    }

                    *self = ReadHeadState::Head;
                    return StepResult::Action(NextAction::Read);
                }

                ReadHeadState::Head => {
                    if let Some(e) = err.take() {
                        return StepResult::Done(Err(e));
                    }

                    proc.seqnum = st.reader.sequence_number();

                    match proc.on_head_message(st.reader.message()) {
                        Err(e) => return StepResult::Done(Err(e)),

                        Ok(HeadEvent::NoRows(ok)) => {
                            st.apply_ok(&ok);
                            return StepResult::Done(Ok(()));
                        }

                        Ok(HeadEvent::Columns(_)) => {
                            if let Err(e) = st.begin_read(proc.seqnum, false) {
                                return StepResult::Done(Err(e));
                            }

                            *self = ReadHeadState::Meta;
                            return StepResult::Action(NextAction::Read);
                        }
                    }
                }

                ReadHeadState::Meta => {
                    if let Some(e) = err.take() {
                        return StepResult::Done(Err(e));
                    }

                    proc.seqnum = st.reader.sequence_number();

                    if let Err(e) = proc.on_meta_message(st.reader.message()) {
                        return StepResult::Done(Err(e));
                    }

                    if !proc.is_reading_meta() {
                        // No EOF separates metadata from rows: we always
                        // negotiate deprecate-EOF.
                        return StepResult::Done(Ok(()));
                    }

                    if let Err(e) = st.begin_read(proc.seqnum, false) {
                        return StepResult::Done(Err(e));
                    }

                    return StepResult::Action(NextAction::Read);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// read a whole execution response into a Results container

enum ReaderStep {
    Head(ReadHeadState),
    Rows,
}

/// Consumes one command's complete response (all resultsets, all rows).
/// Used by the aggregate `execute` and by pipeline execute stages.
pub(crate) struct ResponseReader {
    proc: ExecutionProcessor,
    results: Results,
    current: Option<Resultset>,
    step: ReaderStep,
}

impl ResponseReader {
    pub(crate) fn new(format: ValueFormat, meta_mode: MetadataMode, seqnum: u8) -> Self {
        let mut proc = ExecutionProcessor::new(format, meta_mode);
        proc.seqnum = seqnum;

        Self {
            proc,
            results: Results::default(),
            current: None,
            step: ReaderStep::Head(ReadHeadState::Initial),
        }
    }

    pub(crate) fn take_results(&mut self) -> Results {
        std::mem::take(&mut self.results)
    }

    // After a head completed: open a row phase or record the row-less
    // resultset. Returns the next step result when settled.
    fn after_head(&mut self, st: &mut SessionState) -> Option<StepResult> {
        if self.proc.is_reading_rows() {
            self.current = Some(Resultset {
                columns: self.proc.shared_columns(),
                rows: Vec::new(),
                info: None,
            });

            if let Err(e) = st.begin_read(self.proc.seqnum, false) {
                return Some(StepResult::Done(Err(e)));
            }

            self.step = ReaderStep::Rows;
            return Some(StepResult::Action(NextAction::Read));
        }

        // Row-less resultset (OK head).
        self.results.resultsets.push(Resultset {
            columns: None,
            rows: Vec::new(),
            info: self.proc.last_info().cloned(),
        });

        if self.proc.is_complete() {
            return Some(StepResult::Done(Ok(())));
        }

        // More resultsets follow.
        self.step = ReaderStep::Head(ReadHeadState::Initial);
        None
    }

    pub(crate) fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> StepResult {
        loop {
            match self.step {
                ReaderStep::Head(ref mut head) => {
                    match head.resume(st, &mut self.proc, err.take()) {
                        StepResult::Action(action) => return StepResult::Action(action),
                        StepResult::Done(Err(e)) => return StepResult::Done(Err(e)),
                        StepResult::Done(Ok(())) => match self.after_head(st) {
                            Some(result) => return result,
                            None => continue,
                        },
                    }
                }

                ReaderStep::Rows => {
                    if let Some(e) = err.take() {
                        return StepResult::Done(Err(e));
                    }

                    self.proc.seqnum = st.reader.sequence_number();

                    match self.proc.on_row_message(st.reader.message()) {
                        Err(e) => return StepResult::Done(Err(e)),

                        Ok(RowEvent::Row(row)) => {
                            if let Some(current) = &mut self.current {
                                current.rows.push(row);
                            }

                            if let Err(e) = st.begin_read(self.proc.seqnum, false) {
                                return StepResult::Done(Err(e));
                            }

                            if !st.reader.done() {
                                return StepResult::Action(NextAction::Read);
                            }
                        }

                        Ok(RowEvent::End(ok)) => {
                            st.apply_ok(&ok);

                            let mut finished = self.current.take().unwrap_or_default();
                            finished.info = self.proc.last_info().cloned();
                            self.results.resultsets.push(finished);

                            if self.proc.is_complete() {
                                return StepResult::Done(Ok(()));
                            }

                            self.step = ReaderStep::Head(ReadHeadState::Initial);
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// aggregate execute

enum ExecStep {
    Initial,
    Writing,
    Reading,
}

/// Runs a command and collects every row of every resultset.
pub(crate) struct ExecuteAlgo<'a> {
    req: ExecRequest<'a>,
    meta_mode: MetadataMode,
    reader: Option<ResponseReader>,
    step: ExecStep,
}

impl<'a> ExecuteAlgo<'a> {
    pub(crate) fn new(req: ExecRequest<'a>, meta_mode: MetadataMode) -> Self {
        Self {
            req,
            meta_mode,
            reader: None,
            step: ExecStep::Initial,
        }
    }

    pub(crate) fn take_results(&mut self) -> Results {
        self.reader
            .as_mut()
            .map(ResponseReader::take_results)
            .unwrap_or_default()
    }
}

impl SessionAlgo for ExecuteAlgo<'_> {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                ExecStep::Initial => {
                    if let Err(e) = st.check_status_ready() {
                        return NextAction::Done(Err(e));
                    }

                    let mut seqnum = 0;
                    if let Err(e) = self.req.write(st, &mut seqnum) {
                        return NextAction::Done(Err(e));
                    }

                    self.reader = Some(ResponseReader::new(
                        self.req.format(),
                        self.meta_mode,
                        seqnum,
                    ));
                    self.step = ExecStep::Writing;
                    return NextAction::Write;
                }

                ExecStep::Writing => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    self.step = ExecStep::Reading;
                }

                ExecStep::Reading => {
                    let reader = self.reader.as_mut().expect("reader set in Initial");

                    match reader.resume(st, err.take()) {
                        StepResult::Action(action) => return action,
                        StepResult::Done(result) => return NextAction::Done(result),
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// start_execution

enum StartStep {
    Initial,
    Writing,
    Head(ReadHeadState),
}

pub(crate) struct StartExecutionAlgo<'a> {
    req: ExecRequest<'a>,
    state: &'a mut ExecutionState,
    step: StartStep,
}

impl<'a> StartExecutionAlgo<'a> {
    pub(crate) fn new(req: ExecRequest<'a>, state: &'a mut ExecutionState) -> Self {
        Self {
            req,
            state,
            step: StartStep::Initial,
        }
    }
}

impl SessionAlgo for StartExecutionAlgo<'_> {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                StartStep::Initial => {
                    if let Err(e) = st.check_status_ready() {
                        return NextAction::Done(Err(e));
                    }

                    self.state.processor =
                        ExecutionProcessor::new(self.req.format(), st.meta_mode);

                    if let Err(e) = self.req.write(st, &mut self.state.processor.seqnum) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = StartStep::Writing;
                    return NextAction::Write;
                }

                StartStep::Writing => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    // The request is on the wire: a multi-function
                    // operation is now running. Ends when the terminal
                    // OK arrives or the operation errors.
                    st.status = SessionStatus::EngagedInMultiFunction;
                    self.step = StartStep::Head(ReadHeadState::Initial);
                }

                StartStep::Head(ref mut head) => {
                    match head.resume(st, &mut self.state.processor, err.take()) {
                        StepResult::Action(action) => return action,

                        StepResult::Done(Err(e)) => {
                            st.status = SessionStatus::Ready;
                            return NextAction::Done(Err(e));
                        }

                        StepResult::Done(Ok(())) => {
                            if self.state.processor.is_complete() {
                                st.status = SessionStatus::Ready;
                            }

                            return NextAction::Done(Ok(()));
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// read_resultset_head

pub(crate) struct ReadResultsetHeadAlgo<'a> {
    state: &'a mut ExecutionState,
    head: ReadHeadState,
    started: bool,
}

impl<'a> ReadResultsetHeadAlgo<'a> {
    pub(crate) fn new(state: &'a mut ExecutionState) -> Self {
        Self {
            state,
            head: ReadHeadState::Initial,
            started: false,
        }
    }
}

impl SessionAlgo for ReadResultsetHeadAlgo<'_> {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        if !self.started {
            self.started = true;

            if let Err(e) = st.check_status_multi_function() {
                return NextAction::Done(Err(e));
            }

            // Repeated calls on an already-read head are a no-op.
            if !self.state.processor.is_reading_head() {
                return NextAction::Done(Ok(()));
            }
        }

        match self.head.resume(st, &mut self.state.processor, err.take()) {
            StepResult::Action(action) => action,

            StepResult::Done(Err(e)) => {
                st.status = SessionStatus::Ready;
                NextAction::Done(Err(e))
            }

            StepResult::Done(Ok(())) => {
                if self.state.processor.is_complete() {
                    st.status = SessionStatus::Ready;
                }

                NextAction::Done(Ok(()))
            }
        }
    }
}

// ---------------------------------------------------------------------
// read_some_rows

enum RowsStep {
    Initial,
    Reading,
}

pub(crate) struct ReadSomeRowsAlgo<'a> {
    state: &'a mut ExecutionState,
    rows: Vec<Row>,
    step: RowsStep,
}

impl<'a> ReadSomeRowsAlgo<'a> {
    pub(crate) fn new(state: &'a mut ExecutionState) -> Self {
        Self {
            state,
            rows: Vec::new(),
            step: RowsStep::Initial,
        }
    }

    pub(crate) fn take_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    fn fail(&mut self, st: &mut SessionState, err: Error) -> NextAction {
        // An error ends the multi-function operation.
        st.status = SessionStatus::Ready;
        NextAction::Done(Err(err))
    }
}

impl SessionAlgo for ReadSomeRowsAlgo<'_> {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                RowsStep::Initial => {
                    if let Err(e) = st.check_status_multi_function() {
                        return NextAction::Done(Err(e));
                    }

                    // In the head phase (between resultsets) an empty
                    // batch tells the caller to read the next head.
                    if !self.state.processor.is_reading_rows() {
                        return NextAction::Done(Ok(()));
                    }

                    // Keep the parsing state: a previous batch may have
                    // left a partially-parsed message behind.
                    if let Err(e) = st.begin_read(self.state.processor.seqnum, true) {
                        return self.fail(st, e);
                    }

                    self.step = RowsStep::Reading;
                    return NextAction::Read;
                }

                RowsStep::Reading => {
                    if let Some(e) = err.take() {
                        return self.fail(st, e);
                    }

                    // Process every message that is already buffered;
                    // yield the batch once the bytes run out.
                    loop {
                        let proc = &mut self.state.processor;
                        proc.seqnum = st.reader.sequence_number();

                        match proc.on_row_message(st.reader.message()) {
                            Err(e) => return self.fail(st, e),

                            Ok(RowEvent::Row(row)) => self.rows.push(row),

                            Ok(RowEvent::End(ok)) => {
                                st.apply_ok(&ok);

                                if self.state.processor.is_complete() {
                                    st.status = SessionStatus::Ready;
                                }

                                // Between resultsets the caller decides
                                // when to read the next head.
                                return NextAction::Done(Ok(()));
                            }
                        }

                        if let Err(e) = st.begin_read(self.state.processor.seqnum, false) {
                            return self.fail(st, e);
                        }

                        if !st.reader.done() {
                            // Next message needs I/O: end the batch. The
                            // parse state is kept for the next call.
                            return NextAction::Done(Ok(()));
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// prepare_statement

/// Reads a prepare response: PREPARE_OK plus the parameter and column
/// definition packets (validated, then dropped; execution re-delivers
/// column metadata).
pub(crate) struct PrepareReader {
    seqnum: u8,
    statement: Option<Statement>,
    step: PrepareReadStep,
}

enum PrepareReadStep {
    Initial,
    ReadOk,
    SkipMeta { remaining: u32 },
}

impl PrepareReader {
    pub(crate) fn new(seqnum: u8) -> Self {
        Self {
            seqnum,
            statement: None,
            step: PrepareReadStep::Initial,
        }
    }

    pub(crate) fn statement(&self) -> Option<Statement> {
        self.statement
    }

    pub(crate) fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> StepResult {
        loop {
            match self.step {
                PrepareReadStep::Initial => {
                    if let Err(e) = st.begin_read(self.seqnum, false) {
                        return StepResult::Done(Err(e));
                    }

                    self.step = PrepareReadStep::ReadOk;
                    return StepResult::Action(NextAction::Read);
                }

                PrepareReadStep::ReadOk => {
                    if let Some(e) = err.take() {
                        return StepResult::Done(Err(e));
                    }

                    self.seqnum = st.reader.sequence_number();

                    let msg = st.reader.message();
                    if msg.first() == Some(&0xFF) {
                        let err = match ErrPacket::read(msg) {
                            Ok(err) => err.into_server_error().into(),
                            Err(err) => err,
                        };
                        return StepResult::Done(Err(err));
                    }

                    let ok = match ComStmtPrepareOk::read(msg) {
                        Ok(ok) => ok,
                        Err(e) => return StepResult::Done(Err(e)),
                    };

                    self.statement = Some(Statement {
                        id: ok.statement_id,
                        num_params: ok.params,
                        num_columns: ok.columns,
                    });

                    let remaining = u32::from(ok.params) + u32::from(ok.columns);
                    if remaining == 0 {
                        return StepResult::Done(Ok(()));
                    }

                    if let Err(e) = st.begin_read(self.seqnum, false) {
                        return StepResult::Done(Err(e));
                    }

                    self.step = PrepareReadStep::SkipMeta { remaining };
                    return StepResult::Action(NextAction::Read);
                }

                PrepareReadStep::SkipMeta { ref mut remaining } => {
                    if let Some(e) = err.take() {
                        return StepResult::Done(Err(e));
                    }

                    self.seqnum = st.reader.sequence_number();

                    if let Err(e) = ColumnDefinition::read(st.reader.message()) {
                        return StepResult::Done(Err(e));
                    }

                    *remaining -= 1;
                    if *remaining == 0 {
                        return StepResult::Done(Ok(()));
                    }

                    if let Err(e) = st.begin_read(self.seqnum, false) {
                        return StepResult::Done(Err(e));
                    }

                    return StepResult::Action(NextAction::Read);
                }
            }
        }
    }
}

enum PrepareStep {
    Initial,
    Writing,
    Reading,
}

pub(crate) struct PrepareAlgo<'a> {
    sql: &'a str,
    reader: PrepareReader,
    step: PrepareStep,
}

impl<'a> PrepareAlgo<'a> {
    pub(crate) fn new(sql: &'a str) -> Self {
        Self {
            sql,
            reader: PrepareReader::new(0),
            step: PrepareStep::Initial,
        }
    }

    pub(crate) fn statement(&self) -> Option<Statement> {
        self.reader.statement()
    }
}

impl SessionAlgo for PrepareAlgo<'_> {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                PrepareStep::Initial => {
                    if let Err(e) = st.check_status_ready() {
                        return NextAction::Done(Err(e));
                    }

                    let mut seqnum = 0;
                    if let Err(e) = st.write_packet(ComStmtPrepare(self.sql), &mut seqnum) {
                        return NextAction::Done(Err(e));
                    }

                    self.reader = PrepareReader::new(seqnum);
                    self.step = PrepareStep::Writing;
                    return NextAction::Write;
                }

                PrepareStep::Writing => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    self.step = PrepareStep::Reading;
                }

                PrepareStep::Reading => match self.reader.resume(st, err.take()) {
                    StepResult::Action(action) => return action,
                    StepResult::Done(result) => return NextAction::Done(result),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use byteorder::LittleEndian;

    use super::*;
    use crate::error::ClientError;
    use crate::io::BufMutExt;
    use crate::protocol::tests::encode_column_def;
    use crate::protocol::{ColumnFlags, TypeId};
    use crate::session::testing::{ready_session, Script};
    use crate::value::FieldRef;

    fn ok_packet(affected: u64, more_results: bool) -> Vec<u8> {
        let mut buf = vec![0x00];
        buf.put_uint_lenenc::<LittleEndian>(affected);
        buf.put_uint_lenenc::<LittleEndian>(0);
        buf.put_u16::<LittleEndian>(if more_results { 0x000A } else { 0x0002 });
        buf.put_u16::<LittleEndian>(0);
        buf
    }

    fn eof_packet(more_results: bool) -> Vec<u8> {
        let mut buf = ok_packet(0, more_results);
        buf[0] = 0xFE;
        buf
    }

    fn text_row(cells: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for cell in cells {
            buf.put_str_lenenc::<LittleEndian>(cell);
        }
        buf
    }

    fn bigint_column() -> Vec<u8> {
        encode_column_def("v", TypeId::LONG_LONG, 63, ColumnFlags::NOT_NULL)
    }

    // An OK head with MORE_RESULTS_EXISTS advances to a second,
    // row-bearing resultset; the command only completes on the last OK.
    #[test]
    fn it_advances_through_multiple_resultsets() {
        let mut st = ready_session();
        let mut script = Script::new();

        script.push_server_message(&ok_packet(3, true), 1);
        script.push_server_message(&[0x01], 2);
        script.push_server_message(&bigint_column(), 3);
        script.push_server_message(&text_row(&["7"]), 4);
        script.push_server_message(&eof_packet(false), 5);

        let mut algo = ExecuteAlgo::new(ExecRequest::Query("CALL p()"), MetadataMode::default());
        script.run(&mut st, &mut algo).unwrap();

        let results = algo.take_results();
        assert_eq!(results.resultsets().len(), 2);

        assert_eq!(results.resultsets()[0].affected_rows(), 3);
        assert!(results.resultsets()[0].rows().is_empty());

        let second = &results.resultsets()[1];
        assert_eq!(second.columns().len(), 1);
        assert_eq!(second.rows().len(), 1);
        assert_eq!(second.rows()[0].field(0).unwrap(), FieldRef::Int(7));

        assert_eq!(st.status, SessionStatus::Ready);
    }

    #[test]
    fn a_server_error_head_fails_but_keeps_the_session_usable() {
        let mut st = ready_session();
        let mut script = Script::new();

        script.push_server_message(b"\xFF\x19\x04#42000bad query", 1);

        let mut algo = ExecuteAlgo::new(ExecRequest::Query("nonsense"), MetadataMode::default());
        let err = script.run(&mut st, &mut algo).unwrap_err();

        assert_eq!(err.server().map(|e| e.code()), Some(1049));
        assert_eq!(st.status, SessionStatus::Ready);
    }

    #[test]
    fn multi_function_reads_rows_in_batches() {
        let mut st = ready_session();
        let mut script = Script::new();

        script.push_server_message(&[0x01], 1);
        script.push_server_message(&bigint_column(), 2);
        script.push_server_message(&text_row(&["1"]), 3);
        script.push_server_message(&text_row(&["2"]), 4);
        script.push_server_message(&eof_packet(false), 5);

        let mut state = ExecutionState::new();

        let mut start = StartExecutionAlgo::new(ExecRequest::Query("SELECT v"), &mut state);
        script.run(&mut st, &mut start).unwrap();
        drop(start);

        assert_eq!(st.status, SessionStatus::EngagedInMultiFunction);
        assert!(state.should_read_rows());
        assert_eq!(state.columns().len(), 1);

        let mut rows = Vec::new();
        while state.should_read_rows() {
            let mut read = ReadSomeRowsAlgo::new(&mut state);
            script.run(&mut st, &mut read).unwrap();
            rows.extend(read.take_rows());
        }

        assert_eq!(rows.len(), 2);
        assert!(state.is_complete());
        assert_eq!(st.status, SessionStatus::Ready);
    }

    // Property checks on the multi-function preconditions.
    #[test]
    fn read_some_rows_without_start_execution_is_rejected() {
        let mut st = ready_session();
        let mut script = Script::new();

        let mut state = ExecutionState::new();
        let mut read = ReadSomeRowsAlgo::new(&mut state);
        let err = script.run(&mut st, &mut read).unwrap_err();

        assert_eq!(err.code(), Some(ClientError::NotEngagedInMultiFunction));
    }

    #[test]
    fn execute_while_engaged_is_rejected() {
        let mut st = ready_session();
        let mut script = Script::new();

        script.push_server_message(&[0x01], 1);
        script.push_server_message(&bigint_column(), 2);

        let mut state = ExecutionState::new();
        let mut start = StartExecutionAlgo::new(ExecRequest::Query("SELECT v"), &mut state);
        script.run(&mut st, &mut start).unwrap();
        drop(start);

        let mut execute =
            ExecuteAlgo::new(ExecRequest::Query("SELECT 1"), MetadataMode::default());
        let err = script.run(&mut st, &mut execute).unwrap_err();

        assert_eq!(err.code(), Some(ClientError::EngagedInMultiFunction));
    }

    #[test]
    fn wrong_param_count_is_rejected_before_any_write() {
        let mut st = ready_session();
        let mut script = Script::new();

        let statement = Statement {
            id: 1,
            num_params: 2,
            num_columns: 0,
        };

        let params = [Field::Int(1)];
        let mut algo = ExecuteAlgo::new(
            ExecRequest::Statement {
                statement,
                params: &params,
            },
            MetadataMode::default(),
        );
        let err = script.run(&mut st, &mut algo).unwrap_err();

        assert_eq!(err.code(), Some(ClientError::WrongNumParams));
        assert!(script.written.is_empty());
        assert_eq!(st.status, SessionStatus::Ready);
    }

    #[test]
    fn local_infile_requests_are_unsupported() {
        let mut st = ready_session();
        let mut script = Script::new();

        // 0xFB head: the server asks for LOCAL INFILE data
        script.push_server_message(b"\xFBdata.csv", 1);

        let mut algo = ExecuteAlgo::new(
            ExecRequest::Query("LOAD DATA LOCAL INFILE ..."),
            MetadataMode::default(),
        );
        let err = script.run(&mut st, &mut algo).unwrap_err();

        assert_eq!(err.code(), Some(ClientError::Unsupported));
    }

    #[test]
    fn prepare_parses_the_response_and_skips_metadata() {
        let mut st = ready_session();
        let mut script = Script::new();

        let mut prepare_ok = vec![0x00];
        prepare_ok.put_u32::<LittleEndian>(7); // statement id
        prepare_ok.put_u16::<LittleEndian>(1); // columns
        prepare_ok.put_u16::<LittleEndian>(2); // params
        prepare_ok.put_u8(0);
        prepare_ok.put_u16::<LittleEndian>(0); // warnings

        script.push_server_message(&prepare_ok, 1);
        script.push_server_message(&bigint_column(), 2);
        script.push_server_message(&bigint_column(), 3);
        script.push_server_message(&bigint_column(), 4);

        let mut algo = PrepareAlgo::new("SELECT ? + ?");
        script.run(&mut st, &mut algo).unwrap();

        let statement = algo.statement().unwrap();
        assert_eq!(statement.id(), 7);
        assert_eq!(statement.num_params(), 2);
        assert_eq!(statement.num_columns(), 1);
    }
}
