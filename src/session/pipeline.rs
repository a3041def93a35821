//! Pipelines: several commands serialized into one outbound buffer,
//! written with a single write, their responses then consumed
//! stage-by-stage.
//!
//! Every stage's response is consumed before the pipeline returns, even
//! after earlier stages failed: the server executes all stages
//! regardless. (For the same reason, transactional compositions must
//! not be expressed as pipelines.) The overall result is the first
//! stage error; per-stage outcomes are stored in the caller-supplied
//! [`PipelineResponse`].
//!
//! `ping`, `reset_connection` and `close_statement` are internally
//! single-stage pipelines, so there is exactly one code path for both
//! standalone and pipelined execution.

use crate::error::{ClientError, Error, Result};
use crate::io::write_message;
use crate::protocol::statement::{ComStmtClose, ComStmtExecute};
use crate::protocol::text::{ComPing, ComQuery, ComResetConnection};
use crate::protocol::{Capabilities, Encode, MetadataMode};
use crate::resultset::{Results, Statement};
use crate::session::execute::{PrepareReader, ResponseReader, StepResult};
use crate::session::{NextAction, SessionAlgo, SessionState};
use crate::value::{Field, ValueFormat};
use crate::CharacterSet;

#[derive(Debug, Clone)]
pub(crate) enum StageKind {
    Execute { format: ValueFormat },
    Prepare,
    CloseStatement,
    ResetConnection,
    SetCharacterSet(CharacterSet),
    Ping,
}

#[derive(Debug, Clone)]
pub(crate) struct Stage {
    pub(crate) kind: StageKind,

    // The sequence number the stage's response starts at.
    pub(crate) response_seqnum: u8,
}

/// An ordered list of commands serialized back-to-back, each with its
/// own frame sequence starting at 0.
#[derive(Debug, Default)]
pub struct PipelineRequest {
    pub(crate) buffer: Vec<u8>,
    pub(crate) stages: Vec<Stage>,
}

impl PipelineRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stages added so far.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Drops all stages, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.stages.clear();
    }

    fn push(&mut self, packet: impl Encode, kind: StageKind) {
        let mut payload = Vec::new();
        packet.encode(&mut payload, Capabilities::empty());

        // Each stage owns a private sequence starting at 0; size limits
        // are enforced against the session when the pipeline runs.
        let response_seqnum = write_message(&payload, &mut self.buffer, 0, usize::MAX)
            .expect("no size limit applies while building");

        self.stages.push(Stage {
            kind,
            response_seqnum,
        });
    }

    /// Adds a textual query stage.
    pub fn add_query(&mut self, sql: &str) -> &mut Self {
        self.push(
            ComQuery(sql),
            StageKind::Execute {
                format: ValueFormat::Text,
            },
        );
        self
    }

    /// Adds a prepared-statement execution stage.
    pub fn add_execute(&mut self, statement: &Statement, params: &[Field]) -> Result<&mut Self> {
        if params.len() != usize::from(statement.num_params()) {
            return Err(ClientError::WrongNumParams.into());
        }

        self.push(
            ComStmtExecute {
                statement_id: statement.id(),
                params,
            },
            StageKind::Execute {
                format: ValueFormat::Binary,
            },
        );
        Ok(self)
    }

    /// Adds a statement preparation stage.
    pub fn add_prepare(&mut self, sql: &str) -> &mut Self {
        self.push(
            crate::protocol::statement::ComStmtPrepare(sql),
            StageKind::Prepare,
        );
        self
    }

    /// Adds a fire-and-forget statement close stage.
    pub fn add_close_statement(&mut self, statement: &Statement) -> &mut Self {
        self.push(
            ComStmtClose {
                statement_id: statement.id(),
            },
            StageKind::CloseStatement,
        );
        self
    }

    /// Adds a connection-reset stage. Server-side session state
    /// (variables, temporary tables, prepared statements) is scrubbed;
    /// the session character set becomes unknown until `SET NAMES`.
    pub fn add_reset_connection(&mut self) -> &mut Self {
        self.push(ComResetConnection, StageKind::ResetConnection);
        self
    }

    /// Adds a `SET NAMES` stage. The character set name is validated
    /// against the built-in table before any bytes are sent.
    pub fn add_set_character_set(&mut self, name: &str) -> Result<&mut Self> {
        let charset =
            CharacterSet::by_name(name).ok_or(ClientError::UnknownCharacterSet)?;

        // The name comes from the static table: quoting is safe.
        let sql = format!("SET NAMES '{}'", charset.name());
        self.push(ComQuery(&sql), StageKind::SetCharacterSet(charset));
        Ok(self)
    }

    /// Adds a ping stage.
    pub fn add_ping(&mut self) -> &mut Self {
        self.push(ComPing, StageKind::Ping);
        self
    }
}

/// Per-stage results of a pipeline run, in stage order.
#[derive(Debug, Default)]
pub struct PipelineResponse {
    pub(crate) items: Vec<StageOutcome>,
}

impl PipelineResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The outcome of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome {
    /// The stage succeeded with no payload (ping, reset, set names,
    /// close statement).
    Ok,

    /// A prepare stage succeeded.
    Statement(Statement),

    /// An execute stage succeeded.
    Results(Results),

    /// The stage failed; later stages still ran and were consumed.
    Error(Error),
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, StageOutcome::Error(_))
    }

    pub fn as_statement(&self) -> Option<&Statement> {
        match self {
            StageOutcome::Statement(statement) => Some(statement),
            _ => None,
        }
    }

    pub fn as_results(&self) -> Option<&Results> {
        match self {
            StageOutcome::Results(results) => Some(results),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            StageOutcome::Error(err) => Some(err),
            _ => None,
        }
    }
}

// The per-stage response reader.
enum StageReader {
    // Expecting a single OK/ERR packet.
    Ok { seqnum: u8, started: bool },
    Prepare(PrepareReader),
    Execute(ResponseReader),
    // Fire-and-forget: no response at all.
    Nothing,
}

impl StageReader {
    fn new(stage: &Stage, meta_mode: MetadataMode) -> Self {
        match stage.kind {
            StageKind::Execute { format } => {
                StageReader::Execute(ResponseReader::new(format, meta_mode, stage.response_seqnum))
            }
            StageKind::Prepare => StageReader::Prepare(PrepareReader::new(stage.response_seqnum)),
            StageKind::CloseStatement => StageReader::Nothing,
            StageKind::ResetConnection | StageKind::SetCharacterSet(_) | StageKind::Ping => {
                StageReader::Ok {
                    seqnum: stage.response_seqnum,
                    started: false,
                }
            }
        }
    }

    fn resume(&mut self, st: &mut SessionState, err: Option<Error>) -> StepResult {
        match self {
            StageReader::Nothing => StepResult::Done(Ok(())),

            StageReader::Ok { seqnum, started } => {
                if !*started {
                    *started = true;

                    if let Err(e) = st.begin_read(*seqnum, false) {
                        return StepResult::Done(Err(e));
                    }

                    return StepResult::Action(NextAction::Read);
                }

                if let Some(e) = err {
                    return StepResult::Done(Err(e));
                }

                StepResult::Done(st.process_ok_response().map(drop))
            }

            StageReader::Prepare(reader) => reader.resume(st, err),
            StageReader::Execute(reader) => reader.resume(st, err),
        }
    }

    // Extracts the stage's successful outcome.
    fn finish(self) -> StageOutcome {
        match self {
            StageReader::Nothing | StageReader::Ok { .. } => StageOutcome::Ok,
            StageReader::Prepare(reader) => match reader.statement() {
                Some(statement) => StageOutcome::Statement(statement),
                None => StageOutcome::Ok,
            },
            StageReader::Execute(mut reader) => StageOutcome::Results(reader.take_results()),
        }
    }
}

enum PipelineStep {
    Initial,
    Writing,
    Stage,
}

pub(crate) struct RunPipelineAlgo<'a> {
    request: &'a PipelineRequest,
    response: &'a mut PipelineResponse,
    stage_index: usize,
    reader: Option<StageReader>,
    first_error: Option<Error>,
    step: PipelineStep,
}

impl<'a> RunPipelineAlgo<'a> {
    pub(crate) fn new(request: &'a PipelineRequest, response: &'a mut PipelineResponse) -> Self {
        response.items.clear();

        Self {
            request,
            response,
            stage_index: 0,
            reader: None,
            first_error: None,
            step: PipelineStep::Initial,
        }
    }

    // Applies the session-level effects of a successful stage.
    fn apply_stage_effects(&mut self, st: &mut SessionState) {
        match self.request.stages[self.stage_index].kind {
            StageKind::SetCharacterSet(charset) => st.charset = Some(charset),

            // The server reverted to its default character set, which
            // we cannot know; a SET NAMES stage usually follows.
            StageKind::ResetConnection => st.charset = None,

            _ => {}
        }
    }

    fn advance_stage(&mut self, st: &mut SessionState, result: Result<()>) -> Result<()> {
        let reader = self.reader.take().expect("stage reader set");

        match result {
            Ok(()) => {
                self.apply_stage_effects(st);
                self.response.items.push(reader.finish());
            }

            Err(err) => {
                // Fatal errors desynchronize the whole connection: stop.
                if err.is_fatal() {
                    self.response
                        .items
                        .push(StageOutcome::Error(err.clone_for_report()));
                    return Err(err);
                }

                if self.first_error.is_none() {
                    self.first_error = Some(err.clone_for_report());
                }
                self.response.items.push(StageOutcome::Error(err));
            }
        }

        self.stage_index += 1;
        Ok(())
    }
}

impl SessionAlgo for RunPipelineAlgo<'_> {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                PipelineStep::Initial => {
                    if let Err(e) = st.check_status_ready() {
                        return NextAction::Done(Err(e));
                    }

                    if self.request.stages.is_empty() {
                        return NextAction::Done(Ok(()));
                    }

                    if self.request.buffer.len() > st.reader.max_buffer_size() {
                        return NextAction::Done(Err(ClientError::MaxBufferSizeExceeded.into()));
                    }

                    st.write_raw(&self.request.buffer);
                    self.step = PipelineStep::Writing;
                    return NextAction::Write;
                }

                PipelineStep::Writing => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    self.reader = Some(StageReader::new(
                        &self.request.stages[0],
                        st.meta_mode,
                    ));
                    self.step = PipelineStep::Stage;
                }

                PipelineStep::Stage => {
                    let reader = self.reader.as_mut().expect("stage reader set");

                    match reader.resume(st, err.take()) {
                        StepResult::Action(action) => return action,

                        StepResult::Done(result) => {
                            if let Err(e) = self.advance_stage(st, result) {
                                return NextAction::Done(Err(e));
                            }

                            if self.stage_index >= self.request.stages.len() {
                                return NextAction::Done(match self.first_error.take() {
                                    Some(e) => Err(e),
                                    None => Ok(()),
                                });
                            }

                            self.reader = Some(StageReader::new(
                                &self.request.stages[self.stage_index],
                                st.meta_mode,
                            ));
                        }
                    }
                }
            }
        }
    }
}

/// The reset sequence the pool uses between checkouts: scrub server
/// state, then pin the character set back to the handshake default.
pub(crate) fn reset_request() -> PipelineRequest {
    let mut request = PipelineRequest::new();
    request.add_reset_connection();
    request
        .add_set_character_set(crate::session::handshake_charset().name())
        .expect("the handshake character set is always known");
    request
}
