//! The sans-I/O session state machine.
//!
//! Every operation is a resumable sub-machine ([`SessionAlgo`]) that
//! advances shared [`SessionState`] and yields [`NextAction`]s; the
//! async driver in [`crate::connection`] performs the I/O and resumes
//! the machine. Parsing, serialization and state transitions are all
//! synchronous, so the same machines back async, blocking or scripted
//! (test) execution.

use crate::collation::HANDSHAKE_COLLATION;
use crate::error::{ClientError, Error, Result};
use crate::io::{write_message, MessageReader};
use crate::protocol::{Capabilities, Encode, MetadataMode, OkPacket};
use crate::CharacterSet;

mod execute;
mod handshake;
mod pipeline;
mod processor;
mod simple;

pub use execute::ExecutionState;
pub use pipeline::{PipelineRequest, PipelineResponse, StageOutcome};

pub(crate) use execute::{
    ExecRequest, ExecuteAlgo, PrepareAlgo, ReadResultsetHeadAlgo, ReadSomeRowsAlgo,
    StartExecutionAlgo,
};
pub(crate) use handshake::{ConnectParams, HandshakeAlgo};
pub(crate) use pipeline::{reset_request, RunPipelineAlgo};
pub(crate) use simple::{InitDbAlgo, QuitAlgo};

/// Max-packet-size value advertised in the handshake response.
pub(crate) const MAX_PACKET_SIZE: u32 = 0x0100_0000;

/// What the I/O driver must do next to advance an operation.
#[derive(Debug)]
pub(crate) enum NextAction {
    /// Read frames into the session's reader until a message completes.
    Read,

    /// Drain the session's write buffer.
    Write,

    /// Perform the transport-level TLS handshake.
    TlsHandshake,

    /// Perform the transport-level TLS shutdown.
    TlsShutdown,

    /// The operation finished.
    Done(Result<()>),
}

/// A resumable operation.
///
/// `resume` is first called with `None`; after each completed (or
/// failed) action the driver calls it again with the action's error, if
/// any. Once `Done` is returned the machine must not be resumed again.
pub(crate) trait SessionAlgo: Send {
    fn resume(&mut self, st: &mut SessionState, err: Option<Error>) -> NextAction;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionStatus {
    NotConnected,
    Ready,
    EngagedInMultiFunction,
}

/// Are we talking to MySQL or MariaDB? Detected from the server version
/// string during handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Flavor {
    #[default]
    MySql,
    MariaDb,
}

pub(crate) struct SessionState {
    pub(crate) status: SessionStatus,

    // Prevents two operations from being interleaved on one session.
    pub(crate) op_in_progress: bool,

    pub(crate) flavor: Flavor,
    pub(crate) server_version: Box<str>,
    pub(crate) capabilities: Capabilities,
    pub(crate) connection_id: u32,

    // Whether the transport can be upgraded to TLS, and whether it has
    // been.
    pub(crate) tls_supported: bool,
    pub(crate) tls_active: bool,

    // UNIX sockets count as secure without TLS (cleartext auth rule).
    pub(crate) transport_is_secure: bool,

    // Do backslashes start escape sequences? OK packets carry the flag.
    pub(crate) backslash_escapes: bool,

    // The session character set; `None` when it cannot be known (before
    // handshake, or after a reset until SET NAMES runs).
    pub(crate) charset: Option<CharacterSet>,

    pub(crate) meta_mode: MetadataMode,

    pub(crate) reader: MessageReader,
    pub(crate) write_buffer: Vec<u8>,

    // Payloads are serialized here before framing into write_buffer.
    scratch: Vec<u8>,
}

impl SessionState {
    pub(crate) fn new(
        initial_buffer_size: usize,
        max_buffer_size: usize,
        tls_supported: bool,
        transport_is_secure: bool,
    ) -> Self {
        Self {
            status: SessionStatus::NotConnected,
            op_in_progress: false,
            flavor: Flavor::MySql,
            server_version: Box::default(),
            capabilities: Capabilities::empty(),
            connection_id: 0,
            tls_supported,
            tls_active: false,
            transport_is_secure,
            backslash_escapes: true,
            charset: None,
            meta_mode: MetadataMode::default(),
            reader: MessageReader::new(initial_buffer_size, max_buffer_size),
            write_buffer: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Back to the not-connected state, keeping buffers allocated.
    pub(crate) fn reset(&mut self) {
        self.status = SessionStatus::NotConnected;
        self.flavor = Flavor::MySql;
        self.server_version = Box::default();
        self.capabilities = Capabilities::empty();
        self.connection_id = 0;
        self.tls_active = false;
        self.backslash_escapes = true;
        self.charset = None;
        self.reader.reset();
        self.write_buffer.clear();
    }

    /// Whether cleartext credentials may cross this transport.
    pub(crate) fn is_secure(&self) -> bool {
        self.tls_active || self.transport_is_secure
    }

    pub(crate) fn check_status_ready(&self) -> Result<()> {
        match self.status {
            SessionStatus::NotConnected => Err(ClientError::NotConnected.into()),
            SessionStatus::EngagedInMultiFunction => {
                Err(ClientError::EngagedInMultiFunction.into())
            }
            SessionStatus::Ready => Ok(()),
        }
    }

    pub(crate) fn check_status_multi_function(&self) -> Result<()> {
        match self.status {
            SessionStatus::NotConnected => Err(ClientError::NotConnected.into()),
            SessionStatus::Ready => Err(ClientError::NotEngagedInMultiFunction.into()),
            SessionStatus::EngagedInMultiFunction => Ok(()),
        }
    }

    /// Serializes `packet` into the write buffer as one message,
    /// advancing `seqnum` past the frames written.
    pub(crate) fn write_packet<T: Encode>(&mut self, packet: T, seqnum: &mut u8) -> Result<()> {
        self.scratch.clear();
        packet.encode(&mut self.scratch, self.capabilities);

        self.write_buffer.clear();
        *seqnum = write_message(
            &self.scratch,
            &mut self.write_buffer,
            *seqnum,
            self.reader.max_buffer_size(),
        )?;

        Ok(())
    }

    /// Puts pre-framed bytes (a pipeline request) into the write buffer.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(bytes);
    }

    /// Starts reading the message whose first frame carries `seqnum`.
    pub(crate) fn begin_read(&mut self, seqnum: u8, keep_state: bool) -> Result<()> {
        self.reader.prepare_read(seqnum, keep_state)
    }

    /// Applies the session-wide side effects of an OK packet.
    pub(crate) fn apply_ok(&mut self, ok: &OkPacket) {
        self.backslash_escapes = ok.backslash_escapes();
    }

    /// Decodes the current message as an OK or ERR response.
    pub(crate) fn process_ok_response(&mut self) -> Result<OkPacket> {
        let msg = self.reader.message();

        match msg.first() {
            Some(&0xFF) => {
                let err = crate::protocol::ErrPacket::read(msg)?;
                Err(err.into_server_error().into())
            }
            _ => {
                let ok = OkPacket::read(msg)?;
                self.apply_ok(&ok);
                Ok(ok)
            }
        }
    }
}

/// The collation advertised during handshake, recorded as the session
/// character set once the handshake succeeds.
pub(crate) fn handshake_charset() -> CharacterSet {
    CharacterSet::UTF8MB4
}

pub(crate) fn handshake_collation() -> u8 {
    HANDSHAKE_COLLATION
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted driver for exercising session machines without I/O.

    use super::*;

    pub(crate) struct Script {
        // Messages the "server" will answer with, already framed.
        wire: Vec<u8>,
        consumed: usize,
        // Everything the machine wrote.
        pub(crate) written: Vec<u8>,
    }

    impl Script {
        pub(crate) fn new() -> Self {
            Self {
                wire: Vec::new(),
                consumed: 0,
                written: Vec::new(),
            }
        }

        /// Frames `payload` as a server message starting at `seqnum`.
        pub(crate) fn push_server_message(&mut self, payload: &[u8], seqnum: u8) {
            write_message(payload, &mut self.wire, seqnum, usize::MAX).unwrap();
        }

        /// Runs `algo` to completion against the scripted wire.
        pub(crate) fn run(
            &mut self,
            st: &mut SessionState,
            algo: &mut dyn SessionAlgo,
        ) -> Result<()> {
            let mut input: Option<Error> = None;

            loop {
                match algo.resume(st, input.take()) {
                    NextAction::Done(result) => {
                        st.op_in_progress = false;
                        if let Err(err) = &result {
                            if err.is_fatal() {
                                st.status = SessionStatus::NotConnected;
                            }
                        }
                        return result;
                    }

                    NextAction::Read => {
                        input = self.fill_one_message(st).err();
                    }

                    NextAction::Write => {
                        self.written.extend_from_slice(&st.write_buffer);
                        st.write_buffer.clear();
                    }

                    NextAction::TlsHandshake | NextAction::TlsShutdown => {
                        panic!("TLS is not scripted in unit tests");
                    }
                }
            }
        }

        fn fill_one_message(&mut self, st: &mut SessionState) -> Result<()> {
            while !st.reader.done() {
                st.reader.prepare_buffer()?;

                let free = st.reader.free_area();
                let available = &self.wire[self.consumed..];
                assert!(
                    !available.is_empty(),
                    "machine wants to read but the script has no more server bytes"
                );

                let n = free.len().min(available.len());
                free[..n].copy_from_slice(&available[..n]);
                self.consumed += n;
                st.reader.resume(n)?;
            }

            Ok(())
        }
    }

    pub(crate) fn ready_session() -> SessionState {
        let mut st = SessionState::new(1024, usize::MAX, false, false);
        st.status = SessionStatus::Ready;
        st.capabilities = Capabilities::mandatory() | Capabilities::MULTI_RESULTS;
        st.charset = Some(handshake_charset());
        st
    }
}
