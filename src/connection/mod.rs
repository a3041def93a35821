//! The async I/O driver.
//!
//! [`Connection`] runs the sans-I/O session machine over any
//! [`Transport`], translating `NextAction`s into socket reads/writes
//! and TLS upgrades, and applying per-operation timeouts.

use std::time::Duration;

use futures_core::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

mod options;
mod socket;
mod tls;

pub use options::{ConnectOptions, ServerAddress, SslMode};
pub use socket::MaybeTlsStream;

use crate::error::{ClientError, Error, Result};
use crate::resultset::{Results, Statement};
use crate::row::Row;
use crate::session::{
    ConnectParams, ExecRequest, ExecuteAlgo, ExecutionState, HandshakeAlgo, InitDbAlgo,
    NextAction, PipelineRequest, PipelineResponse, PrepareAlgo, QuitAlgo, ReadResultsetHeadAlgo,
    ReadSomeRowsAlgo, RunPipelineAlgo, SessionAlgo, SessionState, SessionStatus,
    StartExecutionAlgo,
};
use crate::value::Field;
use crate::CharacterSet;

/// An abstract byte stream a session can run over.
///
/// Beyond plain reads and writes, the session machine may request a
/// TLS handshake or shutdown; transports that cannot upgrade report
/// [`ClientError::UnknownTlsError`].
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Whether cleartext credentials may cross this transport (TLS
    /// active, or a local socket).
    fn is_secure(&self) -> bool {
        false
    }

    /// Whether a TLS upgrade can be requested.
    fn supports_tls(&self) -> bool {
        false
    }

    fn tls_handshake<'a>(&'a mut self, _options: &'a ConnectOptions) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(ClientError::UnknownTlsError.into()) })
    }

    fn tls_shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Err(ClientError::UnknownTlsError.into()) })
    }
}

/// Wraps any byte stream into a [`Transport`] without TLS support.
/// Useful for custom transports and in-memory testing.
pub struct PlainStream<S>(pub S);

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport for PlainStream<S> {}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for PlainStream<S> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for PlainStream<S> {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

/// A single session with a MySQL or MariaDB server.
///
/// All operations take `&mut self`: a session is never driven by two
/// tasks at once. Cancelling an operation mid-flight (dropping its
/// future, or via the configured [`operation_timeout`]) leaves the
/// protocol state indeterminate; the session then refuses further
/// commands and must be closed.
///
/// [`operation_timeout`]: Connection::operation_timeout
pub struct Connection<S: Transport = MaybeTlsStream> {
    stream: S,
    session: SessionState,
    options: ConnectOptions,
    op_timeout: Option<Duration>,
}

impl Connection {
    /// Opens the transport and performs the whole session
    /// establishment: handshake, capability negotiation, optional TLS
    /// upgrade, and authentication.
    pub async fn connect(options: &ConnectOptions) -> Result<Self> {
        let socket = socket::Socket::connect(options.address()).await?;
        let stream = MaybeTlsStream::raw(socket);

        let mut conn = Connection::with_transport(stream, options.clone());
        conn.handshake().await?;

        Ok(conn)
    }

    /// Whether the transport was upgraded to TLS.
    pub fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }
}

impl<S: Transport> Connection<S> {
    /// Wraps an already-open transport. The session starts
    /// not-connected; call [`handshake`](Self::handshake).
    pub fn with_transport(stream: S, options: ConnectOptions) -> Self {
        let session = SessionState::new(
            options.initial_buffer_size.min(options.max_buffer_size),
            options.max_buffer_size,
            stream.supports_tls(),
            stream.is_secure(),
        );

        let mut session = session;
        session.meta_mode = options.metadata_mode;

        Self {
            stream,
            session,
            options,
            op_timeout: None,
        }
    }

    /// Applies `timeout` to every subsequent operation. A timed-out
    /// operation aborts its in-flight I/O and poisons the session.
    /// `None` disables the timeout.
    pub fn operation_timeout(&mut self, timeout: Option<Duration>) {
        self.op_timeout = timeout;
    }

    /// The connection id the server assigned (usable in `KILL`).
    pub fn connection_id(&self) -> u32 {
        self.session.connection_id
    }

    /// The server version string from the handshake.
    pub fn server_version(&self) -> &str {
        &self.session.server_version
    }

    /// The session character set, when known.
    pub fn charset(&self) -> Option<CharacterSet> {
        self.session.charset
    }

    /// Whether backslash escape sequences are active in the session.
    pub fn backslash_escapes(&self) -> bool {
        self.session.backslash_escapes
    }

    /// Performs the handshake on a transport opened externally.
    pub async fn handshake(&mut self) -> Result<()> {
        let params = ConnectParams {
            username: self.options.username.clone(),
            password: self.options.password.clone(),
            database: self.options.database.clone(),
            ssl_mode: self.options.ssl_mode,
            multi_queries: self.options.multi_queries,
        };

        let mut algo = HandshakeAlgo::new(params);
        self.run_algo(&mut algo).await
    }

    /// Runs a textual query, aggregating every row of every resultset.
    pub async fn execute(&mut self, sql: &str) -> Result<Results> {
        let mut algo = ExecuteAlgo::new(ExecRequest::Query(sql), self.session.meta_mode);
        self.run_algo(&mut algo).await?;

        Ok(algo.take_results())
    }

    /// Executes a prepared statement with the given parameters,
    /// aggregating the response.
    pub async fn execute_statement(
        &mut self,
        statement: &Statement,
        params: &[Field],
    ) -> Result<Results> {
        let req = ExecRequest::Statement {
            statement: *statement,
            params,
        };

        let mut algo = ExecuteAlgo::new(req, self.session.meta_mode);
        self.run_algo(&mut algo).await?;

        Ok(algo.take_results())
    }

    /// Starts a multi-function operation: writes the query and reads
    /// the first resultset head. Rows are then pulled with
    /// [`read_some_rows`](Self::read_some_rows).
    pub async fn start_execution(&mut self, sql: &str) -> Result<ExecutionState> {
        let mut state = ExecutionState::new();

        let mut algo = StartExecutionAlgo::new(ExecRequest::Query(sql), &mut state);
        self.run_algo(&mut algo).await?;
        drop(algo);

        Ok(state)
    }

    /// Statement flavor of [`start_execution`](Self::start_execution).
    pub async fn start_execution_statement(
        &mut self,
        statement: &Statement,
        params: &[Field],
    ) -> Result<ExecutionState> {
        let mut state = ExecutionState::new();

        let req = ExecRequest::Statement {
            statement: *statement,
            params,
        };
        let mut algo = StartExecutionAlgo::new(req, &mut state);
        self.run_algo(&mut algo).await?;
        drop(algo);

        Ok(state)
    }

    /// Reads a batch of rows of an engaged multi-function operation.
    /// An empty batch means the current resultset is done: check
    /// [`ExecutionState::should_read_head`] /
    /// [`ExecutionState::is_complete`].
    pub async fn read_some_rows(&mut self, state: &mut ExecutionState) -> Result<Vec<Row>> {
        let mut algo = ReadSomeRowsAlgo::new(state);
        self.run_algo(&mut algo).await?;

        Ok(algo.take_rows())
    }

    /// Reads the next resultset head of a multi-resultset command.
    pub async fn read_resultset_head(&mut self, state: &mut ExecutionState) -> Result<()> {
        let mut algo = ReadResultsetHeadAlgo::new(state);
        self.run_algo(&mut algo).await
    }

    /// Prepares a server-side statement. The returned handle must be
    /// closed with [`close_statement`](Self::close_statement).
    pub async fn prepare_statement(&mut self, sql: &str) -> Result<Statement> {
        let mut algo = PrepareAlgo::new(sql);
        self.run_algo(&mut algo).await?;

        algo.statement()
            .ok_or_else(|| ClientError::ProtocolValueError.into())
    }

    /// Deallocates a prepared statement (fire-and-forget).
    pub async fn close_statement(&mut self, statement: &Statement) -> Result<()> {
        let mut request = PipelineRequest::new();
        request.add_close_statement(statement);

        self.run_single_stage(&request).await
    }

    /// Checks that the server is alive.
    pub async fn ping(&mut self) -> Result<()> {
        let mut request = PipelineRequest::new();
        request.add_ping();

        self.run_single_stage(&request).await
    }

    /// Asks the server to scrub session state (variables, temporary
    /// tables, prepared statements). The session character set becomes
    /// unknown until the next [`set_character_set`](Self::set_character_set).
    pub async fn reset_connection(&mut self) -> Result<()> {
        let mut request = PipelineRequest::new();
        request.add_reset_connection();

        self.run_single_stage(&request).await
    }

    /// Issues a validated `SET NAMES` and records the new character
    /// set. Unknown names are rejected before any bytes are sent.
    pub async fn set_character_set(&mut self, name: &str) -> Result<()> {
        let mut request = PipelineRequest::new();
        request.add_set_character_set(name)?;

        self.run_single_stage(&request).await
    }

    /// Changes the default schema (`USE <schema>`).
    pub async fn set_schema(&mut self, schema: &str) -> Result<()> {
        let mut algo = InitDbAlgo::new(schema);
        self.run_algo(&mut algo).await
    }

    /// Writes all pipeline stages with a single write, then consumes
    /// every stage's response into `response`, in order, regardless of
    /// per-stage errors. The result is the first stage error, if any.
    pub async fn run_pipeline(
        &mut self,
        request: &PipelineRequest,
        response: &mut PipelineResponse,
    ) -> Result<()> {
        let mut algo = RunPipelineAlgo::new(request, response);
        self.run_algo(&mut algo).await
    }

    /// Sends QUIT. The server replies by closing the transport; the
    /// session transitions to not-connected.
    pub async fn quit(&mut self) -> Result<()> {
        let mut algo = QuitAlgo::new();
        self.run_algo(&mut algo).await
    }

    /// Sends QUIT and closes the transport.
    pub async fn close(mut self) -> Result<()> {
        // A poisoned session (cancelled mid-operation) skips the polite
        // goodbye; the server notices the socket close.
        if !self.session.op_in_progress {
            let mut algo = QuitAlgo::new();
            let _ = self.run_algo(&mut algo).await;
        }

        self.stream.shutdown().await?;
        Ok(())
    }

    // -----------------------------------------------------------------

    async fn run_algo(&mut self, algo: &mut dyn SessionAlgo) -> Result<()> {
        match self.op_timeout {
            None => self.run_algo_inner(algo).await,

            Some(timeout) => {
                match tokio::time::timeout(timeout, self.run_algo_inner(algo)).await {
                    Ok(result) => result,
                    Err(_) => {
                        // The inner future was dropped mid-operation: a
                        // partial packet may be in flight. The session
                        // is unusable from here on.
                        self.session.status = SessionStatus::NotConnected;
                        Err(ClientError::OperationAborted.into())
                    }
                }
            }
        }
    }

    async fn run_algo_inner(&mut self, algo: &mut dyn SessionAlgo) -> Result<()> {
        if self.session.op_in_progress {
            return Err(ClientError::OperationInProgress.into());
        }
        self.session.op_in_progress = true;

        let mut input: Option<Error> = None;

        let result = loop {
            match algo.resume(&mut self.session, input.take()) {
                NextAction::Done(result) => break result,

                NextAction::Read => {
                    input = self.fill_message().await.err();
                }

                NextAction::Write => {
                    input = self.flush_write().await.err();
                }

                NextAction::TlsHandshake => {
                    let Self {
                        stream, options, ..
                    } = self;
                    input = stream.tls_handshake(options).await.err();
                }

                NextAction::TlsShutdown => {
                    input = self.stream.tls_shutdown().await.err();
                }
            }
        };

        self.session.op_in_progress = false;

        if let Err(err) = &result {
            if err.is_fatal() {
                log::debug!("session poisoned by: {}", err);
                self.session.status = SessionStatus::NotConnected;
            }
        }

        result
    }

    async fn fill_message(&mut self) -> Result<()> {
        let Self {
            stream, session, ..
        } = self;

        while !session.reader.done() {
            session.reader.prepare_buffer()?;

            let n = stream.read(session.reader.free_area()).await?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )));
            }

            session.reader.resume(n)?;
        }

        Ok(())
    }

    async fn flush_write(&mut self) -> Result<()> {
        let Self {
            stream, session, ..
        } = self;

        log::trace!("writing {} bytes", session.write_buffer.len());

        stream.write_all(&session.write_buffer).await?;
        stream.flush().await?;
        session.write_buffer.clear();

        Ok(())
    }

    async fn run_single_stage(&mut self, request: &PipelineRequest) -> Result<()> {
        let mut response = PipelineResponse::new();
        let mut algo = RunPipelineAlgo::new(request, &mut response);
        self.run_algo(&mut algo).await
    }
}

impl<S: Transport> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connection_id", &self.session.connection_id)
            .finish()
    }
}
