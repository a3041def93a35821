//! Error and Result types.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::io;

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All the ways an operation can fail.
///
/// Client-detected conditions carry a [`ClientError`] code; failures the
/// server reported carry the server's own diagnostics in a
/// [`ServerError`], kept separate from any library text because the
/// server message may contain untrusted input encoded in the
/// connection's character set.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A client-side error identified by its code alone.
    #[error("{0}")]
    Client(#[from] ClientError),

    /// Unexpected or invalid data received from the server. This means
    /// either a bug in this driver or a corrupted connection. Context is
    /// provided by the included message.
    #[error("protocol error: {0}")]
    Protocol(Box<str>),

    /// A typed-access check failed; `reason` is human-readable detail.
    #[error("{code}: {reason}")]
    TypeCheck { code: ClientError, reason: Box<str> },

    /// Invalid configuration detected before any I/O happened.
    #[error("configuration error: {0}")]
    Config(Box<str>),

    /// An error packet returned by the server.
    #[error("{0}")]
    Server(Box<ServerError>),

    /// Error communicating with the server.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// An error occurred during a TLS upgrade or shutdown.
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// The client error code, when there is one.
    ///
    /// Free-text protocol errors map to
    /// [`ClientError::ProtocolValueError`].
    pub fn code(&self) -> Option<ClientError> {
        match self {
            Error::Client(code) => Some(*code),
            Error::Protocol(_) => Some(ClientError::ProtocolValueError),
            Error::TypeCheck { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The server diagnostics, when the server produced this error.
    pub fn server(&self) -> Option<&ServerError> {
        match self {
            Error::Server(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn tls<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Tls(Box::new(err))
    }

    /// A best-effort duplicate, used when one failure must be reported
    /// in two places (a pipeline stage outcome and the overall result).
    pub(crate) fn clone_for_report(&self) -> Error {
        match self {
            Error::Client(code) => Error::Client(*code),
            Error::Protocol(msg) => Error::Protocol(msg.clone()),
            Error::Config(msg) => Error::Config(msg.clone()),
            Error::TypeCheck { code, reason } => Error::TypeCheck {
                code: *code,
                reason: reason.clone(),
            },
            Error::Server(err) => Error::Server(err.clone()),
            Error::Io(err) => Error::Io(io::Error::new(err.kind(), err.to_string())),
            Error::Tls(err) => Error::Protocol(err.to_string().into_boxed_str()),
        }
    }

    /// Whether the session that produced this error is left in an
    /// indeterminate protocol state and must be re-established.
    ///
    /// Server-reported errors and precondition checks performed before
    /// any bytes move are non-fatal; everything else (I/O, TLS, framing,
    /// decode) is.
    pub(crate) fn is_fatal(&self) -> bool {
        match self {
            Error::Server(_) | Error::TypeCheck { .. } | Error::Config(_) => false,
            Error::Client(code) => !matches!(
                code,
                ClientError::OperationInProgress
                    | ClientError::NotConnected
                    | ClientError::EngagedInMultiFunction
                    | ClientError::NotEngagedInMultiFunction
                    | ClientError::WrongNumParams
                    | ClientError::UnknownCharacterSet
                    | ClientError::PoolNotRunning
                    | ClientError::PoolCancelled
                    | ClientError::NoConnectionAvailable
            ),
            Error::Protocol(_) | Error::Io(_) | Error::Tls(_) => true,
        }
    }
}

/// Client-defined error codes, produced by this library rather than the
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// An incomplete message was received from the server.
    #[error("incomplete message received from the server")]
    IncompleteMessage,

    /// An unexpected value was found in a server-received message.
    #[error("unexpected value in a message received from the server")]
    ProtocolValueError,

    /// Unexpected bytes at the end of a message.
    #[error("unexpected extra bytes at the end of a message")]
    ExtraBytes,

    /// Mismatched frame sequence numbers.
    #[error("mismatched sequence numbers")]
    SequenceNumberMismatch,

    /// The server requested an authentication plugin not known to this
    /// library.
    #[error("unknown authentication plugin")]
    UnknownAuthPlugin,

    /// The authentication plugin requires the connection to use a secure
    /// channel (TLS or a UNIX socket).
    #[error("the authentication plugin requires a secure channel")]
    AuthPluginRequiresSecureChannel,

    /// The server does not support the minimum required capabilities.
    #[error("the server does not support the minimum required capabilities")]
    ServerUnsupported,

    /// The number of parameters passed to a prepared statement does not
    /// match its declared parameter count.
    #[error("wrong number of statement parameters")]
    WrongNumParams,

    /// Column metadata does not match the caller's field descriptors.
    #[error("metadata check failed")]
    MetadataCheckFailed,

    /// The number of row types does not match the number of resultsets
    /// returned by the query.
    #[error("mismatched number of resultsets")]
    NumResultsetsMismatch,

    /// The row type being parsed does not correspond to the resultset
    /// being read.
    #[error("row type mismatch")]
    RowTypeMismatch,

    /// A field could not be parsed into the requested static row type.
    #[error("error parsing a field into a static row")]
    StaticRowParsingError,

    /// The requested character set is not known to this library.
    #[error("unknown character set")]
    UnknownCharacterSet,

    /// The server sent a collation id not known to this library.
    #[error("unknown collation")]
    UnknownCollation,

    /// Reading a message would grow the read buffer past its configured
    /// maximum.
    #[error("maximum buffer size exceeded")]
    MaxBufferSizeExceeded,

    /// Another operation is already in progress on this session.
    #[error("another operation is in progress on this session")]
    OperationInProgress,

    /// The operation requires an established session.
    #[error("the session is not connected")]
    NotConnected,

    /// The session is engaged in a multi-function operation that must be
    /// finished first.
    #[error("the session is engaged in a multi-function operation")]
    EngagedInMultiFunction,

    /// The operation requires an engaged multi-function operation.
    #[error("the session is not engaged in a multi-function operation")]
    NotEngagedInMultiFunction,

    /// During handshake, the server sent a packet type that is not
    /// allowed in the current state.
    #[error("unexpected packet type during handshake")]
    BadHandshakePacketType,

    /// A TLS function failed without further diagnostics.
    #[error("unknown TLS error")]
    UnknownTlsError,

    /// The server requested a protocol feature this library does not
    /// implement (e.g. `LOCAL INFILE`).
    #[error("unsupported protocol feature requested by the server")]
    Unsupported,

    /// The in-flight I/O was cancelled; the session state is
    /// indeterminate and the session must be re-established.
    #[error("the operation was aborted")]
    OperationAborted,

    /// `get_connection` was called before the pool was run.
    #[error("the pool is not running")]
    PoolNotRunning,

    /// The pool was cancelled.
    #[error("the pool was cancelled")]
    PoolCancelled,

    /// No connection became available before the configured timeout.
    #[error("no connection available")]
    NoConnectionAvailable,
}

/// An error packet returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    code: u16,
    sql_state: Box<str>,
    message: Box<str>,
}

impl ServerError {
    pub(crate) fn new(code: u16, sql_state: impl Into<Box<str>>, message: impl Into<Box<str>>) -> Self {
        Self {
            code,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }

    /// The server's numeric error code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The five-character SQLSTATE associated with this error.
    pub fn sql_state(&self) -> &str {
        &self.sql_state
    }

    /// The server-provided message. May contain untrusted user input and
    /// is encoded in the connection's character set.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (server error {}, SQLSTATE {})",
            self.message, self.code, self.sql_state
        )
    }
}

impl StdError for ServerError {}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(Box::new(err))
    }
}

macro_rules! protocol_err {
    ($($args:tt)*) => {
        $crate::error::Error::Protocol(format!($($args)*).into_boxed_str())
    };
}
