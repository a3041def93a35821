//! Asynchronous client core for the MySQL/MariaDB wire protocol.
//!
//! The crate is layered bottom-up:
//!
//! - [`io`]: packet framing (length-prefixed frames, 16 MB message joins)
//!   and the wire-level primitive readers/writers.
//! - [`protocol`]: typed encode/decode for every packet the client sends
//!   or receives.
//! - [`session`]: a sans-I/O, resumable state machine owning handshake,
//!   command dispatch, resultset consumption and pipelining.
//! - [`connection`]: the async driver that runs a session over a TCP,
//!   TLS or UNIX-socket transport.
//! - [`pool`]: a bounded pool of healthy connections with background
//!   pings and reconnection.

#![forbid(unsafe_code)]

#[macro_use]
pub mod error;

mod collation;

#[doc(hidden)]
pub mod io;

pub mod protocol;

mod row;
mod value;

mod resultset;

pub mod session;

pub mod connection;
pub mod pool;

pub mod typed;

pub use collation::CharacterSet;
pub use connection::{
    ConnectOptions, Connection, MaybeTlsStream, PlainStream, ServerAddress, SslMode, Transport,
};
pub use error::{ClientError, Error, Result, ServerError};
pub use pool::{ManagedConnection, Pool, PoolOptions, PooledConnection};
pub use resultset::{Results, Resultset, ResultsetInfo, Statement};
pub use row::Row;
pub use session::{ExecutionState, PipelineRequest, PipelineResponse, StageOutcome};
pub use value::{ColumnType, Date, DateTime, Field, FieldRef, TimeDelta};
