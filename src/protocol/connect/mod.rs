//! Packets exchanged during session establishment.

mod auth_switch;
mod handshake;
mod handshake_response;
mod ssl_request;

pub use auth_switch::{AuthMoreData, AuthSwitch};
pub use handshake::Handshake;
pub use handshake_response::HandshakeResponse;
pub use ssl_request::SslRequest;
