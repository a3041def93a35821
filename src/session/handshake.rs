//! The handshake sub-machine: initial packet, capability negotiation,
//! optional TLS upgrade, and the pluggable-auth loop.

use crate::error::{ClientError, Error, Result};
use crate::io::BufMutExt;
use crate::protocol::auth::{AuthPlugin, FAST_AUTH_OK, PERFORM_FULL_AUTH};
use crate::protocol::connect::{AuthMoreData, AuthSwitch, Handshake, HandshakeResponse, SslRequest};
use crate::protocol::{Capabilities, Encode, ErrPacket};
use crate::session::{
    handshake_charset, handshake_collation, Flavor, NextAction, SessionAlgo, SessionState,
    SessionStatus, MAX_PACKET_SIZE,
};
use crate::SslMode;

/// Credentials and switches the handshake needs.
#[derive(Debug, Clone)]
pub(crate) struct ConnectParams {
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) database: Option<String>,
    pub(crate) ssl_mode: SslMode,
    pub(crate) multi_queries: bool,
}

// Raw auth data sent as a bare packet during the auth loop.
struct AuthData<'a>(&'a [u8]);

impl Encode for AuthData<'_> {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_bytes(self.0);
    }
}

enum Step {
    Initial,
    ReadHello,
    WritingSslRequest,
    TlsHandshake,
    WritingResponse,
    ReadReply,
    WritingAuthData,
}

pub(crate) struct HandshakeAlgo {
    params: ConnectParams,
    step: Step,
    seqnum: u8,

    // Filled from the initial handshake packet.
    plugin: Option<AuthPlugin>,
    challenge: Box<[u8]>,

    // At most one auth switch is accepted per handshake.
    switched: bool,
}

impl HandshakeAlgo {
    pub(crate) fn new(params: ConnectParams) -> Self {
        Self {
            params,
            step: Step::Initial,
            seqnum: 0,
            plugin: None,
            challenge: Box::default(),
            switched: false,
        }
    }

    /// Intersects what we want with what the server offers; fails when
    /// a required capability is missing.
    fn negotiate(&self, st: &SessionState, server: Capabilities) -> Result<(Capabilities, bool)> {
        let mut required = Capabilities::mandatory() | Capabilities::MULTI_RESULTS;

        if self.params.database.is_some() {
            required |= Capabilities::CONNECT_WITH_DB;
        }

        if self.params.multi_queries {
            required |= Capabilities::MULTI_STATEMENTS;
        }

        if !server.contains(required) {
            return Err(ClientError::ServerUnsupported.into());
        }

        let server_ssl = server.contains(Capabilities::SSL);
        let use_ssl = match self.params.ssl_mode {
            SslMode::Disable => false,
            SslMode::Enable => st.tls_supported && server_ssl,
            SslMode::Require => {
                if !st.tls_supported || !server_ssl {
                    return Err(ClientError::ServerUnsupported.into());
                }

                true
            }
        };

        let mut negotiated = required;
        if use_ssl {
            negotiated |= Capabilities::SSL;
        }

        Ok((negotiated, use_ssl))
    }

    fn compute_auth_response(&self, st: &SessionState) -> Result<Vec<u8>> {
        let plugin = self.plugin.ok_or(ClientError::UnknownAuthPlugin)?;
        plugin.compute_response(&self.params.password, &self.challenge, st.is_secure())
    }

    fn write_response(&mut self, st: &mut SessionState) -> Result<()> {
        let auth_response = self.compute_auth_response(st)?;
        let plugin = self.plugin.ok_or(ClientError::UnknownAuthPlugin)?;

        st.write_packet(
            HandshakeResponse {
                max_packet_size: MAX_PACKET_SIZE,
                collation: handshake_collation(),
                username: &self.params.username,
                database: self.params.database.as_deref(),
                auth_plugin_name: plugin.name(),
                auth_response: &auth_response,
            },
            &mut self.seqnum,
        )
    }

    fn finish(&self, st: &mut SessionState) -> NextAction {
        st.status = SessionStatus::Ready;
        st.charset = Some(handshake_charset());
        NextAction::Done(Ok(()))
    }

    // Handles one packet of the post-response auth conversation.
    fn on_reply(&mut self, st: &mut SessionState) -> Result<Option<NextAction>> {
        self.seqnum = st.reader.sequence_number();
        let msg = st.reader.message();

        match msg.first().copied() {
            Some(0x00) => {
                st.process_ok_response()?;
                Ok(Some(self.finish(st)))
            }

            Some(0xFF) => Err(ErrPacket::read(msg)?.into_server_error().into()),

            // Auth switch request: re-run authentication with a new
            // plugin and challenge.
            Some(0xFE) => {
                if self.switched {
                    return Err(ClientError::BadHandshakePacketType.into());
                }
                self.switched = true;

                let switch = AuthSwitch::read(msg)?;
                self.plugin = Some(AuthPlugin::from_name(&switch.plugin_name)?);
                self.challenge = switch.challenge;

                let response = self.compute_auth_response(st)?;
                st.write_packet(AuthData(&response), &mut self.seqnum)?;

                self.step = Step::WritingAuthData;
                Ok(Some(NextAction::Write))
            }

            // Plugin-specific continuation.
            Some(0x01) => {
                let more = AuthMoreData::read(msg)?;

                match (self.plugin, &*more.data) {
                    // The password was found in the server cache; the
                    // terminal OK/ERR follows.
                    (Some(AuthPlugin::CachingSha2Password), [FAST_AUTH_OK]) => {
                        st.begin_read(self.seqnum, false)?;
                        self.step = Step::ReadReply;
                        Ok(Some(NextAction::Read))
                    }

                    (Some(AuthPlugin::CachingSha2Password), [PERFORM_FULL_AUTH]) => {
                        let plugin = AuthPlugin::CachingSha2Password;
                        let response = plugin.compute_response(
                            &self.params.password,
                            &[PERFORM_FULL_AUTH],
                            st.is_secure(),
                        )?;

                        st.write_packet(AuthData(&response), &mut self.seqnum)?;
                        self.step = Step::WritingAuthData;
                        Ok(Some(NextAction::Write))
                    }

                    _ => Err(ClientError::BadHandshakePacketType.into()),
                }
            }

            _ => Err(ClientError::BadHandshakePacketType.into()),
        }
    }
}

impl SessionAlgo for HandshakeAlgo {
    fn resume(&mut self, st: &mut SessionState, mut err: Option<Error>) -> NextAction {
        loop {
            match self.step {
                Step::Initial => {
                    st.reset();

                    if let Err(e) = st.begin_read(0, false) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::ReadHello;
                    return NextAction::Read;
                }

                Step::ReadHello => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    self.seqnum = st.reader.sequence_number();

                    let hello = match Handshake::read(st.reader.message()) {
                        Ok(hello) => hello,
                        Err(e) => return NextAction::Done(Err(e)),
                    };

                    st.flavor = if hello.server_version.contains("MariaDB") {
                        Flavor::MariaDb
                    } else {
                        Flavor::MySql
                    };
                    st.server_version = hello.server_version;
                    st.connection_id = hello.connection_id;

                    let (negotiated, use_ssl) =
                        match self.negotiate(st, hello.server_capabilities) {
                            Ok(result) => result,
                            Err(e) => return NextAction::Done(Err(e)),
                        };
                    st.capabilities = negotiated;

                    self.plugin = match AuthPlugin::from_name(&hello.auth_plugin_name) {
                        Ok(plugin) => Some(plugin),
                        Err(e) => return NextAction::Done(Err(e)),
                    };
                    self.challenge = hello.auth_plugin_data;

                    if use_ssl {
                        let request = SslRequest {
                            max_packet_size: MAX_PACKET_SIZE,
                            collation: handshake_collation(),
                        };

                        if let Err(e) = st.write_packet(request, &mut self.seqnum) {
                            return NextAction::Done(Err(e));
                        }

                        self.step = Step::WritingSslRequest;
                        return NextAction::Write;
                    }

                    if let Err(e) = self.write_response(st) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::WritingResponse;
                    return NextAction::Write;
                }

                Step::WritingSslRequest => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::TlsHandshake;
                    return NextAction::TlsHandshake;
                }

                Step::TlsHandshake => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    // From here on every byte is encrypted.
                    st.tls_active = true;

                    if let Err(e) = self.write_response(st) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::WritingResponse;
                    return NextAction::Write;
                }

                Step::WritingResponse | Step::WritingAuthData => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    if let Err(e) = st.begin_read(self.seqnum, false) {
                        return NextAction::Done(Err(e));
                    }

                    self.step = Step::ReadReply;
                    return NextAction::Read;
                }

                Step::ReadReply => {
                    if let Some(e) = err.take() {
                        return NextAction::Done(Err(e));
                    }

                    match self.on_reply(st) {
                        Ok(Some(action)) => return action,
                        Ok(None) => unreachable!("reply handling always yields an action"),
                        Err(e) => return NextAction::Done(Err(e)),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufMutExt;
    use crate::session::testing::Script;
    use crate::session::SessionState;

    use byteorder::LittleEndian;

    const CHALLENGE: [u8; 20] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x10, 0x11, 0x12, 0x13, 0x14,
    ];

    fn make_hello(plugin: &str, capabilities: Capabilities) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u8(10); // protocol version
        buf.put_str_nul("8.0.18");
        buf.put_u32::<LittleEndian>(42); // connection id
        buf.put_bytes(&CHALLENGE[..8]);
        buf.put_u8(0); // filler
        buf.put_u16::<LittleEndian>(capabilities.bits() as u16);
        buf.put_u8(255); // collation
        buf.put_u16::<LittleEndian>(0x0002); // status
        buf.put_u16::<LittleEndian>((capabilities.bits() >> 16) as u16);
        buf.put_u8(21); // auth plugin data length
        buf.advance(10); // reserved
        buf.put_bytes(&CHALLENGE[8..]);
        buf.put_u8(0); // scramble terminator
        buf.put_str_nul(plugin);
        buf
    }

    fn server_caps() -> Capabilities {
        Capabilities::mandatory()
            | Capabilities::MULTI_RESULTS
            | Capabilities::MULTI_STATEMENTS
            | Capabilities::CONNECT_WITH_DB
    }

    fn params() -> ConnectParams {
        ConnectParams {
            username: "root".into(),
            password: "pw".into(),
            database: None,
            ssl_mode: SslMode::Disable,
            multi_queries: false,
        }
    }

    fn ok_packet() -> &'static [u8] {
        b"\x00\x00\x00\x02\x00\x00\x00"
    }

    #[test]
    fn it_handshakes_over_plaintext() {
        let mut st = SessionState::new(1024, usize::MAX, false, false);
        let mut script = Script::new();

        script.push_server_message(&make_hello("mysql_native_password", server_caps()), 0);
        script.push_server_message(ok_packet(), 2);

        let mut algo = HandshakeAlgo::new(params());
        script.run(&mut st, &mut algo).unwrap();

        assert_eq!(st.status, SessionStatus::Ready);
        assert_eq!(st.connection_id, 42);
        assert_eq!(st.charset, Some(crate::CharacterSet::UTF8MB4));
        assert!(st.capabilities.contains(Capabilities::mandatory()));
        assert!(!st.capabilities.contains(Capabilities::CONNECT_WITH_DB));

        // The client wrote exactly one message: the handshake response,
        // frame seq 1, carrying the expected auth response.
        let written = &script.written;
        assert_eq!(written[3], 1); // sequence number

        let expected_auth = AuthPlugin::MySqlNativePassword
            .compute_response("pw", &CHALLENGE, false)
            .unwrap();
        assert!(written
            .windows(expected_auth.len())
            .any(|w| w == &expected_auth[..]));
    }

    #[test]
    fn it_follows_an_auth_switch() {
        let mut st = SessionState::new(1024, usize::MAX, false, false);
        let mut script = Script::new();

        script.push_server_message(&make_hello("caching_sha2_password", server_caps()), 0);

        // switch to mysql_native_password with a fresh challenge
        let mut switch = vec![0xFE];
        switch.extend_from_slice(b"mysql_native_password\0");
        switch.extend_from_slice(&CHALLENGE);
        switch.push(0);
        script.push_server_message(&switch, 2);

        script.push_server_message(ok_packet(), 4);

        let mut algo = HandshakeAlgo::new(params());
        script.run(&mut st, &mut algo).unwrap();

        assert_eq!(st.status, SessionStatus::Ready);
    }

    #[test]
    fn a_second_auth_switch_is_rejected() {
        let mut st = SessionState::new(1024, usize::MAX, false, false);
        let mut script = Script::new();

        script.push_server_message(&make_hello("mysql_native_password", server_caps()), 0);

        let mut switch = vec![0xFE];
        switch.extend_from_slice(b"mysql_native_password\0");
        switch.extend_from_slice(&CHALLENGE);
        script.push_server_message(&switch, 2);
        script.push_server_message(&switch, 4);

        let mut algo = HandshakeAlgo::new(params());
        let err = script.run(&mut st, &mut algo).unwrap_err();

        assert_eq!(err.code(), Some(ClientError::BadHandshakePacketType));
        assert_eq!(st.status, SessionStatus::NotConnected);
    }

    #[test]
    fn missing_capabilities_are_fatal() {
        let mut st = SessionState::new(1024, usize::MAX, false, false);
        let mut script = Script::new();

        let weak = Capabilities::PROTOCOL_41 | Capabilities::SECURE_CONNECTION;
        script.push_server_message(&make_hello("mysql_native_password", weak), 0);

        let mut algo = HandshakeAlgo::new(params());
        let err = script.run(&mut st, &mut algo).unwrap_err();

        assert_eq!(err.code(), Some(ClientError::ServerUnsupported));
    }

    #[test]
    fn full_auth_over_plaintext_is_rejected() {
        let mut st = SessionState::new(1024, usize::MAX, false, false);
        let mut script = Script::new();

        script.push_server_message(&make_hello("caching_sha2_password", server_caps()), 0);
        script.push_server_message(&[0x01, PERFORM_FULL_AUTH], 2);

        let mut algo = HandshakeAlgo::new(params());
        let err = script.run(&mut st, &mut algo).unwrap_err();

        assert_eq!(
            err.code(),
            Some(ClientError::AuthPluginRequiresSecureChannel)
        );
    }

    #[test]
    fn fast_auth_ok_waits_for_the_terminal_ok() {
        let mut st = SessionState::new(1024, usize::MAX, false, false);
        let mut script = Script::new();

        script.push_server_message(&make_hello("caching_sha2_password", server_caps()), 0);
        script.push_server_message(&[0x01, FAST_AUTH_OK], 2);
        script.push_server_message(ok_packet(), 3);

        let mut algo = HandshakeAlgo::new(params());
        script.run(&mut st, &mut algo).unwrap();

        assert_eq!(st.status, SessionStatus::Ready);
    }

    #[test]
    fn requiring_tls_from_a_server_without_it_fails() {
        let mut st = SessionState::new(1024, usize::MAX, true, false);
        let mut script = Script::new();

        script.push_server_message(&make_hello("mysql_native_password", server_caps()), 0);

        let mut algo = HandshakeAlgo::new(ConnectParams {
            ssl_mode: SslMode::Require,
            ..params()
        });
        let err = script.run(&mut st, &mut algo).unwrap_err();

        assert_eq!(err.code(), Some(ClientError::ServerUnsupported));
    }
}
