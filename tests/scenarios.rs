//! Bit-exact wire scenarios, driven over an in-memory duplex stream:
//! one side is a real `Connection`, the other a scripted "server".

use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use mariner::{
    ConnectOptions, Connection, Field, FieldRef, PipelineRequest, PipelineResponse, PlainStream,
    StageOutcome,
};

const CHALLENGE: [u8; 20] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x14,
];

// Capabilities the scripted server advertises: protocol 4.1, plugin
// auth (+ lenenc), deprecate EOF, secure connection, multi results.
const SERVER_CAPS: u32 = 0x0200
    | 0x8000
    | (1 << 19)
    | (1 << 21)
    | (1 << 24)
    | (1 << 17)
    | (1 << 16)
    | 0x0008;

fn frame(payload: &[u8], seq: u8) -> Vec<u8> {
    assert!(payload.len() < 0xFF_FFFF);

    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
    out.push(seq);
    out.extend_from_slice(payload);
    out
}

async fn read_frame(server: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut header = [0_u8; 4];
    server.read_exact(&mut header).await.unwrap();

    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let mut payload = vec![0_u8; len];
    server.read_exact(&mut payload).await.unwrap();

    (header[3], payload)
}

fn lenenc(value: u64) -> Vec<u8> {
    match value {
        0..=250 => vec![value as u8],
        251..=0xFFFF => {
            let mut v = vec![0xFC];
            v.extend_from_slice(&(value as u16).to_le_bytes());
            v
        }
        _ => {
            let mut v = vec![0xFE];
            v.extend_from_slice(&value.to_le_bytes());
            v
        }
    }
}

fn initial_handshake() -> Vec<u8> {
    let mut p = Vec::new();
    p.push(10); // protocol version
    p.extend_from_slice(b"8.0.18\0");
    p.extend_from_slice(&42_u32.to_le_bytes()); // connection id
    p.extend_from_slice(&CHALLENGE[..8]);
    p.push(0); // filler
    p.extend_from_slice(&(SERVER_CAPS as u16).to_le_bytes());
    p.push(255); // collation
    p.extend_from_slice(&0x0002_u16.to_le_bytes()); // status
    p.extend_from_slice(&((SERVER_CAPS >> 16) as u16).to_le_bytes());
    p.push(21); // auth plugin data length
    p.extend_from_slice(&[0; 10]); // reserved
    p.extend_from_slice(&CHALLENGE[8..]);
    p.push(0);
    p.extend_from_slice(b"mysql_native_password\0");
    p
}

fn ok_packet(affected: u64, status: u16) -> Vec<u8> {
    let mut p = vec![0x00];
    p.extend_from_slice(&lenenc(affected));
    p.extend_from_slice(&lenenc(0));
    p.extend_from_slice(&status.to_le_bytes());
    p.extend_from_slice(&0_u16.to_le_bytes());
    p
}

fn eof_packet(status: u16) -> Vec<u8> {
    let mut p = ok_packet(0, status);
    p[0] = 0xFE;
    p
}

fn column_def(name: &str, type_id: u8, collation: u16, flags: u16) -> Vec<u8> {
    let mut p = Vec::new();
    for s in ["def", "", "", "", name, ""] {
        p.extend_from_slice(&lenenc(s.len() as u64));
        p.extend_from_slice(s.as_bytes());
    }
    p.extend_from_slice(&lenenc(0x0C));
    p.extend_from_slice(&collation.to_le_bytes());
    p.extend_from_slice(&255_u32.to_le_bytes());
    p.push(type_id);
    p.extend_from_slice(&flags.to_le_bytes());
    p.push(0);
    p.extend_from_slice(&[0, 0]); // filler
    p
}

// SHA1(pw) XOR SHA1(challenge || SHA1(SHA1(pw))), computed here
// independently of the crate's auth module.
fn expected_native_auth(password: &str) -> Vec<u8> {
    let pw_sha: [u8; 20] = Sha1::digest(password.as_bytes()).into();

    let mut h = Sha1::new();
    h.update(CHALLENGE);
    h.update(Sha1::digest(pw_sha));
    let salted: [u8; 20] = h.finalize().into();

    pw_sha.iter().zip(salted.iter()).map(|(a, b)| a ^ b).collect()
}

// Serves the handshake (scenario A's server side) and validates the
// client's response packet byte-by-byte.
async fn serve_handshake(server: &mut DuplexStream, password: &str) {
    server
        .write_all(&frame(&initial_handshake(), 0))
        .await
        .unwrap();

    let (seq, response) = read_frame(server).await;
    assert_eq!(seq, 1);

    // capabilities (4), max packet (4), collation (1), filler (23)
    let mut rest = &response[..];
    let caps = u32::from_le_bytes(rest[..4].try_into().unwrap());
    assert_eq!(caps & 0x0200, 0x0200, "protocol 4.1 negotiated");
    assert_eq!(caps & (1 << 19), 1 << 19, "plugin auth negotiated");
    assert_eq!(caps & (1 << 24), 1 << 24, "deprecate EOF negotiated");
    rest = &rest[4 + 4 + 1 + 23..];

    // username
    let nul = rest.iter().position(|&b| b == 0).unwrap();
    assert_eq!(&rest[..nul], b"root");
    rest = &rest[nul + 1..];

    // lenenc auth response
    let auth_len = rest[0] as usize;
    let auth = &rest[1..1 + auth_len];
    assert_eq!(auth, expected_native_auth(password), "auth response bytes");
    rest = &rest[1 + auth_len..];

    // plugin name
    assert_eq!(rest, b"mysql_native_password\0");

    server
        .write_all(&frame(&ok_packet(0, 0x0002), 2))
        .await
        .unwrap();
}

fn test_options() -> ConnectOptions {
    ConnectOptions::new().username("root").password("pw")
}

async fn connected() -> (Connection<PlainStream<DuplexStream>>, DuplexStream) {
    let (client, mut server) = tokio::io::duplex(1 << 20);

    let mut conn = Connection::with_transport(PlainStream(client), test_options());

    let client_fut = conn.handshake();
    let server_fut = serve_handshake(&mut server, "pw");

    let (client_res, ()) = tokio::join!(client_fut, server_fut);
    client_res.unwrap();

    (conn, server)
}

// Scenario A: handshake over plaintext. The byte-level assertions live
// in serve_handshake.
#[tokio::test]
async fn handshake_over_plaintext() {
    let (conn, _server) = connected().await;

    assert_eq!(conn.connection_id(), 42);
    assert_eq!(conn.server_version(), "8.0.18");
    assert!(conn.backslash_escapes());
}

// Scenario B: a simple text query producing one row.
#[tokio::test]
async fn simple_query() {
    let (mut conn, mut server) = connected().await;

    let server_fut = async {
        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(payload, b"\x03SELECT 1");

        server.write_all(&frame(&[0x01], 1)).await.unwrap();
        server
            .write_all(&frame(&column_def("1", 0x08, 63, 0x0001), 2))
            .await
            .unwrap();
        server.write_all(&frame(&[0x01, b'1'], 3)).await.unwrap();
        server
            .write_all(&frame(&eof_packet(0x0002), 4))
            .await
            .unwrap();
    };

    let (results, ()) = tokio::join!(conn.execute("SELECT 1"), server_fut);
    let results = results.unwrap();

    assert_eq!(results.resultsets().len(), 1);
    let resultset = results.first().unwrap();
    assert_eq!(resultset.columns().len(), 1);
    assert_eq!(resultset.rows().len(), 1);

    // a BIGINT column: the text cell "1" decodes as a typed integer
    assert_eq!(resultset.rows()[0].field(0).unwrap(), FieldRef::Int(1));
}

// Scenario C: prepared statement execute with integer parameters,
// asserting the exact COM_STMT_EXECUTE bytes.
#[tokio::test]
async fn prepared_statement_execute() {
    let (mut conn, mut server) = connected().await;

    // prepare "SELECT ? + ?" -> statement id 7, 2 params, 1 column
    let server_fut = async {
        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(payload, b"\x16SELECT ? + ?");

        let mut prepare_ok = vec![0x00];
        prepare_ok.extend_from_slice(&7_u32.to_le_bytes());
        prepare_ok.extend_from_slice(&1_u16.to_le_bytes()); // columns
        prepare_ok.extend_from_slice(&2_u16.to_le_bytes()); // params
        prepare_ok.push(0);
        prepare_ok.extend_from_slice(&0_u16.to_le_bytes());
        server.write_all(&frame(&prepare_ok, 1)).await.unwrap();

        // two parameter definitions, then one column definition
        for seq in 2..=4 {
            server
                .write_all(&frame(&column_def("?", 0x08, 63, 0), seq))
                .await
                .unwrap();
        }
    };

    let (statement, ()) = tokio::join!(conn.prepare_statement("SELECT ? + ?"), server_fut);
    let statement = statement.unwrap();
    assert_eq!(statement.id(), 7);
    assert_eq!(statement.num_params(), 2);
    assert_eq!(statement.num_columns(), 1);

    // execute with (2, 3)
    let server_fut = async {
        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!(seq, 0);

        let mut expected = vec![0x17];
        expected.extend_from_slice(&7_u32.to_le_bytes());
        expected.push(0x00); // no cursor
        expected.extend_from_slice(&1_u32.to_le_bytes()); // iterations
        expected.push(0x00); // null bitmap
        expected.push(0x01); // new-params-bind flag
        expected.extend_from_slice(&[0x08, 0x00, 0x08, 0x00]); // longlong signed x2
        expected.extend_from_slice(&2_i64.to_le_bytes());
        expected.extend_from_slice(&3_i64.to_le_bytes());
        assert_eq!(payload, expected, "COM_STMT_EXECUTE bytes");

        server.write_all(&frame(&[0x01], 1)).await.unwrap();
        server
            .write_all(&frame(&column_def("? + ?", 0x08, 63, 0x0001), 2))
            .await
            .unwrap();

        // binary row: header, null bitmap, i64(5)
        let mut row = vec![0x00, 0x00];
        row.extend_from_slice(&5_i64.to_le_bytes());
        server.write_all(&frame(&row, 3)).await.unwrap();

        server
            .write_all(&frame(&eof_packet(0x0002), 4))
            .await
            .unwrap();
    };

    let params = [Field::Int(2), Field::Int(3)];
    let (results, ()) = tokio::join!(conn.execute_statement(&statement, &params), server_fut);
    let results = results.unwrap();

    assert_eq!(results.rows().len(), 1);
    assert_eq!(results.rows()[0].field(0).unwrap(), FieldRef::Int(5));
}

// Scenario D: a pipeline written in one go; every stage's response is
// captured, close is fire-and-forget.
#[tokio::test]
async fn pipeline() {
    let (mut conn, mut server) = connected().await;

    // a statement handle to execute/close in the pipeline
    let server_fut = async {
        let (_, payload) = read_frame(&mut server).await;
        assert_eq!(payload[0], 0x16);

        let mut prepare_ok = vec![0x00];
        prepare_ok.extend_from_slice(&7_u32.to_le_bytes());
        prepare_ok.extend_from_slice(&0_u16.to_le_bytes()); // columns
        prepare_ok.extend_from_slice(&2_u16.to_le_bytes()); // params
        prepare_ok.push(0);
        prepare_ok.extend_from_slice(&0_u16.to_le_bytes());
        server.write_all(&frame(&prepare_ok, 1)).await.unwrap();

        for seq in 2..=3 {
            server
                .write_all(&frame(&column_def("?", 0x08, 63, 0), seq))
                .await
                .unwrap();
        }
    };

    let (statement, ()) = tokio::join!(
        conn.prepare_statement("INSERT INTO t VALUES (?, ?)"),
        server_fut
    );
    let statement = statement.unwrap();

    let mut request = PipelineRequest::new();
    request.add_prepare("SELECT 1");
    request
        .add_execute(&statement, &[Field::Int(1), Field::Int(2)])
        .unwrap();
    request.add_close_statement(&statement);

    let server_fut = async {
        // all three requests arrive back-to-back, each with seq 0
        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!((seq, payload[0]), (0, 0x16));

        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!((seq, payload[0]), (0, 0x17));

        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!((seq, payload[0]), (0, 0x19));
        assert_eq!(&payload[1..], &7_u32.to_le_bytes()[..]);

        // response to the prepare: id 9, no params, no columns
        let mut prepare_ok = vec![0x00];
        prepare_ok.extend_from_slice(&9_u32.to_le_bytes());
        prepare_ok.extend_from_slice(&0_u16.to_le_bytes());
        prepare_ok.extend_from_slice(&0_u16.to_le_bytes());
        prepare_ok.push(0);
        prepare_ok.extend_from_slice(&0_u16.to_le_bytes());
        server.write_all(&frame(&prepare_ok, 1)).await.unwrap();

        // response to the execute: affected = 1
        server
            .write_all(&frame(&ok_packet(1, 0x0002), 1))
            .await
            .unwrap();

        // no response to the close
    };

    let mut response = PipelineResponse::new();
    let (result, ()) = tokio::join!(conn.run_pipeline(&request, &mut response), server_fut);
    result.unwrap();

    assert_eq!(response.len(), 3);

    let prepared = response.outcomes()[0].as_statement().unwrap();
    assert_eq!(prepared.id(), 9);

    let results = response.outcomes()[1].as_results().unwrap();
    assert_eq!(results.affected_rows(), 1);

    assert!(matches!(response.outcomes()[2], StageOutcome::Ok));
}

// A failing stage does not stop later stages from being consumed.
#[tokio::test]
async fn pipeline_captures_per_stage_errors() {
    let (mut conn, mut server) = connected().await;

    let mut request = PipelineRequest::new();
    request.add_query("not sql");
    request.add_ping();

    let server_fut = async {
        let (_, payload) = read_frame(&mut server).await;
        assert_eq!(payload[0], 0x03);
        let (_, payload) = read_frame(&mut server).await;
        assert_eq!(payload[0], 0x0E);

        server
            .write_all(&frame(b"\xFF\x28\x04#42000syntax error", 1))
            .await
            .unwrap();
        server
            .write_all(&frame(&ok_packet(0, 0x0002), 1))
            .await
            .unwrap();
    };

    let mut response = PipelineResponse::new();
    let (result, ()) = tokio::join!(conn.run_pipeline(&request, &mut response), server_fut);

    // overall result: the first stage error
    let err = result.unwrap_err();
    assert_eq!(err.server().map(|e| e.code()), Some(1064));

    assert_eq!(response.len(), 2);
    let stage_err = response.outcomes()[0].as_error().unwrap();
    assert_eq!(stage_err.server().map(|e| e.code()), Some(1064));
    assert!(response.outcomes()[1].is_ok());
}

// Scenario E: a CALL returning two resultsets via MORE_RESULTS_EXISTS.
#[tokio::test]
async fn multi_resultset_call() {
    let (mut conn, mut server) = connected().await;

    let server_fut = async {
        let (_, payload) = read_frame(&mut server).await;
        assert_eq!(payload, b"\x03CALL p()");

        // first: an OK with MORE_RESULTS_EXISTS
        server
            .write_all(&frame(&ok_packet(0, 0x000A), 1))
            .await
            .unwrap();

        // second: a resultset, MORE_RESULTS cleared on its terminator
        server.write_all(&frame(&[0x01], 2)).await.unwrap();
        server
            .write_all(&frame(&column_def("x", 0x08, 63, 0x0001), 3))
            .await
            .unwrap();
        server.write_all(&frame(&[0x02, b'1', b'0'], 4)).await.unwrap();
        server
            .write_all(&frame(&eof_packet(0x0002), 5))
            .await
            .unwrap();
    };

    let (results, ()) = tokio::join!(conn.execute("CALL p()"), server_fut);
    let results = results.unwrap();

    assert_eq!(results.resultsets().len(), 2);
    assert!(results.resultsets()[0].rows().is_empty());
    assert_eq!(
        results.resultsets()[1].rows()[0].field(0).unwrap(),
        FieldRef::Int(10)
    );
}

// Multi-function execution over the wire: rows arrive in caller-driven
// batches.
#[tokio::test]
async fn multi_function_execution() {
    let (mut conn, mut server) = connected().await;

    let server_fut = async {
        let (_, payload) = read_frame(&mut server).await;
        assert_eq!(payload, b"\x03SELECT x FROM t");

        server.write_all(&frame(&[0x01], 1)).await.unwrap();
        server
            .write_all(&frame(&column_def("x", 0x08, 63, 0x0001), 2))
            .await
            .unwrap();
        server.write_all(&frame(&[0x01, b'1'], 3)).await.unwrap();
        server.write_all(&frame(&[0x01, b'2'], 4)).await.unwrap();
        server
            .write_all(&frame(&eof_packet(0x0002), 5))
            .await
            .unwrap();
    };

    let client_fut = async {
        let mut state = conn.start_execution("SELECT x FROM t").await.unwrap();
        assert_eq!(state.columns().len(), 1);

        let mut rows = Vec::new();
        while state.should_read_rows() {
            rows.extend(conn.read_some_rows(&mut state).await.unwrap());
        }

        assert!(state.is_complete());
        rows
    };

    let (rows, ()) = tokio::join!(client_fut, server_fut);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].field(0).unwrap(), FieldRef::Int(1));
    assert_eq!(rows[1].field(0).unwrap(), FieldRef::Int(2));
}

// Ping and reset round-trips (single-stage pipelines under the hood).
#[tokio::test]
async fn ping_and_reset() {
    let (mut conn, mut server) = connected().await;

    let server_fut = async {
        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!((seq, payload.as_slice()), (0, &b"\x0E"[..]));
        server
            .write_all(&frame(&ok_packet(0, 0x0002), 1))
            .await
            .unwrap();

        let (seq, payload) = read_frame(&mut server).await;
        assert_eq!((seq, payload.as_slice()), (0, &b"\x1F"[..]));
        server
            .write_all(&frame(&ok_packet(0, 0x0002), 1))
            .await
            .unwrap();
    };

    let client_fut = async {
        conn.ping().await.unwrap();
        conn.reset_connection().await.unwrap();

        // after a reset the character set is unknown
        assert!(conn.charset().is_none());
    };

    tokio::join!(client_fut, server_fut);
}

// A timed-out operation aborts mid-flight and poisons the session: the
// next command is refused until the session is re-established.
#[tokio::test]
async fn timeout_poisons_the_session() {
    let (mut conn, _server) = connected().await;

    conn.operation_timeout(Some(std::time::Duration::from_millis(50)));

    // the server never answers the ping
    let err = conn.ping().await.unwrap_err();
    assert_eq!(err.code(), Some(mariner::ClientError::OperationAborted));

    let err = conn.ping().await.unwrap_err();
    assert_eq!(err.code(), Some(mariner::ClientError::OperationInProgress));
}

// A sequence-number corruption surfaces as exactly a sequence mismatch
// and poisons the session.
#[tokio::test]
async fn sequence_mismatch_is_detected() {
    let (mut conn, mut server) = connected().await;

    let server_fut = async {
        let _ = read_frame(&mut server).await;
        // reply with the wrong sequence number
        server
            .write_all(&frame(&ok_packet(0, 0x0002), 7))
            .await
            .unwrap();
    };

    let (result, ()) = tokio::join!(conn.ping(), server_fut);
    let err = result.unwrap_err();

    assert_eq!(
        err.code(),
        Some(mariner::ClientError::SequenceNumberMismatch)
    );

    // the session is unusable now
    let err = conn.ping().await.unwrap_err();
    assert_eq!(err.code(), Some(mariner::ClientError::NotConnected));
}
