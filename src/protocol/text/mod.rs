//! Text-protocol commands.

use crate::io::BufMutExt;
use crate::protocol::{Capabilities, Encode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query.html
#[derive(Debug)]
pub struct ComQuery<'a>(pub &'a str);

impl Encode for ComQuery<'_> {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x03); // COM_QUERY
        buf.put_str(self.0);
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_ping.html
#[derive(Debug)]
pub struct ComPing;

impl Encode for ComPing {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x0E); // COM_PING
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_quit.html
//
// Fire-and-forget; the server answers by closing the transport.
#[derive(Debug)]
pub struct ComQuit;

impl Encode for ComQuit {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x01); // COM_QUIT
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_init_db.html
#[derive(Debug)]
pub struct ComInitDb<'a>(pub &'a str);

impl Encode for ComInitDb<'_> {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x02); // COM_INIT_DB
        buf.put_str(self.0);
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_reset_connection.html
//
// Clears session variables, temporary tables and prepared statements.
#[derive(Debug)]
pub struct ComResetConnection;

impl Encode for ComResetConnection {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x1F); // COM_RESET_CONNECTION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: Encode>(packet: T) -> Vec<u8> {
        let mut buf = Vec::new();
        packet.encode(&mut buf, Capabilities::mandatory());
        buf
    }

    #[test]
    fn it_encodes_command_bytes() {
        assert_eq!(encoded(ComQuery("SELECT 1")), b"\x03SELECT 1");
        assert_eq!(encoded(ComPing), b"\x0E");
        assert_eq!(encoded(ComQuit), b"\x01");
        assert_eq!(encoded(ComInitDb("db")), b"\x02db");
        assert_eq!(encoded(ComResetConnection), b"\x1F");
    }
}
