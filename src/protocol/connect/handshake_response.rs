use byteorder::LittleEndian;

use crate::io::BufMutExt;
use crate::protocol::{Capabilities, Encode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_response.html
// https://mariadb.com/kb/en/connection/#handshake-response-packet
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    pub max_packet_size: u32,
    pub collation: u8,
    pub username: &'a str,
    pub database: Option<&'a str>,
    pub auth_plugin_name: &'a str,
    pub auth_response: &'a [u8],
}

impl Encode for HandshakeResponse<'_> {
    fn encode(&self, buf: &mut Vec<u8>, capabilities: Capabilities) {
        // client capabilities : int<4>
        buf.put_u32::<LittleEndian>(capabilities.bits());

        // max packet size : int<4>
        buf.put_u32::<LittleEndian>(self.max_packet_size);

        // collation : int<1>
        buf.put_u8(self.collation);

        // filler : string<23>
        buf.advance(23);

        // username : string<NUL>
        buf.put_str_nul(self.username);

        // auth response : string<lenenc>
        // (PLUGIN_AUTH_LENENC_DATA is mandatory for this client)
        buf.put_bytes_lenenc::<LittleEndian>(self.auth_response);

        if capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            if let Some(database) = self.database {
                // database : string<NUL>
                buf.put_str_nul(database);
            }
        }

        // client plugin name : string<NUL>
        // (PLUGIN_AUTH is mandatory for this client)
        buf.put_str_nul(self.auth_plugin_name);
    }
}

#[cfg(test)]
mod tests {
    use super::{Capabilities, Encode, HandshakeResponse};

    #[test]
    fn it_encodes_the_fixed_prefix() {
        let mut buf = Vec::new();

        HandshakeResponse {
            max_packet_size: 0x0100_0000,
            collation: 45,
            username: "root",
            database: None,
            auth_plugin_name: "mysql_native_password",
            auth_response: &[0xAA; 20],
        }
        .encode(&mut buf, Capabilities::mandatory());

        assert_eq!(&buf[..4], &Capabilities::mandatory().bits().to_le_bytes()[..]);
        assert_eq!(&buf[4..8], &[0, 0, 0, 1][..]);
        assert_eq!(buf[8], 45);
        assert!(buf[9..32].iter().all(|&b| b == 0));
        assert_eq!(&buf[32..37], b"root\0");

        // lenenc auth response, then the plugin name
        assert_eq!(buf[37], 20);
        assert_eq!(&buf[38..58], &[0xAA; 20]);
        assert_eq!(&buf[58..], b"mysql_native_password\0");
    }

    #[test]
    fn it_includes_the_database_only_when_negotiated(){
        let mut buf = Vec::new();

        HandshakeResponse {
            max_packet_size: 0x0100_0000,
            collation: 45,
            username: "root",
            database: Some("db"),
            auth_plugin_name: "mysql_native_password",
            auth_response: &[],
        }
        .encode(&mut buf, Capabilities::mandatory());

        // CONNECT_WITH_DB not negotiated: no database in the packet
        assert!(!buf.windows(3).any(|w| w == b"db\0"));

        let mut buf = Vec::new();

        HandshakeResponse {
            max_packet_size: 0x0100_0000,
            collation: 45,
            username: "root",
            database: Some("db"),
            auth_plugin_name: "mysql_native_password",
            auth_response: &[],
        }
        .encode(&mut buf, Capabilities::mandatory() | Capabilities::CONNECT_WITH_DB);

        assert!(buf.windows(3).any(|w| w == b"db\0"));
    }
}
