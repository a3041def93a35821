use byteorder::LittleEndian;

use crate::io::BufMutExt;
use crate::protocol::{Capabilities, Encode};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_ssl_request.html
// https://mariadb.com/kb/en/connection/#sslrequest-packet
//
// The first half of a handshake response: written before the TLS
// handshake, after which the full response goes over the encrypted
// stream.
#[derive(Debug)]
pub struct SslRequest {
    pub max_packet_size: u32,
    pub collation: u8,
}

impl Encode for SslRequest {
    fn encode(&self, buf: &mut Vec<u8>, capabilities: Capabilities) {
        // client capabilities : int<4>
        buf.put_u32::<LittleEndian>(capabilities.bits());

        // max packet size : int<4>
        buf.put_u32::<LittleEndian>(self.max_packet_size);

        // collation : int<1>
        buf.put_u8(self.collation);

        // filler : string<23>
        buf.advance(23);
    }
}

#[cfg(test)]
mod tests {
    use super::{Capabilities, Encode, SslRequest};

    #[test]
    fn it_is_exactly_32_bytes() {
        let mut buf = Vec::new();

        SslRequest {
            max_packet_size: 0x0100_0000,
            collation: 45,
        }
        .encode(&mut buf, Capabilities::mandatory() | Capabilities::SSL);

        assert_eq!(buf.len(), 32);
        assert!(buf[9..].iter().all(|&b| b == 0));
    }
}
