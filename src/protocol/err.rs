use byteorder::LittleEndian;

use crate::error::{Result, ServerError};
use crate::io::Buf;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_err_packet.html
// https://mariadb.com/kb/en/err_packet/
#[derive(Debug)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: Box<str>,
    pub error_message: Box<str>,
}

impl ErrPacket {
    pub fn read(mut buf: &[u8]) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0xFF {
            return Err(protocol_err!("expected ERR (0xFF); received 0x{:02X}", header));
        }

        let error_code = buf.get_u16::<LittleEndian>()?;

        // The '#' marker and SQLSTATE are only present with protocol 4.1,
        // which we always negotiate; progress reports (MariaDB) omit them.
        let (sql_state, error_message) = if buf.first() == Some(&b'#') {
            buf.advance(1)?;
            (buf.get_str(5)?.into(), buf.get_str_eof()?.into())
        } else {
            ("HY000".into(), buf.get_str_eof()?.into())
        };

        Ok(Self {
            error_code,
            sql_state,
            error_message,
        })
    }

    pub fn into_server_error(self) -> ServerError {
        ServerError::new(self.error_code, self.sql_state, self.error_message)
    }
}

#[cfg(test)]
mod tests {
    use super::ErrPacket;

    const ERR_HANDSHAKE_UNKNOWN_DB: &[u8] = b"\xff\x19\x04#42000Unknown database 'unknown'";

    #[test]
    fn it_decodes_err_unknown_db() {
        let p = ErrPacket::read(ERR_HANDSHAKE_UNKNOWN_DB).unwrap();

        assert_eq!(p.error_code, 1049);
        assert_eq!(&*p.sql_state, "42000");
        assert_eq!(&*p.error_message, "Unknown database 'unknown'");

        let err = p.into_server_error();
        assert_eq!(err.code(), 1049);
        assert_eq!(err.sql_state(), "42000");
        assert_eq!(err.message(), "Unknown database 'unknown'");
    }

    #[test]
    fn it_decodes_err_without_sql_state() {
        let p = ErrPacket::read(b"\xff\x10\x04Too many connections").unwrap();

        assert_eq!(p.error_code, 1040);
        assert_eq!(&*p.sql_state, "HY000");
        assert_eq!(&*p.error_message, "Too many connections");
    }
}
