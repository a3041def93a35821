use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufExt};
use crate::protocol::Status;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_ok_packet.html
// https://mariadb.com/kb/en/ok_packet/
//
// With DEPRECATE_EOF negotiated, resultset terminators reuse this shape
// with a 0xFE header byte and a packet length below 9.
#[derive(Debug, Clone)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status: Status,
    pub warnings: u16,
    pub info: Box<str>,
}

impl OkPacket {
    pub fn read(mut buf: &[u8]) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0 && header != 0xFE {
            return Err(protocol_err!(
                "expected OK (0x00 or 0xFE); received 0x{:02X}",
                header
            ));
        }

        let affected_rows = buf.get_uint_lenenc::<LittleEndian>()?.unwrap_or(0);
        let last_insert_id = buf.get_uint_lenenc::<LittleEndian>()?.unwrap_or(0);
        let status = Status::from_bits_truncate(buf.get_u16::<LittleEndian>()?);
        let warnings = buf.get_u16::<LittleEndian>()?;

        // Info may be absent entirely, a bare string, or (with
        // SESSION_TRACK) length-encoded.
        let info = if buf.is_empty() {
            Box::default()
        } else if status.contains(Status::SESSION_STATE_CHANGED) {
            buf.get_str_lenenc::<LittleEndian>()?.unwrap_or("").into()
        } else {
            buf.get_str_eof()?.into()
        };

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
            info,
        })
    }

    /// Whether another resultset follows this one.
    pub fn more_results(&self) -> bool {
        self.status.contains(Status::MORE_RESULTS_EXISTS)
    }

    /// Whether backslash escape sequences are active in the session.
    pub fn backslash_escapes(&self) -> bool {
        !self.status.contains(Status::NO_BACKSLASH_ESCAPES)
    }
}
