//! Prepared-statement commands and responses.

use byteorder::LittleEndian;

use crate::error::Result;
use crate::io::{Buf, BufMutExt};
use crate::protocol::{null_bitmap, Capabilities, Encode, TypeId};
use crate::value::{put_binary_date, put_binary_datetime, put_binary_time, Field};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html
#[derive(Debug)]
pub struct ComStmtPrepare<'a>(pub &'a str);

impl Encode for ComStmtPrepare<'_> {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x16); // COM_STMT_PREPARE
        buf.put_str(self.0);
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html#sect_protocol_com_stmt_prepare_response_ok
#[derive(Debug)]
pub struct ComStmtPrepareOk {
    pub statement_id: u32,
    pub columns: u16,
    pub params: u16,
    pub warnings: u16,
}

impl ComStmtPrepareOk {
    pub fn read(mut buf: &[u8]) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0 {
            return Err(protocol_err!(
                "expected PREPARE_OK (0x00); received 0x{:02X}",
                header
            ));
        }

        let statement_id = buf.get_u32::<LittleEndian>()?;
        let columns = buf.get_u16::<LittleEndian>()?;
        let params = buf.get_u16::<LittleEndian>()?;

        // filler : int<1>, then warnings : int<2> (absent in short packets)
        let warnings = if buf.len() >= 3 {
            buf.advance(1)?;
            buf.get_u16::<LittleEndian>()?
        } else {
            0
        };

        Ok(Self {
            statement_id,
            columns,
            params,
            warnings,
        })
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_close.html
//
// Fire-and-forget; the server sends no reply.
#[derive(Debug)]
pub struct ComStmtClose {
    pub statement_id: u32,
}

impl Encode for ComStmtClose {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x19); // COM_STMT_CLOSE
        buf.put_u32::<LittleEndian>(self.statement_id);
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_execute.html
#[derive(Debug)]
pub struct ComStmtExecute<'a> {
    pub statement_id: u32,
    pub params: &'a [Field],
}

impl Encode for ComStmtExecute<'_> {
    fn encode(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.put_u8(0x17); // COM_STMT_EXECUTE

        // statement id : int<4>
        buf.put_u32::<LittleEndian>(self.statement_id);

        // cursor flags : int<1> (no cursor)
        buf.put_u8(0);

        // iteration count : int<4>, always 1
        buf.put_u32::<LittleEndian>(1);

        if self.params.is_empty() {
            return;
        }

        // null bitmap : byte<(num_params + 7) / 8>
        buf.put_bytes(&null_bitmap::generate(
            self.params.iter().map(Field::is_null),
            null_bitmap::PARAM_BIT_OFFSET,
        ));

        // new-params-bind flag : int<1>
        buf.put_u8(1);

        // 2-byte type code per parameter; the high bit of the second
        // byte carries signedness
        for param in self.params {
            let (type_id, unsigned) = param_type(param);
            buf.put_u8(type_id.0);
            buf.put_u8(if unsigned { 0x80 } else { 0 });
        }

        for param in self.params {
            put_param(buf, param);
        }
    }
}

fn param_type(param: &Field) -> (TypeId, bool) {
    match param {
        Field::Null => (TypeId::NULL, false),
        Field::Int(_) => (TypeId::LONG_LONG, false),
        Field::UInt(_) => (TypeId::LONG_LONG, true),
        Field::Float(_) => (TypeId::FLOAT, false),
        Field::Double(_) => (TypeId::DOUBLE, false),
        Field::Decimal(_) => (TypeId::NEW_DECIMAL, false),
        Field::Date(_) => (TypeId::DATE, false),
        Field::DateTime(_) => (TypeId::DATETIME, false),
        Field::Time(_) => (TypeId::TIME, false),
        Field::Str(_) | Field::Json(_) | Field::Enum(_) | Field::Set(_) => {
            (TypeId::VAR_STRING, false)
        }
        Field::Bytes(_) | Field::Bit(_) | Field::Geometry(_) => (TypeId::BLOB, false),
    }
}

fn put_param(buf: &mut Vec<u8>, param: &Field) {
    match param {
        Field::Null => {}
        Field::Int(v) => buf.put_i64::<LittleEndian>(*v),
        Field::UInt(v) => buf.put_u64::<LittleEndian>(*v),
        Field::Float(v) => buf.put_f32::<LittleEndian>(*v),
        Field::Double(v) => buf.put_f64::<LittleEndian>(*v),
        Field::Decimal(v) => buf.put_str_lenenc::<LittleEndian>(v),
        Field::Date(v) => put_binary_date(buf, v),
        Field::DateTime(v) => put_binary_datetime(buf, v),
        Field::Time(v) => put_binary_time(buf, v),
        Field::Str(v) | Field::Json(v) | Field::Enum(v) | Field::Set(v) => {
            buf.put_str_lenenc::<LittleEndian>(v)
        }
        Field::Bytes(v) | Field::Bit(v) | Field::Geometry(v) => {
            buf.put_bytes_lenenc::<LittleEndian>(v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_decodes_prepare_ok() {
        let raw = b"\x00\x07\x00\x00\x00\x01\x00\x02\x00\x00\x00\x00";
        let ok = ComStmtPrepareOk::read(raw).unwrap();

        assert_eq!(ok.statement_id, 7);
        assert_eq!(ok.columns, 1);
        assert_eq!(ok.params, 2);
        assert_eq!(ok.warnings, 0);
    }

    #[test]
    fn it_encodes_execute_with_two_integers() {
        let mut buf = Vec::new();
        ComStmtExecute {
            statement_id: 7,
            params: &[Field::Int(2), Field::Int(3)],
        }
        .encode(&mut buf, Capabilities::mandatory());

        let mut expected: Vec<u8> = vec![0x17, 7, 0, 0, 0, 0, 1, 0, 0, 0];
        expected.push(0x00); // null bitmap
        expected.push(0x01); // new-params-bind flag
        expected.extend_from_slice(&[0x08, 0x00, 0x08, 0x00]); // longlong, signed, x2
        expected.extend_from_slice(&2_i64.to_le_bytes());
        expected.extend_from_slice(&3_i64.to_le_bytes());

        assert_eq!(buf, expected);
    }

    #[test]
    fn null_params_only_occupy_the_bitmap() {
        let mut buf = Vec::new();
        ComStmtExecute {
            statement_id: 1,
            params: &[Field::Null, Field::Int(1)],
        }
        .encode(&mut buf, Capabilities::mandatory());

        // header(10) + bitmap(1) + flag(1) + types(4) + one i64 payload
        assert_eq!(buf.len(), 10 + 1 + 1 + 4 + 8);
        assert_eq!(buf[10], 0b01); // first param NULL
        assert_eq!(&buf[12..16], &[0x06, 0x00, 0x08, 0x00][..]); // null type, longlong
    }

    #[test]
    fn it_encodes_close() {
        let mut buf = Vec::new();
        ComStmtClose { statement_id: 7 }.encode(&mut buf, Capabilities::mandatory());
        assert_eq!(buf, b"\x19\x07\x00\x00\x00");
    }
}
