use byteorder::ByteOrder;
use memchr::memchr;
use std::str;

use crate::error::{ClientError, Error, Result};

/// Read-side wire primitives over a borrowed byte slice.
///
/// Every getter checks the remaining length first; running out of bytes
/// is [`ClientError::IncompleteMessage`], never a panic.
pub trait Buf<'a> {
    fn advance(&mut self, cnt: usize) -> Result<()>;

    fn get_u8(&mut self) -> Result<u8>;

    fn get_i8(&mut self) -> Result<i8>;

    fn get_u16<T: ByteOrder>(&mut self) -> Result<u16>;

    fn get_i16<T: ByteOrder>(&mut self) -> Result<i16>;

    fn get_u24<T: ByteOrder>(&mut self) -> Result<u32>;

    fn get_u32<T: ByteOrder>(&mut self) -> Result<u32>;

    fn get_i32<T: ByteOrder>(&mut self) -> Result<i32>;

    fn get_u64<T: ByteOrder>(&mut self) -> Result<u64>;

    fn get_i64<T: ByteOrder>(&mut self) -> Result<i64>;

    fn get_f32<T: ByteOrder>(&mut self) -> Result<f32>;

    fn get_f64<T: ByteOrder>(&mut self) -> Result<f64>;

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]>;

    /// Fixed-length string; must be valid UTF-8.
    fn get_str(&mut self, len: usize) -> Result<&'a str>;

    /// Null-terminated string; consumes the terminator.
    fn get_str_nul(&mut self) -> Result<&'a str>;

    /// The rest of the buffer as a string.
    fn get_str_eof(&mut self) -> Result<&'a str>;

    /// The rest of the buffer as raw bytes.
    fn get_bytes_eof(&mut self) -> Result<&'a [u8]>;
}

impl<'a> Buf<'a> for &'a [u8] {
    fn advance(&mut self, cnt: usize) -> Result<()> {
        self.get_bytes(cnt).map(|_| ())
    }

    fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_bytes(1)?[0])
    }

    fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    fn get_u16<T: ByteOrder>(&mut self) -> Result<u16> {
        Ok(T::read_u16(self.get_bytes(2)?))
    }

    fn get_i16<T: ByteOrder>(&mut self) -> Result<i16> {
        Ok(T::read_i16(self.get_bytes(2)?))
    }

    fn get_u24<T: ByteOrder>(&mut self) -> Result<u32> {
        Ok(T::read_u24(self.get_bytes(3)?))
    }

    fn get_u32<T: ByteOrder>(&mut self) -> Result<u32> {
        Ok(T::read_u32(self.get_bytes(4)?))
    }

    fn get_i32<T: ByteOrder>(&mut self) -> Result<i32> {
        Ok(T::read_i32(self.get_bytes(4)?))
    }

    fn get_u64<T: ByteOrder>(&mut self) -> Result<u64> {
        Ok(T::read_u64(self.get_bytes(8)?))
    }

    fn get_i64<T: ByteOrder>(&mut self) -> Result<i64> {
        Ok(T::read_i64(self.get_bytes(8)?))
    }

    fn get_f32<T: ByteOrder>(&mut self) -> Result<f32> {
        Ok(T::read_f32(self.get_bytes(4)?))
    }

    fn get_f64<T: ByteOrder>(&mut self) -> Result<f64> {
        Ok(T::read_f64(self.get_bytes(8)?))
    }

    fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.len() < len {
            return Err(ClientError::IncompleteMessage.into());
        }

        let (head, tail) = self.split_at(len);
        *self = tail;

        Ok(head)
    }

    fn get_str(&mut self, len: usize) -> Result<&'a str> {
        str::from_utf8(self.get_bytes(len)?)
            .map_err(|err| protocol_err!("invalid UTF-8 in string: {}", err))
    }

    fn get_str_nul(&mut self) -> Result<&'a str> {
        let len = memchr(b'\0', self).ok_or(Error::Client(ClientError::IncompleteMessage))?;
        let s = &self.get_str(len + 1)?[..len];

        Ok(s)
    }

    fn get_str_eof(&mut self) -> Result<&'a str> {
        self.get_str(self.len())
    }

    fn get_bytes_eof(&mut self) -> Result<&'a [u8]> {
        self.get_bytes(self.len())
    }
}

/// Length-encoded forms layered over [`Buf`].
pub trait BufExt<'a>: Buf<'a> {
    /// Length-encoded integer. `None` is the single 0xFB byte that marks
    /// SQL NULL in text rows.
    fn get_uint_lenenc<T: ByteOrder>(&mut self) -> Result<Option<u64>>;

    fn get_str_lenenc<T: ByteOrder>(&mut self) -> Result<Option<&'a str>>;

    fn get_bytes_lenenc<T: ByteOrder>(&mut self) -> Result<Option<&'a [u8]>>;
}

impl<'a> BufExt<'a> for &'a [u8] {
    fn get_uint_lenenc<T: ByteOrder>(&mut self) -> Result<Option<u64>> {
        Ok(match self.get_u8()? {
            0xFB => None,
            0xFC => Some(u64::from(self.get_u16::<T>()?)),
            0xFD => Some(u64::from(self.get_u24::<T>()?)),
            0xFE => Some(self.get_u64::<T>()?),

            value => Some(u64::from(value)),
        })
    }

    fn get_str_lenenc<T: ByteOrder>(&mut self) -> Result<Option<&'a str>> {
        self.get_uint_lenenc::<T>()?
            .map(move |len| self.get_str(len as usize))
            .transpose()
    }

    fn get_bytes_lenenc<T: ByteOrder>(&mut self) -> Result<Option<&'a [u8]>> {
        self.get_uint_lenenc::<T>()?
            .map(move |len| self.get_bytes(len as usize))
            .transpose()
    }
}
