//! Typed field values and the date/time types the protocol carries.

use byteorder::LittleEndian;

use crate::error::{ClientError, Result};
use crate::io::{Buf, BufExt, BufMutExt};
use crate::protocol::ColumnMeta;

/// Semantic column type, independent of protocol quirks.
///
/// Computed from the protocol type byte, the column collation and the
/// column flags; see [`ColumnMeta::column_type`].
///
/// [`ColumnMeta::column_type`]: crate::protocol::ColumnMeta::column_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColumnType {
    Decimal,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    Float,
    Double,
    Bit,
    Year,
    Time,
    Date,
    DateTime,
    Timestamp,
    Char,
    VarChar,
    Text,
    Binary,
    VarBinary,
    Blob,
    Enum,
    Set,
    Json,
    Geometry,
    Unknown,
}

/// Wire encoding of a resultset's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Text,
    Binary,
}

/// A calendar date as the protocol transmits it.
///
/// The protocol can carry the all-zero date (and zero month/day parts),
/// so construction is permissive; [`is_valid`](Date::is_valid)
/// distinguishes real calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Date {
    pub const ZERO: Date = Date {
        year: 0,
        month: 0,
        day: 0,
    };

    /// Checks the MySQL ranges: year 0-9999, month 1-12, day valid for
    /// the month (leap years included).
    pub fn is_valid(&self) -> bool {
        if self.year > 9999 || self.month == 0 || self.month > 12 || self.day == 0 {
            return false;
        }

        self.day <= days_in_month(self.year, self.month)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    // Permissive wire check: zero parts are representable, anything
    // beyond the field ranges is a protocol error.
    fn in_wire_range(&self) -> bool {
        self.year <= 9999 && self.month <= 12 && self.day <= 31
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            let leap = year % 4 == 0 && (year % 100 != 0 || year % 400 == 0);
            if leap {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// A date plus time-of-day, microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub date: Date,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

impl DateTime {
    pub fn is_valid(&self) -> bool {
        self.date.is_valid() && self.in_time_range()
    }

    fn in_time_range(&self) -> bool {
        self.hour <= 23 && self.minute <= 59 && self.second <= 59 && self.microsecond < 1_000_000
    }

    fn in_wire_range(&self) -> bool {
        self.date.in_wire_range() && self.in_time_range()
    }
}

/// A signed time-of-day duration, limited to ±838:59:59.999999 per
/// MySQL's TIME range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TimeDelta {
    microseconds: i64,
}

impl TimeDelta {
    pub const MAX_MICROSECONDS: i64 = ((838 * 3600 + 59 * 60 + 59) * 1_000_000) + 999_999;

    /// A duration from a raw microsecond count; `None` outside the TIME
    /// range.
    pub fn from_microseconds(microseconds: i64) -> Option<Self> {
        if microseconds.abs() > Self::MAX_MICROSECONDS {
            return None;
        }

        Some(Self { microseconds })
    }

    /// A duration from broken-down components, all non-negative with the
    /// sign carried separately.
    pub fn new(negative: bool, hours: u32, minutes: u8, seconds: u8, microseconds: u32) -> Option<Self> {
        if minutes > 59 || seconds > 59 || microseconds >= 1_000_000 {
            return None;
        }

        let total = i64::from(hours) * 3_600_000_000
            + i64::from(minutes) * 60_000_000
            + i64::from(seconds) * 1_000_000
            + i64::from(microseconds);

        Self::from_microseconds(if negative { -total } else { total })
    }

    pub fn microseconds(&self) -> i64 {
        self.microseconds
    }

    pub fn is_negative(&self) -> bool {
        self.microseconds < 0
    }

    /// Whole hours of the absolute duration.
    pub fn hours(&self) -> u32 {
        (self.microseconds.unsigned_abs() / 3_600_000_000) as u32
    }

    /// Minute component (0-59) of the absolute duration.
    pub fn minutes(&self) -> u8 {
        ((self.microseconds.unsigned_abs() / 60_000_000) % 60) as u8
    }

    /// Second component (0-59) of the absolute duration.
    pub fn seconds(&self) -> u8 {
        ((self.microseconds.unsigned_abs() / 1_000_000) % 60) as u8
    }

    /// Microsecond component (0-999999) of the absolute duration.
    pub fn subsecond_microseconds(&self) -> u32 {
        (self.microseconds.unsigned_abs() % 1_000_000) as u32
    }
}

/// A single decoded field, borrowing its string/blob payload from the
/// row it came from. [`to_owned`](FieldRef::to_owned) yields ownership.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Decimal(&'a str),
    Date(Date),
    DateTime(DateTime),
    Time(TimeDelta),
    Str(&'a str),
    Bytes(&'a [u8]),
    Bit(&'a [u8]),
    Json(&'a str),
    Enum(&'a str),
    Set(&'a str),
    Geometry(&'a [u8]),
}

/// The owned counterpart of [`FieldRef`]; also the parameter vocabulary
/// for prepared-statement execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Decimal(String),
    Date(Date),
    DateTime(DateTime),
    Time(TimeDelta),
    Str(String),
    Bytes(Vec<u8>),
    Bit(Vec<u8>),
    Json(String),
    Enum(String),
    Set(String),
    Geometry(Vec<u8>),
}

impl FieldRef<'_> {
    pub fn to_owned(&self) -> Field {
        match *self {
            FieldRef::Null => Field::Null,
            FieldRef::Int(v) => Field::Int(v),
            FieldRef::UInt(v) => Field::UInt(v),
            FieldRef::Float(v) => Field::Float(v),
            FieldRef::Double(v) => Field::Double(v),
            FieldRef::Decimal(v) => Field::Decimal(v.to_owned()),
            FieldRef::Date(v) => Field::Date(v),
            FieldRef::DateTime(v) => Field::DateTime(v),
            FieldRef::Time(v) => Field::Time(v),
            FieldRef::Str(v) => Field::Str(v.to_owned()),
            FieldRef::Bytes(v) => Field::Bytes(v.to_owned()),
            FieldRef::Bit(v) => Field::Bit(v.to_owned()),
            FieldRef::Json(v) => Field::Json(v.to_owned()),
            FieldRef::Enum(v) => Field::Enum(v.to_owned()),
            FieldRef::Set(v) => Field::Set(v.to_owned()),
            FieldRef::Geometry(v) => Field::Geometry(v.to_owned()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldRef::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldRef::Int(v) => Some(v),
            FieldRef::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldRef::UInt(v) => Some(v),
            FieldRef::Int(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            FieldRef::Str(v)
            | FieldRef::Decimal(v)
            | FieldRef::Json(v)
            | FieldRef::Enum(v)
            | FieldRef::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            FieldRef::Bytes(v) | FieldRef::Bit(v) | FieldRef::Geometry(v) => Some(v),
            FieldRef::Str(v) => Some(v.as_bytes()),
            _ => None,
        }
    }
}

impl Field {
    pub fn as_ref(&self) -> FieldRef<'_> {
        match *self {
            Field::Null => FieldRef::Null,
            Field::Int(v) => FieldRef::Int(v),
            Field::UInt(v) => FieldRef::UInt(v),
            Field::Float(v) => FieldRef::Float(v),
            Field::Double(v) => FieldRef::Double(v),
            Field::Decimal(ref v) => FieldRef::Decimal(v),
            Field::Date(v) => FieldRef::Date(v),
            Field::DateTime(v) => FieldRef::DateTime(v),
            Field::Time(v) => FieldRef::Time(v),
            Field::Str(ref v) => FieldRef::Str(v),
            Field::Bytes(ref v) => FieldRef::Bytes(v),
            Field::Bit(ref v) => FieldRef::Bit(v),
            Field::Json(ref v) => FieldRef::Json(v),
            Field::Enum(ref v) => FieldRef::Enum(v),
            Field::Set(ref v) => FieldRef::Set(v),
            Field::Geometry(ref v) => FieldRef::Geometry(v),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Int(v)
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v.into())
    }
}

impl From<u64> for Field {
    fn from(v: u64) -> Self {
        Field::UInt(v)
    }
}

impl From<u32> for Field {
    fn from(v: u32) -> Self {
        Field::UInt(v.into())
    }
}

impl From<f32> for Field {
    fn from(v: f32) -> Self {
        Field::Float(v)
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Double(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Str(v.to_owned())
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Str(v)
    }
}

impl From<&[u8]> for Field {
    fn from(v: &[u8]) -> Self {
        Field::Bytes(v.to_owned())
    }
}

impl From<Vec<u8>> for Field {
    fn from(v: Vec<u8>) -> Self {
        Field::Bytes(v)
    }
}

impl From<Date> for Field {
    fn from(v: Date) -> Self {
        Field::Date(v)
    }
}

impl From<DateTime> for Field {
    fn from(v: DateTime) -> Self {
        Field::DateTime(v)
    }
}

impl From<TimeDelta> for Field {
    fn from(v: TimeDelta) -> Self {
        Field::Time(v)
    }
}

impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(v: Option<T>) -> Self {
        v.map_or(Field::Null, Into::into)
    }
}

// ---------------------------------------------------------------------
// text format

/// Decodes one non-NULL text-protocol cell against its column metadata.
pub(crate) fn decode_text_field<'a>(raw: &'a [u8], meta: &ColumnMeta) -> Result<FieldRef<'a>> {
    Ok(match meta.column_type() {
        ColumnType::TinyInt
        | ColumnType::SmallInt
        | ColumnType::MediumInt
        | ColumnType::Int
        | ColumnType::BigInt => {
            if meta.is_unsigned() {
                FieldRef::UInt(
                    atoi::atoi::<u64>(raw)
                        .ok_or_else(|| protocol_err!("invalid integer cell"))?,
                )
            } else {
                FieldRef::Int(
                    atoi::atoi::<i64>(raw)
                        .ok_or_else(|| protocol_err!("invalid integer cell"))?,
                )
            }
        }

        ColumnType::Year => FieldRef::UInt(
            atoi::atoi::<u64>(raw).ok_or_else(|| protocol_err!("invalid year cell"))?,
        ),

        ColumnType::Float => FieldRef::Float(
            as_str(raw)?
                .parse()
                .map_err(|_| protocol_err!("invalid float cell"))?,
        ),

        ColumnType::Double => FieldRef::Double(
            as_str(raw)?
                .parse()
                .map_err(|_| protocol_err!("invalid double cell"))?,
        ),

        ColumnType::Decimal => FieldRef::Decimal(as_str(raw)?),

        ColumnType::Date => FieldRef::Date(parse_text_date(as_str(raw)?)?),
        ColumnType::DateTime | ColumnType::Timestamp => {
            FieldRef::DateTime(parse_text_datetime(as_str(raw)?)?)
        }
        ColumnType::Time => FieldRef::Time(parse_text_time(as_str(raw)?)?),

        ColumnType::Bit => FieldRef::Bit(raw),
        ColumnType::Json => FieldRef::Json(as_str(raw)?),
        ColumnType::Enum => FieldRef::Enum(as_str(raw)?),
        ColumnType::Set => FieldRef::Set(as_str(raw)?),
        ColumnType::Geometry => FieldRef::Geometry(raw),

        ColumnType::Char | ColumnType::VarChar | ColumnType::Text => FieldRef::Str(as_str(raw)?),

        ColumnType::Binary | ColumnType::VarBinary | ColumnType::Blob | ColumnType::Unknown => {
            FieldRef::Bytes(raw)
        }
    })
}

fn as_str(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw).map_err(|err| protocol_err!("invalid UTF-8 in cell: {}", err))
}

// YYYY-MM-DD
fn parse_text_date(s: &str) -> Result<Date> {
    let invalid = || protocol_err!("invalid DATE cell: {:?}", s);

    if s.len() != 10 || s.as_bytes()[4] != b'-' || s.as_bytes()[7] != b'-' {
        return Err(invalid());
    }

    let date = Date {
        year: s[..4].parse().map_err(|_| invalid())?,
        month: s[5..7].parse().map_err(|_| invalid())?,
        day: s[8..10].parse().map_err(|_| invalid())?,
    };

    if !date.in_wire_range() {
        return Err(invalid());
    }

    Ok(date)
}

// YYYY-MM-DD HH:MM:SS[.ffffff]
fn parse_text_datetime(s: &str) -> Result<DateTime> {
    let invalid = || protocol_err!("invalid DATETIME cell: {:?}", s);

    if s.len() < 19 || s.as_bytes()[10] != b' ' {
        return Err(invalid());
    }

    let date = parse_text_date(&s[..10])?;
    let time = &s[11..];

    if time.as_bytes()[2] != b':' || time.as_bytes()[5] != b':' {
        return Err(invalid());
    }

    let datetime = DateTime {
        date,
        hour: time[..2].parse().map_err(|_| invalid())?,
        minute: time[3..5].parse().map_err(|_| invalid())?,
        second: time[6..8].parse().map_err(|_| invalid())?,
        microsecond: parse_microseconds(time.get(8..).unwrap_or("")).ok_or_else(invalid)?,
    };

    if !datetime.in_wire_range() {
        return Err(invalid());
    }

    Ok(datetime)
}

// [-]HHH:MM:SS[.ffffff]; hours go up to 838
fn parse_text_time(s: &str) -> Result<TimeDelta> {
    let invalid = || protocol_err!("invalid TIME cell: {:?}", s);

    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let mut parts = rest.splitn(3, ':');
    let hours: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let minutes: u8 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;

    let seconds_part = parts.next().ok_or_else(invalid)?;
    let (seconds, microseconds) = match seconds_part.split_once('.') {
        Some((seconds, fraction)) => (
            seconds.parse::<u8>().map_err(|_| invalid())?,
            parse_microseconds(&format!(".{}", fraction)).ok_or_else(invalid)?,
        ),
        None => (seconds_part.parse::<u8>().map_err(|_| invalid())?, 0),
    };

    TimeDelta::new(negative, hours, minutes, seconds, microseconds).ok_or_else(invalid)
}

// "" or ".ffffff" (1 to 6 digits) -> microseconds
fn parse_microseconds(s: &str) -> Option<u32> {
    if s.is_empty() {
        return Some(0);
    }

    let digits = s.strip_prefix('.')?;
    if digits.is_empty() || digits.len() > 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value: u32 = digits.parse().ok()?;
    Some(value * 10_u32.pow(6 - digits.len() as u32))
}

// ---------------------------------------------------------------------
// binary format

/// Decodes one non-NULL binary-protocol cell, consuming its bytes from
/// `buf`.
pub(crate) fn decode_binary_field<'a>(
    buf: &mut &'a [u8],
    meta: &ColumnMeta,
) -> Result<FieldRef<'a>> {
    Ok(match meta.column_type() {
        ColumnType::TinyInt => {
            if meta.is_unsigned() {
                FieldRef::UInt(buf.get_u8()?.into())
            } else {
                FieldRef::Int(buf.get_i8()?.into())
            }
        }

        ColumnType::SmallInt => {
            if meta.is_unsigned() {
                FieldRef::UInt(buf.get_u16::<LittleEndian>()?.into())
            } else {
                FieldRef::Int(buf.get_i16::<LittleEndian>()?.into())
            }
        }

        // INT24 is transmitted as a full 4-byte integer
        ColumnType::MediumInt | ColumnType::Int => {
            if meta.is_unsigned() {
                FieldRef::UInt(buf.get_u32::<LittleEndian>()?.into())
            } else {
                FieldRef::Int(buf.get_i32::<LittleEndian>()?.into())
            }
        }

        ColumnType::BigInt => {
            if meta.is_unsigned() {
                FieldRef::UInt(buf.get_u64::<LittleEndian>()?)
            } else {
                FieldRef::Int(buf.get_i64::<LittleEndian>()?)
            }
        }

        ColumnType::Year => FieldRef::UInt(buf.get_u16::<LittleEndian>()?.into()),

        ColumnType::Float => FieldRef::Float(buf.get_f32::<LittleEndian>()?),
        ColumnType::Double => FieldRef::Double(buf.get_f64::<LittleEndian>()?),

        ColumnType::Date => FieldRef::Date(decode_binary_date(buf)?),
        ColumnType::DateTime | ColumnType::Timestamp => {
            FieldRef::DateTime(decode_binary_datetime(buf)?)
        }
        ColumnType::Time => FieldRef::Time(decode_binary_time(buf)?),

        ColumnType::Decimal => FieldRef::Decimal(get_lenenc_str(buf)?),
        ColumnType::Json => FieldRef::Json(get_lenenc_str(buf)?),
        ColumnType::Enum => FieldRef::Enum(get_lenenc_str(buf)?),
        ColumnType::Set => FieldRef::Set(get_lenenc_str(buf)?),
        ColumnType::Char | ColumnType::VarChar | ColumnType::Text => {
            FieldRef::Str(get_lenenc_str(buf)?)
        }

        ColumnType::Bit => FieldRef::Bit(get_lenenc_bytes(buf)?),
        ColumnType::Geometry => FieldRef::Geometry(get_lenenc_bytes(buf)?),
        ColumnType::Binary | ColumnType::VarBinary | ColumnType::Blob | ColumnType::Unknown => {
            FieldRef::Bytes(get_lenenc_bytes(buf)?)
        }
    })
}

fn get_lenenc_str<'a>(buf: &mut &'a [u8]) -> Result<&'a str> {
    buf.get_str_lenenc::<LittleEndian>()?
        .ok_or_else(|| protocol_err!("unexpected NULL marker in a binary cell"))
}

fn get_lenenc_bytes<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    buf.get_bytes_lenenc::<LittleEndian>()?
        .ok_or_else(|| protocol_err!("unexpected NULL marker in a binary cell"))
}

// The length byte selects year-month-day only (4), up to seconds (7) or
// up to microseconds (11); 0 is the zero date.
fn decode_binary_date(buf: &mut &[u8]) -> Result<Date> {
    let len = buf.get_u8()?;
    let date = match len {
        0 => Date::ZERO,
        4 | 7 | 11 => {
            let date = Date {
                year: buf.get_u16::<LittleEndian>()?,
                month: buf.get_u8()?,
                day: buf.get_u8()?,
            };

            // a DATE column never carries time-of-day, but be lenient
            // about servers that send the longer forms
            buf.advance(len as usize - 4)?;
            date
        }
        _ => return Err(protocol_err!("invalid binary DATE length: {}", len)),
    };

    if !date.in_wire_range() {
        return Err(protocol_err!("binary DATE out of range"));
    }

    Ok(date)
}

fn decode_binary_datetime(buf: &mut &[u8]) -> Result<DateTime> {
    let len = buf.get_u8()?;
    let mut datetime = DateTime::default();

    if len != 0 && len != 4 && len != 7 && len != 11 {
        return Err(protocol_err!("invalid binary DATETIME length: {}", len));
    }

    if len >= 4 {
        datetime.date = Date {
            year: buf.get_u16::<LittleEndian>()?,
            month: buf.get_u8()?,
            day: buf.get_u8()?,
        };
    }

    if len >= 7 {
        datetime.hour = buf.get_u8()?;
        datetime.minute = buf.get_u8()?;
        datetime.second = buf.get_u8()?;
    }

    if len == 11 {
        datetime.microsecond = buf.get_u32::<LittleEndian>()?;
    }

    if !datetime.in_wire_range() {
        return Err(protocol_err!("binary DATETIME out of range"));
    }

    Ok(datetime)
}

// 0, 8 (to seconds) or 12 (to microseconds) bytes: sign, days, h, m, s
fn decode_binary_time(buf: &mut &[u8]) -> Result<TimeDelta> {
    let len = buf.get_u8()?;

    if len == 0 {
        return Ok(TimeDelta::default());
    }

    if len != 8 && len != 12 {
        return Err(protocol_err!("invalid binary TIME length: {}", len));
    }

    let negative = buf.get_u8()? != 0;
    let days = buf.get_u32::<LittleEndian>()?;
    let hours = buf.get_u8()?;
    let minutes = buf.get_u8()?;
    let seconds = buf.get_u8()?;
    let microseconds = if len == 12 {
        buf.get_u32::<LittleEndian>()?
    } else {
        0
    };

    if hours > 23 {
        return Err(protocol_err!("binary TIME hours out of range"));
    }

    TimeDelta::new(
        negative,
        days * 24 + u32::from(hours),
        minutes,
        seconds,
        microseconds,
    )
    .ok_or_else(|| protocol_err!("binary TIME out of range"))
}

// Encoders for binary statement parameters.

pub(crate) fn put_binary_date(buf: &mut Vec<u8>, date: &Date) {
    if date.is_zero() {
        buf.put_u8(0);
    } else {
        buf.put_u8(4);
        buf.put_u16::<LittleEndian>(date.year);
        buf.put_u8(date.month);
        buf.put_u8(date.day);
    }
}

pub(crate) fn put_binary_datetime(buf: &mut Vec<u8>, datetime: &DateTime) {
    buf.put_u8(11);
    buf.put_u16::<LittleEndian>(datetime.date.year);
    buf.put_u8(datetime.date.month);
    buf.put_u8(datetime.date.day);
    buf.put_u8(datetime.hour);
    buf.put_u8(datetime.minute);
    buf.put_u8(datetime.second);
    buf.put_u32::<LittleEndian>(datetime.microsecond);
}

pub(crate) fn put_binary_time(buf: &mut Vec<u8>, time: &TimeDelta) {
    if time.microseconds() == 0 {
        buf.put_u8(0);
        return;
    }

    buf.put_u8(12);
    buf.put_u8(time.is_negative() as u8);
    buf.put_u32::<LittleEndian>(time.hours() / 24);
    buf.put_u8((time.hours() % 24) as u8);
    buf.put_u8(time.minutes());
    buf.put_u8(time.seconds());
    buf.put_u32::<LittleEndian>(time.subsecond_microseconds());
}
