use byteorder::LittleEndian;

use crate::collation::BINARY_COLLATION;
use crate::error::{ClientError, Result};
use crate::io::{Buf, BufExt};
use crate::value::ColumnType;
use crate::CharacterSet;

/// Protocol-level column type byte.
///
/// Distinct from [`ColumnType`]: several of these are legacy aliases
/// whose meaning depends on collation and flags.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct TypeId(pub u8);

impl TypeId {
    pub const DECIMAL: TypeId = TypeId(0x00);
    pub const TINY: TypeId = TypeId(0x01);
    pub const SHORT: TypeId = TypeId(0x02);
    pub const LONG: TypeId = TypeId(0x03);
    pub const FLOAT: TypeId = TypeId(0x04);
    pub const DOUBLE: TypeId = TypeId(0x05);
    pub const NULL: TypeId = TypeId(0x06);
    pub const TIMESTAMP: TypeId = TypeId(0x07);
    pub const LONG_LONG: TypeId = TypeId(0x08);
    pub const INT_24: TypeId = TypeId(0x09);
    pub const DATE: TypeId = TypeId(0x0A);
    pub const TIME: TypeId = TypeId(0x0B);
    pub const DATETIME: TypeId = TypeId(0x0C);
    pub const YEAR: TypeId = TypeId(0x0D);
    pub const NEW_DATE: TypeId = TypeId(0x0E);
    pub const VARCHAR: TypeId = TypeId(0x0F);
    pub const BIT: TypeId = TypeId(0x10);
    pub const JSON: TypeId = TypeId(0xF5);
    pub const NEW_DECIMAL: TypeId = TypeId(0xF6);
    pub const ENUM: TypeId = TypeId(0xF7);
    pub const SET: TypeId = TypeId(0xF8);
    pub const TINY_BLOB: TypeId = TypeId(0xF9);
    pub const MEDIUM_BLOB: TypeId = TypeId(0xFA);
    pub const LONG_BLOB: TypeId = TypeId(0xFB);
    pub const BLOB: TypeId = TypeId(0xFC);
    pub const VAR_STRING: TypeId = TypeId(0xFD);
    pub const STRING: TypeId = TypeId(0xFE);
    pub const GEOMETRY: TypeId = TypeId(0xFF);
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/group__group__cs__column__definition__flags.html
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColumnFlags: u16 {
        const NOT_NULL = 1;
        const PRIMARY_KEY = 2;
        const UNIQUE_KEY = 4;
        const MULTIPLE_KEY = 8;
        const BLOB = 16;
        const UNSIGNED = 32;
        const ZEROFILL = 64;
        const BINARY = 128;
        const ENUM = 256;
        const AUTO_INCREMENT = 512;
        const TIMESTAMP = 1024;
        const SET = 2048;
        const NO_DEFAULT_VALUE = 4096;
        const ON_UPDATE_NOW = 8192;
        const NUM = 32768;
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query_response_text_resultset_column_definition.html
// https://mariadb.com/kb/en/resultset/#column-definition-packet
#[derive(Debug)]
pub struct ColumnDefinition<'a> {
    pub schema: &'a str,
    pub table_alias: &'a str,
    pub table: &'a str,
    pub column_alias: &'a str,
    pub column: &'a str,
    pub collation: u16,
    pub max_size: u32,
    pub type_id: TypeId,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl<'a> ColumnDefinition<'a> {
    pub fn read(mut buf: &'a [u8]) -> Result<Self> {
        // catalog : string<lenenc>; always "def"
        let catalog = buf.get_str_lenenc::<LittleEndian>()?;

        if catalog != Some("def") {
            return Err(protocol_err!(
                "expected column definition (\"def\"); received {:?}",
                catalog
            ));
        }

        let schema = buf.get_str_lenenc::<LittleEndian>()?.unwrap_or("");
        let table_alias = buf.get_str_lenenc::<LittleEndian>()?.unwrap_or("");
        let table = buf.get_str_lenenc::<LittleEndian>()?.unwrap_or("");
        let column_alias = buf.get_str_lenenc::<LittleEndian>()?.unwrap_or("");
        let column = buf.get_str_lenenc::<LittleEndian>()?.unwrap_or("");

        // length of the fixed-size block : always 0x0C
        let len_fixed_fields = buf.get_uint_lenenc::<LittleEndian>()?.unwrap_or(0);
        if len_fixed_fields != 0x0C {
            return Err(protocol_err!(
                "expected column definition fixed block (0x0C); received {:#04X}",
                len_fixed_fields
            ));
        }

        let collation = buf.get_u16::<LittleEndian>()?;
        let max_size = buf.get_u32::<LittleEndian>()?;
        let type_id = TypeId(buf.get_u8()?);
        let flags = ColumnFlags::from_bits_truncate(buf.get_u16::<LittleEndian>()?);
        let decimals = buf.get_u8()?;

        // 2 trailing filler bytes

        Ok(Self {
            schema,
            table_alias,
            table,
            column_alias,
            column,
            collation,
            max_size,
            type_id,
            flags,
            decimals,
        })
    }

    /// The name a SELECT exposes: the alias when present, the original
    /// column name otherwise.
    pub fn name(&self) -> &'a str {
        if self.column_alias.is_empty() {
            self.column
        } else {
            self.column_alias
        }
    }
}

/// How much column metadata to retain.
///
/// `Minimal` keeps only what row decoding and name lookup need, saving
/// string allocations on wide resultsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataMode {
    #[default]
    Minimal,
    Full,
}

/// Column metadata retained for a resultset, with the semantic column
/// type already resolved.
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub(crate) schema: Box<str>,
    pub(crate) table_alias: Box<str>,
    pub(crate) table: Box<str>,
    pub(crate) name: Box<str>,
    pub(crate) original_name: Box<str>,
    pub(crate) collation: u16,
    pub(crate) max_size: u32,
    pub(crate) type_id: TypeId,
    pub(crate) column_type: ColumnType,
    pub(crate) flags: ColumnFlags,
    pub(crate) decimals: u8,
}

impl ColumnMeta {
    pub(crate) fn from_definition(def: &ColumnDefinition<'_>, mode: MetadataMode) -> Self {
        let full = matches!(mode, MetadataMode::Full);

        Self {
            schema: if full { def.schema.into() } else { Box::default() },
            table_alias: if full { def.table_alias.into() } else { Box::default() },
            table: if full { def.table.into() } else { Box::default() },
            name: def.name().into(),
            original_name: if full { def.column.into() } else { Box::default() },
            collation: def.collation,
            max_size: def.max_size,
            type_id: def.type_id,
            column_type: resolve_column_type(def.type_id, def.collation, def.flags),
            flags: def.flags,
            decimals: def.decimals,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table_alias
    }

    pub fn original_table(&self) -> &str {
        &self.table
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn collation(&self) -> u16 {
        self.collation
    }

    /// Declared maximum length, in bytes.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED)
    }

    pub fn is_not_null(&self) -> bool {
        self.flags.contains(ColumnFlags::NOT_NULL)
    }

    pub fn is_primary_key(&self) -> bool {
        self.flags.contains(ColumnFlags::PRIMARY_KEY)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.flags.contains(ColumnFlags::AUTO_INCREMENT)
    }

    pub fn is_binary_collation(&self) -> bool {
        self.collation == BINARY_COLLATION
    }

    /// The character set behind this column's collation.
    pub fn character_set(&self) -> Result<CharacterSet> {
        CharacterSet::from_collation(self.collation)
            .ok_or_else(|| ClientError::UnknownCollation.into())
    }
}

/// Maps the protocol type byte, collation and flags to the semantic
/// column type. Legacy type ids some servers still send (`tiny_blob`,
/// `varchar`, `enum`, ...) are resolved here.
pub(crate) fn resolve_column_type(id: TypeId, collation: u16, flags: ColumnFlags) -> ColumnType {
    let binary = collation == BINARY_COLLATION;

    match id {
        TypeId::DECIMAL | TypeId::NEW_DECIMAL => ColumnType::Decimal,
        TypeId::TINY => ColumnType::TinyInt,
        TypeId::SHORT => ColumnType::SmallInt,
        TypeId::INT_24 => ColumnType::MediumInt,
        TypeId::LONG => ColumnType::Int,
        TypeId::LONG_LONG => ColumnType::BigInt,
        TypeId::FLOAT => ColumnType::Float,
        TypeId::DOUBLE => ColumnType::Double,
        TypeId::BIT => ColumnType::Bit,
        TypeId::YEAR => ColumnType::Year,
        TypeId::TIME => ColumnType::Time,
        TypeId::DATE | TypeId::NEW_DATE => ColumnType::Date,
        TypeId::DATETIME => ColumnType::DateTime,
        TypeId::TIMESTAMP => ColumnType::Timestamp,
        TypeId::JSON => ColumnType::Json,
        TypeId::ENUM => ColumnType::Enum,
        TypeId::SET => ColumnType::Set,
        TypeId::GEOMETRY => ColumnType::Geometry,

        TypeId::STRING if flags.contains(ColumnFlags::ENUM) => ColumnType::Enum,
        TypeId::STRING if flags.contains(ColumnFlags::SET) => ColumnType::Set,
        TypeId::STRING if binary => ColumnType::Binary,
        TypeId::STRING => ColumnType::Char,

        TypeId::VARCHAR | TypeId::VAR_STRING if binary => ColumnType::VarBinary,
        TypeId::VARCHAR | TypeId::VAR_STRING => ColumnType::VarChar,

        TypeId::TINY_BLOB | TypeId::MEDIUM_BLOB | TypeId::LONG_BLOB | TypeId::BLOB if binary => {
            ColumnType::Blob
        }
        TypeId::TINY_BLOB | TypeId::MEDIUM_BLOB | TypeId::LONG_BLOB | TypeId::BLOB => {
            ColumnType::Text
        }

        _ => ColumnType::Unknown,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use byteorder::LittleEndian;

    use super::{resolve_column_type, ColumnDefinition, ColumnFlags, ColumnMeta, MetadataMode, TypeId};
    use crate::io::BufMutExt;
    use crate::value::ColumnType;

    pub(crate) fn column_meta(
        name: &str,
        type_id: TypeId,
        collation: u16,
        flags: ColumnFlags,
    ) -> ColumnMeta {
        let raw = encode_column_def(name, type_id, collation, flags);
        let def = ColumnDefinition::read(&raw).unwrap();
        ColumnMeta::from_definition(&def, MetadataMode::Minimal)
    }

    pub(crate) fn encode_column_def(
        name: &str,
        type_id: TypeId,
        collation: u16,
        flags: ColumnFlags,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_str_lenenc::<LittleEndian>("def");
        buf.put_str_lenenc::<LittleEndian>("test_schema");
        buf.put_str_lenenc::<LittleEndian>("t_alias");
        buf.put_str_lenenc::<LittleEndian>("t");
        buf.put_str_lenenc::<LittleEndian>(name);
        buf.put_str_lenenc::<LittleEndian>("orig");
        buf.put_uint_lenenc::<LittleEndian>(0x0C);
        buf.put_u16::<LittleEndian>(collation);
        buf.put_u32::<LittleEndian>(255);
        buf.put_u8(type_id.0);
        buf.put_u16::<LittleEndian>(flags.bits());
        buf.put_u8(0);
        buf.put_u16::<LittleEndian>(0); // filler
        buf
    }

    #[test]
    fn it_decodes_a_column_definition() {
        let raw = encode_column_def("id", TypeId::LONG_LONG, 63, ColumnFlags::NOT_NULL);
        let def = ColumnDefinition::read(&raw).unwrap();

        assert_eq!(def.name(), "id");
        assert_eq!(def.schema, "test_schema");
        assert_eq!(def.type_id, TypeId::LONG_LONG);
        assert!(def.flags.contains(ColumnFlags::NOT_NULL));
    }

    #[test]
    fn it_rejects_a_bad_catalog() {
        let mut raw = encode_column_def("id", TypeId::LONG, 63, ColumnFlags::empty());
        raw[1] = b'x';
        assert!(ColumnDefinition::read(&raw).is_err());
    }

    #[test]
    fn minimal_mode_drops_origin_strings() {
        let raw = encode_column_def("id", TypeId::LONG, 63, ColumnFlags::empty());
        let def = ColumnDefinition::read(&raw).unwrap();

        let meta = ColumnMeta::from_definition(&def, MetadataMode::Minimal);
        assert_eq!(meta.name(), "id");
        assert!(meta.schema().is_empty());

        let meta = ColumnMeta::from_definition(&def, MetadataMode::Full);
        assert_eq!(meta.schema(), "test_schema");
        assert_eq!(meta.original_table(), "t");
    }

    #[test]
    fn it_resolves_legacy_aliases_by_collation() {
        let none = ColumnFlags::empty();

        // blob family: binary collation decides blob vs text
        assert_eq!(resolve_column_type(TypeId::TINY_BLOB, 63, none), ColumnType::Blob);
        assert_eq!(resolve_column_type(TypeId::TINY_BLOB, 45, none), ColumnType::Text);

        // varchar family
        assert_eq!(resolve_column_type(TypeId::VARCHAR, 63, none), ColumnType::VarBinary);
        assert_eq!(resolve_column_type(TypeId::VAR_STRING, 45, none), ColumnType::VarChar);

        // string + flags
        assert_eq!(
            resolve_column_type(TypeId::STRING, 45, ColumnFlags::ENUM),
            ColumnType::Enum
        );
        assert_eq!(
            resolve_column_type(TypeId::STRING, 63, none),
            ColumnType::Binary
        );

        assert_eq!(resolve_column_type(TypeId::NULL, 63, none), ColumnType::Unknown);
    }
}
