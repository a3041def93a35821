//! Character sets and the collation table.
//!
//! The server identifies text encodings by a 2-byte collation id; the
//! client needs the character set behind it (most importantly whether it
//! is multi-byte) to escape SQL safely and to validate `SET NAMES`.

/// A character set known to this library.
///
/// `max_bytes_per_char` drives escaping rules: a multi-byte character
/// set can embed bytes that look like quotes inside a character, so
/// escaping must be charset-aware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterSet {
    name: &'static str,
    max_bytes_per_char: u8,
}

impl CharacterSet {
    pub const UTF8MB4: CharacterSet = CharacterSet::new("utf8mb4", 4);
    pub const UTF8MB3: CharacterSet = CharacterSet::new("utf8mb3", 3);
    pub const ASCII: CharacterSet = CharacterSet::new("ascii", 1);
    pub const LATIN1: CharacterSet = CharacterSet::new("latin1", 1);
    pub const BINARY: CharacterSet = CharacterSet::new("binary", 1);

    const fn new(name: &'static str, max_bytes_per_char: u8) -> Self {
        Self {
            name,
            max_bytes_per_char,
        }
    }

    /// The MySQL name of this character set (e.g. `"utf8mb4"`).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Maximum encoded length of one character, in bytes.
    pub fn max_bytes_per_char(&self) -> u8 {
        self.max_bytes_per_char
    }

    /// Looks up a character set by its MySQL name.
    ///
    /// Returns `None` for names this library does not know; callers turn
    /// that into [`ClientError::UnknownCharacterSet`].
    ///
    /// [`ClientError::UnknownCharacterSet`]: crate::ClientError::UnknownCharacterSet
    pub fn by_name(name: &str) -> Option<CharacterSet> {
        Some(match name {
            "utf8mb4" => Self::UTF8MB4,
            "utf8" | "utf8mb3" => Self::UTF8MB3,
            "ascii" => Self::ASCII,
            "latin1" => Self::LATIN1,
            "binary" => Self::BINARY,
            "ucs2" => CharacterSet::new("ucs2", 2),
            "utf16" => CharacterSet::new("utf16", 4),
            "utf16le" => CharacterSet::new("utf16le", 4),
            "utf32" => CharacterSet::new("utf32", 4),
            "big5" => CharacterSet::new("big5", 2),
            "sjis" => CharacterSet::new("sjis", 2),
            "cp932" => CharacterSet::new("cp932", 2),
            "ujis" => CharacterSet::new("ujis", 3),
            "eucjpms" => CharacterSet::new("eucjpms", 3),
            "euckr" => CharacterSet::new("euckr", 2),
            "gb2312" => CharacterSet::new("gb2312", 2),
            "gbk" => CharacterSet::new("gbk", 2),
            "gb18030" => CharacterSet::new("gb18030", 4),
            "latin2" => CharacterSet::new("latin2", 1),
            "latin5" => CharacterSet::new("latin5", 1),
            "latin7" => CharacterSet::new("latin7", 1),
            "cp1250" => CharacterSet::new("cp1250", 1),
            "cp1251" => CharacterSet::new("cp1251", 1),
            "cp1256" => CharacterSet::new("cp1256", 1),
            "cp1257" => CharacterSet::new("cp1257", 1),
            "greek" => CharacterSet::new("greek", 1),
            "hebrew" => CharacterSet::new("hebrew", 1),
            "tis620" => CharacterSet::new("tis620", 1),
            "koi8r" => CharacterSet::new("koi8r", 1),
            "koi8u" => CharacterSet::new("koi8u", 1),
            _ => return None,
        })
    }

    /// Looks up the character set behind a server collation id.
    pub fn from_collation(id: u16) -> Option<CharacterSet> {
        Some(match id {
            // utf8mb4: the classic *_ci ids, the 8.0 no-pad range and
            // the MariaDB uca1400 range
            45 | 46 | 224..=247 | 255..=323 => Self::UTF8MB4,
            // utf8mb3
            33 | 76 | 83 | 192..=223 => Self::UTF8MB3,
            63 => Self::BINARY,
            5 | 8 | 15 | 31 | 47 | 48 | 49 | 94 => Self::LATIN1,
            11 | 65 => Self::ASCII,
            35 | 90 | 128..=151 => CharacterSet::new("ucs2", 2),
            54 | 55 | 101..=124 => CharacterSet::new("utf16", 4),
            56 | 62 => CharacterSet::new("utf16le", 4),
            60 | 61 | 160..=183 => CharacterSet::new("utf32", 4),
            1 | 84 => CharacterSet::new("big5", 2),
            13 | 88 => CharacterSet::new("sjis", 2),
            95 | 96 => CharacterSet::new("cp932", 2),
            12 | 91 => CharacterSet::new("ujis", 3),
            97 | 98 => CharacterSet::new("eucjpms", 3),
            19 | 85 => CharacterSet::new("euckr", 2),
            24 | 86 => CharacterSet::new("gb2312", 2),
            28 | 87 => CharacterSet::new("gbk", 2),
            248..=250 => CharacterSet::new("gb18030", 4),
            2 | 9 | 21 | 27 | 77 => CharacterSet::new("latin2", 1),
            30 | 78 => CharacterSet::new("latin5", 1),
            20 | 41 | 42 | 79 => CharacterSet::new("latin7", 1),
            26 | 34 | 44 | 66 | 99 => CharacterSet::new("cp1250", 1),
            14 | 23 | 50 | 51 | 52 => CharacterSet::new("cp1251", 1),
            57 | 67 => CharacterSet::new("cp1256", 1),
            29 | 58 | 59 => CharacterSet::new("cp1257", 1),
            25 | 70 => CharacterSet::new("greek", 1),
            16 | 71 => CharacterSet::new("hebrew", 1),
            18 | 89 => CharacterSet::new("tis620", 1),
            7 | 74 => CharacterSet::new("koi8r", 1),
            22 | 75 => CharacterSet::new("koi8u", 1),
            _ => return None,
        })
    }
}

/// Collation id sent in the handshake response: `utf8mb4_general_ci`.
/// Understood by every supported MySQL and MariaDB version.
pub(crate) const HANDSHAKE_COLLATION: u8 = 45;

/// Collation id meaning "raw bytes, no character set".
pub(crate) const BINARY_COLLATION: u16 = 63;
