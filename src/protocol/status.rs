// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/mysql__com_8h.html#a1d854e841086925be1883e4d7b4e8cad
// https://mariadb.com/kb/en/ok_packet/#server-status-flag
bitflags::bitflags! {
    /// The 16-bit status field carried by OK (and EOF-as-OK) packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u16 {
        const IN_TRANS = 1;
        const AUTOCOMMIT = 2;
        const MORE_RESULTS_EXISTS = 8;
        const NO_GOOD_INDEX_USED = 16;
        const NO_INDEX_USED = 32;
        const CURSOR_EXISTS = 64;
        const LAST_ROW_SENT = 128;
        const DB_DROPPED = 256;
        const NO_BACKSLASH_ESCAPES = 512;
        const METADATA_CHANGED = 1024;
        const QUERY_WAS_SLOW = 2048;
        const PS_OUT_PARAMS = 4096;
        const IN_TRANS_READONLY = 8192;
        const SESSION_STATE_CHANGED = 16384;
    }
}
