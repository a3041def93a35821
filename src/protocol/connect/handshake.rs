use byteorder::LittleEndian;

use crate::error::{ClientError, Result};
use crate::io::Buf;
use crate::protocol::{Capabilities, Status};

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_v10.html
// https://mariadb.com/kb/en/connection/#initial-handshake-packet
#[derive(Debug)]
pub struct Handshake {
    pub protocol_version: u8,
    pub server_version: Box<str>,
    pub connection_id: u32,
    pub server_capabilities: Capabilities,
    pub server_collation: u8,
    pub status: Status,
    pub auth_plugin_name: Box<str>,
    pub auth_plugin_data: Box<[u8]>,
}

impl Handshake {
    pub fn read(mut buf: &[u8]) -> Result<Self> {
        let protocol_version = buf.get_u8()?;
        if protocol_version != 10 {
            return Err(ClientError::ServerUnsupported.into());
        }

        let server_version = buf.get_str_nul()?.into();
        let connection_id = buf.get_u32::<LittleEndian>()?;

        // scramble, first part : string<8>
        let mut scramble = Vec::with_capacity(20);
        scramble.extend_from_slice(buf.get_bytes(8)?);

        // filler : string<1>
        buf.advance(1)?;

        // capability flags, lower 2 bytes : int<2>
        let capabilities_low = buf.get_u16::<LittleEndian>()?;

        let server_collation = buf.get_u8()?;
        let status = Status::from_bits_truncate(buf.get_u16::<LittleEndian>()?);

        // capability flags, upper 2 bytes : int<2>
        let capabilities_high = buf.get_u16::<LittleEndian>()?;
        let capabilities = Capabilities::from_bits_truncate(
            u32::from(capabilities_low) | (u32::from(capabilities_high) << 16),
        );

        let auth_plugin_data_len = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            buf.get_u8()?
        } else {
            buf.advance(1)?;
            0
        };

        // reserved : string<10>
        buf.advance(10)?;

        if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            // scramble, second part : string<n>, n = max(13, len - 8);
            // a trailing null byte is part of the transmission, not of
            // the scramble itself
            let len = ((auth_plugin_data_len as isize) - 8).max(13) as usize;
            scramble.extend_from_slice(buf.get_bytes(len)?);

            if scramble.last() == Some(&0) {
                scramble.pop();
            }
        }

        let auth_plugin_name = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            // most servers null-terminate the name; some older MariaDB
            // builds do not
            if buf.contains(&0) {
                buf.get_str_nul()?
            } else {
                buf.get_str_eof()?
            }
        } else {
            ""
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            server_capabilities: capabilities,
            server_collation,
            status,
            auth_plugin_name: auth_plugin_name.into(),
            auth_plugin_data: scramble.into_boxed_slice(),
        })
    }
}
