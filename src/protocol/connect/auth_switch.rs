use crate::error::Result;
use crate::io::Buf;

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_auth_switch_request.html
//
// The server asks the client to re-run authentication with a different
// plugin and a fresh challenge.
#[derive(Debug)]
pub struct AuthSwitch {
    pub plugin_name: Box<str>,
    pub challenge: Box<[u8]>,
}

impl AuthSwitch {
    pub fn read(mut buf: &[u8]) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0xFE {
            return Err(protocol_err!(
                "expected AUTH_SWITCH (0xFE); received 0x{:02X}",
                header
            ));
        }

        let plugin_name = buf.get_str_nul()?.into();

        // challenge : string<EOF>, transmitted with a trailing null
        let mut challenge = buf.get_bytes_eof()?;
        if challenge.last() == Some(&0) {
            challenge = &challenge[..challenge.len() - 1];
        }

        Ok(Self {
            plugin_name,
            challenge: challenge.into(),
        })
    }
}

// A plugin-specific continuation ("auth more data"), e.g. the
// fast-auth-ok / perform-full-auth bytes of caching_sha2_password.
#[derive(Debug)]
pub struct AuthMoreData {
    pub data: Box<[u8]>,
}

impl AuthMoreData {
    pub fn read(mut buf: &[u8]) -> Result<Self> {
        let header = buf.get_u8()?;
        if header != 0x01 {
            return Err(protocol_err!(
                "expected AUTH_MORE_DATA (0x01); received 0x{:02X}",
                header
            ));
        }

        Ok(Self {
            data: buf.get_bytes_eof()?.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthMoreData, AuthSwitch};

    #[test]
    fn it_decodes_auth_switch() {
        let mut raw = vec![0xFE];
        raw.extend_from_slice(b"mysql_native_password\0");
        raw.extend_from_slice(&[7; 20]);
        raw.push(0);

        let p = AuthSwitch::read(&raw).unwrap();
        assert_eq!(&*p.plugin_name, "mysql_native_password");
        assert_eq!(&*p.challenge, &[7; 20][..]);
    }

    #[test]
    fn it_decodes_more_data() {
        let p = AuthMoreData::read(&[0x01, 0x04]).unwrap();
        assert_eq!(&*p.data, &[0x04][..]);
    }
}
