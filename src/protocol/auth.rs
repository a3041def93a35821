//! Pluggable authentication.
//!
//! Two plugins are supported; both are challenge/response over a 20-byte
//! server nonce. `caching_sha2_password` may additionally ask for the
//! cleartext password ("full auth"), which is only allowed over a secure
//! channel (TLS or a UNIX socket).

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::{ClientError, Result};

const CHALLENGE_LENGTH: usize = 20;

/// Single byte the server sends (in an auth-more-data packet, or as an
/// auth-switch challenge) to request the cleartext password.
pub const PERFORM_FULL_AUTH: u8 = 4;

/// Single byte meaning the server found the password in its cache; the
/// terminal OK/ERR follows with no further action.
pub const FAST_AUTH_OK: u8 = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuthPlugin {
    MySqlNativePassword,
    CachingSha2Password,
}

impl AuthPlugin {
    pub fn name(self) -> &'static str {
        match self {
            AuthPlugin::MySqlNativePassword => "mysql_native_password",
            AuthPlugin::CachingSha2Password => "caching_sha2_password",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "mysql_native_password" => Ok(AuthPlugin::MySqlNativePassword),
            "caching_sha2_password" => Ok(AuthPlugin::CachingSha2Password),

            _ => Err(ClientError::UnknownAuthPlugin.into()),
        }
    }

    /// Computes the authentication response for `challenge`.
    ///
    /// `secure` states whether the transport is TLS or a UNIX socket;
    /// plugins that would reveal the password refuse insecure channels.
    pub fn compute_response(
        self,
        password: &str,
        challenge: &[u8],
        secure: bool,
    ) -> Result<Vec<u8>> {
        // A blank password always answers with an empty response.
        if password.is_empty() {
            return Ok(Vec::new());
        }

        match self {
            AuthPlugin::MySqlNativePassword => {
                let challenge = check_challenge(challenge)?;
                Ok(native_password_response(password, challenge).to_vec())
            }

            AuthPlugin::CachingSha2Password => {
                if challenge == [PERFORM_FULL_AUTH] {
                    if !secure {
                        return Err(ClientError::AuthPluginRequiresSecureChannel.into());
                    }

                    // Cleartext password, null-terminated.
                    let mut response = Vec::with_capacity(password.len() + 1);
                    response.extend_from_slice(password.as_bytes());
                    response.push(0);
                    return Ok(response);
                }

                let challenge = check_challenge(challenge)?;
                Ok(sha2_password_response(password, challenge).to_vec())
            }
        }
    }
}

fn check_challenge(challenge: &[u8]) -> Result<&[u8; CHALLENGE_LENGTH]> {
    challenge
        .try_into()
        .map_err(|_| ClientError::ProtocolValueError.into())
}

// SHA1(password) XOR SHA1(challenge ∥ SHA1(SHA1(password)))
fn native_password_response(password: &str, challenge: &[u8; CHALLENGE_LENGTH]) -> [u8; 20] {
    let password_sha: [u8; 20] = Sha1::digest(password.as_bytes()).into();

    let mut salted = Sha1::new();
    salted.update(challenge);
    salted.update(Sha1::digest(password_sha));
    let salted_sha: [u8; 20] = salted.finalize().into();

    xor(password_sha, salted_sha)
}

// SHA256(SHA256(SHA256(password)) ∥ challenge) XOR SHA256(password)
fn sha2_password_response(password: &str, challenge: &[u8; CHALLENGE_LENGTH]) -> [u8; 32] {
    let password_sha: [u8; 32] = Sha256::digest(password.as_bytes()).into();

    let mut salted = Sha256::new();
    salted.update(Sha256::digest(password_sha));
    salted.update(challenge);
    let salted_sha: [u8; 32] = salted.finalize().into();

    xor(salted_sha, password_sha)
}

fn xor<const N: usize>(mut a: [u8; N], b: [u8; N]) -> [u8; N] {
    for (a, b) in a.iter_mut().zip(b.iter()) {
        *a ^= b;
    }

    a
}
