use base64::prelude::*;
use std::{net::SocketAddr, str::FromStr};
use x25519_dalek::{PublicKey, StaticSecret};

pub mod cmd;
pub mod peer;

const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyParseError {
    #[error(transparent)]
    Decode(#[from] base64::DecodeSliceError),

    #[error("key is {0} bytes long, expected 32")]
    Length(usize),
}

/// Curve25519 key in the raw form `wg(8)` uses. The all-zero key marks an
/// interface that has no key configured.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut inner = [0u8; KEY_LEN];
        let len = BASE64_STANDARD.decode_slice(s, &mut inner)?;
        if len != KEY_LEN {
            return Err(KeyParseError::Length(len));
        }

        Ok(Key(inner))
    }
}

impl Key {
    pub const EMPTY: Key = Key([0u8; KEY_LEN]);

    pub fn generate_private() -> Key {
        let mut bytes: [u8; 32] = rand::random();
        bytes[0] &= 248;
        bytes[31] &= 127;
        bytes[31] |= 64;
        Key(bytes)
    }

    pub fn public_key(&self) -> Key {
        let secret = StaticSecret::from(self.0);
        Key(*PublicKey::from(&secret).as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", BASE64_STANDARD.encode(self.0))
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Key").field(&self.to_string()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Domain(String),
    Ip(SocketAddr),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Domain(dom) => write!(f, "{dom}"),
            Endpoint::Ip(addr) => write!(f, "{addr}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if let Ok(addr) = s.parse() {
            Self::Ip(addr)
        } else {
            Self::Domain(s.to_string())
        })
    }
}

/// Key store and peer table of a wireguard interface.
pub trait WireguardApi {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get_private_key(&self, iface: &str) -> Result<Key, Self::Error>;
    fn get_pub_key(&self, iface: &str) -> Result<Key, Self::Error>;

    fn set_private_key(&mut self, iface: &str, key: &Key) -> Result<(), Self::Error>;
    fn set_peer(&mut self, iface: &str, peer: &peer::PeerConfig) -> Result<(), Self::Error>;
}
