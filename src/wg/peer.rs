use super::{Endpoint, Key};

/// Remote peer as handed out by the lease server, ready to be installed on
/// the interface.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    // PublicKey, as received
    pub public_key: String,

    // PresharedKey
    pub preshared_key: Option<Key>,

    // Endpoint
    pub endpoint: Option<Endpoint>,

    // AllowedIPs
    pub allowed_ips: Vec<String>,

    // PersistentKeepalive
    pub persistent_keepalive: Option<u16>,
}

impl PeerConfig {
    pub fn new(
        public_key: &str,
        preshared_key: Option<Key>,
        endpoint: &str,
        allowed_ips: Vec<String>,
    ) -> Self {
        let endpoint = if endpoint.is_empty() {
            None
        } else {
            endpoint.parse().ok()
        };

        PeerConfig {
            public_key: public_key.to_string(),
            preshared_key,
            endpoint,
            allowed_ips,
            persistent_keepalive: None,
        }
    }
}
