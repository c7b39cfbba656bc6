use crate::{
    error::Error,
    wg::{Key, WireguardApi},
};

/// Key pair of the managed interface.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub public: Key,
    pub private: Key,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Makes sure `device` has a private key, generating and installing one if
/// the interface reports the empty key, and returns the resulting pair.
pub fn ensure_keys<W: WireguardApi>(wg: &mut W, device: &str) -> Result<Identity, Error> {
    let retrieval = |e: W::Error| Error::KeyRetrieval {
        device: device.to_string(),
        source: e.into(),
    };

    let private = wg.get_private_key(device).map_err(retrieval)?;

    if private.is_empty() {
        log::info!("no private key on {device}, generating one");

        let key = Key::generate_private();
        wg.set_private_key(device, &key)
            .map_err(|e| Error::KeyGeneration {
                device: device.to_string(),
                source: e.into(),
            })?;
    }

    let private = wg.get_private_key(device).map_err(retrieval)?;
    if private.is_empty() {
        return Err(Error::KeyGeneration {
            device: device.to_string(),
            source: "private key still empty after install".into(),
        });
    }

    let public = wg.get_pub_key(device).map_err(retrieval)?;

    log::info!("using public key {public} on {device}");

    Ok(Identity { public, private })
}
