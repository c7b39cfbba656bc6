use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

use crate::error::Error;

use super::{Key, WireguardApi, peer::PeerConfig};

// What `wg show` prints for an unset key
const NO_KEY: &str = "(none)";

#[derive(Debug, Default)]
pub struct WgCmdBackend;
impl WgCmdBackend {
    pub fn new() -> Self {
        Self
    }

    fn show(iface: &str, field: &str) -> Result<Key, Error> {
        let out = Command::new("wg").arg("show").arg(iface).arg(field).output()?;
        check(&out)?;

        parse_key_output(&String::from_utf8_lossy(&out.stdout))
    }
}

fn check(out: &Output) -> Result<(), Error> {
    if !out.status.success() {
        log::debug!("wg: {}", String::from_utf8_lossy(&out.stderr).trim());
        return Err(Error::WgCommandFail(out.status.code()));
    }

    Ok(())
}

fn parse_key_output(out: &str) -> Result<Key, Error> {
    let out = out.trim();
    if out.is_empty() || out == NO_KEY {
        return Ok(Key::EMPTY);
    }

    Ok(out.parse()?)
}

fn peer_args(iface: &str, peer: &PeerConfig) -> Vec<String> {
    let mut args = vec![
        "set".to_string(),
        iface.to_string(),
        "peer".to_string(),
        peer.public_key.clone(),
    ];

    if let Some(endpoint) = &peer.endpoint {
        args.push("endpoint".to_string());
        args.push(endpoint.to_string());
    }

    if let Some(keepalive) = peer.persistent_keepalive {
        args.push("persistent-keepalive".to_string());
        args.push(keepalive.to_string());
    }

    args.push("allowed-ips".to_string());
    args.push(peer.allowed_ips.join(","));
    args
}

impl WireguardApi for WgCmdBackend {
    type Error = Error;

    fn get_private_key(&self, iface: &str) -> Result<Key, Self::Error> {
        Self::show(iface, "private-key")
    }

    fn get_pub_key(&self, iface: &str) -> Result<Key, Self::Error> {
        Self::show(iface, "public-key")
    }

    fn set_private_key(&mut self, iface: &str, key: &Key) -> Result<(), Self::Error> {
        let mut child = Command::new("wg")
            .arg("set")
            .arg(iface)
            .arg("private-key")
            .arg("/dev/stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            writeln!(stdin, "{key}")?;
        }

        check(&child.wait_with_output()?)
    }

    fn set_peer(&mut self, iface: &str, peer: &PeerConfig) -> Result<(), Self::Error> {
        // Preshared keys would have to go through a file as well; leases never carry one.
        if peer.preshared_key.is_some() {
            log::warn!("ignoring preshared key for peer {}", peer.public_key);
        }

        let out = Command::new("wg").args(peer_args(iface, peer)).output()?;
        check(&out)
    }
}
