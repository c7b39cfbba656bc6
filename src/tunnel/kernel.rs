use std::process::Command;

use tokio::sync::oneshot;

use crate::{error::Error, link::netlink::if_nametoindex};

use super::{TunnelDriver, TunnelHandle};

/// Kernel wireguard devices. Packet processing happens in the kernel module,
/// so the run loop only owns the device lifetime.
#[derive(Debug, Default)]
pub struct KernelDriver;

impl KernelDriver {
    pub fn new() -> Self {
        Self
    }
}

fn ip_link(args: &[&str]) -> Result<(), Error> {
    let out = Command::new("ip").arg("link").args(args).output()?;

    if !out.status.success() {
        log::debug!("ip link: {}", String::from_utf8_lossy(&out.stderr).trim());
        return Err(Error::WgCommandFail(out.status.code()));
    }

    Ok(())
}

impl TunnelDriver for KernelDriver {
    type Handle = KernelDevice;
    type Error = Error;

    fn create(&mut self, iface: &str) -> Result<Self::Handle, Self::Error> {
        if if_nametoindex(iface).is_ok() {
            log::info!("reusing existing device {iface}");
            return Ok(KernelDevice {
                iface: iface.to_string(),
                owned: false,
            });
        }

        ip_link(&["add", "dev", iface, "type", "wireguard"])?;
        log::info!("created wireguard device {iface}");

        Ok(KernelDevice {
            iface: iface.to_string(),
            owned: true,
        })
    }
}

#[derive(Debug)]
pub struct KernelDevice {
    iface: String,
    // whether the device was created by us and should go away with us
    owned: bool,
}

impl TunnelHandle for KernelDevice {
    async fn run(self, stop: oneshot::Receiver<()>) {
        if stop.await.is_err() {
            log::warn!("supervisor of {} went away without stopping", self.iface);
        }

        if !self.owned {
            return;
        }

        let iface = self.iface;
        let res = tokio::task::spawn_blocking(move || {
            ip_link(&["del", "dev", &iface]).map(|_| iface)
        })
        .await;

        match res {
            Ok(Ok(iface)) => log::info!("removed wireguard device {iface}"),
            Ok(Err(err)) => log::error!("cannot remove wireguard device: {err}"),
            Err(err) => log::error!("device teardown panicked: {err}"),
        }
    }
}
