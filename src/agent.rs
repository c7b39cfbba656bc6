use ipnetwork::IpNetwork;

use crate::{
    error::Error,
    identity::{Identity, ensure_keys},
    lease::LeaseClient,
    link::LinkConfigurator,
    tunnel::{Supervisor, TunnelDriver},
    wg::{WireguardApi, peer::PeerConfig},
};

/// Splits a lease's allowed ip list. Entries are neither trimmed nor
/// filtered.
pub fn split_allowed_ips(allowed_ips: &str) -> Vec<String> {
    allowed_ips.split(',').map(str::to_string).collect()
}

fn parse_ip_net(input: &str) -> Result<IpNetwork, Error> {
    input.parse().map_err(|source| Error::Parse {
        input: input.to_string(),
        source,
    })
}

/// Keeps one wireguard interface provisioned: the device, its keys and the
/// addresses and routes handed out by a lease server.
pub struct Agent<L> {
    device: String,
    identity: Identity,
    link: L,
    lease: LeaseClient,
    tundev: Supervisor,
}

impl<L: LinkConfigurator> Agent<L> {
    /// Starts the device, brings the link up and makes sure the device has a
    /// key pair, in that order. Leases are requested separately.
    ///
    /// Spawns the device run loop, so it must be called from within a tokio
    /// runtime.
    pub fn new<W, D>(
        device: &str,
        wg: &mut W,
        mut link: L,
        driver: &mut D,
        lease: LeaseClient,
    ) -> Result<Self, Error>
    where
        W: WireguardApi,
        D: TunnelDriver,
    {
        let tundev = Supervisor::start(driver, device)?;

        link.ensure_link_up(device)
            .map_err(|e| Error::link_state(device, "bringing link up", e))?;

        let identity = ensure_keys(wg, device)?;

        Ok(Self {
            device: device.to_string(),
            identity,
            link,
            lease,
            tundev,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn add_ip_to_dev(&mut self, ip: &str) -> Result<(), Error> {
        let dev_ip = parse_ip_net(ip)?;

        log::info!("configuring offered ip {dev_ip} on dev {}", self.device);
        self.link
            .add_address(&self.device, dev_ip)
            .map_err(|e| Error::link_state(&self.device, "adding address", e))
    }

    fn add_routes_for_allowed_ips(&mut self, allowed_ips: &[String]) -> Result<(), Error> {
        for aip in allowed_ips {
            let dst = parse_ip_net(aip)?;

            log::info!("adding route {dst} on dev {}", self.device);
            self.link
                .add_route(&self.device, dst)
                .map_err(|e| Error::link_state(&self.device, "adding route", e))?;
        }

        Ok(())
    }

    /// Asks the lease server for a lease, applies the offered address and the
    /// routes for the peer's allowed ips, and returns the peer to install.
    ///
    /// Nothing applied before a failing step is rolled back.
    pub async fn get_new_wg_lease(
        &mut self,
        server_url: &str,
        token: &str,
    ) -> Result<(PeerConfig, Vec<String>), Error> {
        let resp = self
            .lease
            .request_lease(server_url, token, &self.identity.public)
            .await?;

        self.add_ip_to_dev(&resp.ip)?;

        let allowed_ips = split_allowed_ips(&resp.allowed_ips);
        self.add_routes_for_allowed_ips(&allowed_ips)?;

        let peer = PeerConfig::new(&resp.pub_key, None, &resp.endpoint, allowed_ips.clone());

        Ok((peer, allowed_ips))
    }

    /// Signals the device run loop without waiting for it.
    pub fn stop(&mut self) {
        self.tundev.stop();
    }

    /// Stops the device run loop and waits until it has exited.
    pub async fn shutdown(self) {
        self.tundev.join().await;
    }
}
