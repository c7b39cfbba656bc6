use ipnetwork::IpNetwork;

pub mod netlink;

/// Address, route and link state of a single named interface.
pub trait LinkConfigurator {
    type Error: std::error::Error + Send + Sync + 'static;

    fn ensure_link_up(&mut self, iface: &str) -> Result<(), Self::Error>;

    /// Assigns `addr` to `iface`. Re-adding an address already present must
    /// not fail.
    fn add_address(&mut self, iface: &str, addr: IpNetwork) -> Result<(), Self::Error>;

    fn add_route(&mut self, iface: &str, dst: IpNetwork) -> Result<(), Self::Error>;
}
