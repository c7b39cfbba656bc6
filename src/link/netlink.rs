use std::{ffi::CString, io};

use ipnetwork::IpNetwork;
use netlink_packet_core::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::{
    AddressHeader, AddressMessage, LinkHeader, LinkMessage, RT_SCOPE_LINK, RTN_UNICAST,
    RouteHeader, RouteMessage, RtnlMessage, address, constants::*, link, route,
};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};

use super::LinkConfigurator;

pub const DEFAULT_MTU: u32 = 1420;

pub(crate) fn if_nametoindex(iface: &str) -> Result<u32, io::Error> {
    let name = CString::new(iface)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    match unsafe { libc::if_nametoindex(name.as_ptr()) } {
        0 => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("couldn't find interface '{iface}'."),
        )),
        index => Ok(index),
    }
}

fn netlink_call(
    message: RtnlMessage,
    flags: Option<u16>,
) -> Result<Vec<NetlinkMessage<RtnlMessage>>, io::Error> {
    let mut req = NetlinkMessage::from(message);
    req.header.flags = flags.unwrap_or(NLM_F_REQUEST | NLM_F_ACK | NLM_F_EXCL | NLM_F_CREATE);
    req.finalize();
    let mut buf = [0; 4096];
    req.serialize(&mut buf);
    let len = req.buffer_len();

    log::trace!("netlink request: {:?}", req);
    let socket = Socket::new(NETLINK_ROUTE)?;
    let kernel_addr = SocketAddr::new(0, 0);
    socket.connect(&kernel_addr)?;
    let n_sent = socket.send(&buf[..len], 0)?;
    if n_sent != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "failed to send netlink request",
        ));
    }

    let mut responses = vec![];
    loop {
        let n_received = socket.recv(&mut &mut buf[..], 0)?;
        let mut offset = 0;
        loop {
            let bytes = &buf[offset..];
            let response = NetlinkMessage::<RtnlMessage>::deserialize(bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            responses.push(response.clone());
            log::trace!("netlink response: {:?}", response);
            match response.payload {
                NetlinkPayload::Ack(_) | NetlinkPayload::Done => return Ok(responses),
                NetlinkPayload::Error(e) => return Err(e.into()),
                _ => {}
            }
            offset += response.header.length as usize;
            if offset == n_received || response.header.length == 0 {
                // the reply may continue in the next datagram
                break;
            }
        }
    }
}

fn link_up_message(index: u32, mtu: u32) -> LinkMessage {
    LinkMessage {
        header: LinkHeader {
            index,
            flags: IFF_UP,
            change_mask: IFF_UP,
            ..Default::default()
        },
        nlas: vec![link::nlas::Nla::Mtu(mtu)],
    }
}

fn address_message(index: u32, addr: IpNetwork) -> AddressMessage {
    let (family, nlas) = match addr {
        IpNetwork::V4(network) => {
            let addr_bytes = network.ip().octets().to_vec();
            (
                AF_INET as u8,
                vec![
                    address::Nla::Local(addr_bytes.clone()),
                    address::Nla::Address(addr_bytes),
                ],
            )
        }
        IpNetwork::V6(network) => (
            AF_INET6 as u8,
            vec![address::Nla::Address(network.ip().octets().to_vec())],
        ),
    };

    AddressMessage {
        header: AddressHeader {
            index,
            family,
            prefix_len: addr.prefix(),
            scope: RT_SCOPE_UNIVERSE,
            ..Default::default()
        },
        nlas,
    }
}

fn route_message(index: u32, dst: IpNetwork) -> RouteMessage {
    let (address_family, dst_bytes) = match dst {
        IpNetwork::V4(network) => (AF_INET as u8, network.network().octets().to_vec()),
        IpNetwork::V6(network) => (AF_INET6 as u8, network.network().octets().to_vec()),
    };

    RouteMessage {
        header: RouteHeader {
            protocol: RTPROT_BOOT,
            scope: RT_SCOPE_LINK,
            kind: RTN_UNICAST,
            destination_prefix_length: dst.prefix(),
            address_family,
            ..Default::default()
        },
        nlas: vec![
            route::Nla::Destination(dst_bytes),
            route::Nla::Oif(index),
            route::Nla::Table(RT_TABLE_MAIN as u32),
        ],
    }
}

/// Talks rtnetlink directly, one request per call.
#[derive(Debug, Clone)]
pub struct NetlinkLink {
    mtu: u32,
}

impl Default for NetlinkLink {
    fn default() -> Self {
        Self::new(DEFAULT_MTU)
    }
}

impl NetlinkLink {
    pub fn new(mtu: u32) -> Self {
        Self { mtu }
    }
}

impl LinkConfigurator for NetlinkLink {
    type Error = io::Error;

    fn ensure_link_up(&mut self, iface: &str) -> Result<(), Self::Error> {
        let index = if_nametoindex(iface)?;
        netlink_call(
            RtnlMessage::SetLink(link_up_message(index, self.mtu)),
            None,
        )?;

        log::info!("link {iface} is up, mtu {}", self.mtu);
        Ok(())
    }

    fn add_address(&mut self, iface: &str, addr: IpNetwork) -> Result<(), Self::Error> {
        let index = if_nametoindex(iface)?;
        netlink_call(
            RtnlMessage::NewAddress(address_message(index, addr)),
            Some(NLM_F_REQUEST | NLM_F_ACK | NLM_F_REPLACE | NLM_F_CREATE),
        )?;
        Ok(())
    }

    fn add_route(&mut self, iface: &str, dst: IpNetwork) -> Result<(), Self::Error> {
        let index = if_nametoindex(iface)?;
        match netlink_call(RtnlMessage::NewRoute(route_message(index, dst)), None) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                log::debug!("route {dst} via {iface} already present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
