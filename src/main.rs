use std::{
    pin::{Pin, pin},
    time::Duration,
};

use clap::Parser;
use futures::future::OptionFuture;
use tokio::time::{Instant, interval_at};
use wg_lease_agent::{
    Agent, Error,
    lease::LeaseClient,
    link::netlink::{DEFAULT_MTU, NetlinkLink},
    tunnel::kernel::KernelDriver,
    wg::{WireguardApi, cmd::WgCmdBackend},
};

#[derive(clap::Parser)]
#[command(version, about)]
pub struct Args {
    /// Wireguard interface to manage
    iface: String,

    /// Base url of the lease server
    #[arg(long, env = "LEASE_SERVER_URL")]
    server_url: String,

    /// Bearer token presented to the lease server
    #[arg(long, env = "LEASE_TOKEN", hide_env_values = true)]
    token: String,

    /// MTU set on the interface when bringing it up
    #[arg(long, default_value_t = DEFAULT_MTU)]
    mtu: u32,

    /// Request the lease again every this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    renew_interval: Option<u64>,

    /// Keepalive interval for the installed peer, in seconds
    #[arg(long)]
    persistent_keepalive: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut wg = WgCmdBackend::new();
    let mut agent = Agent::new(
        &args.iface,
        &mut wg,
        NetlinkLink::new(args.mtu),
        &mut KernelDriver::new(),
        LeaseClient::new()?,
    )?;

    let mut shutdown = pin!(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("cannot listen for shutdown signal: {err}");
        }
    });

    let stopped = tokio::select! {
        res = lease(&mut agent, &mut wg, &args) => {
            if let Err(err) = res {
                agent.shutdown().await;
                return Err(err);
            }
            false
        }
        _ = &mut shutdown => true,
    };

    if !stopped {
        let period = args.renew_interval.map(Duration::from_secs);
        renew_until(shutdown, period, async || {
            lease(&mut agent, &mut wg, &args).await
        })
        .await;
    }

    log::info!("shutting down");
    agent.shutdown().await;

    Ok(())
}

/// Calls `renew` every `period` until `shutdown` completes. A renewal still in
/// flight at that point is abandoned. Without a period it only waits.
async fn renew_until<S, R>(mut shutdown: Pin<&mut S>, period: Option<Duration>, mut renew: R)
where
    S: Future<Output = ()>,
    R: AsyncFnMut() -> Result<(), Error>,
{
    let mut renewal = period.map(|period| interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            Some(_) = OptionFuture::from(renewal.as_mut().map(|i| i.tick())) => {
                tokio::select! {
                    // the previous lease stays in place if renewal fails
                    res = renew() => {
                        if let Err(err) = res {
                            log::error!("lease renewal failed: {err}");
                        }
                    }
                    _ = &mut shutdown => break,
                }
            }
        }
    }
}

async fn lease(
    agent: &mut Agent<NetlinkLink>,
    wg: &mut WgCmdBackend,
    args: &Args,
) -> Result<(), Error> {
    let (mut peer, allowed_ips) = agent
        .get_new_wg_lease(&args.server_url, &args.token)
        .await?;
    peer.persistent_keepalive = args.persistent_keepalive;

    log::info!(
        "installing peer {} allowed ips {}",
        peer.public_key,
        allowed_ips.join(",")
    );
    wg.set_peer(agent.device(), &peer)
}
