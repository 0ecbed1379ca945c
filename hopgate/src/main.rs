//! hopgate - gateway node daemon.
//!
//! Runs one hoptrail node on a UDP-emulated link layer. Terminal data packets
//! are acknowledged over the mesh and reported to the HTTP collector.

mod config;
mod http;
mod platform;
mod udp;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hoptrail::{ensure_secure_link, Event, Node};
use log::{debug, info, trace, warn};
use tokio::net::UdpSocket;

use crate::config::Args;
use crate::http::{run_uploader, HttpSink};
use crate::platform::{RandRandom, SystemClock};
use crate::udp::{decode_datagram, UdpTransport, MAX_DATAGRAM};

type GatewayNode = Node<UdpTransport, HttpSink, RandRandom, SystemClock>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    args.validate()?;

    let socket = UdpSocket::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    let socket = Arc::new(socket);
    info!("{} listening on {}", args.address, socket.local_addr()?);

    let transport = UdpTransport::new(args.address, socket.clone(), args.neighbor_map());
    let (sink, uploads) = HttpSink::new();
    let uploader = tokio::spawn(run_uploader(
        reqwest::Client::new(),
        args.collector_url.clone(),
        uploads,
    ));

    let mut node: GatewayNode = Node::new(
        args.address,
        args.lmk,
        transport,
        sink,
        RandRandom::new(),
        SystemClock::new(),
    );

    // Known neighbors get their secured link up front.
    for spec in &args.neighbors {
        match ensure_secure_link(node.transport(), &spec.addr, &args.lmk) {
            Ok(setup) => info!("neighbor {} at {}: {:?}", spec.addr, spec.endpoint, setup),
            Err(e) => warn!("neighbor {}: link setup failed: {}", spec.addr, e),
        }
    }

    if let Some(to) = args.send_to {
        let sent = if to.is_broadcast() {
            node.send_broadcast(&args.send_text)
        } else {
            node.send_data(to, &args.send_text)
        };
        match sent {
            Ok(id) => info!("startup packet {:#010x} sent to {}", id, to),
            Err(e) => warn!("startup send to {} failed: {}", to, e),
        }
    }

    let mut tick = tokio::time::interval(Duration::from_millis(args.tick_ms));
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, remote)) => match decode_datagram(&buf[..len]) {
                    Some((from, frame)) => {
                        let admission = node.inbox().on_link_receive(from, frame);
                        trace!("{} bytes from {} ({}): {:?}", len, from, remote, admission);
                        node.poll();
                    }
                    None => debug!("runt datagram ({} bytes) from {}", len, remote),
                },
                Err(e) => warn!("receive failed: {}", e),
            },
            _ = tick.tick() => {
                node.poll();
                let now = node.now();
                node.handle_timer(now);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
        drain_events(&node);
    }

    let metrics = node.metrics();
    info!("final counters: {:?}", metrics);

    // Dropping the node closes the upload queue; let pending uploads finish.
    drop(node);
    uploader.await.context("uploader task")?;
    Ok(())
}

fn drain_events(node: &GatewayNode) {
    while let Ok(event) = node.events().try_receive() {
        match event {
            Event::DataDelivered { source, id, text } => {
                info!("delivered {:#010x} from {}: {}", id, source, text.as_str())
            }
            Event::SessionComplete { session, from } => {
                info!("session {} acknowledged by {}", session, from)
            }
            Event::BroadcastAcknowledged { from } => info!("broadcast acknowledged by {}", from),
            Event::SessionFailed { id, attempts } => {
                warn!("{:#010x} unacknowledged after {} retries", id, attempts)
            }
        }
    }
}
