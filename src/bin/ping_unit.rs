//! Pings a unit without going through `initialize` — useful for checking
//! that a device is reachable before committing to the full handshake.

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use vmu_core::task::Task;
use vmu_core::transport::Transport;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    ip: String,
    #[arg(long)]
    port: u16,
    #[arg(long, default_value_t = 5)]
    tries: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let transport = Transport::open(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    let mut task = Task::new(transport);
    task.set_ipv4(&args.ip)?;
    task.set_port(args.port)?;

    task.util_ping_unit(args.tries)?;
    println!("{} responded", args.ip);
    Ok(())
}
