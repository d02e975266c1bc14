//! Runs one synchronous sweep against a single unit and prints the I/Q
//! sample count recovered for the measured path.

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use vmu_core::config::{HopRate, RxPath, TxPath};
use vmu_core::task::Task;
use vmu_core::transport::Transport;

#[derive(Parser)]
struct Args {
    /// Device IPv4 address.
    #[arg(long)]
    ip: String,
    /// Device UDP port, in [1025, 1279].
    #[arg(long)]
    port: u16,
    /// Sweep start frequency, MHz.
    #[arg(long, default_value_t = 100.0)]
    start_mhz: f64,
    /// Sweep stop frequency, MHz.
    #[arg(long, default_value_t = 4000.0)]
    stop_mhz: f64,
    /// Number of sweep points.
    #[arg(long, default_value_t = 1024)]
    points: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let transport = Transport::open(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    let mut task = Task::new(transport);
    task.set_ipv4(&args.ip)?;
    task.set_port(args.port)?;

    task.initialize(|percent| {
        log::info!("PROM download: {percent}%");
        true
    })?;

    task.set_hop_rate(HopRate::Hop45K)?;
    task.generate_linear_sweep(args.start_mhz, args.stop_mhz, args.points)?;
    task.add_path_to_measure(TxPath::Path0, RxPath::Path0)?;

    task.start()?;
    task.measure()?;
    let record = task.extract_sweep_data(TxPath::Path0, RxPath::Path0)?;
    println!("sweep {} captured {} I/Q points", record.sweep_number, record.i.len());

    task.stop()?;
    Ok(())
}
