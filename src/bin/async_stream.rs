//! Starts a unit in asynchronous mode and drains streamed sweeps for a
//! fixed number of drain cycles, printing the sweep numbers recovered.

use std::net::{Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use clap::Parser;
use vmu_core::config::{HopRate, RxPath, TxPath};
use vmu_core::task::{ProgramType, Task};
use vmu_core::transport::Transport;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    ip: String,
    #[arg(long)]
    port: u16,
    /// Number of drain cycles before halting.
    #[arg(long, default_value_t = 20)]
    cycles: u32,
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

    task.set_measurement_type(ProgramType::Async)?;
    task.set_hop_rate(HopRate::Hop15K)?;
    task.generate_linear_sweep(100.0, 2000.0, 256)?;
    task.add_path_to_measure(TxPath::Path0, RxPath::Path0)?;

    task.start()?;
    task.begin_async()?;

    for cycle in 0..args.cycles {
        task.measure()?;
        match task.extract_sweep_data(TxPath::Path0, RxPath::Path0) {
            Ok(record) => println!("cycle {cycle}: sweep {} ({} points)", record.sweep_number, record.i.len()),
            Err(e) => log::debug!("cycle {cycle}: nothing ready yet ({e})"),
        }
        thread::sleep(Duration::from_millis(50));
    }

    task.halt_async()?;
    task.stop()?;
    Ok(())
}
