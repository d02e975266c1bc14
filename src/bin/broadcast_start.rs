//! Coordinates a simultaneous start across several units sharing one
//! transport: one `Generate` sync-pulse role and the rest `Receive`.

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use vmu_core::config::{HopRate, RxPath, SyncPulseMode, TxPath};
use vmu_core::task::{self, ProgramType, Task};
use vmu_core::transport::Transport;

#[derive(Parser)]
struct Args {
    /// Device IPv4 addresses, one per unit; the first is the sync-pulse
    /// generator, the rest are receivers.
    #[arg(long, num_args = 2.., required = true)]
    ips: Vec<String>,
    #[arg(long)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let transport = Transport::open(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;

    let mut tasks: Vec<Task> = Vec::new();
    for (idx, ip) in args.ips.iter().enumerate() {
        let mut task = Task::new(transport.clone());
        task.set_ipv4(ip)?;
        task.set_port(args.port)?;
        task.initialize(|_| true)?;
        task.set_measurement_type(ProgramType::Async)?;
        task.set_hop_rate(HopRate::Hop15K)?;
        task.generate_linear_sweep(100.0, 2000.0, 512)?;
        task.add_path_to_measure(TxPath::Path0, RxPath::Path0)?;
        task.set_sync_pulse_mode(if idx == 0 { SyncPulseMode::Generate } else { SyncPulseMode::Receive })?;
        task.start()?;
        task.begin_async()?;
        tasks.push(task);
    }

    let refs: Vec<&Task> = tasks.iter().collect();
    task::validate_array_tasks(&refs)?;

    let mut mut_refs: Vec<&mut Task> = tasks.iter_mut().collect();
    task::broadcast_begin_command(&mut mut_refs)?;
    println!("broadcast start sent to {} units", args.ips.len());
    Ok(())
}
