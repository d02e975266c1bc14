//! Host-side control-plane core for networked Vector Measurement Units.
//!
//! A [`Task`](task::Task) owns a UDP [`Transport`](transport::Transport),
//! a declarative [`SweepConfig`](config::SweepConfig), and, once
//! [`initialize`](task::Task::initialize) has run, an immutable
//! [`HardwareProfile`](profile::HardwareProfile). `start` turns the
//! configuration into a byte-coded program via
//! [`ProgramBuilder`](program::ProgramBuilder) and uploads it; `measure`
//! drives a [`ReceivePipeline`](pipeline::ReceivePipeline) that reassembles
//! streamed sweep packets into per-path records.

pub mod cmd;
pub mod config;
pub mod error;
pub mod framer;
pub mod pipeline;
pub mod profile;
pub mod program;
pub mod task;
pub mod transport;

pub use config::SweepConfig;
pub use error::{AvmuError, Result};
pub use pipeline::ReceivePipeline;
pub use profile::HardwareProfile;
pub use program::ProgramBuilder;
pub use task::{ProgramType, SweepDataStruct, Task, TaskState};
pub use transport::Transport;
