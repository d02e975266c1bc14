//! The `Task` state machine: the one object a caller drives end to end.
//!
//! `Uninitialized → Stopped → Started → Running`, gating every other
//! operation in this module exactly per the transition table this crate is
//! built against. Blocking calls run on the caller's thread; the only
//! concurrency primitive is the `interruptMeasurement` channel.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::cmd::{cmd_sweep, cmd_system, OPC_BEGIN_ASYNC, OPC_BROADCAST_BEGIN, OPC_ENTER_LOW_POWER, OPC_GET_CAPABILITIES, OPC_HALT_ASYNC, OPC_PING, OPC_READ_PROM_CHUNK, OPC_START, OPC_STOP, OPC_TRIGGER_SYNC, OPC_UPLOAD_PROGRAM};
use crate::config::{RxPath, SweepConfig, TxPath};
use crate::error::{AvmuError, Result};
use crate::framer::{self, ReplyFrame};
use crate::pipeline::ReceivePipeline;
use crate::profile::{HardwareProfile, SwitchboardKind};
use crate::program::ProgramBuilder;
use crate::transport::{PeerChannel, Transport};

/// Default request/reply timeout, matching the original header's documented
/// default.
const DEFAULT_TIMEOUT_MS: u64 = 100;
/// Bytes of uploaded program per `OPC_UPLOAD_PROGRAM` datagram.
const UPLOAD_CHUNK_LEN: usize = 512;
/// Bytes of PROM read per `OPC_READ_PROM_CHUNK` datagram during initialize.
const PROM_CHUNK_LEN: u16 = 256;
/// PROM magic bytes; anything else is `BadProm`.
const PROM_MAGIC: &[u8; 4] = b"VMUP";
/// How many in-flight sweeps `ReceivePipeline` keeps queued before dropping.
const PIPELINE_QUEUE_DEPTH: usize = 4;
/// Granularity at which `drain_until` re-checks the interrupt channel and
/// deadline while blocked on the peer channel.
const POLL_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Uninitialized,
    Stopped,
    Started,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramType {
    Sync,
    Async,
}

impl Default for ProgramType {
    fn default() -> Self {
        ProgramType::Sync
    }
}

/// One per-path, per-sweep measurement record, as described in the data
/// model: I/Q arrays sized to the snapped frequency list, plus the optional
/// encoder/serial side channels and sweep bookkeeping.
#[derive(Debug, Clone)]
pub struct SweepDataStruct {
    pub tx: TxPath,
    pub rx: RxPath,
    pub i: Vec<f64>,
    pub q: Vec<f64>,
    pub serial_buffer: Vec<u8>,
    pub serial_age: u32,
    pub timestamp_ticks: u32,
    pub packet_number: u16,
    pub sweep_number: u32,
    pub frame_number: u32,
}

/// A per-device control object: owns (or shares) a `Transport`, a
/// `SweepConfig`, and, once populated, a `HardwareProfile`.
pub struct Task {
    transport: Transport,
    channel: Option<PeerChannel>,
    ipv4: Option<Ipv4Addr>,
    port: Option<u16>,
    state: TaskState,
    config: SweepConfig,
    profile: HardwareProfile,
    timeout_ms: u64,
    program_type: ProgramType,
    queue: VecDeque<SweepDataStruct>,
    pipeline: Option<ReceivePipeline>,
    interrupt_tx: Sender<()>,
    interrupt_rx: Receiver<()>,
}

impl Task {
    pub fn new(transport: Transport) -> Self {
        let (interrupt_tx, interrupt_rx) = mpsc::channel();
        Task {
            transport,
            channel: None,
            ipv4: None,
            port: None,
            state: TaskState::Uninitialized,
            config: SweepConfig::new(),
            profile: HardwareProfile::zeroed(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            program_type: ProgramType::default(),
            queue: VecDeque::new(),
            pipeline: None,
            interrupt_tx,
            interrupt_rx,
        }
    }

    /// Construct a new `Task` sharing this one's `Transport` (see §4.8:
    /// several logical devices multiplexed over one socket). The new task
    /// still needs its own `set_ipv4`/`set_port` before `initialize`.
    pub fn create_shared_task(&self) -> Task {
        Task::new(self.transport.clone())
    }

    // --- state & endpoint ---

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ipv4
    }

    /// Reassigning the endpoint forces `Uninitialized`, discarding any
    /// cached profile and dropping the current peer channel — the next
    /// device behind this address may be a different unit entirely.
    pub fn set_ipv4(&mut self, ipv4: &str) -> Result<()> {
        let addr = Ipv4Addr::from_str(ipv4).map_err(|_| AvmuError::BadIpPort)?;
        self.ipv4 = Some(addr);
        self.force_uninitialized();
        Ok(())
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn set_port(&mut self, port: u16) -> Result<()> {
        if !(crate::config::MIN_DEVICE_PORT..=crate::config::MAX_DEVICE_PORT).contains(&port) {
            return Err(AvmuError::BadIpPort);
        }
        self.port = Some(port);
        self.force_uninitialized();
        Ok(())
    }

    fn force_uninitialized(&mut self) {
        self.state = TaskState::Uninitialized;
        self.profile = HardwareProfile::zeroed();
        self.channel = None;
        self.pipeline = None;
        self.queue.clear();
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Zero is "non-blocking poll": a subsequent `measure()` returns
    /// immediately with `NoResponse` rather than blocking if nothing is
    /// already queued.
    pub fn set_timeout_ms(&mut self, ms: u64) {
        self.timeout_ms = ms;
    }

    pub fn measurement_type(&self) -> ProgramType {
        self.program_type
    }

    pub fn set_measurement_type(&mut self, program_type: ProgramType) -> Result<()> {
        self.check_mutable()?;
        self.program_type = program_type;
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        match self.state {
            TaskState::Uninitialized | TaskState::Stopped => Ok(()),
            _ => Err(AvmuError::WrongState),
        }
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        let ip = self.ipv4.ok_or(AvmuError::MissingIp)?;
        let port = self.port.ok_or(AvmuError::MissingPort)?;
        Ok(SocketAddr::from((ip, port)))
    }

    fn channel(&self) -> Result<&PeerChannel> {
        self.channel.as_ref().ok_or(AvmuError::Socket)
    }

    pub fn interrupt_handle(&self) -> Sender<()> {
        self.interrupt_tx.clone()
    }

    // --- configuration passthrough (state-gated) ---

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Snaps every frequency to the hardware's generatable grid before
    /// storing it, so a subsequent `config().frequencies()` read reflects
    /// exactly what the device will tune to.
    pub fn set_frequencies(&mut self, freqs: Vec<f64>) -> Result<()> {
        self.check_mutable()?;
        if freqs.len() > self.profile.max_points {
            return Err(AvmuError::TooManyPoints);
        }
        let snapped = freqs
            .into_iter()
            .map(|f| crate::program::util_nearest_legal_freq(&self.profile, f))
            .collect::<Result<Vec<f64>>>()?;
        self.config.set_frequencies_checked(snapped, self.profile.max_points, None)
    }

    /// `utilGenerateLinearSweep`: snaps `[start, end]` to the hardware grid
    /// for `n` evenly spaced points and installs the result as the
    /// frequency list. Only valid in `Stopped` — it needs a populated
    /// `HardwareProfile`.
    pub fn generate_linear_sweep(&mut self, start_mhz: f64, end_mhz: f64, n: u32) -> Result<()> {
        if self.state != TaskState::Stopped {
            return Err(AvmuError::WrongState);
        }
        let (start, end) = crate::program::util_fix_linear_sweep_limits(&self.profile, start_mhz, end_mhz, n)?;
        let points = crate::program::linear_points(start, end, n);
        self.config.set_frequencies_checked(points, self.profile.max_points, None)
    }

    pub fn set_hop_rate(&mut self, hop_rate: crate::config::HopRate) -> Result<()> {
        self.check_mutable()?;
        self.config.set_hop_rate(hop_rate);
        Ok(())
    }

    pub fn add_path_to_measure(&mut self, tx: TxPath, rx: RxPath) -> Result<()> {
        self.check_mutable()?;
        self.config.add_path_to_measure(tx, rx)
    }

    pub fn clear_measured_paths(&mut self) -> Result<()> {
        self.check_mutable()?;
        self.config.clear_measured_paths();
        Ok(())
    }

    pub fn add_exclusion_band(&mut self, start_mhz: f64, stop_mhz: f64) -> Result<()> {
        self.check_mutable()?;
        self.config.add_exclusion_band(start_mhz, stop_mhz)
    }

    pub fn set_if_gain(&mut self, gain: crate::config::IfGain) -> Result<()> {
        self.check_mutable()?;
        self.config.set_if_gain(gain)
    }

    pub fn set_pad_12db_enabled(&mut self, enabled: bool) -> Result<()> {
        self.check_mutable()?;
        self.config.set_pad_12db_enabled(enabled);
        Ok(())
    }

    pub fn set_encoder(&mut self, cfg: crate::config::EncoderConfig) -> Result<()> {
        self.check_mutable()?;
        self.config.set_encoder(cfg);
        Ok(())
    }

    pub fn set_serial_port(&mut self, cfg: crate::config::SerialConfig) -> Result<()> {
        self.check_mutable()?;
        self.config.set_serial_port(cfg);
        Ok(())
    }

    pub fn set_sync_pulse_mode(&mut self, mode: crate::config::SyncPulseMode) -> Result<()> {
        self.check_mutable()?;
        self.config.set_sync_pulse_mode(mode);
        Ok(())
    }

    pub fn set_send_sweep_timer(&mut self, enabled: bool) -> Result<()> {
        self.check_mutable()?;
        self.config.set_send_sweep_timer(enabled);
        Ok(())
    }

    pub fn set_reset_frame_counter_on_start(&mut self, enabled: bool) -> Result<()> {
        self.check_mutable()?;
        self.config.set_reset_frame_counter_on_start(enabled);
        Ok(())
    }

    pub fn set_tdd_settings(&mut self, settings: crate::config::TddSettings) -> Result<()> {
        self.check_mutable()?;
        self.config.set_tdd_settings(settings);
        Ok(())
    }

    // --- request/reply primitive ---

    fn request_reply(&self, opcode: u16, payload: &[u8], timeout_ms: u64) -> Result<ReplyFrame> {
        let peer = self.peer_addr()?;
        let channel = self.channel()?;
        let sequence = self.transport.next_sequence();
        let frame = framer::encode_command(opcode, sequence, payload);
        self.transport.send_to(peer, &frame)?;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AvmuError::NoResponse);
            }
            let datagram = channel.recv_timeout(remaining)?;
            match framer::decode_reply(&datagram) {
                Ok(reply) if reply.opcode == opcode && reply.sequence == sequence => {
                    return Ok(reply);
                }
                Ok(_) => continue, // stale or unrelated reply, keep waiting
                Err(_) => continue, // not a command reply (e.g. a streamed sweep frame), ignore here
            }
        }
    }

    // --- 4.2 initialize ---

    /// Handshakes with the device: capabilities query, then a chunked PROM
    /// download, invoking `progress(percent)` after each chunk. Returning
    /// `false` aborts the download with `Interrupted`; no state transition
    /// happens unless the whole handshake succeeds.
    pub fn initialize(&mut self, mut progress: impl FnMut(u8) -> bool) -> Result<()> {
        if self.state != TaskState::Uninitialized {
            return Err(AvmuError::WrongState);
        }
        let peer = self.peer_addr()?;
        let channel = self.transport.register(peer);
        let sequence = self.transport.next_sequence();
        let frame = framer::encode_command(OPC_GET_CAPABILITIES, sequence, &cmd_system::get_capabilities_req());
        self.transport.send_to(peer, &frame)?;
        let reply = Self::await_reply(&channel, OPC_GET_CAPABILITIES, sequence, self.timeout_ms)?;
        reply.status.check()?;
        let (profile, prom_total_len) = decode_capabilities(&reply.payload)?;
        profile.validate()?;

        let mut prom = Vec::with_capacity(prom_total_len as usize);
        let mut offset: u32 = 0;
        while (offset as usize) < prom_total_len as usize {
            let len = PROM_CHUNK_LEN.min((prom_total_len - offset) as u16);
            let seq = self.transport.next_sequence();
            let req = cmd_system::read_prom_chunk_req(offset, len);
            let frame = framer::encode_command(OPC_READ_PROM_CHUNK, seq, &req);
            self.transport.send_to(peer, &frame)?;
            let reply = Self::await_reply(&channel, OPC_READ_PROM_CHUNK, seq, self.timeout_ms)?;
            reply.status.check()?;
            prom.extend_from_slice(&reply.payload);
            offset += reply.payload.len() as u32;

            let percent = ((offset as u64 * 100) / prom_total_len.max(1) as u64) as u8;
            log::debug!("initialize: PROM download {percent}%");
            if !progress(percent) {
                return Err(AvmuError::Interrupted);
            }
        }

        if prom_total_len == 0 {
            return Err(AvmuError::EmptyProm);
        }
        if prom.len() < PROM_MAGIC.len() || &prom[..PROM_MAGIC.len()] != PROM_MAGIC {
            return Err(AvmuError::BadProm);
        }

        self.profile = profile;
        self.channel = Some(channel);
        self.state = TaskState::Stopped;
        log::debug!("task initialized: serial {}", self.profile.serial_number);
        Ok(())
    }

    fn await_reply(channel: &PeerChannel, opcode: u16, sequence: u32, timeout_ms: u64) -> Result<ReplyFrame> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AvmuError::NoResponse);
            }
            let datagram = channel.recv_timeout(remaining)?;
            if let Ok(reply) = framer::decode_reply(&datagram) {
                if reply.opcode == opcode && reply.sequence == sequence {
                    return Ok(reply);
                }
            }
        }
    }

    // --- 4.4 start/stop ---

    pub fn start(&mut self) -> Result<()> {
        if self.state != TaskState::Stopped {
            return Err(AvmuError::WrongState);
        }
        if self.config.hop_rate() == crate::config::HopRate::Undefined {
            return Err(AvmuError::MissingHop);
        }
        if self.config.hop_rate() == crate::config::HopRate::Hop90K {
            return Err(AvmuError::BadHop);
        }
        if self.profile.switchboard_kind.requires_attenuation()
            && matches!(self.config.if_gain(), crate::config::IfGain::UseDefault)
        {
            if !self.profile.features.attenuators {
                return Err(AvmuError::NoAttenPresent);
            }
            return Err(AvmuError::MissingAtten);
        }

        let built = ProgramBuilder::build(&self.profile, &self.config)?;

        let peer = self.peer_addr()?;
        let channel = self.channel()?;
        let total_len = built.bytes.len() as u32;
        for (chunk_index, chunk) in built.bytes.chunks(UPLOAD_CHUNK_LEN).enumerate() {
            let offset = (chunk_index * UPLOAD_CHUNK_LEN) as u32;
            let req = cmd_sweep::upload_program_chunk_req(offset, total_len, chunk);
            let seq = self.transport.next_sequence();
            let frame = framer::encode_command(OPC_UPLOAD_PROGRAM, seq, &req);
            self.transport.send_to(peer, &frame)?;
            let reply = Self::await_reply(channel, OPC_UPLOAD_PROGRAM, seq, self.timeout_ms)?;
            reply.status.check()?;
        }

        let reply = self.request_reply(OPC_START, &cmd_sweep::start_req(), self.timeout_ms)?;
        reply.status.check()?;

        self.config.set_frequencies_checked(built.snapped_frequencies, self.profile.max_points, None)?;
        self.queue.clear();
        self.pipeline = Some(ReceivePipeline::new(self.config.measured_paths().len(), PIPELINE_QUEUE_DEPTH));
        self.state = TaskState::Started;
        log::debug!("task started, program is {} bytes", total_len);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !matches!(self.state, TaskState::Started | TaskState::Running) {
            return Err(AvmuError::WrongState);
        }
        let reply = self.request_reply(OPC_STOP, &cmd_sweep::stop_req(), self.timeout_ms)?;
        reply.status.check()?;
        self.state = TaskState::Stopped;
        self.pipeline = None;
        self.queue.clear();
        Ok(())
    }

    // --- 4.6 asynchronous measurement ---

    pub fn begin_async(&mut self) -> Result<()> {
        if self.state != TaskState::Started {
            return Err(AvmuError::WrongState);
        }
        if self.program_type != ProgramType::Async {
            return Err(AvmuError::WrongProgramType);
        }
        let reply = self.request_reply(OPC_BEGIN_ASYNC, &cmd_sweep::begin_async_req(), self.timeout_ms)?;
        reply.status.check()?;
        self.state = TaskState::Running;
        Ok(())
    }

    /// Returns to `Started` and flushes any in-flight reassembly state —
    /// async streaming tolerates loss by design, so there is nothing to
    /// recover here.
    pub fn halt_async(&mut self) -> Result<()> {
        if self.state != TaskState::Running {
            return Err(AvmuError::WrongState);
        }
        let reply = self.request_reply(OPC_HALT_ASYNC, &cmd_sweep::halt_async_req(), self.timeout_ms)?;
        reply.status.check()?;
        self.state = TaskState::Started;
        self.pipeline = Some(ReceivePipeline::new(self.config.measured_paths().len(), PIPELINE_QUEUE_DEPTH));
        self.queue.clear();
        Ok(())
    }

    // --- 4.5 / 4.6 measure ---

    /// Synchronous mode (`Started`): triggers one sweep and blocks until it
    /// is fully reassembled. Asynchronous mode (`Running`): drains whatever
    /// sweep datagrams are already queued, blocking only up to `timeout_ms`
    /// for at least the first one to arrive.
    pub fn measure(&mut self) -> Result<()> {
        match (self.state, self.program_type) {
            (TaskState::Started, ProgramType::Sync) => self.measure_sync(),
            (TaskState::Running, ProgramType::Async) => self.measure_async(),
            (TaskState::Started, ProgramType::Async) | (TaskState::Running, ProgramType::Sync) => {
                Err(AvmuError::WrongProgramType)
            }
            _ => Err(AvmuError::WrongState),
        }
    }

    fn measure_sync(&mut self) -> Result<()> {
        let reply = self.request_reply(OPC_TRIGGER_SYNC, &cmd_sweep::trigger_sync_req(), self.timeout_ms)?;
        reply.status.check()?;
        let frame_time = self.get_precise_time_per_frame().max(0.0);
        let budget = Duration::from_secs_f64(frame_time) + Duration::from_millis(self.timeout_ms);
        let deadline = Instant::now() + budget;
        let produced = self.drain_until(deadline)?;
        if produced == 0 {
            return Err(AvmuError::NoResponse);
        }
        Ok(())
    }

    fn measure_async(&mut self) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms);
        self.drain_until(deadline)?;
        Ok(())
    }

    /// Pulls datagrams off the peer channel, feeding `self.pipeline`, until
    /// `deadline` passes or `interruptMeasurement` fires. Returns the number
    /// of completed sweeps moved into `self.queue`.
    fn drain_until(&mut self, deadline: Instant) -> Result<usize> {
        let channel = self.channel.as_ref().ok_or(AvmuError::Socket)?;
        let pipeline = self.pipeline.as_mut().ok_or(AvmuError::WrongState)?;
        let path_order: Vec<(TxPath, RxPath)> = self.config.measured_paths().to_vec();
        let mut produced = 0usize;
        loop {
            if self.interrupt_rx.try_recv().is_ok() {
                return Err(AvmuError::Interrupted);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let slice = remaining.min(POLL_SLICE);
            match channel.recv_timeout(slice) {
                Ok(datagram) => {
                    if pipeline.ingest(&datagram).is_err() {
                        return Err(AvmuError::Bytes);
                    }
                    while let Some(sweep) = pipeline.next_completed() {
                        for path in &sweep.paths {
                            let Some(&(tx, rx)) = path_order.get(path.path_index as usize) else {
                                continue;
                            };
                            self.queue.push_back(SweepDataStruct {
                                tx,
                                rx,
                                i: path.samples.iter().step_by(2).copied().collect(),
                                q: path.samples.iter().skip(1).step_by(2).copied().collect(),
                                serial_buffer: Vec::new(),
                                serial_age: 0,
                                timestamp_ticks: sweep.timestamp_ticks,
                                packet_number: 0,
                                sweep_number: sweep.sweep_number,
                                frame_number: sweep.frame_number,
                            });
                            produced += 1;
                        }
                    }
                }
                Err(AvmuError::NoResponse) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(produced)
    }

    /// Dequeues the oldest record for `(tx, rx)`. `bad-path` if the pair was
    /// never added to the measured set; `path-has-no-data` if it was but no
    /// matching record has been produced yet.
    pub fn extract_sweep_data(&mut self, tx: TxPath, rx: RxPath) -> Result<SweepDataStruct> {
        if !self.config.measured_paths().iter().any(|&(t, r)| t == tx && r == rx) {
            return Err(AvmuError::BadPath);
        }
        let idx = self.queue.iter().position(|r| r.tx == tx && r.rx == rx);
        match idx {
            Some(i) => Ok(self.queue.remove(i).unwrap()),
            None => Err(AvmuError::PathHasNoData),
        }
    }

    // --- 4.9 utility queries ---

    pub fn get_hardware_details(&self) -> HardwareProfile {
        self.profile.clone()
    }

    /// Computed sweep duration in seconds, or `-1.0` outside `Started`/`Running`.
    pub fn get_precise_time_per_frame(&self) -> f64 {
        if !matches!(self.state, TaskState::Started | TaskState::Running) {
            return -1.0;
        }
        match self.config.hop_rate().samples_per_second() {
            Some(sps) if sps > 0.0 => self.config.frequencies().len() as f64 / sps,
            _ => -1.0,
        }
    }

    pub fn is_shaft_encoder_present(&self) -> Result<bool> {
        if self.state == TaskState::Uninitialized {
            return Err(AvmuError::WrongState);
        }
        Ok(self.profile.features.encoders)
    }

    pub fn is_serial_port_present(&self) -> Result<bool> {
        if self.state == TaskState::Uninitialized {
            return Err(AvmuError::WrongState);
        }
        Ok(self.profile.features.serial_port)
    }

    /// Sends up to `tries` ping probes spaced by `timeout_ms`, returning as
    /// soon as one is acknowledged. Pre-empts any sweep in progress on the
    /// device, so the caller must not invoke this mid-measurement.
    pub fn util_ping_unit(&self, tries: u32) -> Result<()> {
        let peer = self.peer_addr()?;
        // Reuse the task's own registered route when one exists (i.e. after
        // `initialize`) — registering a second `PeerChannel` for the same
        // peer would steal `self.channel`'s route and then delete it out
        // from under the task when this temporary one drops.
        let temp_channel = match &self.channel {
            Some(_) => None,
            None => Some(self.transport.register(peer)),
        };
        let channel = temp_channel.as_ref().or(self.channel.as_ref()).unwrap();
        for attempt in 0..tries.max(1) {
            let sequence = self.transport.next_sequence();
            let frame = framer::encode_command(OPC_PING, sequence, &cmd_system::ping_req());
            self.transport.send_to(peer, &frame)?;
            match Self::await_reply(channel, OPC_PING, sequence, self.timeout_ms) {
                Ok(reply) => {
                    reply.status.check()?;
                    return Ok(());
                }
                Err(AvmuError::NoResponse) => {
                    log::warn!("ping attempt {} of {tries} to {peer} timed out", attempt + 1);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AvmuError::NoResponse)
    }

    /// Disables the device's RF rails while idle. Valid from `Started` or
    /// `Stopped`; the next sweep after this incurs a warm-up delay.
    pub fn util_enter_low_power_state(&mut self) -> Result<()> {
        if !matches!(self.state, TaskState::Started | TaskState::Stopped) {
            return Err(AvmuError::WrongState);
        }
        let reply = self.request_reply(OPC_ENTER_LOW_POWER, &cmd_system::enter_low_power_req(), self.timeout_ms)?;
        reply.status.check()
    }
}

/// Cross-task invariant checks ahead of a coordinated broadcast start
/// (§4.8): common hop rate, identical frequency-list length, compatible
/// sync-pulse roles.
pub fn validate_array_tasks(tasks: &[&Task]) -> Result<()> {
    if tasks.is_empty() {
        return Err(AvmuError::TaskArrayInvalid);
    }
    let hop_rate = tasks[0].config.hop_rate();
    if !tasks.iter().all(|t| t.config.hop_rate() == hop_rate) {
        return Err(AvmuError::TaskArrayInvalid);
    }
    let point_count = tasks[0].config.frequencies().len();
    if !tasks.iter().all(|t| t.config.frequencies().len() == point_count) {
        return Err(AvmuError::TaskArrayInvalid);
    }
    let peers = tasks
        .iter()
        .map(|t| t.peer_addr().map(|a| a.to_string()))
        .collect::<Result<Vec<_>>>()?;
    if !crate::config::all_unique(&peers) {
        return Err(AvmuError::TaskArrayInvalid);
    }
    let modes: Vec<_> = tasks.iter().map(|t| t.config.sync_pulse_mode()).collect();
    crate::config::validate_sync_roles(&modes)
}

/// Broadcasts the begin command to port 1024 so every pre-programmed,
/// already-`Running` unit starts within about a millisecond of the others.
pub fn broadcast_begin_command(tasks: &mut [&mut Task]) -> Result<()> {
    if tasks.is_empty() {
        return Err(AvmuError::TaskArrayInvalid);
    }
    if !tasks.iter().all(|t| t.state == TaskState::Running) {
        return Err(AvmuError::TaskArrayInvalid);
    }
    let broadcast_ip = tasks[0].ipv4.ok_or(AvmuError::MissingIp)?;
    let broadcast_ip = Ipv4Addr::new(broadcast_ip.octets()[0], broadcast_ip.octets()[1], broadcast_ip.octets()[2], 255);
    let sequence = tasks[0].transport.next_sequence();
    let frame = framer::encode_command(OPC_BROADCAST_BEGIN, sequence, &cmd_sweep::broadcast_begin_req());
    tasks[0].transport.broadcast(broadcast_ip, &frame)
}

/// Decode the capabilities reply payload into `(profile, prom_total_len)`.
/// Layout (an implementation choice, like the rest of `framer`): min/max
/// freq as big-endian f64 bit patterns, `max_points`/`serial_number`/
/// `prom_total_len` as `u32`, `switchboard_kind` and a feature bitmask as
/// one byte each, then a band-boundary count byte and that many f64s.
fn decode_capabilities(payload: &[u8]) -> Result<(HardwareProfile, u32)> {
    if payload.len() < 8 + 8 + 4 + 4 + 4 + 1 + 1 + 1 {
        return Err(AvmuError::Bytes);
    }
    let mut pos = 0;
    let read_f64 = |p: &mut usize, buf: &[u8]| -> f64 {
        let bits = u64::from_be_bytes(buf[*p..*p + 8].try_into().unwrap());
        *p += 8;
        f64::from_bits(bits)
    };
    let read_u32 = |p: &mut usize, buf: &[u8]| -> u32 {
        let v = u32::from_be_bytes(buf[*p..*p + 4].try_into().unwrap());
        *p += 4;
        v
    };

    let min_freq_mhz = read_f64(&mut pos, payload);
    let max_freq_mhz = read_f64(&mut pos, payload);
    let max_points = read_u32(&mut pos, payload) as usize;
    let serial_number = read_u32(&mut pos, payload);
    let prom_total_len = read_u32(&mut pos, payload);

    let switchboard_byte = payload[pos];
    pos += 1;
    let switchboard_kind = match switchboard_byte {
        0 => SwitchboardKind::NoSwitch,
        1 => SwitchboardKind::Simple4,
        2 => SwitchboardKind::Tdd4,
        3 => SwitchboardKind::Simple8,
        4 => SwitchboardKind::SParameter,
        _ => return Err(AvmuError::UnknownFeature),
    };

    let feature_byte = payload[pos];
    pos += 1;
    let features = crate::profile::FeatureFlags {
        encoders: feature_byte & 0b0000_0001 != 0,
        serial_port: feature_byte & 0b0000_0010 != 0,
        attenuators: feature_byte & 0b0000_0100 != 0,
        multiple_receivers: feature_byte & 0b0000_1000 != 0,
        scan_trigger_in: feature_byte & 0b0001_0000 != 0,
        scan_trigger_out: feature_byte & 0b0010_0000 != 0,
    };

    let band_count = payload[pos] as usize;
    pos += 1;
    if payload.len() < pos + band_count * 8 {
        return Err(AvmuError::Bytes);
    }
    let mut band_boundaries = Vec::with_capacity(band_count);
    for _ in 0..band_count {
        band_boundaries.push(read_f64(&mut pos, payload));
    }

    Ok((
        HardwareProfile {
            min_freq_mhz,
            max_freq_mhz,
            max_points,
            serial_number,
            band_boundaries,
            switchboard_kind,
            features,
        },
        prom_total_len,
    ))
}
