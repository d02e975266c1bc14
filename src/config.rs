//! Declarative sweep configuration.
//!
//! `SweepConfig` is mutable only while the owning `Task` is `Uninitialized`
//! or `Stopped`; enforcement of that rule lives in `Task`, not here —
//! this module only enforces the *shape* invariants (ranges, duplicates,
//! set semantics) that hold regardless of task state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AvmuError, Result};

/// Sweep dwell rate, in samples/second per frequency point.
///
/// `Hop90K` is accepted by [`SweepConfig::set_hop_rate`] and round-trips
/// through [`SweepConfig::hop_rate`] — the original header marks it "currently
/// unsupported but may be enabled in the future", i.e. a real settable value
/// that only fails downstream. `Task::start` is what rejects it (`BadHop`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HopRate {
    Undefined,
    Hop90K,
    Hop45K,
    Hop30K,
    Hop15K,
    Hop7K,
    Hop3K,
    Hop2K,
    Hop1K,
    Hop550,
    Hop312,
    Hop156,
    Hop78,
    Hop39,
    Hop20,
}

impl HopRate {
    /// Samples/second for this rate, or `None` for `Undefined`.
    pub fn samples_per_second(self) -> Option<f64> {
        use HopRate::*;
        Some(match self {
            Undefined => return None,
            Hop90K => 90_000.0,
            Hop45K => 45_000.0,
            Hop30K => 30_000.0,
            Hop15K => 15_000.0,
            Hop7K => 7_000.0,
            Hop3K => 3_000.0,
            Hop2K => 2_000.0,
            Hop1K => 1_000.0,
            Hop550 => 550.0,
            Hop312 => 312.0,
            Hop156 => 156.0,
            Hop78 => 78.0,
            Hop39 => 39.0,
            Hop20 => 20.0,
        })
    }
}

impl Default for HopRate {
    fn default() -> Self {
        HopRate::Undefined
    }
}

/// One side of a measured path. `None` is a legal selector (e.g. a
/// transmit-only or receive-only configuration on hardware that supports it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TxPath {
    Path0,
    Path1,
    Path2,
    Path3,
    Path4,
    Path5,
    Path6,
    Path7,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RxPath {
    Path0,
    Path1,
    Path2,
    Path3,
    Path4,
    Path5,
    Path6,
    Path7,
    None,
}

/// IF gain, in dB, applied to the receive chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IfGain {
    UseDefault,
    Db(u8),
}

impl IfGain {
    /// Valid explicit steps, per the hardware's gain stage: 0, 3, 6, ..., 45 dB.
    pub fn is_valid(self) -> bool {
        match self {
            IfGain::UseDefault => true,
            IfGain::Db(v) => v <= 45 && v % 3 == 0,
        }
    }
}

/// Hardware-level sync-pulse role for coordinated multi-unit starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPulseMode {
    Ignore,
    Generate,
    Receive,
}

impl Default for SyncPulseMode {
    fn default() -> Self {
        SyncPulseMode::Ignore
    }
}

/// Shaft-encoder readout configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub enabled: bool,
    pub reset_on_start: bool,
}

/// Serial RX capture configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub enabled: bool,
    pub buffer_size_bytes: u16,
}

/// Time-division-duplex switchboard register block. Only meaningful when
/// `HardwareProfile::switchboard_kind == SwitchboardKind::Tdd4`. Values are
/// forwarded to the device verbatim — the crate does not validate the
/// register values themselves beyond the presence check performed by
/// `ProgramBuilder`, mirroring the original header's "horrible messy pile of
/// magic values" disclaimer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddSettings {
    pub active: bool,
    pub enabled: bool,
    pub nulling: bool,
    pub power_amp: bool,
    pub slave: bool,
    pub attenuator_enabled: bool,
    pub attenuator_value: u16,
    pub lna: bool,
    pub tx: u32,
    pub tx_to_rx1: u32,
    pub rx1: u32,
    pub rx1_to_rx2: u32,
    pub rx2: u32,
    pub rx2_to_tx: u32,
}

/// An inclusive-exclusive frequency interval, in MHz, within which the RF
/// output is muted while the synthesizer still steps through (and samples)
/// every point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExclusionBand {
    pub start_mhz: f64,
    pub stop_mhz: f64,
}

impl ExclusionBand {
    pub fn new(start_mhz: f64, stop_mhz: f64) -> Result<Self> {
        if !(start_mhz > 0.0 && stop_mhz > start_mhz) {
            return Err(AvmuError::InvalidParameter);
        }
        Ok(ExclusionBand { start_mhz, stop_mhz })
    }

    pub fn contains(&self, freq_mhz: f64) -> bool {
        freq_mhz >= self.start_mhz && freq_mhz < self.stop_mhz
    }
}

/// Declarative, mutable-while-stopped sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    ipv4: Option<String>,
    port: Option<u16>,
    hop_rate: HopRate,
    frequencies_mhz: Vec<f64>,
    exclusion_bands: Vec<ExclusionBand>,
    measured_paths: Vec<(TxPath, RxPath)>,
    if_gain: IfGain,
    pad_12db_enabled: bool,
    encoder: EncoderConfig,
    serial_port: SerialConfig,
    sync_pulse_mode: SyncPulseMode,
    send_sweep_timer: bool,
    reset_frame_counter_on_start: bool,
    tdd_settings: Option<TddSettings>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            ipv4: None,
            port: None,
            hop_rate: HopRate::Undefined,
            frequencies_mhz: Vec::new(),
            exclusion_bands: Vec::new(),
            measured_paths: Vec::new(),
            if_gain: IfGain::UseDefault,
            pad_12db_enabled: false,
            encoder: EncoderConfig::default(),
            serial_port: SerialConfig::default(),
            sync_pulse_mode: SyncPulseMode::default(),
            send_sweep_timer: false,
            reset_frame_counter_on_start: false,
            tdd_settings: None,
        }
    }
}

/// Reserved broadcast port; no device may be configured to listen here.
pub const BROADCAST_PORT: u16 = 1024;
/// Lowest usable per-device UDP port.
pub const MIN_DEVICE_PORT: u16 = 1025;
/// Highest usable per-device UDP port.
pub const MAX_DEVICE_PORT: u16 = 1279;

impl SweepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ipv4(&self) -> Option<&str> {
        self.ipv4.as_deref()
    }

    pub fn set_ipv4(&mut self, ipv4: impl Into<String>) {
        self.ipv4 = Some(ipv4.into());
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Set the UDP port. Valid range is `[1025, 1279]`; port 1024 is
    /// reserved for the broadcast start.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        if !(MIN_DEVICE_PORT..=MAX_DEVICE_PORT).contains(&port) {
            return Err(AvmuError::BadIpPort);
        }
        self.port = Some(port);
        Ok(())
    }

    pub fn hop_rate(&self) -> HopRate {
        self.hop_rate
    }

    pub fn set_hop_rate(&mut self, hop_rate: HopRate) {
        self.hop_rate = hop_rate;
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies_mhz
    }

    /// Replace the frequency list. Snapping to the hardware grid happens in
    /// `ProgramBuilder`/`Task`, which has the `HardwareProfile` needed to do
    /// it; this setter only enforces length and raw membership in
    /// `[min_freq_mhz, max_freq_mhz]` when a profile is supplied, and always
    /// enforces `max_points`.
    pub fn set_frequencies_checked(
        &mut self,
        freqs: Vec<f64>,
        max_points: usize,
        freq_range_mhz: Option<(f64, f64)>,
    ) -> Result<()> {
        if freqs.len() > max_points {
            return Err(AvmuError::TooManyPoints);
        }
        if let Some((min, max)) = freq_range_mhz {
            if freqs.iter().any(|f| *f < min || *f > max) {
                return Err(AvmuError::FreqOutOfBounds);
            }
        }
        self.frequencies_mhz = freqs;
        Ok(())
    }

    pub fn exclusion_bands(&self) -> &[ExclusionBand] {
        &self.exclusion_bands
    }

    /// Accumulates; two additions with the same arguments yield two entries.
    /// Overlap and ordering are irrelevant — union semantics are applied at
    /// program-generation time.
    pub fn add_exclusion_band(&mut self, start_mhz: f64, stop_mhz: f64) -> Result<()> {
        self.exclusion_bands.push(ExclusionBand::new(start_mhz, stop_mhz)?);
        Ok(())
    }

    pub fn get_exclusion_band(&self, idx: usize) -> Result<ExclusionBand> {
        self.exclusion_bands.get(idx).copied().ok_or(AvmuError::IndexOutOfBounds)
    }

    pub fn is_excluded(&self, freq_mhz: f64) -> bool {
        self.exclusion_bands.iter().any(|b| b.contains(freq_mhz))
    }

    pub fn measured_paths(&self) -> &[(TxPath, RxPath)] {
        &self.measured_paths
    }

    pub fn measured_path_count(&self) -> usize {
        self.measured_paths.len()
    }

    pub fn path_at_index(&self, idx: usize) -> Result<(TxPath, RxPath)> {
        self.measured_paths.get(idx).copied().ok_or(AvmuError::IndexOutOfBounds)
    }

    /// Adds a (tx, rx) pair to the measured set. Duplicate additions return
    /// `PathAlreadyMeasured`; insertion order is preserved for
    /// `path_at_index`.
    pub fn add_path_to_measure(&mut self, tx: TxPath, rx: RxPath) -> Result<()> {
        if self.measured_paths.iter().any(|&(t, r)| t == tx && r == rx) {
            return Err(AvmuError::PathAlreadyMeasured);
        }
        self.measured_paths.push((tx, rx));
        Ok(())
    }

    pub fn clear_measured_paths(&mut self) {
        self.measured_paths.clear();
    }

    pub fn if_gain(&self) -> IfGain {
        self.if_gain
    }

    pub fn set_if_gain(&mut self, gain: IfGain) -> Result<()> {
        if !gain.is_valid() {
            return Err(AvmuError::BadAtten);
        }
        self.if_gain = gain;
        Ok(())
    }

    pub fn pad_12db_enabled(&self) -> bool {
        self.pad_12db_enabled
    }

    pub fn set_pad_12db_enabled(&mut self, enabled: bool) {
        self.pad_12db_enabled = enabled;
    }

    pub fn encoder(&self) -> EncoderConfig {
        self.encoder
    }

    pub fn set_encoder(&mut self, encoder: EncoderConfig) {
        self.encoder = encoder;
    }

    pub fn serial_port(&self) -> SerialConfig {
        self.serial_port
    }

    pub fn set_serial_port(&mut self, serial: SerialConfig) {
        self.serial_port = serial;
    }

    pub fn sync_pulse_mode(&self) -> SyncPulseMode {
        self.sync_pulse_mode
    }

    pub fn set_sync_pulse_mode(&mut self, mode: SyncPulseMode) {
        self.sync_pulse_mode = mode;
    }

    pub fn send_sweep_timer(&self) -> bool {
        self.send_sweep_timer
    }

    pub fn set_send_sweep_timer(&mut self, enabled: bool) {
        self.send_sweep_timer = enabled;
    }

    pub fn reset_frame_counter_on_start(&self) -> bool {
        self.reset_frame_counter_on_start
    }

    pub fn set_reset_frame_counter_on_start(&mut self, enabled: bool) {
        self.reset_frame_counter_on_start = enabled;
    }

    pub fn tdd_settings(&self) -> Option<TddSettings> {
        self.tdd_settings
    }

    pub fn set_tdd_settings(&mut self, settings: TddSettings) {
        self.tdd_settings = Some(settings);
    }

    /// Load from a JSON or TOML document (detected by content, not
    /// extension) — ambient configuration-surface convenience; does not
    /// change validation semantics, which still run on the setters above.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|_| AvmuError::InvalidParameter)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|_| AvmuError::InvalidParameter)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|_| AvmuError::InvalidParameter)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|_| AvmuError::InvalidParameter)
    }
}

/// Cross-task invariants checked before a coordinated broadcast start: a
/// common hop rate, identical frequency-list length, and compatible
/// sync-pulse roles (exactly one `Generate` with the rest `Receive`/`Ignore`,
/// or all `Ignore`).
pub fn validate_sync_roles(modes: &[SyncPulseMode]) -> Result<()> {
    let generate_count = modes.iter().filter(|m| **m == SyncPulseMode::Generate).count();
    let all_ignore = modes.iter().all(|m| *m == SyncPulseMode::Ignore);
    if all_ignore {
        return Ok(());
    }
    if generate_count == 1 {
        return Ok(());
    }
    Err(AvmuError::TaskArrayInvalid)
}

/// Just the set-dedup helper used by `validate_sync_roles`'s caller to make
/// sure a batch of tasks isn't trivially degenerate (e.g. duplicate entries).
pub fn all_unique<T: Ord + Clone>(items: &[T]) -> bool {
    let set: BTreeSet<T> = items.iter().cloned().collect();
    set.len() == items.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_bounds() {
        let mut cfg = SweepConfig::new();
        assert_eq!(cfg.set_port(1024), Err(AvmuError::BadIpPort));
        assert_eq!(cfg.set_port(2000), Err(AvmuError::BadIpPort));
        assert!(cfg.set_port(1279).is_ok());
        assert_eq!(cfg.port(), Some(1279));
    }

    #[test]
    fn duplicate_path_rejected() {
        let mut cfg = SweepConfig::new();
        cfg.add_path_to_measure(TxPath::Path0, RxPath::Path0).unwrap();
        assert_eq!(
            cfg.add_path_to_measure(TxPath::Path0, RxPath::Path0),
            Err(AvmuError::PathAlreadyMeasured)
        );
        assert_eq!(cfg.measured_path_count(), 1);
        assert_eq!(cfg.path_at_index(0).unwrap(), (TxPath::Path0, RxPath::Path0));
    }

    #[test]
    fn exclusion_bands_accumulate() {
        let mut cfg = SweepConfig::new();
        cfg.add_exclusion_band(100.0, 200.0).unwrap();
        cfg.add_exclusion_band(100.0, 200.0).unwrap();
        assert_eq!(cfg.exclusion_bands().len(), 2);
        assert!(cfg.is_excluded(150.0));
        assert!(!cfg.is_excluded(250.0));
    }

    #[test]
    fn exclusion_band_bad_range() {
        let mut cfg = SweepConfig::new();
        assert_eq!(
            cfg.add_exclusion_band(200.0, 100.0),
            Err(AvmuError::InvalidParameter)
        );
    }

    #[test]
    fn sync_roles() {
        use SyncPulseMode::*;
        assert!(validate_sync_roles(&[Generate, Receive, Receive]).is_ok());
        assert!(validate_sync_roles(&[Ignore, Ignore]).is_ok());
        assert_eq!(
            validate_sync_roles(&[Generate, Generate, Receive]),
            Err(AvmuError::TaskArrayInvalid)
        );
        assert_eq!(
            validate_sync_roles(&[Receive, Receive]),
            Err(AvmuError::TaskArrayInvalid)
        );
    }

    #[test]
    fn json_round_trip() {
        let mut cfg = SweepConfig::new();
        cfg.set_ipv4("192.168.1.207");
        cfg.set_port(1030).unwrap();
        cfg.set_hop_rate(HopRate::Hop45K);
        let json = cfg.to_json().unwrap();
        let back = SweepConfig::from_json(&json).unwrap();
        assert_eq!(back.ipv4(), Some("192.168.1.207"));
        assert_eq!(back.port(), Some(1030));
        assert_eq!(back.hop_rate(), HopRate::Hop45K);
    }
}
