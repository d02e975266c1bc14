//! Pure translation from `(HardwareProfile, SweepConfig)` to a byte-coded
//! device program, plus the frequency-grid utilities the sweep configuration
//! layer builds on. Keeping this free of any `Task`/`Transport` dependency
//! makes it trivially unit-testable, per the rationale in the control-plane
//! design: program generation should not require live hardware to verify.

use crate::cmd::{cmd_feature, cmd_path, cmd_tdd};
use crate::config::SweepConfig;
use crate::error::{AvmuError, Result};
use crate::profile::HardwareProfile;

/// Resolution of the synthesizer's fractional-N tuner, in MHz. An
/// implementation choice (the specification deliberately does not
/// standardize program bit layout or tuner precision) — 1 kHz, documented
/// here since `ProgramBuilder`, `utilNearestLegalFreq` and
/// `utilFixLinearSweepLimits` must all agree on it.
pub const FREQ_GRID_MHZ: f64 = 0.001;

/// Upper bound on the generated program's size, in bytes. An implementation
/// choice standing in for the real device's instruction memory size, which
/// the specification does not publish.
pub const PROGRAM_MEMORY_BYTES: usize = 8192;

fn snap_to_grid(freq_mhz: f64) -> f64 {
    (freq_mhz / FREQ_GRID_MHZ).round() * FREQ_GRID_MHZ
}

/// Round a single frequency to the nearest value the synthesizer can
/// actually generate, bounds-checked against the hardware's tunable range.
pub fn util_nearest_legal_freq(profile: &HardwareProfile, freq_mhz: f64) -> Result<f64> {
    if freq_mhz < profile.min_freq_mhz || freq_mhz > profile.max_freq_mhz {
        return Err(AvmuError::FreqOutOfBounds);
    }
    Ok(snap_to_grid(freq_mhz))
}

/// Adjust `start`/`end` so that `n` evenly spaced points all fall on exactly
/// generatable frequencies — unequal spacing induces doppler artifacts
/// downstream. When `n` is 0 or 1, or `start == end`, each endpoint is
/// snapped independently.
pub fn util_fix_linear_sweep_limits(
    profile: &HardwareProfile,
    start_mhz: f64,
    end_mhz: f64,
    n: u32,
) -> Result<(f64, f64)> {
    if n <= 1 || start_mhz == end_mhz {
        let s = util_nearest_legal_freq(profile, start_mhz)?;
        let e = util_nearest_legal_freq(profile, end_mhz)?;
        return Ok((s, e));
    }
    if n as usize > profile.max_points {
        return Err(AvmuError::TooManyPoints);
    }
    let snapped_start = util_nearest_legal_freq(profile, start_mhz)?;
    let raw_spacing = (end_mhz - start_mhz) / (n as f64 - 1.0);
    let snapped_spacing = snap_to_grid(raw_spacing).max(FREQ_GRID_MHZ);
    let snapped_end = snapped_start + snapped_spacing * (n as f64 - 1.0);
    if snapped_end < profile.min_freq_mhz || snapped_end > profile.max_freq_mhz {
        return Err(AvmuError::FreqOutOfBounds);
    }
    Ok((snapped_start, snapped_end))
}

/// Generate `n` linearly spaced points between the (already fixed) limits.
pub fn linear_points(start_mhz: f64, end_mhz: f64, n: u32) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![start_mhz];
    }
    let spacing = (end_mhz - start_mhz) / (n as f64 - 1.0);
    (0..n).map(|i| start_mhz + spacing * i as f64).collect()
}

/// Convert a snapped MHz value into the hardware grid code used by the
/// per-point program opcode (the synthesizer's own tuning word).
fn freq_to_grid_code(freq_mhz: f64) -> u32 {
    (freq_mhz / FREQ_GRID_MHZ).round() as u32
}

/// The output of `ProgramBuilder::build`.
pub struct BuiltProgram {
    pub bytes: Vec<u8>,
    pub snapped_frequencies: Vec<f64>,
}

/// Pure function: `(HardwareProfile, SweepConfig) -> (program bytes, actual
/// frequency list after grid-snapping)`.
pub struct ProgramBuilder;

impl ProgramBuilder {
    pub fn build(profile: &HardwareProfile, config: &SweepConfig) -> Result<BuiltProgram> {
        if config.frequencies().is_empty() {
            return Err(AvmuError::MissingFreqs);
        }
        if config.frequencies().len() > profile.max_points {
            return Err(AvmuError::TooManyPoints);
        }
        if config.measured_paths().is_empty() {
            return Err(AvmuError::NoPathsMeasured);
        }
        if profile.switchboard_kind.requires_attenuation() {
            match config.if_gain() {
                crate::config::IfGain::UseDefault => return Err(AvmuError::MissingAtten),
                crate::config::IfGain::Db(_) => {}
            }
        }

        // 1. Frequency snapping.
        let snapped: Vec<f64> = config
            .frequencies()
            .iter()
            .map(|&f| util_nearest_legal_freq(profile, f))
            .collect::<Result<_>>()?;

        let mut program = Vec::new();

        // 5. Feature opcodes (global, emitted once).
        program.extend(cmd_feature::if_gain_op(config.if_gain()));
        program.extend(cmd_feature::pad_12db_op(config.pad_12db_enabled()));
        program.extend(cmd_feature::encoder_op(config.encoder()));
        program.extend(cmd_feature::serial_op(config.serial_port()));
        program.extend(cmd_feature::sync_pulse_op(config.sync_pulse_mode()));
        program.extend(cmd_feature::send_sweep_timer_op(config.send_sweep_timer()));
        program.extend(cmd_feature::reset_frame_counter_op(
            config.reset_frame_counter_on_start(),
        ));
        if profile.switchboard_kind == crate::profile::SwitchboardKind::Tdd4 {
            let tdd = config.tdd_settings().ok_or(AvmuError::FeatureNotPresent)?;
            program.extend(cmd_tdd::tdd_op(tdd));
        }

        // 4. Path ordering: one block per measured path.
        for &(tx, rx) in config.measured_paths() {
            program.extend(cmd_path::select_path_op(tx, rx));

            // 2 + 3: exclusion mask and band-crossing ordering, point by point.
            let mut current_band: Option<usize> = None;
            for &freq in &snapped {
                let band = profile.band_index(freq);
                if current_band != Some(band) {
                    program.extend(cmd_path::select_band_op(band as u8));
                    current_band = Some(band);
                }
                let rf_enabled = !config.is_excluded(freq);
                program.extend(cmd_path::point_op(freq_to_grid_code(freq), rf_enabled));
            }
        }

        // 6. Budget check.
        if program.len() > PROGRAM_MEMORY_BYTES {
            return Err(AvmuError::ProgOverflow);
        }

        Ok(BuiltProgram { bytes: program, snapped_frequencies: snapped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RxPath, TxPath};
    use crate::profile::{FeatureFlags, SwitchboardKind};

    fn profile(max_points: usize) -> HardwareProfile {
        HardwareProfile {
            min_freq_mhz: 100.0,
            max_freq_mhz: 6000.0,
            max_points,
            serial_number: 1,
            band_boundaries: vec![4000.0, 2000.0],
            switchboard_kind: SwitchboardKind::Simple4,
            features: FeatureFlags::default(),
        }
    }

    #[test]
    fn nearest_legal_freq_snaps_and_bounds_checks() {
        let p = profile(4096);
        let snapped = util_nearest_legal_freq(&p, 100.00049).unwrap();
        assert!((snapped - 100.0).abs() < 1e-9);
        assert_eq!(util_nearest_legal_freq(&p, 50.0), Err(AvmuError::FreqOutOfBounds));
    }

    #[test]
    fn fix_linear_sweep_limits_constant_spacing() {
        let p = profile(4096);
        let (start, end) = util_fix_linear_sweep_limits(&p, 100.0, 4000.0, 1024).unwrap();
        let pts = linear_points(start, end, 1024);
        let mut spacings = Vec::new();
        for w in pts.windows(2) {
            spacings.push(w[1] - w[0]);
        }
        let first = spacings[0];
        for s in &spacings {
            assert!((s - first).abs() <= FREQ_GRID_MHZ + 1e-9);
        }
        assert_eq!(pts.len(), 1024);
    }

    #[test]
    fn fix_linear_sweep_limits_degenerate_cases() {
        let p = profile(4096);
        let (s, e) = util_fix_linear_sweep_limits(&p, 1000.0, 1000.0, 10).unwrap();
        assert!((s - e).abs() < 1e-9);
        let (s, e) = util_fix_linear_sweep_limits(&p, 1000.0, 2000.0, 0).unwrap();
        assert!((s - 1000.0).abs() < 1e-6);
        assert!((e - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn builder_rejects_no_paths() {
        let p = profile(4096);
        let mut cfg = SweepConfig::new();
        cfg.set_frequencies_checked(vec![100.0, 200.0], p.max_points, None).unwrap();
        assert_eq!(ProgramBuilder::build(&p, &cfg), Err(AvmuError::NoPathsMeasured));
    }

    #[test]
    fn builder_marks_excluded_points_rf_off_but_still_samples() {
        let p = profile(4096);
        let mut cfg = SweepConfig::new();
        cfg.set_frequencies_checked(vec![100.0, 150.0, 200.0], p.max_points, None).unwrap();
        cfg.add_path_to_measure(TxPath::Path0, RxPath::Path0).unwrap();
        cfg.add_exclusion_band(140.0, 160.0).unwrap();
        let built = ProgramBuilder::build(&p, &cfg).unwrap();
        // Count PROG_OP_POINT opcodes and check the muted one has rf_enabled=0.
        let mut i = 0;
        let mut found_muted = false;
        let mut total_points = 0;
        while i < built.bytes.len() {
            let tag = built.bytes[i];
            match tag {
                crate::cmd::PROG_OP_POINT => {
                    total_points += 1;
                    let rf_enabled = built.bytes[i + 5];
                    if rf_enabled == 0 {
                        found_muted = true;
                    }
                    i += 6;
                }
                crate::cmd::PROG_OP_SELECT_BAND => i += 2,
                crate::cmd::PROG_OP_SELECT_PATH => i += 3,
                crate::cmd::PROG_OP_SET_IF_GAIN => i += 2,
                crate::cmd::PROG_OP_SET_PAD => i += 2,
                crate::cmd::PROG_OP_ENCODER => i += 3,
                crate::cmd::PROG_OP_SERIAL => i += 4,
                crate::cmd::PROG_OP_SYNC_PULSE => i += 2,
                crate::cmd::PROG_OP_SEND_SWEEP_TIMER => i += 2,
                crate::cmd::PROG_OP_RESET_FRAME_COUNTER => i += 2,
                crate::cmd::PROG_OP_TDD => i += 1 + 7 + 2 + 6 * 4,
                _ => unreachable!("unknown opcode {tag}"),
            }
        }
        assert!(found_muted);
        assert_eq!(total_points, 3);
    }

    #[test]
    fn builder_overflow_with_tiny_budget() {
        let mut p = profile(4096);
        p.max_points = 4096;
        let mut cfg = SweepConfig::new();
        let freqs: Vec<f64> = (0..4096).map(|i| 100.0 + i as f64).collect();
        cfg.set_frequencies_checked(freqs, p.max_points, None).unwrap();
        cfg.add_path_to_measure(TxPath::Path0, RxPath::Path0).unwrap();
        cfg.add_path_to_measure(TxPath::Path1, RxPath::Path1).unwrap();
        assert_eq!(ProgramBuilder::build(&p, &cfg), Err(AvmuError::ProgOverflow));
    }
}
