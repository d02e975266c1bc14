//! Program opcodes for optional hardware features: IF gain, 12 dB pad,
//! shaft encoder, serial capture, sync-pulse direction, sweep timer and
//! frame-counter reset.

use super::{
    PROG_OP_ENCODER, PROG_OP_RESET_FRAME_COUNTER, PROG_OP_SEND_SWEEP_TIMER, PROG_OP_SERIAL,
    PROG_OP_SET_IF_GAIN, PROG_OP_SET_PAD, PROG_OP_SYNC_PULSE,
};
use crate::config::{EncoderConfig, IfGain, SerialConfig, SyncPulseMode};

pub fn if_gain_op(gain: IfGain) -> Vec<u8> {
    let code: u8 = match gain {
        IfGain::UseDefault => 0xFF,
        IfGain::Db(v) => v,
    };
    vec![PROG_OP_SET_IF_GAIN, code]
}

pub fn pad_12db_op(enabled: bool) -> Vec<u8> {
    vec![PROG_OP_SET_PAD, enabled as u8]
}

pub fn encoder_op(cfg: EncoderConfig) -> Vec<u8> {
    vec![PROG_OP_ENCODER, cfg.enabled as u8, cfg.reset_on_start as u8]
}

pub fn serial_op(cfg: SerialConfig) -> Vec<u8> {
    let mut op = vec![PROG_OP_SERIAL, cfg.enabled as u8];
    op.extend_from_slice(&cfg.buffer_size_bytes.to_be_bytes());
    op
}

pub fn sync_pulse_op(mode: SyncPulseMode) -> Vec<u8> {
    let code = match mode {
        SyncPulseMode::Ignore => 0,
        SyncPulseMode::Generate => 1,
        SyncPulseMode::Receive => 2,
    };
    vec![PROG_OP_SYNC_PULSE, code]
}

pub fn send_sweep_timer_op(enabled: bool) -> Vec<u8> {
    vec![PROG_OP_SEND_SWEEP_TIMER, enabled as u8]
}

pub fn reset_frame_counter_op(enabled: bool) -> Vec<u8> {
    vec![PROG_OP_RESET_FRAME_COUNTER, enabled as u8]
}
