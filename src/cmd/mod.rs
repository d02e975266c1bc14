//! Opcode encoders, grouped by command domain — mirrors the teacher's
//! `cmd_<domain>.rs` split, one module per family of device operations.

pub mod cmd_feature;
pub mod cmd_path;
pub mod cmd_system;
pub mod cmd_sweep;
pub mod cmd_tdd;

// Wire command opcodes (request/reply frames carried over `framer`).
pub const OPC_GET_CAPABILITIES: u16 = 0x0001;
pub const OPC_READ_PROM_CHUNK: u16 = 0x0002;
pub const OPC_PING: u16 = 0x0003;
pub const OPC_UPLOAD_PROGRAM: u16 = 0x0010;
pub const OPC_START: u16 = 0x0011;
pub const OPC_STOP: u16 = 0x0012;
pub const OPC_BEGIN_ASYNC: u16 = 0x0013;
pub const OPC_HALT_ASYNC: u16 = 0x0014;
pub const OPC_TRIGGER_SYNC: u16 = 0x0015;
pub const OPC_ENTER_LOW_POWER: u16 = 0x0016;
pub const OPC_BROADCAST_BEGIN: u16 = 0x0020;

// Program (device-memory) opcodes: a single leading tag byte per opcode,
// consumed by the device out of the uploaded program blob, not wire frames.
pub const PROG_OP_SELECT_BAND: u8 = 0x01;
pub const PROG_OP_SELECT_PATH: u8 = 0x02;
pub const PROG_OP_POINT: u8 = 0x03;
pub const PROG_OP_SET_IF_GAIN: u8 = 0x04;
pub const PROG_OP_SET_PAD: u8 = 0x05;
pub const PROG_OP_ENCODER: u8 = 0x06;
pub const PROG_OP_SERIAL: u8 = 0x07;
pub const PROG_OP_SYNC_PULSE: u8 = 0x08;
pub const PROG_OP_SEND_SWEEP_TIMER: u8 = 0x09;
pub const PROG_OP_RESET_FRAME_COUNTER: u8 = 0x0A;
pub const PROG_OP_TDD: u8 = 0x0B;
