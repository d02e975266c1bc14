//! Program opcodes that drive the synthesizer/switchboard through a sweep:
//! band-change markers, path-select blocks, and per-point sample opcodes.

use super::{PROG_OP_POINT, PROG_OP_SELECT_BAND, PROG_OP_SELECT_PATH};
use crate::config::{RxPath, TxPath};

/// Emitted whenever the sweep crosses a band boundary; bands are ordered
/// highest-first by the caller (`ProgramBuilder`).
pub fn select_band_op(band_index: u8) -> Vec<u8> {
    vec![PROG_OP_SELECT_BAND, band_index]
}

fn path_code(tx: TxPath, rx: RxPath) -> (u8, u8) {
    let t = match tx {
        TxPath::Path0 => 0,
        TxPath::Path1 => 1,
        TxPath::Path2 => 2,
        TxPath::Path3 => 3,
        TxPath::Path4 => 4,
        TxPath::Path5 => 5,
        TxPath::Path6 => 6,
        TxPath::Path7 => 7,
        TxPath::None => 0xFF,
    };
    let r = match rx {
        RxPath::Path0 => 0,
        RxPath::Path1 => 1,
        RxPath::Path2 => 2,
        RxPath::Path3 => 3,
        RxPath::Path4 => 4,
        RxPath::Path5 => 5,
        RxPath::Path6 => 6,
        RxPath::Path7 => 7,
        RxPath::None => 0xFF,
    };
    (t, r)
}

/// Begins a block of per-point opcodes for one measured (tx, rx) pair.
pub fn select_path_op(tx: TxPath, rx: RxPath) -> Vec<u8> {
    let (t, r) = path_code(tx, rx);
    vec![PROG_OP_SELECT_PATH, t, r]
}

/// One sample opcode: the synthesizer steps to `freq_code` (a hardware grid
/// code, not raw MHz) regardless of exclusion, but the RF output is muted
/// when `rf_enabled` is false.
pub fn point_op(freq_code: u32, rf_enabled: bool) -> Vec<u8> {
    let mut op = vec![PROG_OP_POINT];
    op.extend_from_slice(&freq_code.to_be_bytes());
    op.push(rf_enabled as u8);
    op
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_op_encodes_rf_flag() {
        let on = point_op(42, true);
        let off = point_op(42, false);
        assert_eq!(*on.last().unwrap(), 1);
        assert_eq!(*off.last().unwrap(), 0);
        assert_eq!(on.len(), 6);
    }

    #[test]
    fn path_op_encodes_none() {
        let op = select_path_op(TxPath::None, RxPath::Path3);
        assert_eq!(op[1], 0xFF);
        assert_eq!(op[2], 3);
    }
}
