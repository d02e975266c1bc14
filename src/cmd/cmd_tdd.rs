//! Time-division-duplex switchboard register block. Values are forwarded
//! verbatim — no semantic validation beyond the presence check performed by
//! `ProgramBuilder` for `SwitchboardKind::Tdd4`.

use super::PROG_OP_TDD;
use crate::config::TddSettings;

pub fn tdd_op(settings: TddSettings) -> Vec<u8> {
    let mut op = Vec::with_capacity(1 + 7 + 6 * 4);
    op.push(PROG_OP_TDD);
    op.push(settings.active as u8);
    op.push(settings.enabled as u8);
    op.push(settings.nulling as u8);
    op.push(settings.power_amp as u8);
    op.push(settings.slave as u8);
    op.push(settings.attenuator_enabled as u8);
    op.push(settings.lna as u8);
    op.extend_from_slice(&settings.attenuator_value.to_be_bytes());
    op.extend_from_slice(&settings.tx.to_be_bytes());
    op.extend_from_slice(&settings.tx_to_rx1.to_be_bytes());
    op.extend_from_slice(&settings.rx1.to_be_bytes());
    op.extend_from_slice(&settings.rx1_to_rx2.to_be_bytes());
    op.extend_from_slice(&settings.rx2.to_be_bytes());
    op.extend_from_slice(&settings.rx2_to_tx.to_be_bytes());
    op
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tdd_op_length_is_fixed() {
        let op = tdd_op(TddSettings::default());
        assert_eq!(op.len(), 1 + 7 + 2 + 6 * 4);
    }
}
