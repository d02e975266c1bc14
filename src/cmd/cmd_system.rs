//! System-level commands: capability query, PROM download, liveness ping.

/// Request the device's capability block (feeds `HardwareProfile`).
pub fn get_capabilities_req() -> Vec<u8> {
    Vec::new()
}

/// Request one chunk of the PROM blob, `len` bytes starting at `offset`.
pub fn read_prom_chunk_req(offset: u32, len: u16) -> Vec<u8> {
    let mut req = Vec::with_capacity(6);
    req.extend_from_slice(&offset.to_be_bytes());
    req.extend_from_slice(&len.to_be_bytes());
    req
}

/// An "are you there" probe, for `utilPingUnit`.
pub fn ping_req() -> Vec<u8> {
    Vec::new()
}

/// Disable the device's RF rails to save idle power.
pub fn enter_low_power_req() -> Vec<u8> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prom_chunk_encodes_offset_and_len() {
        let req = read_prom_chunk_req(0x0100, 64);
        assert_eq!(req, vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x40]);
    }
}
