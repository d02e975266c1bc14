//! Wire-level sweep lifecycle commands: program upload, start/stop,
//! async begin/halt, the sync trigger, and broadcast begin.

/// One chunk of the uploaded program. `total_len` lets the device detect a
/// truncated upload; `offset` lets chunks arrive in any one in-flight batch.
pub fn upload_program_chunk_req(offset: u32, total_len: u32, chunk: &[u8]) -> Vec<u8> {
    let mut req = Vec::with_capacity(8 + chunk.len());
    req.extend_from_slice(&offset.to_be_bytes());
    req.extend_from_slice(&total_len.to_be_bytes());
    req.extend_from_slice(chunk);
    req
}

pub fn start_req() -> Vec<u8> {
    Vec::new()
}

pub fn stop_req() -> Vec<u8> {
    Vec::new()
}

pub fn begin_async_req() -> Vec<u8> {
    Vec::new()
}

pub fn halt_async_req() -> Vec<u8> {
    Vec::new()
}

/// Trigger one synchronous sweep.
pub fn trigger_sync_req() -> Vec<u8> {
    Vec::new()
}

/// Sent to the reserved broadcast port (1024) so every pre-programmed unit
/// begins within about a millisecond of each other.
pub fn broadcast_begin_req() -> Vec<u8> {
    Vec::new()
}
