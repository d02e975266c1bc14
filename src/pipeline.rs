//! Sweep reassembly. Streamed sweep frames arrive as one UDP datagram per
//! (sweep, path, packet) triple, in no guaranteed order, interleaved with
//! frames from other in-flight sweeps; `ReceivePipeline` folds them back
//! into complete, per-path sample vectors.
//!
//! Packet payload layout (after the `framer` header/trailer have been
//! stripped): a single path-index byte, followed by `total_packets`-worth of
//! big-endian Q1.15 samples (see `framer::decode_iq_sample`). An
//! implementation choice, like the rest of the wire layout in `framer`.

use std::collections::{HashMap, VecDeque};

use crate::error::{AvmuError, Result};
use crate::framer::{self, SweepFrameHeader};

/// How many sweeps may be simultaneously in flight (partially reassembled)
/// before the oldest incomplete one is discarded to bound memory.
const MAX_IN_FLIGHT_SWEEPS: usize = 3;

#[derive(Debug, Clone)]
pub struct SweepPathData {
    pub path_index: u8,
    pub samples: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct CompletedSweep {
    pub sweep_number: u32,
    pub frame_number: u32,
    pub timestamp_ticks: u32,
    pub paths: Vec<SweepPathData>,
}

struct PartialPath {
    packets: Vec<Option<Vec<f64>>>,
    received: usize,
}

struct PartialSweep {
    frame_number: u32,
    timestamp_ticks: u32,
    total_packets: u16,
    expected_paths: usize,
    paths: HashMap<u8, PartialPath>,
}

impl PartialSweep {
    fn complete(&self) -> bool {
        self.paths.len() == self.expected_paths
            && self.paths.values().all(|p| p.received == self.total_packets as usize)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Incomplete sweeps discarded because a newer sweep superseded them.
    pub lost_sweeps: u64,
    /// Completed sweeps discarded because the ready queue was full.
    pub dropped_completed_sweeps: u64,
}

/// Reassembles streamed sweep datagrams into complete, per-path sample
/// sets. One instance per `Task` in `Running`/async-streaming state.
pub struct ReceivePipeline {
    expected_paths: usize,
    queue_capacity: usize,
    in_flight: HashMap<u32, PartialSweep>,
    in_flight_order: VecDeque<u32>,
    ready: VecDeque<CompletedSweep>,
    stats: PipelineStats,
}

impl ReceivePipeline {
    pub fn new(expected_paths: usize, queue_capacity: usize) -> Self {
        ReceivePipeline {
            expected_paths,
            queue_capacity: queue_capacity.max(1),
            in_flight: HashMap::new(),
            in_flight_order: VecDeque::new(),
            ready: VecDeque::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Feed one raw datagram (still framed: header + payload + checksum).
    pub fn ingest(&mut self, datagram: &[u8]) -> Result<()> {
        let (header, payload) = framer::decode_sweep_frame(datagram)?;
        if payload.is_empty() {
            return Err(AvmuError::Bytes);
        }
        let path_index = payload[0];
        let sample_bytes = &payload[1..];
        if sample_bytes.len() % 2 != 0 {
            return Err(AvmuError::Bytes);
        }
        let samples: Vec<f64> = sample_bytes
            .chunks_exact(2)
            .map(|c| framer::decode_iq_sample(i16::from_be_bytes([c[0], c[1]])))
            .collect();

        self.admit_sweep(&header);

        let sweep = self.in_flight.get_mut(&header.sweep_number).expect("just admitted");
        let path = sweep.paths.entry(path_index).or_insert_with(|| PartialPath {
            packets: vec![None; header.total_packets as usize],
            received: 0,
        });
        if let Some(slot) = path.packets.get_mut(header.packet_number as usize) {
            if slot.is_none() {
                path.received += 1;
            }
            *slot = Some(samples);
        }

        if self.in_flight.get(&header.sweep_number).map(|s| s.complete()).unwrap_or(false) {
            self.finish_sweep(header.sweep_number);
        }
        Ok(())
    }

    fn admit_sweep(&mut self, header: &SweepFrameHeader) {
        if self.in_flight.contains_key(&header.sweep_number) {
            return;
        }
        self.in_flight.insert(
            header.sweep_number,
            PartialSweep {
                frame_number: header.frame_number,
                timestamp_ticks: header.timestamp_ticks,
                total_packets: header.total_packets,
                expected_paths: self.expected_paths,
                paths: HashMap::new(),
            },
        );
        self.in_flight_order.push_back(header.sweep_number);

        while self.in_flight_order.len() > MAX_IN_FLIGHT_SWEEPS {
            if let Some(evicted) = self.in_flight_order.pop_front() {
                if self.in_flight.remove(&evicted).is_some() {
                    self.stats.lost_sweeps += 1;
                }
            }
        }
    }

    fn finish_sweep(&mut self, sweep_number: u32) {
        self.in_flight_order.retain(|&n| n != sweep_number);
        let Some(sweep) = self.in_flight.remove(&sweep_number) else { return };
        let mut paths: Vec<SweepPathData> = sweep
            .paths
            .into_iter()
            .map(|(path_index, partial)| SweepPathData {
                path_index,
                samples: partial.packets.into_iter().flatten().flatten().collect(),
            })
            .collect();
        paths.sort_by_key(|p| p.path_index);

        if self.ready.len() >= self.queue_capacity {
            self.ready.pop_front();
            self.stats.dropped_completed_sweeps += 1;
        }
        self.ready.push_back(CompletedSweep {
            sweep_number,
            frame_number: sweep.frame_number,
            timestamp_ticks: sweep.timestamp_ticks,
            paths,
        });
    }

    /// Pop the oldest completed sweep, if any are ready.
    pub fn next_completed(&mut self) -> Option<CompletedSweep> {
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sweep: u32, packet: u16, total: u16, path: u8, samples: &[f64]) -> Vec<u8> {
        let mut payload = vec![path];
        for &s in samples {
            payload.extend_from_slice(&framer::encode_iq_sample(s).to_be_bytes());
        }
        framer::encode_sweep_frame(
            SweepFrameHeader {
                sweep_number: sweep,
                packet_number: packet,
                total_packets: total,
                frame_number: sweep,
                timestamp_ticks: 1000 + sweep,
            },
            &payload,
        )
    }

    #[test]
    fn reassembles_single_path_single_packet() {
        let mut p = ReceivePipeline::new(1, 4);
        p.ingest(&frame(1, 0, 1, 0, &[0.25, -0.5])).unwrap();
        let done = p.next_completed().unwrap();
        assert_eq!(done.sweep_number, 1);
        assert_eq!(done.paths.len(), 1);
        assert!((done.paths[0].samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn waits_for_all_paths_before_completing() {
        let mut p = ReceivePipeline::new(2, 4);
        p.ingest(&frame(1, 0, 1, 0, &[0.1])).unwrap();
        assert!(p.next_completed().is_none());
        p.ingest(&frame(1, 0, 1, 1, &[0.2])).unwrap();
        let done = p.next_completed().unwrap();
        assert_eq!(done.paths.len(), 2);
    }

    #[test]
    fn multi_packet_path_reassembles_in_order() {
        let mut p = ReceivePipeline::new(1, 4);
        p.ingest(&frame(1, 1, 2, 0, &[0.2])).unwrap();
        p.ingest(&frame(1, 0, 2, 0, &[0.1])).unwrap();
        let done = p.next_completed().unwrap();
        assert_eq!(done.paths[0].samples.len(), 2);
        assert!((done.paths[0].samples[0] - 0.1).abs() < 1e-3);
        assert!((done.paths[0].samples[1] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn stale_incomplete_sweep_is_evicted_and_counted() {
        let mut p = ReceivePipeline::new(2, 4);
        p.ingest(&frame(1, 0, 1, 0, &[0.1])).unwrap(); // sweep 1, incomplete
        p.ingest(&frame(2, 0, 1, 0, &[0.1])).unwrap();
        p.ingest(&frame(3, 0, 1, 0, &[0.1])).unwrap();
        p.ingest(&frame(4, 0, 1, 0, &[0.1])).unwrap(); // pushes sweep 1 out
        assert_eq!(p.stats().lost_sweeps, 1);
    }

    #[test]
    fn ready_queue_drops_oldest_when_full() {
        let mut p = ReceivePipeline::new(1, 1);
        p.ingest(&frame(1, 0, 1, 0, &[0.1])).unwrap();
        p.ingest(&frame(2, 0, 1, 0, &[0.1])).unwrap();
        assert_eq!(p.stats().dropped_completed_sweeps, 1);
        let only = p.next_completed().unwrap();
        assert_eq!(only.sweep_number, 2);
        assert!(p.next_completed().is_none());
    }
}
