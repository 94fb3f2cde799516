//! Simulated link for testing without hardware
//!
//! A shared in-memory bus: every byte written by one endpoint is heard by
//! every other endpoint that is currently open, or echoed back to the writer
//! when it is the only one open (loopback).
//!
//! Faults can be configured per bus (a reliable baud rate or payload length
//! ceiling) and per endpoint (corrupt everything it receives, never deliver
//! to it, refuse to open it).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::link::{Channel, LinkConfig, ProbeError, Transport};

#[derive(Debug, Default)]
struct Faults {
    max_baud: Option<u32>,
    max_payload: Option<usize>,
    corrupt: HashSet<String>,
    silent: HashSet<String>,
    refuse: HashSet<String>,
}

struct Bus {
    faults: Faults,
    /// Currently open endpoints, in open order
    open: Vec<String>,
    queues: HashMap<String, VecDeque<u8>>,
    opens: usize,
    double_opens: usize,
    rng: StdRng,
}

impl Bus {
    fn deliver(&mut self, from: &str, baud: u32, data: &[u8]) {
        let payload_len = payload_len(data);
        let degraded = self.faults.max_baud.is_some_and(|max| baud > max)
            || self.faults.max_payload.is_some_and(|max| payload_len > max);

        let recipients: Vec<String> = if self.open.len() == 1 {
            self.open.clone()
        } else {
            self.open.iter().filter(|id| *id != from).cloned().collect()
        };

        for id in recipients {
            if self.faults.silent.contains(&id) {
                continue;
            }
            let mut copy = data.to_vec();
            if degraded || self.faults.corrupt.contains(&id) {
                self.corrupt(&mut copy, payload_len);
            }
            self.queues.entry(id).or_default().extend(copy);
        }
    }

    fn corrupt(&mut self, data: &mut [u8], payload_len: usize) {
        let span = if payload_len > 0 {
            payload_len
        } else {
            data.len()
        };
        if span == 0 {
            return;
        }
        let index = self.rng.gen_range(0..span);
        data[index] ^= 0x01;
    }
}

/// Length of the payload region of an encoded packet
///
/// Payloads never contain a lowercase `x`, so the last `0x` starts the
/// integrity code.
fn payload_len(data: &[u8]) -> usize {
    data.windows(2)
        .rposition(|w| w == b"0x")
        .unwrap_or_else(|| data.len().saturating_sub(2))
}

/// In-memory [`Transport`]
///
/// Cloning shares the same bus.
#[derive(Clone)]
pub struct SimTransport {
    bus: Arc<Mutex<Bus>>,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    /// Lossless bus
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Lossless bus whose corruption positions come from `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            bus: Arc::new(Mutex::new(Bus {
                faults: Faults::default(),
                open: Vec::new(),
                queues: HashMap::new(),
                opens: 0,
                double_opens: 0,
                rng: StdRng::seed_from_u64(seed),
            })),
        }
    }

    fn bus(&self) -> MutexGuard<'_, Bus> {
        lock(&self.bus)
    }

    /// Corrupt every packet sent above `baud`
    pub fn reliable_up_to_baud(self, baud: u32) -> Self {
        self.bus().faults.max_baud = Some(baud);
        self
    }

    /// Corrupt every packet whose payload is longer than `length`
    pub fn reliable_up_to_length(self, length: usize) -> Self {
        self.bus().faults.max_payload = Some(length);
        self
    }

    /// Corrupt everything `id` receives
    pub fn corrupting(self, id: &str) -> Self {
        self.bus().faults.corrupt.insert(id.to_string());
        self
    }

    /// Never deliver anything to `id`
    pub fn silent(self, id: &str) -> Self {
        self.bus().faults.silent.insert(id.to_string());
        self
    }

    /// Fail every attempt to open `id`
    pub fn refusing(self, id: &str) -> Self {
        self.bus().faults.refuse.insert(id.to_string());
        self
    }

    /// Endpoints currently open
    pub fn open_count(&self) -> usize {
        self.bus().open.len()
    }

    /// Successful opens so far
    pub fn total_opens(&self) -> usize {
        self.bus().opens
    }

    /// Times an endpoint was opened while a handle to it was still open
    pub fn double_opens(&self) -> usize {
        self.bus().double_opens
    }
}

impl Transport for SimTransport {
    fn open(&self, id: &str, config: &LinkConfig) -> Result<Box<dyn Channel>, ProbeError> {
        let mut bus = self.bus();
        if bus.faults.refuse.contains(id) {
            return Err(ProbeError::connection(id, "refused by simulated bus"));
        }
        if bus.open.iter().any(|open| open == id) {
            bus.double_opens += 1;
        }
        bus.open.push(id.to_string());
        bus.opens += 1;
        bus.queues.entry(id.to_string()).or_default().clear();

        Ok(Box::new(SimChannel {
            id: id.to_string(),
            baud: config.baud_rate,
            bus: Arc::clone(&self.bus),
        }))
    }
}

fn lock(bus: &Mutex<Bus>) -> MutexGuard<'_, Bus> {
    bus.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct SimChannel {
    id: String,
    baud: u32,
    bus: Arc<Mutex<Bus>>,
}

impl Read for SimChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut bus = lock(&self.bus);
        let queue = bus.queues.entry(self.id.clone()).or_default();
        if queue.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "simulated read timeout"));
        }
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.bus).deliver(&self.id, self.baud, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for SimChannel {
    fn clear_input(&mut self) -> io::Result<()> {
        if let Some(queue) = lock(&self.bus).queues.get_mut(&self.id) {
            queue.clear();
        }
        Ok(())
    }
}

impl Drop for SimChannel {
    fn drop(&mut self) {
        let mut bus = lock(&self.bus);
        if let Some(pos) = bus.open.iter().position(|id| *id == self.id) {
            bus.open.remove(pos);
        }
    }
}
