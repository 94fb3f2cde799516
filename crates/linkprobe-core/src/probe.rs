//! Probe driver
//!
//! Opens a fresh endpoint set for every round, so each candidate of a search
//! is measured on freshly configured ports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::link::{EndpointSet, LinkConfig, PayloadGenerator, ProbeError, Transport};
use crate::round::{run_round, RoundOutcome};
use crate::search::{search, SearchReport};
use crate::stats::DelayStats;

/// Ranges and sizes used by a full characterisation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPlan {
    /// Lowest baud rate tried by the speed search
    pub min_baud: u32,
    /// Speed search ceiling, exclusive
    pub max_baud: u32,
    /// Payload length used while searching for speed
    pub speed_search_length: usize,
    /// Shortest payload tried by the length search
    pub min_length: u32,
    /// Length search ceiling, exclusive
    pub max_length: u32,
    /// Rounds per delay measurement
    pub delay_samples: usize,
    /// Short payload length delays are also measured at
    pub short_length: usize,
}

impl Default for SearchPlan {
    fn default() -> Self {
        Self {
            min_baud: 9600,
            max_baud: 120_000_000,
            speed_search_length: 2000,
            min_length: 100,
            max_length: 100_000,
            delay_samples: 10,
            short_length: 10,
        }
    }
}

/// Delay statistics at one payload length
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayAtLength {
    /// Payload length
    pub length: usize,
    /// Statistics, absent when no round produced a sample
    pub stats: Option<DelayStats>,
}

/// Everything a characterisation run found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkReport {
    /// Endpoints in sending order
    pub endpoints: Vec<String>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Plan the run followed
    pub plan: SearchPlan,
    /// Speed search
    pub speed: SearchReport,
    /// Length search at the speed found, skipped when no speed worked
    pub length: Option<SearchReport>,
    /// Delay measurements
    pub delays: Vec<DelayAtLength>,
}

impl LinkReport {
    /// Highest working baud rate, 0 if none
    pub fn max_baud(&self) -> u32 {
        self.speed.last_good
    }

    /// Longest working payload at [`Self::max_baud`], 0 if none
    pub fn max_length(&self) -> u32 {
        self.length.as_ref().map_or(0, |r| r.last_good)
    }
}

/// Runs rounds, searches and delay measurements against a fixed list of endpoints
pub struct Prober<T: Transport> {
    transport: T,
    endpoints: Vec<String>,
    config: LinkConfig,
    generator: PayloadGenerator,
}

impl<T: Transport> Prober<T> {
    /// Prober over `endpoints`, opened through `transport`
    pub fn new(transport: T, endpoints: Vec<String>) -> Self {
        Self {
            transport,
            endpoints,
            config: LinkConfig::default(),
            generator: PayloadGenerator::new(),
        }
    }

    /// Use `config` for everything but the baud rate, which each probe sets
    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `generator` for payloads
    pub fn with_generator(mut self, generator: PayloadGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Endpoints in sending order
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Open the endpoints at `baud`, run one round of `length`, close them
    pub fn probe(&mut self, baud: u32, length: usize) -> Result<RoundOutcome, ProbeError> {
        let config = self.config.clone().with_baud_rate(baud);
        let mut set = EndpointSet::open(&self.transport, &self.endpoints, &config)?;
        let outcome = run_round(&mut set, length, &mut self.generator);
        set.close();
        outcome
    }

    /// Highest baud rate in `[min, max)` at which `length`-character packets pass
    pub fn search_speed(&mut self, min: u32, max: u32, length: usize) -> SearchReport {
        info!(min, max, length, "searching for speed");
        search(min, max, |baud| self.probe(baud, length))
    }

    /// Longest payload in `[min, max)` that passes at `baud`
    pub fn search_length(&mut self, min: u32, max: u32, baud: u32) -> SearchReport {
        info!(min, max, baud, "searching for packet length");
        search(min, max, |length| self.probe(baud, length as usize))
    }

    /// Delay statistics over `rounds` rounds at fixed `baud` and `length`
    ///
    /// Sampling stops at the first round that fails; samples gathered up to
    /// that point, including the failed round's verified receipts, are kept.
    pub fn sample_delay(
        &mut self,
        baud: u32,
        length: usize,
        rounds: usize,
    ) -> Result<DelayStats, ProbeError> {
        if self.endpoints.is_empty() {
            return Err(ProbeError::NoEndpoints);
        }
        if length == 0 {
            return Err(ProbeError::InvalidLength(length));
        }

        let mut pooled = Vec::new();
        for round in 0..rounds {
            match self.probe(baud, length) {
                Ok(outcome) => {
                    pooled.extend(outcome.delays());
                    if let Some(failure) = outcome.failure() {
                        warn!(round, baud, length, "delay sampling stopped: {failure}");
                        break;
                    }
                }
                Err(e) => {
                    warn!(round, baud, length, "delay sampling stopped: {e}");
                    break;
                }
            }
        }

        DelayStats::from_samples(&pooled)
    }

    /// Speed, then length at that speed, then delays at a short and at the
    /// longest working length
    pub fn characterize(&mut self, plan: &SearchPlan) -> Result<LinkReport, ProbeError> {
        if self.endpoints.is_empty() {
            return Err(ProbeError::NoEndpoints);
        }
        let started_at = Utc::now();

        let speed = self.search_speed(plan.min_baud, plan.max_baud, plan.speed_search_length);
        let baud = speed.last_good;

        let mut length = None;
        let mut delays = Vec::new();
        if baud > 0 {
            let found = self.search_length(plan.min_length, plan.max_length, baud);
            let mut lengths = vec![plan.short_length];
            if found.last_good > 0 {
                lengths.push(found.last_good as usize);
            }
            length = Some(found);

            for len in lengths {
                let stats = match self.sample_delay(baud, len, plan.delay_samples) {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        warn!(baud, length = len, "no delay statistics: {e}");
                        None
                    }
                };
                delays.push(DelayAtLength { length: len, stats });
            }
        } else {
            warn!("no working speed found, skipping length and delay measurement");
        }

        Ok(LinkReport {
            endpoints: self.endpoints.clone(),
            started_at,
            plan: plan.clone(),
            speed,
            length,
            delays,
        })
    }
}
