// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Dispatchable operations
//!
//! [`Operation`] is the closed set of things a worker can execute on a cache
//! miss. Each variant carries its inputs as typed fields and declares which of
//! them must be represented in the request's cache keywords
//! ([`Operation::required_keywords`]).

use alloy_primitives::BlockNumber;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::{Keyword, UnixTimestamp};
use crate::errors::SourceError;

/// Method tag of an [`Operation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Resolve a point in time to the latest block at or before it
    TimeToBlock,
    /// Run a named computation at one block
    RunAtBlock,
    /// Fan `RunAtBlock` out over a list of blocks
    RunAtBlocks,
    /// Run a windowed, interval-sampled historical query
    RunHistoricalSeries,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::TimeToBlock => "time-to-block",
            Method::RunAtBlock => "run-at-block",
            Method::RunAtBlocks => "run-at-blocks",
            Method::RunHistoricalSeries => "run-historical-series",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for Keyword {
    fn from(method: Method) -> Self {
        Keyword::Text(method.as_str().to_string())
    }
}

/// A named external computation and its literal parameters
///
/// Parameters live in a sorted map so the serialized form is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Computation {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl Computation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Keywords that identify this computation: its name, then every
    /// parameter value in key order.
    pub fn keywords(&self) -> Vec<Keyword> {
        std::iter::once(Keyword::from(self.name.as_str()))
            .chain(self.params.values().map(Keyword::from_json))
            .collect()
    }

    fn required(&self, out: &mut Vec<(String, Keyword)>) {
        out.push(("computation".to_string(), Keyword::from(self.name.as_str())));
        for (key, value) in &self.params {
            out.push((format!("param '{key}'"), Keyword::from_json(value)));
        }
    }
}

/// Where a historical series ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SeriesAnchor {
    /// End at `timestamp` rounded down to a multiple of `clock_secs`
    Snapped {
        clock_secs: u64,
        timestamp: UnixTimestamp,
    },
    /// End exactly at `timestamp`
    EndAt { timestamp: UnixTimestamp },
}

impl SeriesAnchor {
    /// Snaps the current wall-clock time to `clock_secs`.
    ///
    /// The snapped time is fixed here, at construction, so that the request's
    /// cache key stays deterministic.
    pub fn snapped_now(clock_secs: u64) -> Self {
        let timestamp = UnixTimestamp::now().floor_to(clock_secs);
        SeriesAnchor::Snapped {
            clock_secs,
            timestamp,
        }
    }

    /// Effective end of the series.
    pub fn end_timestamp(&self) -> UnixTimestamp {
        match self {
            SeriesAnchor::Snapped {
                clock_secs,
                timestamp,
            } => timestamp.floor_to(*clock_secs),
            SeriesAnchor::EndAt { timestamp } => *timestamp,
        }
    }
}

/// Inputs of a `run-historical-series` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesQuery {
    pub anchor: SeriesAnchor,
    /// Length of the window ending at the anchor, in seconds
    pub window_secs: u64,
    /// Distance between samples, in seconds
    pub interval_secs: u64,
    /// Computation to run at each sampled block; `None` samples blocks only
    #[serde(default)]
    pub computation: Option<Computation>,
}

impl SeriesQuery {
    /// Sample times in ascending order, ending at the anchor.
    ///
    /// A window of `w` with interval `i` yields `w / i + 1` samples.
    pub fn sample_times(&self) -> Result<Vec<UnixTimestamp>, SourceError> {
        if self.interval_secs == 0 {
            return Err(SourceError::compute_rejected(
                "historical series interval must be positive",
            ));
        }
        let end = self.anchor.end_timestamp();
        let count = self.window_secs / self.interval_secs;
        let mut times: Vec<UnixTimestamp> = (0..=count)
            .map(|k| end.minus_secs(k.saturating_mul(self.interval_secs)))
            .collect();
        times.reverse();
        Ok(times)
    }
}

/// A dispatchable unit of work with its literal inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum Operation {
    TimeToBlock {
        timestamp: UnixTimestamp,
    },
    RunAtBlock {
        block_number: BlockNumber,
        computation: Computation,
    },
    RunAtBlocks {
        block_numbers: Vec<BlockNumber>,
        computation: Computation,
    },
    RunHistoricalSeries {
        query: SeriesQuery,
    },
}

impl Operation {
    pub fn method(&self) -> Method {
        match self {
            Operation::TimeToBlock { .. } => Method::TimeToBlock,
            Operation::RunAtBlock { .. } => Method::RunAtBlock,
            Operation::RunAtBlocks { .. } => Method::RunAtBlocks,
            Operation::RunHistoricalSeries { .. } => Method::RunHistoricalSeries,
        }
    }

    /// Labelled keywords that must appear among a request's cache keywords.
    ///
    /// Block numbers of a batch are not listed here: they must appear in the
    /// request's tail keyword, which the request checks separately.
    pub fn required_keywords(&self) -> Vec<(String, Keyword)> {
        let mut out = Vec::new();
        match self {
            Operation::TimeToBlock { timestamp } => {
                out.push(("timestamp".to_string(), Keyword::from(*timestamp)));
            }
            Operation::RunAtBlock {
                block_number,
                computation,
            } => {
                out.push(("block_number".to_string(), Keyword::from(*block_number)));
                computation.required(&mut out);
            }
            Operation::RunAtBlocks { computation, .. } => {
                computation.required(&mut out);
            }
            Operation::RunHistoricalSeries { query } => {
                match query.anchor {
                    SeriesAnchor::Snapped {
                        clock_secs,
                        timestamp,
                    } => {
                        out.push(("snap_clock".to_string(), Keyword::from(clock_secs)));
                        out.push(("timestamp".to_string(), Keyword::from(timestamp)));
                    }
                    SeriesAnchor::EndAt { timestamp } => {
                        out.push(("end_timestamp".to_string(), Keyword::from(timestamp)));
                    }
                }
                out.push(("window".to_string(), Keyword::from(query.window_secs)));
                out.push(("interval".to_string(), Keyword::from(query.interval_secs)));
                if let Some(computation) = &query.computation {
                    computation.required(&mut out);
                }
            }
        }
        out
    }

    /// Canonical serialization of the literal inputs, stored with each entry.
    pub fn snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
