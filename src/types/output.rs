// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Raw outputs of dispatched operations

use alloy_primitives::BlockNumber;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::UnixTimestamp;

/// A block resolved from a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResolution {
    pub block_number: BlockNumber,
    pub block_timestamp: UnixTimestamp,
}

/// A computation's output at one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockValue {
    pub block_number: BlockNumber,
    pub value: Value,
}

/// One sample of a historical series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// The sample time requested
    pub sample_timestamp: UnixTimestamp,
    /// Latest block at or before the sample time
    pub block_number: BlockNumber,
    pub block_timestamp: UnixTimestamp,
    /// Computation output at the block, when the query named one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// Samples of a historical series, ascending by sample time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub points: Vec<SeriesPoint>,
}

/// Whatever a dispatch produced, before a request narrows it to its raw type
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Block(BlockResolution),
    Value(Value),
    Blocks(Vec<BlockValue>),
    Series(HistoricalSeries),
}

impl RawOutput {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RawOutput::Block(_) => "block",
            RawOutput::Value(_) => "value",
            RawOutput::Blocks(_) => "blocks",
            RawOutput::Series(_) => "series",
        }
    }

    /// Returns `true` if the dispatch produced nothing usable.
    pub fn is_empty(&self) -> bool {
        match self {
            RawOutput::Block(_) => false,
            RawOutput::Value(value) => value.is_null(),
            // An empty batch is a complete answer
            RawOutput::Blocks(_) => false,
            RawOutput::Series(series) => series.points.is_empty(),
        }
    }
}
