// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use alloy_primitives::BlockNumber;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ResolveTimeToBlock, TaskContext, TaskDefinition, TimedBlock};
use crate::errors::{CookError, TaskError};
use crate::request::WorkRequest;
use crate::types::{
    HistoricalSeries, Keyword, Operation, SeriesAnchor, SeriesQuery, UnixTimestamp,
};

/// One sampled block of a [`BlockRangeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRangeRow {
    pub sample_timestamp: UnixTimestamp,
    pub block_number: BlockNumber,
    pub block_timestamp: UnixTimestamp,
}

/// Blocks sampled at a fixed interval over a window, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRangeTable {
    /// The block the window ends at
    pub anchor: TimedBlock,
    pub window_secs: u64,
    pub interval_secs: u64,
    pub rows: Vec<BlockRangeRow>,
}

impl BlockRangeTable {
    pub fn sample_times(&self) -> Vec<UnixTimestamp> {
        self.rows.iter().map(|row| row.sample_timestamp).collect()
    }

    pub fn block_numbers(&self) -> Vec<BlockNumber> {
        self.rows.iter().map(|row| row.block_number).collect()
    }

    pub fn first(&self) -> Option<&BlockRangeRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&BlockRangeRow> {
        self.rows.last()
    }
}

/// Samples blocks over a window ending at a resolved point in time
///
/// Runs [`ResolveTimeToBlock`] for `as_of` first, then issues a
/// `run-historical-series` request anchored at the resolved block's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveHistoricalBlockRange {
    as_of: UnixTimestamp,
    window_secs: u64,
    interval_secs: u64,
    snap_clock_secs: Option<u64>,
}

impl ResolveHistoricalBlockRange {
    /// Fails if `interval_secs` is zero.
    pub fn new(as_of: UnixTimestamp, window_secs: u64, interval_secs: u64) -> Result<Self, TaskError> {
        if interval_secs == 0 {
            return Err(TaskError::construction("block range interval must be positive"));
        }
        Ok(Self {
            as_of,
            window_secs,
            interval_secs,
            snap_clock_secs: None,
        })
    }

    /// Rounds the window's end down to a multiple of `clock_secs`.
    pub fn snapped_to(mut self, clock_secs: u64) -> Result<Self, TaskError> {
        if clock_secs == 0 {
            return Err(TaskError::construction("snap clock must be positive"));
        }
        self.snap_clock_secs = Some(clock_secs);
        Ok(self)
    }

    pub fn as_of(&self) -> UnixTimestamp {
        self.as_of
    }

    fn request(&self, anchor: TimedBlock) -> WorkRequest<HistoricalSeries, BlockRangeTable> {
        let (series_anchor, mut keywords): (SeriesAnchor, Vec<Keyword>) = match self.snap_clock_secs {
            Some(clock_secs) => (
                SeriesAnchor::Snapped {
                    clock_secs,
                    timestamp: anchor.block_timestamp,
                },
                vec![Keyword::from(clock_secs), anchor.block_timestamp.into()],
            ),
            None => (
                SeriesAnchor::EndAt {
                    timestamp: anchor.block_timestamp,
                },
                vec![anchor.block_timestamp.into()],
            ),
        };
        keywords.push(Keyword::from(self.window_secs));
        keywords.push(Keyword::from(self.interval_secs));

        let (window_secs, interval_secs) = (self.window_secs, self.interval_secs);
        WorkRequest::new(
            keywords,
            format!("block-range@{}", anchor.block_timestamp),
            Operation::RunHistoricalSeries {
                query: SeriesQuery {
                    anchor: series_anchor,
                    window_secs,
                    interval_secs,
                    computation: None,
                },
            },
            move |ctx, series: HistoricalSeries| {
                let rows: Vec<BlockRangeRow> = series
                    .points
                    .into_iter()
                    .map(|point| BlockRangeRow {
                        sample_timestamp: point.sample_timestamp,
                        block_number: point.block_number,
                        block_timestamp: point.block_timestamp,
                    })
                    .collect();
                if rows.windows(2).any(|pair| pair[0].sample_timestamp > pair[1].sample_timestamp) {
                    return Err(CookError::shaping(&ctx.target, "series samples are not ascending"));
                }
                Ok(BlockRangeTable {
                    anchor,
                    window_secs,
                    interval_secs,
                    rows,
                })
            },
        )
    }
}

#[async_trait]
impl TaskDefinition for ResolveHistoricalBlockRange {
    type Output = BlockRangeTable;

    const NAME: &'static str = "block-range";

    async fn define(&self, ctx: &TaskContext) -> Result<BlockRangeTable, TaskError> {
        let anchor = ctx.run(ResolveTimeToBlock::new(self.as_of)).await?;
        let mut table = ctx.cook(&self.request(anchor)).await?;
        // The slot is keyed by the resolved block time, which other as-of
        // times may share.
        table.anchor = anchor;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> TimedBlock {
        TimedBlock {
            timestamp: UnixTimestamp(10_005),
            block_number: 750,
            block_timestamp: UnixTimestamp(10_000),
        }
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(matches!(
            ResolveHistoricalBlockRange::new(UnixTimestamp(10_000), 100, 0),
            Err(TaskError::Construction { .. })
        ));
    }

    #[test]
    fn test_request_is_anchored_at_resolved_time() {
        let range = ResolveHistoricalBlockRange::new(UnixTimestamp(10_005), 3_000, 1_000).unwrap();
        let request = range.request(anchor());
        assert!(request.verify_keywords().is_ok());
        match request.operation() {
            Operation::RunHistoricalSeries { query } => {
                assert_eq!(query.anchor.end_timestamp(), UnixTimestamp(10_000));
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }

    #[test]
    fn test_snapped_request_keywords_cover_clock() {
        let range = ResolveHistoricalBlockRange::new(UnixTimestamp(10_005), 3_000, 1_000)
            .unwrap()
            .snapped_to(600)
            .unwrap();
        let request = range.request(anchor());
        assert!(request.verify_keywords().is_ok());
        assert_eq!(request.keywords()[1], Keyword::from(600u64));
    }
}
