// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use alloy_primitives::BlockNumber;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BlockRangeTable, ResolveHistoricalBlockRange, TaskContext, TaskDefinition};
use crate::errors::TaskError;
use crate::request::{Recovery, WorkRequest};
use crate::types::{BlockValue, Computation, Keyword, Operation, UnixTimestamp};

/// Keyword that separates lenient batches from strict ones.
const ALLOW_MISSING_KEYWORD: &str = "allow-missing";

/// A computation's value at one sampled block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSeriesPoint {
    pub sample_timestamp: UnixTimestamp,
    pub block_number: BlockNumber,
    pub block_timestamp: UnixTimestamp,
    /// `Null` when the source had no data and missing values were allowed
    pub value: Value,
}

/// A computation sampled over a block range, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSeries {
    pub computation: Computation,
    pub points: Vec<BlockSeriesPoint>,
}

/// Runs a computation at every block of a historical block range
///
/// The blocks are cooked as one `run-at-blocks` batch, which the worker
/// expands into one cached `run-at-block` item per block, so blocks shared
/// with earlier batches are not recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunAtHistoricalBlocks {
    range: ResolveHistoricalBlockRange,
    computation: Computation,
    allow_missing: bool,
}

impl RunAtHistoricalBlocks {
    pub fn new(range: ResolveHistoricalBlockRange, computation: Computation) -> Self {
        Self {
            range,
            computation,
            allow_missing: false,
        }
    }

    /// Records `Null` for blocks where the source reports missing data
    /// instead of failing the whole batch.
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }

    pub fn computation(&self) -> &Computation {
        &self.computation
    }

    fn request(&self, blocks: Vec<BlockNumber>) -> WorkRequest<Vec<BlockValue>, Vec<BlockValue>> {
        let mut keywords = self.computation.keywords();
        if self.allow_missing {
            keywords.push(Keyword::from(ALLOW_MISSING_KEYWORD));
        }
        keywords.push(Keyword::from(blocks.clone()));

        let target = format!(
            "{}@{}..{}",
            self.computation.name,
            blocks.first().copied().unwrap_or_default(),
            blocks.last().copied().unwrap_or_default()
        );
        let request = WorkRequest::identity(
            keywords,
            target,
            Operation::RunAtBlocks {
                block_numbers: blocks,
                computation: self.computation.clone(),
            },
        );

        if self.allow_missing {
            request.with_item_error_handler(|_, error| {
                if error.is_domain_failure() {
                    Recovery::Continue(Value::Null)
                } else {
                    Recovery::Raise
                }
            })
        } else {
            request
        }
    }

    fn join(&self, table: &BlockRangeTable, values: Vec<BlockValue>) -> Result<BlockSeries, TaskError> {
        if values.len() != table.rows.len() {
            return Err(TaskError::derivation(
                Self::NAME,
                format!("expected {} values, got {}", table.rows.len(), values.len()),
            ));
        }
        let points = table
            .rows
            .iter()
            .zip(values)
            .map(|(row, value)| {
                if row.block_number != value.block_number {
                    return Err(TaskError::derivation(
                        Self::NAME,
                        format!(
                            "value for block {} paired with row for block {}",
                            value.block_number, row.block_number
                        ),
                    ));
                }
                Ok(BlockSeriesPoint {
                    sample_timestamp: row.sample_timestamp,
                    block_number: row.block_number,
                    block_timestamp: row.block_timestamp,
                    value: value.value,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BlockSeries {
            computation: self.computation.clone(),
            points,
        })
    }
}

#[async_trait]
impl TaskDefinition for RunAtHistoricalBlocks {
    type Output = BlockSeries;

    const NAME: &'static str = "run-at-blocks";

    async fn define(&self, ctx: &TaskContext) -> Result<BlockSeries, TaskError> {
        let table = ctx.run(self.range).await?;
        let values = ctx.cook(&self.request(table.block_numbers())).await?;
        self.join(&table, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{BlockRangeRow, TimedBlock};

    fn blocks_task(allow_missing: bool) -> RunAtHistoricalBlocks {
        let range = ResolveHistoricalBlockRange::new(UnixTimestamp(10_000), 2_000, 1_000).unwrap();
        RunAtHistoricalBlocks::new(range, Computation::new("pool.tvl").with_param("pool", "0xabc"))
            .allow_missing(allow_missing)
    }

    fn table(blocks: &[BlockNumber]) -> BlockRangeTable {
        BlockRangeTable {
            anchor: TimedBlock {
                timestamp: UnixTimestamp(10_000),
                block_number: 750,
                block_timestamp: UnixTimestamp(10_000),
            },
            window_secs: 2_000,
            interval_secs: 1_000,
            rows: blocks
                .iter()
                .enumerate()
                .map(|(i, &block_number)| BlockRangeRow {
                    sample_timestamp: UnixTimestamp(8_000 + 1_000 * i as i64),
                    block_number,
                    block_timestamp: UnixTimestamp(8_000 + 1_000 * i as i64),
                })
                .collect(),
        }
    }

    #[test]
    fn test_request_keywords_end_with_block_list() {
        let request = blocks_task(false).request(vec![100, 200, 300]);
        assert!(request.verify_keywords().is_ok());
        assert_eq!(
            request.keywords().last(),
            Some(&Keyword::from(vec![100u64, 200, 300]))
        );
    }

    #[test]
    fn test_allow_missing_changes_the_key() {
        let strict = blocks_task(false).request(vec![100]);
        let lenient = blocks_task(true).request(vec![100]);
        assert_ne!(strict.key_hash(), lenient.key_hash());
        assert_ne!(strict.item_keywords(100), lenient.item_keywords(100));
    }

    #[test]
    fn test_join_pairs_rows_with_values() {
        let task = blocks_task(false);
        let values = vec![
            BlockValue {
                block_number: 100,
                value: Value::from(1),
            },
            BlockValue {
                block_number: 200,
                value: Value::from(2),
            },
        ];
        let series = task.join(&table(&[100, 200]), values).unwrap();
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[1].sample_timestamp, UnixTimestamp(9_000));
        assert_eq!(series.points[1].value, Value::from(2));
    }

    #[test]
    fn test_join_rejects_misaligned_values() {
        let task = blocks_task(false);
        let values = vec![BlockValue {
            block_number: 100,
            value: Value::from(1),
        }];
        assert!(matches!(
            task.join(&table(&[100, 200]), values),
            Err(TaskError::Derivation { .. })
        ));
    }
}
