// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use alloy_primitives::BlockNumber;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BlockSeries, BlockSeriesPoint, RunAtHistoricalBlocks, TaskContext, TaskDefinition};
use crate::errors::TaskError;
use crate::types::UnixTimestamp;

/// What [`DeriveReturnSeries`] reduces a block series to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReturnVariant {
    /// The most recent non-missing value
    Latest,
    /// `value[i] / value[i - lag]` for every sample with a sample `lag` steps back
    Rolling { lag: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub sample_timestamp: UnixTimestamp,
    pub block_number: BlockNumber,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub variant: ReturnVariant,
    pub points: Vec<ReturnPoint>,
}

/// Derives a latest value or a rolling ratio series from per-block values
///
/// Values are read from each block's output as numbers, either directly or
/// at a JSON pointer (`/price/usd`). Missing (`null`) values are skipped;
/// anything else that is not a number fails the task.
#[derive(Debug, Clone, PartialEq)]
pub struct DeriveReturnSeries {
    blocks: RunAtHistoricalBlocks,
    variant: ReturnVariant,
    value_pointer: Option<String>,
}

impl DeriveReturnSeries {
    /// Fails if a rolling lag is zero.
    pub fn new(blocks: RunAtHistoricalBlocks, variant: ReturnVariant) -> Result<Self, TaskError> {
        if variant == (ReturnVariant::Rolling { lag: 0 }) {
            return Err(TaskError::construction("rolling lag must be positive"));
        }
        Ok(Self {
            blocks,
            variant,
            value_pointer: None,
        })
    }

    /// Reads each value at this JSON pointer instead of the whole output.
    pub fn at_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.value_pointer = Some(pointer.into());
        self
    }

    fn number(&self, point: &BlockSeriesPoint) -> Result<Option<f64>, TaskError> {
        let value = match &self.value_pointer {
            Some(pointer) => point.value.pointer(pointer).unwrap_or(&Value::Null),
            None => &point.value,
        };
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            // Large integers are commonly carried as decimal strings
            Value::String(s) => s.parse::<f64>().map(Some).map_err(|_| {
                TaskError::derivation(
                    Self::NAME,
                    format!("value {s:?} at block {} is not numeric", point.block_number),
                )
            }),
            other => Err(TaskError::derivation(
                Self::NAME,
                format!("value {other} at block {} is not numeric", point.block_number),
            )),
        }
    }

    fn derive(&self, series: &BlockSeries) -> Result<ReturnSeries, TaskError> {
        let values = series
            .points
            .iter()
            .map(|point| Ok((point, self.number(point)?)))
            .collect::<Result<Vec<_>, TaskError>>()?;

        let points = match self.variant {
            ReturnVariant::Latest => values
                .iter()
                .rev()
                .find_map(|(point, value)| {
                    value.map(|value| ReturnPoint {
                        sample_timestamp: point.sample_timestamp,
                        block_number: point.block_number,
                        value,
                    })
                })
                .into_iter()
                .collect(),
            ReturnVariant::Rolling { lag } => {
                let mut points = Vec::with_capacity(values.len().saturating_sub(lag));
                for i in lag..values.len() {
                    let (point, current) = values[i];
                    let (base_point, base) = values[i - lag];
                    let (Some(current), Some(base)) = (current, base) else {
                        continue;
                    };
                    if base == 0.0 {
                        return Err(TaskError::derivation(
                            Self::NAME,
                            format!("zero base value at block {}", base_point.block_number),
                        ));
                    }
                    points.push(ReturnPoint {
                        sample_timestamp: point.sample_timestamp,
                        block_number: point.block_number,
                        value: current / base,
                    });
                }
                points
            }
        };

        Ok(ReturnSeries {
            variant: self.variant,
            points,
        })
    }
}

#[async_trait]
impl TaskDefinition for DeriveReturnSeries {
    type Output = ReturnSeries;

    const NAME: &'static str = "return-series";

    async fn define(&self, ctx: &TaskContext) -> Result<ReturnSeries, TaskError> {
        let series = ctx.run(self.blocks.clone()).await?;
        self.derive(&series)
    }
}
