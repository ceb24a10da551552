// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{TaskContext, TaskDefinition};
use crate::errors::TaskError;
use crate::request::WorkRequest;
use crate::types::{BlockResolution, Operation, UnixTimestamp};
use alloy_primitives::BlockNumber;

/// A resolved block together with the time it was resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedBlock {
    /// The requested point in time
    pub timestamp: UnixTimestamp,
    /// Latest block at or before `timestamp`
    pub block_number: BlockNumber,
    pub block_timestamp: UnixTimestamp,
}

/// Resolves a point in time to the latest block at or before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveTimeToBlock {
    timestamp: UnixTimestamp,
}

impl ResolveTimeToBlock {
    pub fn new(timestamp: UnixTimestamp) -> Self {
        Self { timestamp }
    }

    /// Resolves the start of `date` (00:00:00 UTC).
    pub fn for_date(date: NaiveDate) -> Result<Self, TaskError> {
        UnixTimestamp::start_of_day(date)
            .map(Self::new)
            .ok_or_else(|| TaskError::construction(format!("date {date} has no UTC start of day")))
    }

    pub fn timestamp(&self) -> UnixTimestamp {
        self.timestamp
    }

    pub(crate) fn request(&self) -> WorkRequest<BlockResolution, TimedBlock> {
        let timestamp = self.timestamp;
        WorkRequest::new(
            vec![timestamp.into()],
            format!("block@{timestamp}"),
            Operation::TimeToBlock { timestamp },
            move |_, block: BlockResolution| {
                Ok(TimedBlock {
                    timestamp,
                    block_number: block.block_number,
                    block_timestamp: block.block_timestamp,
                })
            },
        )
    }
}

#[async_trait]
impl TaskDefinition for ResolveTimeToBlock {
    type Output = TimedBlock;

    const NAME: &'static str = "time-to-block";

    async fn define(&self, ctx: &TaskContext) -> Result<TimedBlock, TaskError> {
        ctx.cook(&self.request()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Keyword;

    #[test]
    fn test_for_date_is_start_of_day_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 10).unwrap();
        let task = ResolveTimeToBlock::for_date(date).unwrap();
        assert_eq!(task.timestamp(), UnixTimestamp(1728518400));
    }

    #[test]
    fn test_request_keywords() {
        let request = ResolveTimeToBlock::new(UnixTimestamp(1_700_000_000)).request();
        assert_eq!(
            request.keywords(),
            &[Keyword::from("time-to-block"), Keyword::from(1_700_000_000i64)]
        );
        assert!(request.verify_keywords().is_ok());
    }
}
