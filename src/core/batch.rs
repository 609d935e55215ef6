//! 批量传输 - 逐项执行，单项失败不影响其余项

use super::transfer::{transfer_file, TransferOptions};
use crate::error::SyncError;
use crate::storage::Filesystem;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// 一次传输的两端路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPair {
    pub source: String,
    pub destination: String,
}

impl TransferPair {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// 单项传输结果
#[derive(Debug)]
pub struct TransferResult {
    /// 失败时为 0
    pub bytes_transferred: u64,
    pub error: Option<SyncError>,
}

impl TransferResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Result<u64, SyncError>> for TransferResult {
    fn from(result: Result<u64, SyncError>) -> Self {
        match result {
            Ok(bytes) => TransferResult {
                bytes_transferred: bytes,
                error: None,
            },
            Err(e) => TransferResult {
                bytes_transferred: 0,
                error: Some(e),
            },
        }
    }
}

/// 批量结果汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl BatchSummary {
    pub fn of(results: &[TransferResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, r| {
            if r.is_ok() {
                summary.succeeded += 1;
                summary.bytes += r.bytes_transferred;
            } else {
                summary.failed += 1;
            }
            summary
        })
    }
}

/// 依次传输每一对路径，结果顺序与输入一致
pub async fn transfer_batch(
    source: &dyn Filesystem,
    dest: &dyn Filesystem,
    pairs: &[TransferPair],
    options: &TransferOptions,
) -> Vec<TransferResult> {
    let mut results = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let result: TransferResult =
            transfer_file(source, &pair.source, dest, &pair.destination, options, None)
                .await
                .into();
        if let Some(e) = &result.error {
            error!("传输失败 {} -> {}: {}", pair.source, pair.destination, e);
        }
        results.push(result);
    }

    let summary = BatchSummary::of(&results);
    info!(
        "批量传输完成: 成功 {}, 失败 {}, {} 字节",
        summary.succeeded, summary.failed, summary.bytes
    );
    results
}
