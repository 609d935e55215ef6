//! 单文件传输

use super::progress::{CountingReader, Progress};
use crate::error::{Result, SyncError};
use crate::storage::{FileReader, Filesystem};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

/// 默认复制缓冲区大小
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// 传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 远程 -> 本地
    Download,
    /// 本地 -> 远程
    Upload,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Download => write!(f, "download"),
            Direction::Upload => write!(f, "upload"),
        }
    }
}

/// 单文件传输选项
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// 复制缓冲区大小（字节）
    pub buffer_size: usize,
    /// 复制完成后是否强制目标落盘
    pub sync_destination: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            sync_destination: true,
        }
    }
}

/// 把 `source_path` 的内容复制到 `dest_path`，返回复制的字节数
///
/// 步骤依次为：创建目标、打开源、（可选）读取源大小写入 `total`、
/// 经计数流复制、（可选）落盘、关闭目标。任一步失败都立即返回对应阶段的错误，
/// 已创建的目标文件不会回滚。传入的 `progress` 在开始时清零。
pub async fn transfer_file(
    source: &dyn Filesystem,
    source_path: &str,
    dest: &dyn Filesystem,
    dest_path: &str,
    options: &TransferOptions,
    progress: Option<&Progress>,
) -> Result<u64> {
    debug!(
        "传输: {}:{} -> {}:{}",
        source.name(),
        source_path,
        dest.name(),
        dest_path
    );

    if let Some(progress) = progress {
        progress.reset();
    }

    let mut writer = dest
        .create(dest_path)
        .await
        .map_err(|e| SyncError::DestinationOpen {
            path: dest_path.to_string(),
            source: e,
        })?;

    let reader = source
        .open(source_path)
        .await
        .map_err(|e| SyncError::SourceOpen {
            path: source_path.to_string(),
            source: e,
        })?;

    if let Some(progress) = progress.filter(|p| p.tracks_total()) {
        let meta = source
            .stat(source_path)
            .await
            .map_err(|e| SyncError::Stat {
                path: source_path.to_string(),
                source: e,
            })?
            .ok_or_else(|| SyncError::Stat {
                path: source_path.to_string(),
                source: anyhow::anyhow!("无法确定源文件大小"),
            })?;
        progress.set_total(meta.size);
    }

    let reader: FileReader = match progress {
        Some(progress) => Box::new(CountingReader::new(reader, progress.counter())),
        None => reader,
    };
    let mut reader = BufReader::with_capacity(options.buffer_size.max(1), reader);

    let bytes = tokio::io::copy_buf(&mut reader, &mut writer)
        .await
        .map_err(|e| SyncError::Copy {
            from: source_path.to_string(),
            to: dest_path.to_string(),
            source: e,
        })?;

    if options.sync_destination {
        writer.sync_all().await.map_err(|e| SyncError::Sync {
            path: dest_path.to_string(),
            source: e,
        })?;
    }

    // 远程写入端的关闭错误只在 shutdown 时报告
    writer.shutdown().await.map_err(|e| SyncError::Sync {
        path: dest_path.to_string(),
        source: e,
    })?;

    if let Some(progress) = progress {
        progress.raise_total(bytes);
    }

    debug!("传输完成: {} ({} 字节)", dest_path, bytes);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::ProgressSnapshot;
    use crate::storage::{Fault, FileMeta, FileWriter, MemoryFs, PathStyle, WalkStream};
    use async_trait::async_trait;
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// 每次读取前记录一次进度快照
    struct SamplingReader {
        inner: FileReader,
        progress: Progress,
        samples: Arc<Mutex<Vec<ProgressSnapshot>>>,
    }

    impl AsyncRead for SamplingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let snapshot = self.progress.snapshot();
            self.samples.lock().unwrap().push(snapshot);
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    /// 包装 MemoryFs，打开的读取流会在复制过程中采样进度
    struct SamplingFs {
        inner: MemoryFs,
        progress: Progress,
        samples: Arc<Mutex<Vec<ProgressSnapshot>>>,
    }

    #[async_trait]
    impl Filesystem for SamplingFs {
        async fn open(&self, path: &str) -> anyhow::Result<FileReader> {
            let inner = self.inner.open(path).await?;
            Ok(Box::new(SamplingReader {
                inner,
                progress: self.progress.clone(),
                samples: self.samples.clone(),
            }))
        }

        async fn create(&self, path: &str) -> anyhow::Result<Box<dyn FileWriter>> {
            self.inner.create(path).await
        }

        async fn stat(&self, path: &str) -> anyhow::Result<Option<FileMeta>> {
            self.inner.stat(path).await
        }

        async fn mkdir(&self, path: &str, mode: u32) -> anyhow::Result<()> {
            self.inner.mkdir(path, mode).await
        }

        async fn chmod(&self, path: &str, mode: u32) -> anyhow::Result<()> {
            self.inner.chmod(path, mode).await
        }

        async fn walk(&self, root: &str) -> WalkStream {
            self.inner.walk(root).await
        }

        fn path_style(&self) -> PathStyle {
            PathStyle::Posix
        }

        fn name(&self) -> &str {
            "sampling"
        }
    }

    fn fixture() -> (MemoryFs, MemoryFs) {
        let remote = MemoryFs::new();
        remote.write_file("/data/a.txt", b"hello world").unwrap();
        let local = MemoryFs::new();
        local.create_dir_all("/dl").unwrap();
        (remote, local)
    }

    #[tokio::test]
    async fn test_transfer_copies_bytes() {
        let (remote, local) = fixture();
        let bytes = transfer_file(
            &remote,
            "/data/a.txt",
            &local,
            "/dl/a.txt",
            &TransferOptions::default(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(local.read_file("/dl/a.txt").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_small_buffer_still_copies_everything() {
        let (remote, local) = fixture();
        let options = TransferOptions {
            buffer_size: 3,
            sync_destination: false,
        };
        let bytes = transfer_file(&remote, "/data/a.txt", &local, "/dl/a.txt", &options, None)
            .await
            .unwrap();
        assert_eq!(bytes, 11);
        assert_eq!(local.read_file("/dl/a.txt").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_destination_open_error() {
        let (remote, local) = fixture();
        let err = transfer_file(
            &remote,
            "/data/a.txt",
            &local,
            "/missing/a.txt",
            &TransferOptions::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::DestinationOpen { .. }));
    }

    #[tokio::test]
    async fn test_source_open_error_leaves_destination() {
        let (remote, local) = fixture();
        let err = transfer_file(
            &remote,
            "/data/nope.txt",
            &local,
            "/dl/nope.txt",
            &TransferOptions::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::SourceOpen { .. }));
        // 目标已创建，不回滚
        assert_eq!(local.read_file("/dl/nope.txt").unwrap(), b"");
    }

    #[tokio::test]
    async fn test_copy_error() {
        let (remote, local) = fixture();
        remote.inject("/data/a.txt", Fault::ReadAfter(5));
        let err = transfer_file(
            &remote,
            "/data/a.txt",
            &local,
            "/dl/a.txt",
            &TransferOptions::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Copy { .. }));
    }

    #[tokio::test]
    async fn test_sync_error_fails_item() {
        let (remote, local) = fixture();
        local.inject("/dl/a.txt", Fault::Sync);
        let err = transfer_file(
            &remote,
            "/data/a.txt",
            &local,
            "/dl/a.txt",
            &TransferOptions::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Sync { .. }));

        // 不落盘时同样的目标可以成功
        let options = TransferOptions {
            sync_destination: false,
            ..Default::default()
        };
        let bytes = transfer_file(&remote, "/data/a.txt", &local, "/dl/a.txt", &options, None)
            .await
            .unwrap();
        assert_eq!(bytes, 11);
    }

    #[tokio::test]
    async fn test_progress_counts_match() {
        let (remote, local) = fixture();
        let payload = vec![1u8; 300_000];
        remote.write_file("/data/big.bin", &payload).unwrap();

        let progress = Progress::new();
        let bytes = transfer_file(
            &remote,
            "/data/big.bin",
            &local,
            "/dl/big.bin",
            &TransferOptions::default(),
            Some(&progress),
        )
        .await
        .unwrap();

        assert_eq!(bytes, 300_000);
        assert_eq!(progress.transferred(), 300_000);
        assert_eq!(progress.total(), Some(300_000));
    }

    #[tokio::test]
    async fn test_progress_stat_error() {
        let (remote, local) = fixture();
        remote.inject("/data/a.txt", Fault::Stat);

        let progress = Progress::new();
        let err = transfer_file(
            &remote,
            "/data/a.txt",
            &local,
            "/dl/a.txt",
            &TransferOptions::default(),
            Some(&progress),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Stat { .. }));

        // 不跟踪总量时不需要 stat
        let progress = Progress::transferred_only();
        let bytes = transfer_file(
            &remote,
            "/data/a.txt",
            &local,
            "/dl/a.txt",
            &TransferOptions::default(),
            Some(&progress),
        )
        .await
        .unwrap();
        assert_eq!(bytes, 11);
        assert_eq!(progress.transferred(), 11);
    }

    #[tokio::test]
    async fn test_progress_observed_during_copy() {
        let (remote, local) = fixture();
        let size = 64 * 1024;
        remote.write_file("/data/big.bin", &vec![3u8; size]).unwrap();

        let progress = Progress::new();
        let samples = Arc::new(Mutex::new(Vec::new()));
        let source = SamplingFs {
            inner: remote,
            progress: progress.clone(),
            samples: samples.clone(),
        };
        let options = TransferOptions {
            buffer_size: 4096,
            sync_destination: false,
        };

        let bytes = transfer_file(
            &source,
            "/data/big.bin",
            &local,
            "/dl/big.bin",
            &options,
            Some(&progress),
        )
        .await
        .unwrap();
        assert_eq!(bytes, size as u64);

        let samples = samples.lock().unwrap();
        assert!(samples.len() > size / 4096);
        let mut last = 0;
        for sample in samples.iter() {
            // 复制开始前总量已确定，计数单调且不超过总量
            assert_eq!(sample.total, Some(size as u64));
            assert!(sample.transferred <= size as u64);
            assert!(sample.transferred >= last);
            last = sample.transferred;
        }
        assert_eq!(progress.transferred(), size as u64);
    }

    #[tokio::test]
    async fn test_reused_progress_starts_from_zero() {
        let (remote, local) = fixture();
        remote.write_file("/data/first.bin", &vec![1u8; 100]).unwrap();

        let progress = Progress::new();
        transfer_file(
            &remote,
            "/data/first.bin",
            &local,
            "/dl/first.bin",
            &TransferOptions::default(),
            Some(&progress),
        )
        .await
        .unwrap();

        let bytes = transfer_file(
            &remote,
            "/data/a.txt",
            &local,
            "/dl/a.txt",
            &TransferOptions::default(),
            Some(&progress),
        )
        .await
        .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(progress.snapshot(), ProgressSnapshot {
            transferred: 11,
            total: Some(11),
        });
    }

    #[tokio::test]
    async fn test_shutdown_error_fails_item() {
        let (remote, local) = fixture();
        local.inject("/dl/a.txt", Fault::Shutdown);
        let options = TransferOptions {
            sync_destination: false,
            ..Default::default()
        };

        let err = transfer_file(&remote, "/data/a.txt", &local, "/dl/a.txt", &options, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Sync { .. }));
        assert!(err.is_retryable());
    }
}
