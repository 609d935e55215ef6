//! 传输进度 - 计数读取流与可跨线程读取的进度计数器

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// 进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub transferred: u64,
    /// 未跟踪总量时为 `None`
    pub total: Option<u64>,
}

/// 由调用方持有的进度计数器，克隆后共享同一组计数
///
/// 传输过程中只有一个写入方，其他线程可随时调用 [`Progress::snapshot`] 读取。
#[derive(Debug, Clone)]
pub struct Progress {
    transferred: Arc<AtomicU64>,
    total: Option<Arc<AtomicU64>>,
}

impl Progress {
    /// 同时跟踪已传输字节和总字节
    pub fn new() -> Self {
        Self {
            transferred: Arc::new(AtomicU64::new(0)),
            total: Some(Arc::new(AtomicU64::new(0))),
        }
    }

    /// 只跟踪已传输字节
    pub fn transferred_only() -> Self {
        Self {
            transferred: Arc::new(AtomicU64::new(0)),
            total: None,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    pub fn total(&self) -> Option<u64> {
        self.total.as_ref().map(|t| t.load(Ordering::Acquire))
    }

    pub fn tracks_total(&self) -> bool {
        self.total.is_some()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            transferred: self.transferred(),
            total: self.total(),
        }
    }

    /// 开始新的传输前清零，复用同一个 `Progress` 时计数不会累加
    pub(crate) fn reset(&self) {
        self.transferred.store(0, Ordering::Release);
        self.set_total(0);
    }

    pub(crate) fn set_total(&self, total: u64) {
        if let Some(t) = &self.total {
            t.store(total, Ordering::Release);
        }
    }

    /// 总量不得小于最终已传输量
    pub(crate) fn raise_total(&self, at_least: u64) {
        if let Some(t) = &self.total {
            t.fetch_max(at_least, Ordering::AcqRel);
        }
    }

    pub(crate) fn counter(&self) -> Arc<AtomicU64> {
        self.transferred.clone()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// 透传读取流，每次读取后累加实际读到的字节数
pub struct CountingReader<R> {
    inner: R,
    counter: Arc<AtomicU64>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, counter: Arc<AtomicU64>) -> Self {
        Self { inner, counter }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            let n = buf.filled().len() - before;
            self.counter.fetch_add(n as u64, Ordering::AcqRel);
        }
        polled
    }
}
