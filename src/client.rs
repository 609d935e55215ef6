//! 会话客户端 - 在远程会话与本地文件系统之间上传/下载文件和目录树

use crate::config::TransferConfig;
use crate::core::{
    mirror_tree, transfer_batch, transfer_file, Direction, Progress, TransferPair,
    TransferResult, TreeReport,
};
use crate::error::{Result, SyncError};
use crate::storage::{Filesystem, LocalFs, Session};
use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{info, warn};

/// 建立远程会话的方式（认证、拨号、握手都在这里完成）
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    async fn connect(&self) -> anyhow::Result<Self::Session>;
}

/// 持有一个远程会话的客户端
pub struct Client<S: Session> {
    session: S,
    local: LocalFs,
    config: TransferConfig,
}

impl<S: Session> Client<S> {
    /// 包装一个已建立的会话
    pub fn new(session: S) -> Self {
        Self::with_config(session, TransferConfig::default())
    }

    pub fn with_config(session: S, config: TransferConfig) -> Self {
        Self {
            session,
            local: LocalFs::new(),
            config,
        }
    }

    /// 通过 connector 建立会话
    pub async fn connect<C>(connector: &C, config: TransferConfig) -> Result<Self>
    where
        C: Connector<Session = S>,
    {
        let session = connector.connect().await.map_err(SyncError::Connection)?;
        info!("已连接: {}", session.name());
        Ok(Self::with_config(session, config))
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// 按方向返回 (源, 目标)
    fn endpoints(&self, direction: Direction) -> (&dyn Filesystem, &dyn Filesystem) {
        match direction {
            Direction::Download => (&self.session, &self.local),
            Direction::Upload => (&self.local, &self.session),
        }
    }

    async fn single(
        &self,
        direction: Direction,
        local_path: &str,
        remote_path: &str,
        progress: Option<&Progress>,
    ) -> Result<u64> {
        let (source, dest) = self.endpoints(direction);
        let (source_path, dest_path) = match direction {
            Direction::Download => (remote_path, local_path),
            Direction::Upload => (local_path, remote_path),
        };
        transfer_file(
            source,
            source_path,
            dest,
            dest_path,
            &self.config.transfer_options(direction),
            progress,
        )
        .await
    }

    /// 下载单个文件
    pub async fn get(&self, local_path: &str, remote_path: &str) -> Result<u64> {
        self.single(Direction::Download, local_path, remote_path, None)
            .await
    }

    /// 下载单个文件并更新进度
    pub async fn get_with_progress(
        &self,
        local_path: &str,
        remote_path: &str,
        progress: &Progress,
    ) -> Result<u64> {
        self.single(Direction::Download, local_path, remote_path, Some(progress))
            .await
    }

    /// 上传单个文件
    pub async fn put(&self, local_path: &str, remote_path: &str) -> Result<u64> {
        self.single(Direction::Upload, local_path, remote_path, None)
            .await
    }

    /// 上传单个文件并更新进度
    pub async fn put_with_progress(
        &self,
        local_path: &str,
        remote_path: &str,
        progress: &Progress,
    ) -> Result<u64> {
        self.single(Direction::Upload, local_path, remote_path, Some(progress))
            .await
    }

    /// 递归下载整个目录
    pub async fn get_recursive(&self, local_root: &str, remote_root: &str) -> Result<TreeReport> {
        mirror_tree(
            &self.session,
            remote_root,
            &self.local,
            local_root,
            &self.config.mirror_options(Direction::Download),
        )
        .await
    }

    /// 递归上传整个目录
    pub async fn put_recursive(&self, local_root: &str, remote_root: &str) -> Result<TreeReport> {
        mirror_tree(
            &self.local,
            local_root,
            &self.session,
            remote_root,
            &self.config.mirror_options(Direction::Upload),
        )
        .await
    }

    /// 批量下载，`source` 为远程路径，`destination` 为本地路径
    pub async fn get_multiple(&self, pairs: &[TransferPair]) -> Vec<TransferResult> {
        let (source, dest) = self.endpoints(Direction::Download);
        transfer_batch(
            source,
            dest,
            pairs,
            &self.config.transfer_options(Direction::Download),
        )
        .await
    }

    /// 批量上传，`source` 为本地路径，`destination` 为远程路径
    pub async fn put_multiple(&self, pairs: &[TransferPair]) -> Vec<TransferResult> {
        let (source, dest) = self.endpoints(Direction::Upload);
        transfer_batch(
            source,
            dest,
            pairs,
            &self.config.transfer_options(Direction::Upload),
        )
        .await
    }

    /// 关闭会话，返回每个关闭失败的资源对应的错误
    pub async fn close(self) -> Vec<anyhow::Error> {
        let errors = self.session.close().await;
        for e in &errors {
            warn!("关闭会话出错: {}", e);
        }
        info!("会话已关闭: {}", self.session.name());
        errors
    }

    /// [`Client::close`] 的别名
    pub async fn quit(self) -> Vec<anyhow::Error> {
        self.close().await
    }
}

/// 建立会话、执行 `f`，无论成功与否都关闭会话
///
/// `f` 出错时返回其错误（关闭错误只记录日志）；`f` 成功但关闭失败时返回
/// [`SyncError::Close`]。
pub async fn with_client<C, T, F>(connector: &C, config: TransferConfig, f: F) -> Result<T>
where
    C: Connector,
    F: for<'a> FnOnce(&'a Client<C::Session>) -> BoxFuture<'a, Result<T>>,
{
    let client = Client::connect(connector, config).await?;
    let outcome = f(&client).await;
    let close_errors = client.close().await;

    match outcome {
        Ok(_) if !close_errors.is_empty() => Err(SyncError::Close(close_errors)),
        outcome => outcome,
    }
}
