//! 同步错误类型

use thiserror::Error;

/// 错误产生的阶段，调用方据此区分可重试的 IO 故障与结构性冲突
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Open,
    Copy,
    Sync,
    Stat,
    Mkdir,
    Structure,
    Close,
}

/// 同步过程中的所有错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("连接失败: {0}")]
    Connection(#[source] anyhow::Error),

    #[error("无法打开源文件 {path}: {source}")]
    SourceOpen {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("无法创建目标文件 {path}: {source}")]
    DestinationOpen {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("复制 {from} -> {to} 失败: {source}")]
    Copy {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("同步到磁盘失败 {path}: {source}")]
    Sync {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("无法获取文件信息 {path}: {source}")]
    Stat {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("遍历 {root} 失败: {source}")]
    Walk {
        root: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("无法创建目录 {path}: {source}")]
    Mkdir {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("无法创建目录 {path}: 同名的非目录已存在")]
    NameCollision { path: String },

    #[error("无法计算 {path} 相对于 {root} 的路径")]
    PathRelation { root: String, path: String },

    #[error("关闭会话时发生 {} 个错误", .0.len())]
    Close(Vec<anyhow::Error>),
}

impl SyncError {
    pub fn phase(&self) -> Phase {
        match self {
            SyncError::Connection(_) => Phase::Connect,
            SyncError::SourceOpen { .. } | SyncError::DestinationOpen { .. } => Phase::Open,
            SyncError::Copy { .. } => Phase::Copy,
            SyncError::Sync { .. } => Phase::Sync,
            SyncError::Stat { .. } | SyncError::Walk { .. } => Phase::Stat,
            SyncError::Mkdir { .. } => Phase::Mkdir,
            SyncError::NameCollision { .. } | SyncError::PathRelation { .. } => Phase::Structure,
            SyncError::Close(_) => Phase::Close,
        }
    }

    /// 结构性错误重试也不会成功
    pub fn is_retryable(&self) -> bool {
        self.phase() != Phase::Structure
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
