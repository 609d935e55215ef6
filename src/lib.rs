//! 目录树同步引擎 - 通过远程文件传输会话上传/下载单个文件、批量文件和整个目录树

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use client::{with_client, Client, Connector};
pub use config::TransferConfig;
pub use core::{
    BatchSummary, Direction, MirrorOptions, Progress, ProgressSnapshot, TransferOptions,
    TransferPair, TransferResult, TreeReport,
};
pub use error::{Phase, Result, SyncError};
pub use storage::{FileMeta, Filesystem, LocalFs, MemoryFs, PathStyle, Session};
