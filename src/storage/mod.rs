pub mod local;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

pub use local::LocalFs;
pub use memory::{Fault, MemoryFs};

/// 目录默认权限
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// 文件默认权限
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// 文件元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    pub is_dir: bool,
    /// 权限位（不含文件类型位）
    pub mode: u32,
}

/// 遍历得到的条目
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: String,
    pub meta: FileMeta,
}

/// 路径分隔符风格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    /// 远程端，始终使用 `/`
    Posix,
    /// 本机风格（Windows 上为 `\`）
    Native,
}

impl PathStyle {
    pub fn separator(self) -> char {
        match self {
            PathStyle::Posix => '/',
            PathStyle::Native => std::path::MAIN_SEPARATOR,
        }
    }

    pub fn is_separator(self, c: char) -> bool {
        match self {
            PathStyle::Posix => c == '/',
            PathStyle::Native => std::path::is_separator(c),
        }
    }
}

pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

pub type WalkStream = Pin<Box<dyn Stream<Item = Result<WalkEntry>> + Send>>;

/// 可写文件句柄，额外支持落盘
#[async_trait]
pub trait FileWriter: AsyncWrite + Send + Unpin {
    async fn sync_all(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl FileWriter for tokio::fs::File {
    async fn sync_all(&mut self) -> std::io::Result<()> {
        tokio::fs::File::sync_all(&*self).await
    }
}

/// 文件系统抽象接口
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// 以只读方式打开文件
    async fn open(&self, path: &str) -> Result<FileReader>;

    /// 创建文件，已存在则截断
    async fn create(&self, path: &str) -> Result<Box<dyn FileWriter>>;

    /// 获取文件元数据，不存在时返回 `None`
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 创建单层目录
    async fn mkdir(&self, path: &str, mode: u32) -> Result<()>;

    async fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    /// 深度优先遍历，先返回 `root` 本身，父目录总在子条目之前。
    /// 单个条目出错时以 `Err` 形式出现在流中。
    async fn walk(&self, root: &str) -> WalkStream;

    fn path_style(&self) -> PathStyle;

    /// 获取名称（用于日志）
    fn name(&self) -> &str;
}

/// 已建立连接的远程会话
#[async_trait]
pub trait Session: Filesystem {
    /// 关闭底层连接，每个关闭失败的资源对应一个错误
    async fn close(&self) -> Vec<anyhow::Error>;
}
