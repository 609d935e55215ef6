//! 内存文件系统 - 用作测试中的远程端

use super::{
    FileMeta, FileReader, FileWriter, Filesystem, PathStyle, Session, WalkEntry, WalkStream,
    DEFAULT_DIR_MODE, DEFAULT_FILE_MODE,
};
use crate::core::reroot::clean;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// 针对单个路径注入的故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 打开读取失败
    Open,
    /// 创建失败
    Create,
    /// 读取到指定字节数后失败
    ReadAfter(usize),
    /// 落盘失败
    Sync,
    /// 关闭写入端失败
    Shutdown,
    /// stat 失败（非 NotFound）
    Stat,
    Mkdir,
    /// 遍历到该条目时报错
    Walk,
}

#[derive(Debug, Clone)]
enum Node {
    Dir { mode: u32 },
    File { mode: u32, data: Arc<Mutex<Vec<u8>>> },
}

impl Node {
    fn meta(&self) -> FileMeta {
        match self {
            Node::Dir { mode } => FileMeta {
                size: 0,
                is_dir: true,
                mode: *mode,
            },
            Node::File { mode, data } => FileMeta {
                size: data.lock().map(|d| d.len() as u64).unwrap_or(0),
                is_dir: false,
                mode: *mode,
            },
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    nodes: BTreeMap<String, Node>,
    faults: HashMap<String, Fault>,
    close_errors: Vec<String>,
    closed: bool,
}

/// 内存中的 POSIX 风格文件系统
#[derive(Debug, Clone)]
pub struct MemoryFs {
    inner: Arc<Mutex<MemoryInner>>,
    name: String,
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir {
            mode: DEFAULT_DIR_MODE,
        });
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                nodes,
                ..Default::default()
            })),
            name: "memory".to_string(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("内存文件系统锁已损坏"))
    }

    /// 获取锁并检查会话是否仍然可用
    fn open_inner(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        let inner = self.lock()?;
        if inner.closed {
            bail!(io::Error::new(io::ErrorKind::NotConnected, "会话已关闭"));
        }
        Ok(inner)
    }

    fn parent_of(path: &str) -> Option<String> {
        if path == "/" {
            return None;
        }
        match path.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(i) => Some(path[..i].to_string()),
            None => None,
        }
    }

    fn check_parent(inner: &MemoryInner, path: &str) -> Result<()> {
        let parent = Self::parent_of(path).ok_or_else(|| anyhow!("{} 没有父目录", path))?;
        match inner.nodes.get(&parent) {
            Some(Node::Dir { .. }) => Ok(()),
            Some(Node::File { .. }) => bail!("{} 不是目录", parent),
            None => bail!(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} 不存在", parent)
            )),
        }
    }

    /// 注入故障
    pub fn inject(&self, path: &str, fault: Fault) {
        if let Ok(mut inner) = self.lock() {
            inner.faults.insert(clean(path, PathStyle::Posix), fault);
        }
    }

    /// 设置关闭时返回的错误
    pub fn fail_close(&self, messages: &[&str]) {
        if let Ok(mut inner) = self.lock() {
            inner.close_errors = messages.iter().map(|m| m.to_string()).collect();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|inner| inner.closed).unwrap_or(true)
    }

    /// 递归创建目录
    pub fn create_dir_all(&self, path: &str) -> Result<()> {
        let path = clean(path, PathStyle::Posix);
        let mut inner = self.lock()?;
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            match inner.nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => bail!("{} 不是目录", current),
                None => {
                    inner.nodes.insert(current.clone(), Node::Dir {
                        mode: DEFAULT_DIR_MODE,
                    });
                }
            }
        }
        Ok(())
    }

    /// 写入整个文件，自动创建父目录
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = clean(path, PathStyle::Posix);
        if let Some(parent) = Self::parent_of(&path) {
            self.create_dir_all(&parent)?;
        }
        let mut inner = self.lock()?;
        if let Some(Node::Dir { .. }) = inner.nodes.get(&path) {
            bail!("{} 是目录", path);
        }
        inner.nodes.insert(path, Node::File {
            mode: DEFAULT_FILE_MODE,
            data: Arc::new(Mutex::new(data.to_vec())),
        });
        Ok(())
    }

    /// 读取整个文件
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        let inner = self.lock().ok()?;
        match inner.nodes.get(&clean(path, PathStyle::Posix))? {
            Node::File { data, .. } => data.lock().ok().map(|d| d.clone()),
            Node::Dir { .. } => None,
        }
    }

    /// 查看节点元数据（不受故障注入和关闭状态影响）
    pub fn meta(&self, path: &str) -> Option<FileMeta> {
        let inner = self.lock().ok()?;
        inner
            .nodes
            .get(&clean(path, PathStyle::Posix))
            .map(Node::meta)
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

/// 读取打开时刻的文件快照
struct MemoryReader {
    data: Vec<u8>,
    pos: usize,
    fail_after: Option<usize>,
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut end = self.data.len();
        if let Some(limit) = self.fail_after {
            if self.pos >= limit {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "注入的读取故障",
                )));
            }
            end = end.min(limit);
        }
        let n = (end - self.pos).min(buf.remaining());
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

struct MemoryWriter {
    data: Arc<Mutex<Vec<u8>>>,
    fail_sync: bool,
    fail_shutdown: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.data.lock() {
            Ok(mut data) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            Err(_) => Poll::Ready(Err(io::Error::other("文件缓冲区锁已损坏"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.fail_shutdown {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "注入的关闭故障",
            )));
        }
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl FileWriter for MemoryWriter {
    async fn sync_all(&mut self) -> io::Result<()> {
        if self.fail_sync {
            return Err(io::Error::other("注入的落盘故障"));
        }
        Ok(())
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn open(&self, path: &str) -> Result<FileReader> {
        let path = clean(path, PathStyle::Posix);
        let inner = self.open_inner()?;
        let fault = inner.faults.get(&path).copied();
        if fault == Some(Fault::Open) {
            bail!("注入的打开故障: {}", path);
        }
        match inner.nodes.get(&path) {
            Some(Node::File { data, .. }) => {
                let data = data
                    .lock()
                    .map_err(|_| anyhow!("文件缓冲区锁已损坏"))?
                    .clone();
                let fail_after = match fault {
                    Some(Fault::ReadAfter(n)) => Some(n),
                    _ => None,
                };
                Ok(Box::new(MemoryReader {
                    data,
                    pos: 0,
                    fail_after,
                }))
            }
            Some(Node::Dir { .. }) => bail!("{} 是目录", path),
            None => bail!(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} 不存在", path)
            )),
        }
    }

    async fn create(&self, path: &str) -> Result<Box<dyn FileWriter>> {
        let path = clean(path, PathStyle::Posix);
        let mut inner = self.open_inner()?;
        let fault = inner.faults.get(&path).copied();
        if fault == Some(Fault::Create) {
            bail!("注入的创建故障: {}", path);
        }
        Self::check_parent(&inner, &path)?;

        let data = match inner.nodes.get(&path) {
            Some(Node::Dir { .. }) => bail!("{} 是目录", path),
            Some(Node::File { data, .. }) => {
                let data = data.clone();
                data.lock()
                    .map_err(|_| anyhow!("文件缓冲区锁已损坏"))?
                    .clear();
                data
            }
            None => {
                let data = Arc::new(Mutex::new(Vec::new()));
                inner.nodes.insert(path.clone(), Node::File {
                    mode: DEFAULT_FILE_MODE,
                    data: data.clone(),
                });
                data
            }
        };

        Ok(Box::new(MemoryWriter {
            data,
            fail_sync: fault == Some(Fault::Sync),
            fail_shutdown: fault == Some(Fault::Shutdown),
        }))
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let path = clean(path, PathStyle::Posix);
        let inner = self.open_inner()?;
        if inner.faults.get(&path) == Some(&Fault::Stat) {
            bail!(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("注入的 stat 故障: {}", path)
            ));
        }
        Ok(inner.nodes.get(&path).map(Node::meta))
    }

    async fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        let path = clean(path, PathStyle::Posix);
        let mut inner = self.open_inner()?;
        if inner.faults.get(&path) == Some(&Fault::Mkdir) {
            bail!("注入的 mkdir 故障: {}", path);
        }
        if inner.nodes.contains_key(&path) {
            bail!(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} 已存在", path)
            ));
        }
        Self::check_parent(&inner, &path)?;
        inner.nodes.insert(path, Node::Dir { mode });
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let path = clean(path, PathStyle::Posix);
        let mut inner = self.open_inner()?;
        match inner.nodes.get_mut(&path) {
            Some(Node::Dir { mode: m }) | Some(Node::File { mode: m, .. }) => {
                *m = mode;
                Ok(())
            }
            None => bail!(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} 不存在", path)
            )),
        }
    }

    async fn walk(&self, root: &str) -> WalkStream {
        let root = clean(root, PathStyle::Posix);
        let entries = match self.open_inner() {
            Ok(inner) => walk_nodes(&inner, &root),
            Err(e) => vec![Err(e)],
        };
        Box::pin(futures::stream::iter(entries))
    }

    fn path_style(&self) -> PathStyle {
        PathStyle::Posix
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 按路径分量排序得到先序深度优先遍历
fn walk_nodes(inner: &MemoryInner, root: &str) -> Vec<Result<WalkEntry>> {
    if !inner.nodes.contains_key(root) {
        return vec![Err(anyhow!(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} 不存在", root)
        )))];
    }

    let prefix = if root == "/" {
        "/".to_string()
    } else {
        format!("{}/", root)
    };
    let mut paths: Vec<&String> = inner
        .nodes
        .keys()
        .filter(|p| p.as_str() == root || p.starts_with(&prefix))
        .collect();
    paths.sort_by(|a, b| a.split('/').cmp(b.split('/')));

    paths
        .into_iter()
        .map(|path| {
            if inner.faults.get(path) == Some(&Fault::Walk) {
                return Err(anyhow!("注入的遍历故障: {}", path));
            }
            Ok(WalkEntry {
                path: path.clone(),
                meta: inner.nodes[path].meta(),
            })
        })
        .collect()
}

#[async_trait]
impl Session for MemoryFs {
    async fn close(&self) -> Vec<anyhow::Error> {
        match self.lock() {
            Ok(mut inner) => {
                inner.closed = true;
                inner
                    .close_errors
                    .drain(..)
                    .map(|m| anyhow!(m))
                    .collect()
            }
            Err(e) => vec![e],
        }
    }
}
