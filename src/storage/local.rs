use super::{FileMeta, FileReader, FileWriter, Filesystem, PathStyle, WalkEntry, WalkStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::Metadata;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use walkdir::WalkDir;

/// 遍历线程最多领先调用方的条目数
const WALK_CHANNEL_SIZE: usize = 64;

/// 本地文件系统
pub struct LocalFs {
    name: String,
}

impl LocalFs {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }

    fn to_walk_entry(entry: &walkdir::DirEntry) -> Result<WalkEntry> {
        let metadata = entry.metadata()?;
        let path = entry
            .path()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("路径不是有效的 UTF-8: {:?}", entry.path()))?
            .to_string();
        Ok(WalkEntry {
            path,
            meta: Self::to_meta(&metadata),
        })
    }

    fn to_meta(metadata: &Metadata) -> FileMeta {
        FileMeta {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
            mode: permission_bits(metadata),
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    let base = if metadata.is_dir() {
        super::DEFAULT_DIR_MODE
    } else {
        super::DEFAULT_FILE_MODE
    };
    if metadata.permissions().readonly() {
        base & !0o222
    } else {
        base
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn open(&self, path: &str) -> Result<FileReader> {
        let file = fs::File::open(path)
            .await
            .with_context(|| format!("打开 {} 失败", path))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &str) -> Result<Box<dyn FileWriter>> {
        let file = fs::File::create(path)
            .await
            .with_context(|| format!("创建 {} 失败", path))?;
        Ok(Box::new(file))
    }

    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(Some(Self::to_meta(&metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder
            .create(path)
            .await
            .with_context(|| format!("创建目录 {} 失败", path))?;
        Ok(())
    }

    #[cfg(unix)]
    async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("修改 {} 权限失败", path))?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let mut permissions = fs::metadata(path).await?.permissions();
        permissions.set_readonly(mode & 0o222 == 0);
        fs::set_permissions(path, permissions)
            .await
            .with_context(|| format!("修改 {} 权限失败", path))?;
        Ok(())
    }

    async fn walk(&self, root: &str) -> WalkStream {
        let root = root.to_string();
        let (tx, rx) = mpsc::channel(WALK_CHANNEL_SIZE);

        // 遍历在阻塞线程中进行，通过有界通道逐条交给调用方
        tokio::task::spawn_blocking(move || {
            let walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();
            for entry in walker {
                let item = entry
                    .map_err(anyhow::Error::from)
                    .and_then(|entry| Self::to_walk_entry(&entry));
                // 接收端已丢弃，调用方不再需要后续条目
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    fn path_style(&self) -> PathStyle {
        PathStyle::Native
    }

    fn name(&self) -> &str {
        &self.name
    }
}
