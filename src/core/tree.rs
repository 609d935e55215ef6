//! 目录树镜像 - 遍历源树并在目标端重建

use super::reroot::reroot;
use super::transfer::{transfer_file, TransferOptions};
use crate::error::{Result, SyncError};
use crate::storage::{Filesystem, WalkEntry};
use futures::StreamExt;
use tracing::{debug, info, warn};

/// 镜像选项
#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
    pub transfer: TransferOptions,
    /// 创建目录后再显式设置一次权限（部分目标端创建目录时不接受 mode）
    pub chmod_dirs: bool,
}

/// 镜像结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeReport {
    pub dirs_created: u64,
    pub dirs_existing: u64,
    pub files: u64,
    pub bytes: u64,
}

impl TreeReport {
    pub fn dirs(&self) -> u64 {
        self.dirs_created + self.dirs_existing
    }
}

/// 把 `source_root` 整棵树镜像到 `dest_root`
///
/// 任何一个条目失败都会立即中止整个操作，已写入的部分保留。
/// 对已存在的目录是幂等的，重复执行会重新传输所有文件。
pub async fn mirror_tree(
    source: &dyn Filesystem,
    source_root: &str,
    dest: &dyn Filesystem,
    dest_root: &str,
    options: &MirrorOptions,
) -> Result<TreeReport> {
    info!(
        "开始镜像: {}:{} -> {}:{}",
        source.name(),
        source_root,
        dest.name(),
        dest_root
    );

    let mut report = TreeReport::default();
    let mut walker = source.walk(source_root).await;

    while let Some(entry) = walker.next().await {
        let entry = entry.map_err(|e| SyncError::Walk {
            root: source_root.to_string(),
            source: e,
        })?;

        let dest_path = reroot(
            source_root,
            source.path_style(),
            dest_root,
            dest.path_style(),
            &entry.path,
        )?;

        let outcome = if entry.meta.is_dir {
            ensure_dir(dest, &dest_path, &entry, options, &mut report).await
        } else {
            transfer_file(
                source,
                &entry.path,
                dest,
                &dest_path,
                &options.transfer,
                None,
            )
            .await
            .map(|bytes| {
                report.files += 1;
                report.bytes += bytes;
            })
        };

        if let Err(e) = outcome {
            warn!("镜像中止于 {}: {}", entry.path, e);
            return Err(e);
        }
    }

    info!(
        "镜像完成: {} 个目录 (新建 {}), {} 个文件, {} 字节",
        report.dirs(),
        report.dirs_created,
        report.files,
        report.bytes
    );
    Ok(report)
}

/// 确保目标目录存在
async fn ensure_dir(
    dest: &dyn Filesystem,
    dest_path: &str,
    entry: &WalkEntry,
    options: &MirrorOptions,
    report: &mut TreeReport,
) -> Result<()> {
    let existing = dest.stat(dest_path).await.map_err(|e| SyncError::Stat {
        path: dest_path.to_string(),
        source: e,
    })?;

    match existing {
        Some(meta) if meta.is_dir => {
            debug!("目录已存在: {}", dest_path);
            report.dirs_existing += 1;
        }
        Some(_) => {
            return Err(SyncError::NameCollision {
                path: dest_path.to_string(),
            });
        }
        None => {
            let mkdir_error = |e| SyncError::Mkdir {
                path: dest_path.to_string(),
                source: e,
            };
            dest.mkdir(dest_path, entry.meta.mode)
                .await
                .map_err(mkdir_error)?;
            if options.chmod_dirs {
                dest.chmod(dest_path, entry.meta.mode)
                    .await
                    .map_err(mkdir_error)?;
            }
            debug!("创建目录: {} ({:o})", dest_path, entry.meta.mode);
            report.dirs_created += 1;
        }
    }
    Ok(())
}
