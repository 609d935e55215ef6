//! 传输配置模块

use crate::core::{Direction, MirrorOptions, TransferOptions};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 传输配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// 复制缓冲区大小（KB）
    #[serde(default = "default_buffer_size_kb")]
    pub buffer_size_kb: usize,
    /// 下载完成后是否强制落盘
    #[serde(default = "default_true")]
    pub sync_downloads: bool,
    /// 上传目录时是否在创建后再 chmod
    #[serde(default = "default_true")]
    pub chmod_uploaded_dirs: bool,
}

/// 缓冲区上限（KB）
pub const MAX_BUFFER_SIZE_KB: usize = 16 * 1024;

fn default_buffer_size_kb() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_size_kb: default_buffer_size_kb(),
            sync_downloads: default_true(),
            chmod_uploaded_dirs: default_true(),
        }
    }
}

impl TransferConfig {
    /// 从配置文件加载传输配置
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("transfer").cloned())
            .and_then(|transfer| serde_json::from_value::<TransferConfig>(transfer).ok())
            .map(|mut config| {
                config.buffer_size_kb = config.buffer_size_kb.clamp(1, MAX_BUFFER_SIZE_KB);
                config
            })
            .unwrap_or_default()
    }

    /// 保存传输配置，保留文件中的其他配置项
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        fs::create_dir_all(config_dir)?;
        let config_file = config_dir.join("config.json");

        // 读取现有配置
        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };
        if !config.is_object() {
            config = serde_json::json!({});
        }

        config["transfer"] = serde_json::to_value(self)?;
        fs::write(&config_file, serde_json::to_string_pretty(&config)?)?;

        Ok(())
    }

    /// 某个方向上的单文件传输选项
    pub fn transfer_options(&self, direction: Direction) -> TransferOptions {
        TransferOptions {
            buffer_size: self
                .buffer_size_kb
                .clamp(1, MAX_BUFFER_SIZE_KB)
                .saturating_mul(1024),
            sync_destination: direction == Direction::Download && self.sync_downloads,
        }
    }

    /// 某个方向上的目录镜像选项
    pub fn mirror_options(&self, direction: Direction) -> MirrorOptions {
        MirrorOptions {
            transfer: self.transfer_options(direction),
            chmod_dirs: direction == Direction::Upload && self.chmod_uploaded_dirs,
        }
    }
}

/// 默认配置目录
pub fn default_config_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
    } else {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    };

    base.map(|p| p.join("treesync"))
        .unwrap_or_else(|| PathBuf::from(".treesync"))
}
