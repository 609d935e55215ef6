//! 日志模块 - 提供文件日志和大小管理功能

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// 日志文件名
const LOG_FILE: &str = "treesync.log";

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("log").cloned())
            .and_then(|log| serde_json::from_value::<LogConfig>(log).ok())
            .unwrap_or_default()
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

fn lock_writer(writer: &SharedWriter) -> io::Result<MutexGuard<'_, Option<BufWriter<File>>>> {
    writer
        .lock()
        .map_err(|_| io::Error::other("日志写入器锁已损坏"))
}

/// 带大小限制的日志写入器
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: SharedWriter,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE);
        let max_size = (max_size_mb as u64) * 1024 * 1024;

        let writer = Self::open_file(&file_path, max_size)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
        // 检查现有文件大小，如果超过限制则轮转
        if Self::exceeds(file_path, max_size) {
            Self::rotate_log(file_path)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(BufWriter::new(file))
    }

    fn exceeds(file_path: &Path, max_size: u64) -> bool {
        fs::metadata(file_path)
            .map(|metadata| metadata.len() > max_size)
            .unwrap_or(false)
    }

    /// 轮转日志文件，只保留一个 .old 备份
    fn rotate_log(file_path: &Path) -> io::Result<()> {
        let backup_path = file_path.with_extension("log.old");

        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }

        fs::rename(file_path, &backup_path)?;

        Ok(())
    }

    /// 超出大小时关闭当前文件、轮转并重新打开
    fn rotate_if_needed(writer: &SharedWriter, file_path: &Path, max_size: u64) -> io::Result<()> {
        if !Self::exceeds(file_path, max_size) {
            return Ok(());
        }

        let mut guard = lock_writer(writer)?;
        if let Some(mut w) = guard.take() {
            let _ = w.flush();
        }
        Self::rotate_log(file_path)?;
        *guard = Some(Self::open_file(file_path, max_size)?);
        Ok(())
    }
}

/// 日志写入器包装
pub struct LogWriter {
    inner: SharedWriter,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = {
            let mut guard = lock_writer(&self.inner)?;
            let writer = guard
                .as_mut()
                .ok_or_else(|| io::Error::other("Writer not available"))?;
            let written = writer.write(buf)?;
            writer.flush()?;
            written
        };

        // 写入失败不影响本次结果，轮转留到下次
        let _ = SizeRotatingWriter::rotate_if_needed(&self.inner, &self.file_path, self.max_size);

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock_writer(&self.inner)?.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let _ = Self::rotate_if_needed(&self.writer, &self.file_path, self.max_size);

        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

/// 初始化日志系统
///
/// 配置从 `config_dir/config.json` 的 `log` 段读取，日志写入 `log_dir`。
/// 已有全局 subscriber 时静默跳过。
pub fn init_logging(config_dir: &Path, log_dir: &Path) {
    let config = LogConfig::load(config_dir);

    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    // 创建日志级别过滤器
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(config.tracing_level().into());

    match SizeRotatingWriter::new(log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            // 文件日志层 - 始终输出到文件
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            // 在 debug 模式下也输出到控制台
            let console_layer = cfg!(debug_assertions).then(|| {
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
            });

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer);

            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        Err(_) => {
            // 文件日志创建失败，回退到控制台
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .try_init();
        }
    }
}
