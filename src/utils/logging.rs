//! 顾问运行日志
//!
//! 规划与求解过程的日志写入文件并按大小轮转，警告同时输出到 stderr。
//! 异步写入，退出前需调用 [`shutdown`]。

use crate::config::LogConfig;
use crate::core::error::{AdvisorError, AdvisorResult};
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use std::sync::Mutex;

static ADVISOR_LOGGER: Mutex<Option<LoggerHandle>> = Mutex::new(None);

fn log_file(config: &LogConfig) -> FileSpec {
    FileSpec::default()
        .directory(&config.dir)
        .basename(&config.file)
        .suppress_timestamp()
}

fn rotation(config: &LogConfig) -> (Criterion, Naming, Cleanup) {
    (
        Criterion::Size(config.max_file_size),
        Naming::Numbers,
        Cleanup::KeepLogFiles(config.max_files),
    )
}

/// 按配置启动日志，重复启动返回配置错误
///
/// # Examples
/// ```no_run
/// use schema_advisor::config::AdvisorConfig;
/// use schema_advisor::utils::logging;
///
/// let config = AdvisorConfig::default();
/// logging::init(&config.log).expect("日志初始化失败");
/// logging::shutdown();
/// ```
pub fn init(config: &LogConfig) -> AdvisorResult<()> {
    let mut slot = ADVISOR_LOGGER
        .lock()
        .map_err(|_| AdvisorError::Config("日志句柄锁已中毒".to_string()))?;
    if slot.is_some() {
        return Err(AdvisorError::Config("日志系统已初始化".to_string()));
    }

    let (criterion, naming, cleanup) = rotation(config);
    let logger = Logger::try_with_str(&config.level)
        .map_err(|e| AdvisorError::Config(format!("日志级别 {} 无效: {}", config.level, e)))?;
    let handle = logger
        .log_to_file(log_file(config))
        .duplicate_to_stderr(Duplicate::Warn)
        .rotate(criterion, naming, cleanup)
        .write_mode(WriteMode::Async)
        .append()
        .start()
        .map_err(|e| AdvisorError::Config(format!("日志启动失败: {}", e)))?;
    *slot = Some(handle);
    drop(slot);

    log::info!("顾问日志写入 {}/{} (级别 {})", config.dir, config.file, config.level);
    Ok(())
}

/// 写完缓冲的日志并停止异步线程
pub fn shutdown() {
    let handle = match ADVISOR_LOGGER.lock() {
        Ok(mut slot) => slot.take(),
        Err(_) => None,
    };
    if let Some(handle) = handle {
        handle.flush();
        handle.shutdown();
    }
}

pub fn is_initialized() -> bool {
    ADVISOR_LOGGER
        .lock()
        .map(|slot| slot.is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_twice_is_rejected() {
        let dir = tempfile::tempdir().expect("Failed to create temporary dir");
        let config = LogConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            ..LogConfig::default()
        };

        assert!(init(&config).is_ok());
        assert!(is_initialized());
        let second = init(&config);
        assert!(matches!(second, Err(AdvisorError::Config(_))));

        log::info!("规划日志测试");
        shutdown();
        assert!(!is_initialized());
        shutdown();
    }
}
