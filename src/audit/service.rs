use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::models::AuditRecord;
use crate::error::{HostBoxError, Result};

/// Append-only destination for audit records.
///
/// Implementations are shared by every request task and must serialize
/// concurrent appends themselves.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// 审计日志文件写入器
///
/// Every record is written as one line and flushed while the lock is held, so
/// concurrent writers never interleave.
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HostBoxError::at(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HostBoxError::at(path, e))?;

        info!("Audit log opened at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        let line = format!("{record}\n");
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// 内存审计存储，主要用于测试
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// 审计日志服务
///
/// Owns the sink and the verbosity switch read once from configuration.
#[derive(Clone)]
pub struct AuditService {
    sink: Arc<dyn AuditSink>,
    verbose: bool,
}

impl AuditService {
    pub fn new(sink: Arc<dyn AuditSink>, verbose: bool) -> Self {
        Self { sink, verbose }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// 记录审计日志
    ///
    /// A failing sink is reported through tracing and otherwise ignored.
    pub fn log(&self, record: AuditRecord) {
        debug!(
            action = %record.action,
            caller = %record.caller_identity,
            "audit: {}",
            record.description
        );
        if let Err(e) = self.sink.append(&record) {
            warn!("Failed to append audit record for {}: {}", record.action, e);
        }
    }

    /// Same as [`log`](Self::log), with the sink write moved onto the
    /// blocking pool so request tasks never wait on file I/O.
    pub async fn submit(&self, record: AuditRecord) {
        let service = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || service.log(record)).await {
            warn!("Audit task failed: {}", e);
        }
    }
}
