//! ---
//! logd_section: "03-persistence-logging"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "Append-only JSON-lines log store."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logd_schema::{sort_records, LogRecord};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::LogStore;
use crate::{Result, StoreError};

const FORMAT_NAME: &str = "logd-records";
const FORMAT_VERSION: u16 = 1;

/// First line of every record file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileHeader {
    format: String,
    version: u16,
    created_at: DateTime<Utc>,
}

impl FileHeader {
    fn new() -> Self {
        Self {
            format: FORMAT_NAME.to_owned(),
            version: FORMAT_VERSION,
            created_at: Utc::now(),
        }
    }

    fn check(&self, path: &Path) -> Result<()> {
        if self.format != FORMAT_NAME || self.version != FORMAT_VERSION {
            return Err(StoreError::Serialization(format!(
                "{} is not a {FORMAT_NAME} v{FORMAT_VERSION} file (found {} v{})",
                path.display(),
                self.format,
                self.version
            )));
        }
        Ok(())
    }
}

struct Inner {
    path: PathBuf,
    // Readers hold the read side while scanning so they never see a partial line.
    writer: RwLock<BufWriter<File>>,
}

/// Store that keeps one JSON document per line in a local file.
///
/// Appends are flushed before returning and exclude concurrent scans. Queries
/// scan the whole file, which is fine for the volumes this backend is meant for.
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<Inner>,
}

impl FileStore {
    /// Open `path` for appending, creating it and its parent directories when
    /// missing. An existing file must carry a valid header.
    pub async fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        let inner = run_blocking(move || open_inner(path)).await?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.inner.path)
            .finish()
    }
}

fn open_inner(path: PathBuf) -> Result<Inner> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let fresh = !path.exists() || fs::metadata(&path)?.len() == 0;
    if !fresh {
        read_header(&path)?.check(&path)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = BufWriter::new(file);
    if fresh {
        let line = serde_json::to_string(&FileHeader::new())?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        debug!(path = %path.display(), "created record file");
    }

    Ok(Inner {
        path,
        writer: RwLock::new(writer),
    })
}

fn read_header(path: &Path) -> Result<FileHeader> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut first = String::new();
    reader.read_line(&mut first)?;
    serde_json::from_str(first.trim_end()).map_err(|err| {
        StoreError::Serialization(format!("invalid header in {}: {err}", path.display()))
    })
}

fn scan<F>(inner: &Inner, keep: F) -> Result<Vec<LogRecord>>
where
    F: Fn(&LogRecord) -> bool,
{
    let _appends = inner.writer.read();
    let path = inner.path.as_path();
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: LogRecord = serde_json::from_str(&line).map_err(|err| {
            StoreError::Serialization(format!(
                "{}:{}: {err}",
                path.display(),
                index + 1
            ))
        })?;
        if keep(&record) {
            records.push(record);
        }
    }
    sort_records(&mut records);
    Ok(records)
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StoreError::Unavailable(format!("file store worker failed: {err}")))?
}

#[async_trait]
impl LogStore for FileStore {
    async fn append(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let inner = Arc::clone(&self.inner);
        run_blocking(move || {
            let mut writer = inner.writer.write();
            writer.write_all(&line)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
            Ok(())
        })
        .await
    }

    async fn query_by_service(&self, service_name: &str) -> Result<Vec<LogRecord>> {
        let inner = Arc::clone(&self.inner);
        let service_name = service_name.to_owned();
        run_blocking(move || scan(&inner, |record| record.service_name == service_name)).await
    }

    async fn query_all(&self) -> Result<Vec<LogRecord>> {
        let inner = Arc::clone(&self.inner);
        run_blocking(move || scan(&inner, |_| true)).await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
