//! ArchiveSink - タスクごとのアーカイブ書き込み
//!
//! 1 タスク = 1 zip ファイル = 1 エントリ（`<kind>.log`）。
//! 保存先は `<base_dir>/<group_id>/<ip>-<port>.zip`。

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::{Component, GroupId, TaskError};

/// Directory holding the archives of one group.
pub fn group_dir(base_dir: &Path, group_id: GroupId) -> PathBuf {
    base_dir.join(group_id.to_string())
}

pub struct ArchiveSink {
    path: PathBuf,
    writer: ZipWriter<File>,
    lines: usize,
}

impl ArchiveSink {
    /// Create the group directory, the archive file and its single entry.
    pub fn create(
        base_dir: &Path,
        group_id: GroupId,
        component: &Component,
    ) -> Result<Self, TaskError> {
        let dir = group_dir(base_dir, group_id);
        fs::create_dir_all(&dir)
            .map_err(|e| TaskError::Setup(format!("create dir {}: {e}", dir.display())))?;

        let path = dir.join(component.archive_file_name());
        let file = File::create(&path)
            .map_err(|e| TaskError::Setup(format!("create {}: {e}", path.display())))?;

        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Err(e) = writer.start_file(component.log_file_name(), options) {
            // saved_path is not published yet, so finalize would not find this file
            drop(writer);
            if let Err(rm) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %rm, "failed to remove archive");
            }
            return Err(TaskError::Setup(format!(
                "open entry {} in {}: {e}",
                component.log_file_name(),
                path.display()
            )));
        }

        Ok(Self {
            path,
            writer,
            lines: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), TaskError> {
        self.writer
            .write_all(line.as_bytes())
            .map_err(|e| TaskError::Stream(format!("write {}: {e}", self.path.display())))?;
        self.lines += 1;
        Ok(())
    }

    /// Push buffered bytes down to the file. Called after every batch.
    pub fn flush(&mut self) -> Result<(), TaskError> {
        self.writer
            .flush()
            .map_err(|e| TaskError::Stream(format!("flush {}: {e}", self.path.display())))
    }

    /// Close the entry and write the central directory. Without this the
    /// archive is not readable.
    pub fn finish(self) -> Result<PathBuf, TaskError> {
        let Self { path, writer, .. } = self;
        let mut file = writer
            .finish()
            .map_err(|e| TaskError::Stream(format!("finish {}: {e}", path.display())))?;
        file.flush()
            .map_err(|e| TaskError::Stream(format!("finish {}: {e}", path.display())))?;
        Ok(path)
    }
}
