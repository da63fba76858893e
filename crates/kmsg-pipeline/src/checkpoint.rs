//! 체크포인트 저장소 — 처리 중인 시퀀스 번호의 영속화
//!
//! 파일에는 시퀀스 번호의 십진수 텍스트만 들어 있습니다.
//! 파일은 tmpfs 위에 있다고 가정하므로 fsync하지 않고, 매 갱신마다
//! 처음으로 seek한 뒤 덮어씁니다. 값의 자릿수가 줄어든 경우에만 잘라냅니다.
//!
//! 쓰기에 실패하면 핸들을 닫고 이후 모든 갱신이 실패합니다.
//! 체크포인트 없이 계속 진행하면 재시작 시 중복 처리가 생기기 때문입니다.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use metrics::counter;

use kmsieve_core::metrics as m;

use crate::error::PipelineError;

/// 체크포인트 파일 핸들
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    file: Option<File>,
    value: u64,
    written_len: usize,
}

impl CheckpointStore {
    /// 저장된 값을 읽고 쓰기 핸들을 열어 기준값을 다시 기록합니다.
    ///
    /// 상위 디렉토리가 없으면 0700 권한으로 생성합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        let value = Self::read(&path)?;

        let err = |source| PipelineError::Checkpoint {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(parent)
                .map_err(err)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&path)
            .map_err(err)?;
        let current_len = file.metadata().map_err(err)?.len();

        let mut store = Self {
            path,
            file: Some(file),
            value,
            // 기존 내용이 더 길면 (쓰레기 값 등) 기준값 기록 시 잘라냄
            written_len: usize::try_from(current_len).unwrap_or(usize::MAX),
        };
        store.persist(value)?;

        tracing::info!(
            path = %store.path.display(),
            checkpoint = value,
            "checkpoint loaded"
        );
        Ok(store)
    }

    /// 체크포인트 파일 값을 읽습니다 (쓰기 핸들 없이).
    ///
    /// 파일이 없으면 0, 내용이 숫자가 아니면 경고 후 0입니다.
    pub fn read(path: impl AsRef<Path>) -> Result<u64, PipelineError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(path = %path.display(), "checkpoint is not text, starting from 0");
                return Ok(0);
            }
            Err(source) => {
                return Err(PipelineError::Checkpoint {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        match trimmed.parse::<u64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                tracing::warn!(
                    path = %path.display(),
                    content = trimmed,
                    "checkpoint content is not a sequence number, starting from 0"
                );
                Ok(0)
            }
        }
    }

    /// 실행 중인 데몬 없이 값을 직접 기록합니다 (운영 도구용).
    pub fn overwrite(path: impl AsRef<Path>, value: u64) -> Result<(), PipelineError> {
        let path = path.as_ref();
        std::fs::write(path, value.to_string()).map_err(|source| PipelineError::Checkpoint {
            path: path.display().to_string(),
            source,
        })
    }

    /// 현재 값
    pub fn value(&self) -> u64 {
        self.value
    }

    /// 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 쓰기 핸들이 살아 있는지 확인합니다.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// 값을 갱신하고 즉시 파일에 기록합니다.
    pub fn update(&mut self, value: u64) -> Result<(), PipelineError> {
        if value == self.value && self.file.is_some() {
            return Ok(());
        }
        self.persist(value)
    }

    fn persist(&mut self, value: u64) -> Result<(), PipelineError> {
        let Some(file) = self.file.as_mut() else {
            return Err(PipelineError::Checkpoint {
                path: self.path.display().to_string(),
                source: io::Error::other("checkpoint handle closed after earlier failure"),
            });
        };

        let digits = value.to_string();
        match write_digits(file, digits.as_bytes(), self.written_len) {
            Ok(()) => {
                self.value = value;
                self.written_len = digits.len();
                counter!(m::CHECKPOINT_WRITES_TOTAL).increment(1);
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %source,
                    "checkpoint write failed, closing handle"
                );
                self.file = None;
                Err(PipelineError::Checkpoint {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        }
    }
}

fn write_digits(file: &mut File, digits: &[u8], previous_len: usize) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(digits)?;
    if digits.len() < previous_len {
        file.set_len(digits.len() as u64)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn missing_file_starts_at_zero_and_writes_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/kmsieve/checkpoint");

        let store = CheckpointStore::open(&path).unwrap();
        assert_eq!(store.value(), 0);
        assert_eq!(contents(&path), "0");
    }

    #[test]
    fn parent_directory_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/checkpoint");
        CheckpointStore::open(&path).unwrap();

        let mode = std::fs::metadata(dir.path().join("state"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn existing_value_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");
        std::fs::write(&path, "1234\n").unwrap();

        let store = CheckpointStore::open(&path).unwrap();
        assert_eq!(store.value(), 1234);
        // 기준값을 다시 기록하면서 줄바꿈이 잘려나감
        assert_eq!(contents(&path), "1234");
    }

    #[test]
    fn garbled_value_is_treated_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");
        std::fs::write(&path, "not-a-number").unwrap();

        assert_eq!(CheckpointStore::read(&path).unwrap(), 0);
        let store = CheckpointStore::open(&path).unwrap();
        assert_eq!(store.value(), 0);
        assert_eq!(contents(&path), "0");
    }

    #[test]
    fn update_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");

        let mut store = CheckpointStore::open(&path).unwrap();
        store.update(9).unwrap();
        assert_eq!(contents(&path), "9");
        store.update(10).unwrap();
        assert_eq!(contents(&path), "10");
        store.update(100_000).unwrap();
        assert_eq!(contents(&path), "100000");
    }

    #[test]
    fn shrinking_value_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");

        let mut store = CheckpointStore::open(&path).unwrap();
        store.update(12345).unwrap();
        store.update(7).unwrap();
        assert_eq!(contents(&path), "7");
        assert_eq!(CheckpointStore::read(&path).unwrap(), 7);
    }

    #[test]
    fn overwrite_and_read_without_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");

        CheckpointStore::overwrite(&path, 42).unwrap();
        assert_eq!(CheckpointStore::read(&path).unwrap(), 42);
    }

    #[test]
    fn write_failure_closes_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");

        let mut store = CheckpointStore::open(&path).unwrap();
        // 읽기 전용 핸들로 교체해 쓰기 실패를 유도
        store.file = Some(File::open(&path).unwrap());

        let err = store.update(5).unwrap_err();
        assert!(matches!(err, PipelineError::Checkpoint { .. }));
        assert!(!store.is_open());
        assert_eq!(store.value(), 0);

        // 이후 갱신도 계속 실패
        assert!(store.update(6).is_err());
    }
}
