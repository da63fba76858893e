//! keep / dump 싱크
//!
//! - keep: 포함된 줄을 그대로 쓰고 즉시 flush (보통 stdout)
//! - dump: 제외된 줄을 기록하는 줄 단위 버퍼 파일 (선택)
//!
//! dump 싱크가 없으면 제외된 줄은 버려집니다.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use metrics::counter;

use kmsieve_core::metrics as m;

use crate::error::PipelineError;

/// 다른 이름을 찾기 위해 표식을 덧붙이는 최대 횟수
const MAX_DUMP_NAME_ATTEMPTS: usize = 64;

/// 줄 단위 버퍼링되는 dump 파일
pub type DumpFile = LineWriter<File>;

/// 비어 있는 경로를 찾아 dump 파일을 새로 엽니다.
///
/// `path`가 이미 있으면 파일 이름 끝에 `marker`를 하나씩 덧붙이며 재시도합니다.
/// 실제로 연 경로와 파일을 반환합니다.
pub fn open_dump_file(path: &Path, marker: char) -> Result<(PathBuf, DumpFile), PipelineError> {
    let mut candidate: OsString = path.as_os_str().to_owned();
    let mut marker_buf = [0u8; 4];
    let marker: &str = marker.encode_utf8(&mut marker_buf);

    for _ in 0..MAX_DUMP_NAME_ATTEMPTS {
        match OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => {
                let opened = PathBuf::from(candidate);
                if opened != path {
                    tracing::info!(
                        requested = %path.display(),
                        path = %opened.display(),
                        "dump path exists, using alternative"
                    );
                }
                return Ok((opened, LineWriter::new(file)));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => candidate.push(marker),
            Err(source) => return Err(PipelineError::Sink { sink: "dump", source }),
        }
    }

    Err(PipelineError::Sink {
        sink: "dump",
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "no free dump path after {MAX_DUMP_NAME_ATTEMPTS} attempts: {}",
                path.display()
            ),
        ),
    })
}

/// 싱크별 누적 줄 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCounts {
    /// keep 싱크로 쓴 줄
    pub kept: u64,
    /// dump 싱크로 쓴 줄
    pub dumped: u64,
    /// dump 싱크가 없어 버린 줄
    pub discarded: u64,
}

/// 판정 결과에 따라 줄을 내보내는 싱크 묶음
#[derive(Debug)]
pub struct Sinks<K, D> {
    keep: K,
    dump: Option<D>,
    counts: SinkCounts,
}

impl<K: Write, D: Write> Sinks<K, D> {
    /// keep 싱크와 선택적 dump 싱크로 생성합니다.
    pub fn new(keep: K, dump: Option<D>) -> Self {
        Self {
            keep,
            dump,
            counts: SinkCounts::default(),
        }
    }

    /// 포함된 줄을 그대로 쓰고 flush합니다.
    pub fn keep(&mut self, line: &[u8]) -> Result<(), PipelineError> {
        self.keep
            .write_all(line)
            .and_then(|()| self.keep.flush())
            .map_err(|source| PipelineError::Sink { sink: "keep", source })?;
        self.counts.kept += 1;
        counter!(m::LINES_KEPT_TOTAL).increment(1);
        Ok(())
    }

    /// 제외된 줄을 dump 싱크로 보내거나 버립니다.
    pub fn dump(&mut self, line: &[u8]) -> Result<(), PipelineError> {
        match self.dump.as_mut() {
            Some(dump) => {
                dump.write_all(line)
                    .map_err(|source| PipelineError::Sink { sink: "dump", source })?;
                self.counts.dumped += 1;
                counter!(m::LINES_DUMPED_TOTAL).increment(1);
            }
            None => {
                self.counts.discarded += 1;
                counter!(m::LINES_DISCARDED_TOTAL).increment(1);
            }
        }
        Ok(())
    }

    /// 판정에 따라 라우팅합니다.
    pub fn route(&mut self, included: bool, line: &[u8]) -> Result<(), PipelineError> {
        if included {
            self.keep(line)
        } else {
            self.dump(line)
        }
    }

    /// 두 싱크를 flush합니다.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.keep
            .flush()
            .map_err(|source| PipelineError::Sink { sink: "keep", source })?;
        if let Some(dump) = self.dump.as_mut() {
            dump.flush()
                .map_err(|source| PipelineError::Sink { sink: "dump", source })?;
        }
        Ok(())
    }

    /// 누적 줄 수
    pub fn counts(&self) -> SinkCounts {
        self.counts
    }

    /// keep 싱크 참조
    pub fn keep_ref(&self) -> &K {
        &self.keep
    }

    /// dump 싱크 참조
    pub fn dump_ref(&self) -> Option<&D> {
        self.dump.as_ref()
    }

    /// 싱크를 꺼냅니다.
    pub fn into_inner(self) -> (K, Option<D>) {
        (self.keep, self.dump)
    }
}
