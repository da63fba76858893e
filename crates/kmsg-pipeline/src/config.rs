//! 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`KmsieveConfig`]에서 파이프라인이 쓰는 값만 추려
//! 경로와 문자 타입으로 변환한 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use kmsieve_core::config::KmsieveConfig;
//! use kmsieve_pipeline::config::PipelineConfig;
//!
//! let core_config = KmsieveConfig::default();
//! let config = PipelineConfig::from_core(&core_config)?;
//! ```

use std::path::PathBuf;

use kmsieve_core::config::{FilterMode, KmsieveConfig};

use crate::error::PipelineError;
use crate::sink::{DumpFile, open_dump_file};

/// 파이프라인 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 필터링 모드
    pub mode: FilterMode,
    /// 규칙 파일 경로
    pub rules_path: PathBuf,
    /// 체크포인트 파일 경로
    pub checkpoint_path: PathBuf,
    /// dump 파일 경로 (`None`이면 제외된 줄을 버림)
    pub dump_path: Option<PathBuf>,
    /// dump 경로 충돌 시 덧붙일 문자
    pub dump_marker: char,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // 검증된 기본 설정에서 변환하므로 실패하지 않음
        let core = KmsieveConfig::default();
        Self {
            mode: core.filter.mode,
            rules_path: PathBuf::from(core.filter.rules_path),
            checkpoint_path: PathBuf::from(core.checkpoint.path),
            dump_path: None,
            dump_marker: '+',
        }
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &KmsieveConfig) -> Result<Self, PipelineError> {
        let mut marker = core.dump.marker.chars();
        let dump_marker = match (marker.next(), marker.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(PipelineError::Config {
                    field: "dump.marker".to_owned(),
                    reason: "must be a single character".to_owned(),
                });
            }
        };

        Ok(Self {
            mode: core.filter.mode,
            rules_path: PathBuf::from(&core.filter.rules_path),
            checkpoint_path: PathBuf::from(&core.checkpoint.path),
            dump_path: core
                .dump_enabled()
                .then(|| PathBuf::from(&core.dump.path)),
            dump_marker,
        })
    }

    /// dump 싱크가 설정되어 있으면 파일을 엽니다.
    pub fn open_dump(&self) -> Result<Option<(PathBuf, DumpFile)>, PipelineError> {
        self.dump_path
            .as_deref()
            .map(|path| open_dump_file(path, self.dump_marker))
            .transpose()
    }
}
