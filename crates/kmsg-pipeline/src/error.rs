//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 규칙 로딩부터 싱크 쓰기까지 파이프라인 내부에서 발생하는
//! 모든 에러를 표현합니다. `From<PipelineError> for KmsieveError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use kmsieve_core::error::KmsieveError;

use crate::rule::RuleParseError;

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 규칙 파일의 특정 줄 파싱 실패
    #[error("{source_name}:{line}: {source}")]
    RuleParse {
        /// 규칙 파일 이름 (경로 또는 `<inline>`)
        source_name: String,
        /// 1부터 시작하는 줄 번호
        line: usize,
        /// 파싱 실패 원인
        #[source]
        source: RuleParseError,
    },

    /// 규칙 파일 로딩 실패 (크기 초과, 읽기 실패 등)
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 규칙 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 체크포인트 파일 읽기/쓰기 실패
    #[error("checkpoint error: {path}: {source}")]
    Checkpoint {
        /// 체크포인트 파일 경로
        path: String,
        /// I/O 원인
        #[source]
        source: std::io::Error,
    },

    /// keep/dump 싱크 쓰기 실패
    #[error("{sink} sink error: {source}")]
    Sink {
        /// 싱크 이름 (keep, dump)
        sink: &'static str,
        /// I/O 원인
        #[source]
        source: std::io::Error,
    },

    /// 파이프라인 조립 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl PipelineError {
    /// 규칙 파일 문제로 인한 에러인지 확인합니다 (시작 시 설정 에러로 분류).
    pub fn is_rule_error(&self) -> bool {
        matches!(self, Self::RuleParse { .. } | Self::RuleLoad { .. })
    }
}

impl From<PipelineError> for KmsieveError {
    fn from(err: PipelineError) -> Self {
        if err.is_rule_error() {
            KmsieveError::Rule(err.to_string())
        } else {
            KmsieveError::Pipeline(err.to_string())
        }
    }
}
