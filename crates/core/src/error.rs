//! 에러 타입 — 도메인별 에러 정의

/// kmsieve 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum KmsieveError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 규칙 파일 에러 (구문 오류, 정규식 컴파일 실패)
    #[error("rule error: {0}")]
    Rule(String),

    /// 메시지 파이프라인 처리 에러 (싱크 쓰기, 체크포인트 저장)
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
