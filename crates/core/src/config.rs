//! 설정 관리 — kmsieve.toml 파싱 및 런타임 설정
//!
//! [`KmsieveConfig`]는 데몬과 CLI가 공유하는 최상위 설정 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, 데몬/CLI 쪽에서 적용)
//! 2. 환경변수 (`KMSIEVE_FILTER_MODE=whole-message` 형식)
//! 3. 설정 파일 (`kmsieve.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), kmsieve_core::error::KmsieveError> {
//! use kmsieve_core::config::KmsieveConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = KmsieveConfig::load("/etc/kmsieve/kmsieve.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = KmsieveConfig::parse("[filter]\nmode = \"whole-message\"")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, KmsieveError};

/// 기본 설정 파일 경로
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kmsieve/kmsieve.toml";

/// kmsg 레코드 하나가 한 번의 read()에 들어가야 하므로 이보다 작을 수 없습니다.
pub const MIN_READ_BUFFER_SIZE: usize = 8 * 1024;
const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// kmsieve 통합 설정
///
/// `kmsieve.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KmsieveConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 커널 로그 장치 설정
    #[serde(default)]
    pub source: SourceConfig,
    /// 규칙 필터 설정
    #[serde(default)]
    pub filter: FilterConfig,
    /// 체크포인트 설정
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// 제외된 메시지 덤프 설정
    #[serde(default)]
    pub dump: DumpConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl KmsieveConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, KmsieveError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값으로 시작합니다.
    ///
    /// 부팅 초기에 설정 파일 없이도 데몬이 떠야 하므로, 기본 경로의 파일이
    /// 없는 경우는 에러가 아닙니다. `required`가 참이면 (사용자가 경로를
    /// 직접 지정한 경우) 파일이 없을 때 `FileNotFound`를 반환합니다.
    pub async fn load_or_default(
        path: impl AsRef<Path>,
        required: bool,
    ) -> Result<Self, KmsieveError> {
        let path = path.as_ref();
        match Self::from_file(path).await {
            Ok(mut config) => {
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            Err(KmsieveError::Config(ConfigError::FileNotFound { .. })) if !required => {
                tracing::debug!(path = %path.display(), "config file absent, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, KmsieveError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KmsieveError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                KmsieveError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, KmsieveError> {
        toml::from_str(toml_str).map_err(|e| {
            KmsieveError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `KMSIEVE_{SECTION}_{FIELD}`
    /// 예: `KMSIEVE_CHECKPOINT_PATH=/run/kmsieve/seq`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "KMSIEVE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "KMSIEVE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.lock_dir, "KMSIEVE_GENERAL_LOCK_DIR");
        override_string(
            &mut self.general.ready_command,
            "KMSIEVE_GENERAL_READY_COMMAND",
        );

        // Source
        override_string(&mut self.source.device, "KMSIEVE_SOURCE_DEVICE");
        override_usize(
            &mut self.source.read_buffer_size,
            "KMSIEVE_SOURCE_READ_BUFFER_SIZE",
        );

        // Filter
        override_string(&mut self.filter.rules_path, "KMSIEVE_FILTER_RULES_PATH");
        override_mode(&mut self.filter.mode, "KMSIEVE_FILTER_MODE");

        // Checkpoint / Dump
        override_string(&mut self.checkpoint.path, "KMSIEVE_CHECKPOINT_PATH");
        override_string(&mut self.dump.path, "KMSIEVE_DUMP_PATH");
        override_string(&mut self.dump.marker, "KMSIEVE_DUMP_MARKER");

        // Metrics
        override_bool(&mut self.metrics.enabled, "KMSIEVE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "KMSIEVE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "KMSIEVE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), KmsieveError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // 필수 경로
        let required_paths = [
            ("general.lock_dir", &self.general.lock_dir),
            ("source.device", &self.source.device),
            ("filter.rules_path", &self.filter.rules_path),
            ("checkpoint.path", &self.checkpoint.path),
        ];
        for (field, value) in required_paths {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty".to_owned()));
            }
        }

        if !(MIN_READ_BUFFER_SIZE..=MAX_READ_BUFFER_SIZE).contains(&self.source.read_buffer_size) {
            return Err(invalid(
                "source.read_buffer_size",
                format!("must be {MIN_READ_BUFFER_SIZE}-{MAX_READ_BUFFER_SIZE}"),
            ));
        }

        // 덤프 파일 충돌 회피 마커는 정확히 한 글자
        let mut marker = self.dump.marker.chars();
        match (marker.next(), marker.next()) {
            (Some(c), None) if c != '/' && c != '\0' => {}
            _ => {
                return Err(invalid(
                    "dump.marker",
                    "must be a single character other than '/'".to_owned(),
                ));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0".to_owned()));
            }
            if self.metrics.endpoint != "/metrics" {
                return Err(invalid(
                    "metrics.endpoint",
                    "only '/metrics' is currently supported".to_owned(),
                ));
            }
        }

        Ok(())
    }

    /// 덤프 싱크가 설정되어 있는지 확인합니다.
    pub fn dump_enabled(&self) -> bool {
        !self.dump.path.is_empty()
    }
}

fn invalid(field: &str, reason: String) -> KmsieveError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 필터링 모드
///
/// - `LeadingLine`: 첫 줄(primary line)만 보고 즉시 판정합니다 (기본값).
/// - `WholeMessage`: 연속 줄까지 모은 전체 메시지로 판정합니다.
///   다음 메시지가 도착해야 판정되므로 한 메시지만큼 지연됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    /// 첫 줄 기준 즉시 판정
    #[default]
    LeadingLine,
    /// 전체 메시지 기준 지연 판정
    WholeMessage,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeadingLine => f.write_str("leading-line"),
            Self::WholeMessage => f.write_str("whole-message"),
        }
    }
}

impl FromStr for FilterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leading-line" => Ok(Self::LeadingLine),
            "whole-message" => Ok(Self::WholeMessage),
            other => Err(ConfigError::InvalidValue {
                field: "filter.mode".to_owned(),
                reason: format!("unknown mode '{other}', expected 'leading-line' or 'whole-message'"),
            }),
        }
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 단일 인스턴스 잠금 디렉토리
    pub lock_dir: String,
    /// 초기화 완료 후 실행할 외부 준비 알림 명령 (빈 문자열이면 없음)
    pub ready_command: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            lock_dir: "/run/kmsieve.lock".to_owned(),
            ready_command: String::new(),
        }
    }
}

/// 커널 로그 장치 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 커널 링 버퍼 장치 경로
    pub device: String,
    /// read() 버퍼 크기 (바이트)
    pub read_buffer_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: "/dev/kmsg".to_owned(),
            read_buffer_size: 16 * 1024,
        }
    }
}

/// 규칙 필터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// IIE 규칙 파일 경로
    pub rules_path: String,
    /// 필터링 모드
    pub mode: FilterMode,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            rules_path: "/etc/kmsieve/rules".to_owned(),
            mode: FilterMode::LeadingLine,
        }
    }
}

/// 체크포인트 설정
///
/// 체크포인트 파일은 재부팅 시 비워지는 tmpfs(`/run`)에 두는 것을 전제로 합니다.
/// 커널 시퀀스 번호는 부팅마다 0부터 다시 시작하기 때문입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// 다음에 처리할 시퀀스 번호를 담는 파일
    pub path: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: "/run/kmsieve/checkpoint".to_owned(),
        }
    }
}

/// 제외된 메시지 덤프 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// 덤프 파일 경로 (빈 문자열이면 비활성화)
    pub path: String,
    /// 경로가 이미 존재할 때 뒤에 붙일 문자
    pub marker: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            marker: "+".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_mode(target: &mut FilterMode, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<FilterMode>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse filter mode from env var, ignoring"
            ),
        }
    }
}
