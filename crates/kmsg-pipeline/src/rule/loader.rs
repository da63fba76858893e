//! 규칙 파일 로더 -- 줄 단위 규칙 파일을 디스크에서 로드합니다.
//!
//! 한 줄에 규칙 하나, 빈 줄과 `#`으로 시작하는 줄은 무시합니다.
//! 잘못된 규칙이 하나라도 있으면 파일 전체가 거부됩니다.

use std::path::Path;

use crate::error::PipelineError;

use super::IieEngine;
use super::types::Rule;

/// 규칙 파일 로더 설정
const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_RULES_COUNT: usize = 10_000;

/// 규칙 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 규칙 파일을 읽어 엔진을 구성합니다.
    ///
    /// 파일이 없으면 경고 후 `None`을 반환합니다 (호출자는 모든 메시지를 통과시킴).
    ///
    /// # Errors
    /// - 파일을 읽을 수 없거나 UTF-8이 아닌 경우
    /// - 파일 크기가 `MAX_RULE_FILE_SIZE`를 초과하는 경우
    /// - 규칙 구문 오류 (파일 이름과 줄 번호 포함)
    pub async fn load_file(path: impl AsRef<Path>) -> Result<Option<IieEngine>, PipelineError> {
        let path = path.as_ref();

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "rule file not found, forwarding every message"
                );
                return Ok(None);
            }
            Err(e) => {
                return Err(PipelineError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file metadata: {e}"),
                });
            }
        };

        if metadata.len() > MAX_RULE_FILE_SIZE {
            return Err(PipelineError::RuleLoad {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| PipelineError::RuleLoad {
                    path: path.display().to_string(),
                    reason: format!("failed to read file: {e}"),
                })?;

        let engine = Self::parse_str(&content, &path.display().to_string())?;

        tracing::info!(
            path = %path.display(),
            count = engine.len(),
            "loaded filter rules"
        );

        Ok(Some(engine))
    }

    /// 규칙 파일 내용을 파싱하여 엔진을 구성합니다.
    pub fn parse_str(content: &str, source_name: &str) -> Result<IieEngine, PipelineError> {
        let mut engine = IieEngine::new();

        for (lineno, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let rule = Rule::parse(trimmed).map_err(|source| PipelineError::RuleParse {
                source_name: source_name.to_owned(),
                line: lineno + 1,
                source,
            })?;
            engine.push(rule);

            if engine.len() > MAX_RULES_COUNT {
                return Err(PipelineError::RuleLoad {
                    path: source_name.to_owned(),
                    reason: format!("too many rules: max {MAX_RULES_COUNT}"),
                });
            }
        }

        Ok(engine)
    }
}
