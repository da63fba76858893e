//! 규칙 데이터 구조 정의

use std::fmt;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

/// 규칙 종류
///
/// 규칙이 매칭되었을 때 메시지 판정을 어느 쪽으로 뒤집는지 나타냅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// 포함 (`i`)
    Include,
    /// 제외 (`e`)
    Exclude,
}

impl RuleKind {
    /// 규칙이 매칭되었을 때의 판정 (`true` = 포함)
    pub fn effect(self) -> bool {
        matches!(self, Self::Include)
    }

    /// 반대 종류
    pub fn opposite(self) -> Self {
        match self {
            Self::Include => Self::Exclude,
            Self::Exclude => Self::Include,
        }
    }

    /// 규칙 파일에서 쓰는 한 글자 표식
    pub fn marker(self) -> char {
        match self {
            Self::Include => 'i',
            Self::Exclude => 'e',
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Include => 0,
            Self::Exclude => 1,
        }
    }

    fn from_marker(b: u8) -> Option<Self> {
        match b {
            b'i' => Some(Self::Include),
            b'e' => Some(Self::Exclude),
            _ => None,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include => f.write_str("include"),
            Self::Exclude => f.write_str("exclude"),
        }
    }
}

/// 규칙 한 줄의 파싱 실패 원인
#[derive(Debug, thiserror::Error)]
pub enum RuleParseError {
    /// `i ` 또는 `e ` 접두어 누락
    #[error("rule must start with 'i' or 'e' followed by whitespace")]
    MissingKind,

    /// 패턴이 `/`로 감싸져 있지 않음
    #[error("pattern must be enclosed in '/' delimiters")]
    MissingDelimiters,

    /// 닫는 `/` 뒤에 공백이 아닌 문자가 있음
    #[error("unexpected characters after closing '/': {trailing:?}")]
    TrailingCharacters {
        /// 남은 문자열
        trailing: String,
    },

    /// 정규식 컴파일 실패
    #[error("invalid regex /{pattern}/: {source}")]
    InvalidRegex {
        /// 컴파일하려던 패턴
        pattern: String,
        /// regex 크레이트 에러
        #[source]
        source: regex::Error,
    },
}

/// 컴파일된 포함/제외 규칙
///
/// 생성 후 불변입니다. 매칭은 전체 일치가 아닌 부분 검색(search)입니다.
#[derive(Debug, Clone)]
pub struct Rule {
    kind: RuleKind,
    pattern: Regex,
}

impl Rule {
    /// 종류와 정규식 문자열로 규칙을 생성합니다.
    pub fn new(kind: RuleKind, pattern: &str) -> Result<Self, RuleParseError> {
        let pattern = Regex::new(pattern).map_err(|source| RuleParseError::InvalidRegex {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self { kind, pattern })
    }

    /// `<i|e> /<regex>/` 형식의 규칙 한 줄을 파싱합니다.
    ///
    /// 정규식은 접두어 뒤 첫 번째 `/`부터 줄의 마지막 `/`까지이므로
    /// 패턴 안의 `/`는 이스케이프 없이 쓸 수 있습니다.
    pub fn parse(line: &str) -> Result<Self, RuleParseError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let bytes = line.as_bytes();

        let kind = match bytes {
            [marker, b' ' | b'\t', ..] => {
                RuleKind::from_marker(*marker).ok_or(RuleParseError::MissingKind)?
            }
            _ => return Err(RuleParseError::MissingKind),
        };

        // 접두어(2바이트) 이후 첫 '/'
        let open = line[2..]
            .find('/')
            .map(|i| i + 2)
            .ok_or(RuleParseError::MissingDelimiters)?;
        if !line[2..open].bytes().all(|b| b == b' ' || b == b'\t') {
            return Err(RuleParseError::MissingDelimiters);
        }

        let close = line.rfind('/').ok_or(RuleParseError::MissingDelimiters)?;
        if close <= open {
            return Err(RuleParseError::MissingDelimiters);
        }

        let trailing = &line[close + 1..];
        if !trailing.trim().is_empty() {
            return Err(RuleParseError::TrailingCharacters {
                trailing: trailing.to_owned(),
            });
        }

        Self::new(kind, &line[open + 1..close])
    }

    /// 규칙 종류
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    /// 원본 정규식 문자열
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// 텍스트 안에 패턴이 나타나는지 검사합니다.
    pub fn is_match(&self, text: &[u8]) -> bool {
        self.pattern.is_match(text)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{}/", self.kind.marker(), self.pattern.as_str())
    }
}
