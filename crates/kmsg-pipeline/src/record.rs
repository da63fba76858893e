//! kmsg 레코드 줄 분류 및 시퀀스 번호 파싱
//!
//! `/dev/kmsg` 레코드 형식:
//!
//! ```text
//! 6,1234,5678901,-;usb 1-1: new high-speed USB device
//!  SUBSYSTEM=usb
//!  DEVICE=c189:1
//! ```
//!
//! 첫 줄(primary line)은 `;` 앞 헤더가 쉼표로 구분된 필드이며 두 번째 필드가
//! 시퀀스 번호입니다. 공백 한 칸으로 시작하는 줄은 직전 레코드의 연속 줄입니다.

/// 줄 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// 레코드 첫 줄
    Primary,
    /// 공백으로 시작하는 메타데이터 연속 줄
    Continuation,
}

/// 줄 종류를 판별합니다.
pub fn classify(line: &[u8]) -> LineKind {
    if line.first() == Some(&b' ') {
        LineKind::Continuation
    } else {
        LineKind::Primary
    }
}

/// 첫 줄 헤더의 두 번째 필드에서 시퀀스 번호를 추출합니다.
///
/// 필드는 반드시 `,`로 끝나야 하며 십진수 숫자만 허용합니다.
/// 잘린 줄이나 연속 줄은 `None`입니다.
pub fn parse_sequence(line: &[u8]) -> Option<u64> {
    let header_end = line.iter().position(|&b| b == b';').unwrap_or(line.len());
    let header = &line[..header_end];

    let first_comma = header.iter().position(|&b| b == b',')?;
    let rest = &header[first_comma + 1..];
    let field_len = rest.iter().position(|&b| b == b',')?;
    let field = &rest[..field_len];

    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }

    field.iter().try_fold(0u64, |acc, &d| {
        acc.checked_mul(10)?.checked_add(u64::from(d - b'0'))
    })
}

/// 매칭에 쓰는 텍스트 (마지막 줄바꿈 제외)
pub fn match_text(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}
