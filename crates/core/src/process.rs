//! 인스턴스 락 디렉토리의 PID 파일과 프로세스 생존 확인
//!
//! 데몬(락 소유자)과 CLI(락 관찰자)가 같은 규칙으로 락 상태를 판단하도록
//! PID 파일 이름과 생존 확인 로직을 한곳에 둡니다.

use std::path::Path;

/// 락 디렉토리 안에서 데몬이 PID를 기록하는 파일 이름
pub const PID_FILE_NAME: &str = "pid";

/// 락 디렉토리에 기록된 PID를 읽습니다.
///
/// 파일이 없거나 내용이 숫자가 아니면 `None`입니다.
pub fn holder_pid(lock_dir: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_dir.join(PID_FILE_NAME))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// 주어진 PID의 프로세스가 살아 있는지 확인합니다.
///
/// 시그널을 보낼 권한이 없는 프로세스도 살아 있는 것으로 봅니다.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use std::io::{Error, ErrorKind};

    // 0과 음수는 프로세스 그룹을 가리킴
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // SAFETY: 시그널 0의 kill(2)은 존재 여부와 권한만 검사합니다
    let result = unsafe { libc::kill(pid, 0) };

    result == 0 || Error::last_os_error().kind() == ErrorKind::PermissionDenied
}

/// 이 플랫폼에서는 생존 확인을 할 수 없으므로 항상 `false`입니다.
#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    tracing::warn!("process liveness check not supported on this platform");
    false
}
