//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 파이프라인과 데몬은 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::gauge!()` 매크로를 호출합니다.
//!
//! 레코더가 설치되지 않은 경우 (메트릭 비활성화) 매크로 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `kmsieve_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(kmsieve_core::metrics::LINES_KEPT_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 필터링 모드 레이블 키 (leading-line, whole-message)
pub const LABEL_MODE: &str = "mode";

/// 빌드 정보 레이블 키
pub const LABEL_VERSION: &str = "version";

// ─── 파이프라인 메트릭 ──────────────────────────────────────────────

/// 장치에서 읽은 전체 줄 수 (counter)
pub const LINES_READ_TOTAL: &str = "kmsieve_lines_read_total";

/// keep 싱크(stdout)로 전달된 줄 수 (counter)
pub const LINES_KEPT_TOTAL: &str = "kmsieve_lines_kept_total";

/// 덤프 파일로 기록된 줄 수 (counter)
pub const LINES_DUMPED_TOTAL: &str = "kmsieve_lines_dumped_total";

/// 덤프 싱크 없이 제외되어 버려진 줄 수 (counter)
pub const LINES_DISCARDED_TOTAL: &str = "kmsieve_lines_discarded_total";

/// 소속 메시지 판정 없이 도착해 버려진 연속 줄 수 (counter)
pub const LINES_ORPHANED_TOTAL: &str = "kmsieve_lines_orphaned_total";

/// 재시작 시 체크포인트 이전이라 건너뛴 줄 수 (counter)
pub const LINES_REPLAY_SKIPPED_TOTAL: &str = "kmsieve_lines_replay_skipped_total";

/// 시퀀스 번호 불연속 감지 횟수 (counter)
pub const SEQUENCE_GAPS_TOTAL: &str = "kmsieve_sequence_gaps_total";

/// 체크포인트 파일 기록 횟수 (counter)
pub const CHECKPOINT_WRITES_TOTAL: &str = "kmsieve_checkpoint_writes_total";

/// 규칙 정규식 평가 횟수 (counter)
pub const RULE_EVALUATIONS_TOTAL: &str = "kmsieve_rule_evaluations_total";

/// 커널 링 버퍼 덮어쓰기(EPIPE) 감지 횟수 (counter)
pub const KMSG_OVERRUNS_TOTAL: &str = "kmsieve_kmsg_overruns_total";

// ─── 데몬 메트릭 ────────────────────────────────────────────────────

/// 로드된 규칙 수 (gauge)
pub const RULES_LOADED: &str = "kmsieve_rules_loaded";

/// 빌드 정보 (gauge, 항상 1, labels: version)
pub const DAEMON_BUILD_INFO: &str = "kmsieve_daemon_build_info";

/// 정의된 모든 메트릭 이름
pub const ALL_METRIC_NAMES: &[&str] = &[
    LINES_READ_TOTAL,
    LINES_KEPT_TOTAL,
    LINES_DUMPED_TOTAL,
    LINES_DISCARDED_TOTAL,
    LINES_ORPHANED_TOTAL,
    LINES_REPLAY_SKIPPED_TOTAL,
    SEQUENCE_GAPS_TOTAL,
    CHECKPOINT_WRITES_TOTAL,
    RULE_EVALUATIONS_TOTAL,
    KMSG_OVERRUNS_TOTAL,
    RULES_LOADED,
    DAEMON_BUILD_INFO,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `kmsieved` 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        LINES_READ_TOTAL,
        "Total number of lines read from the kernel log device"
    );
    describe_counter!(
        LINES_KEPT_TOTAL,
        "Total number of lines forwarded to standard output"
    );
    describe_counter!(
        LINES_DUMPED_TOTAL,
        "Total number of excluded lines written to the dump file"
    );
    describe_counter!(
        LINES_DISCARDED_TOTAL,
        "Total number of excluded lines dropped without a dump file"
    );
    describe_counter!(
        LINES_ORPHANED_TOTAL,
        "Total number of continuation lines dropped for lack of a primary line"
    );
    describe_counter!(
        LINES_REPLAY_SKIPPED_TOTAL,
        "Total number of lines skipped because they precede the checkpoint"
    );
    describe_counter!(
        SEQUENCE_GAPS_TOTAL,
        "Total number of discontinuities observed in kernel sequence numbers"
    );
    describe_counter!(
        CHECKPOINT_WRITES_TOTAL,
        "Total number of checkpoint file updates"
    );
    describe_counter!(
        RULE_EVALUATIONS_TOTAL,
        "Total number of rule regex evaluations"
    );
    describe_counter!(
        KMSG_OVERRUNS_TOTAL,
        "Total number of kernel ring buffer overruns reported by the device"
    );
    describe_gauge!(RULES_LOADED, "Number of filter rules currently loaded");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
