//! 재시작 시 이미 처리한 메시지 건너뛰기
//!
//! 커널 링 버퍼는 장치를 새로 열 때마다 남아 있는 가장 오래된 레코드부터 다시 내보냅니다.
//! [`ReplaySkipper`]는 시퀀스 번호가 체크포인트에 도달할 때까지 줄을 버리고,
//! 도달한 줄부터는 (그 줄 포함) 모든 줄을 다음 단계로 그대로 넘깁니다.

use bytes::Bytes;
use metrics::counter;

use kmsieve_core::metrics as m;

use crate::error::PipelineError;
use crate::framer::LineHandler;
use crate::record::{LineKind, classify, parse_sequence};

/// 체크포인트 이전 레코드를 건너뛰는 단계
#[derive(Debug)]
pub struct ReplaySkipper<H> {
    target: u64,
    skipping: bool,
    last_seen: Option<u64>,
    skipped: u64,
    gaps: u64,
    leading_continuations: u64,
    downstream: H,
}

impl<H: LineHandler> ReplaySkipper<H> {
    /// 시퀀스 번호 `target` 이상부터 넘기는 스킵퍼를 생성합니다.
    pub fn new(target: u64, downstream: H) -> Self {
        Self {
            target,
            skipping: target > 0,
            last_seen: None,
            skipped: 0,
            gaps: 0,
            leading_continuations: 0,
            downstream,
        }
    }

    /// 아직 건너뛰는 중인지 확인합니다.
    pub fn is_skipping(&self) -> bool {
        self.skipping
    }

    /// 건너뛴 줄 수
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// 건너뛰는 동안 감지한 시퀀스 불연속 횟수
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// 첫 주 줄보다 먼저 들어온 연속 줄 수
    pub fn leading_continuations(&self) -> u64 {
        self.leading_continuations
    }

    /// 다음 단계 참조
    pub fn get_ref(&self) -> &H {
        &self.downstream
    }

    /// 다음 단계 가변 참조
    pub fn get_mut(&mut self) -> &mut H {
        &mut self.downstream
    }

    fn skip(&mut self) {
        self.skipped += 1;
        counter!(m::LINES_REPLAY_SKIPPED_TOTAL).increment(1);
    }
}

impl<H: LineHandler> LineHandler for ReplaySkipper<H> {
    fn feed(&mut self, line: Bytes) -> Result<(), PipelineError> {
        if !self.skipping {
            return self.downstream.feed(line);
        }

        if classify(&line) == LineKind::Continuation {
            if self.last_seen.is_none() {
                self.leading_continuations += 1;
                tracing::warn!(
                    checkpoint = self.target,
                    "continuation line before any primary line while replaying"
                );
            }
            self.skip();
            return Ok(());
        }

        let Some(seq) = parse_sequence(&line) else {
            tracing::warn!(
                line = %String::from_utf8_lossy(&line).trim_end(),
                "cannot parse sequence number while replaying"
            );
            self.skip();
            return Ok(());
        };

        if seq >= self.target {
            self.skipping = false;
            tracing::info!(
                sequence = seq,
                checkpoint = self.target,
                skipped = self.skipped,
                "caught up with checkpoint"
            );
            return self.downstream.feed(line);
        }

        if let Some(prev) = self.last_seen {
            if prev.checked_add(1) != Some(seq) {
                self.gaps += 1;
                counter!(m::SEQUENCE_GAPS_TOTAL).increment(1);
                tracing::warn!(
                    expected = prev.saturating_add(1),
                    got = seq,
                    "sequence gap while replaying"
                );
            }
        }
        self.last_seen = Some(seq);
        self.skip();
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        if self.skipping {
            tracing::debug!(
                checkpoint = self.target,
                skipped = self.skipped,
                "stream ended before reaching checkpoint"
            );
        }
        self.downstream.finish()
    }
}
