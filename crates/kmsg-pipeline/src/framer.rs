//! 바이트 청크 → 줄 프레이밍
//!
//! 논블로킹 read()로 받은 청크는 줄 중간에서 잘릴 수 있습니다.
//! [`Framer`]는 끝나지 않은 조각을 보관했다가 다음 청크와 이어 붙이고,
//! 완성된 줄은 즉시 다음 단계로 넘깁니다.

use bytes::{Bytes, BytesMut};
use metrics::counter;

use kmsieve_core::metrics as m;

use crate::error::PipelineError;

/// 줄 단위 파이프라인 단계
///
/// 각 단계는 줄을 받아 처리한 뒤 필요하면 다음 단계로 넘깁니다.
/// 스트림 종료 시 `finish()`가 한 번 호출됩니다.
pub trait LineHandler {
    /// 줄 하나를 처리합니다 (줄바꿈 포함, 마지막 줄은 없을 수 있음).
    fn feed(&mut self, line: Bytes) -> Result<(), PipelineError>;

    /// 스트림 종료 — 보관 중인 상태를 모두 내보냅니다.
    fn finish(&mut self) -> Result<(), PipelineError>;
}

/// 청크를 줄로 재조립하는 첫 단계
#[derive(Debug)]
pub struct Framer<H> {
    pending: BytesMut,
    /// `pending` 중 줄바꿈이 없음을 이미 확인한 길이
    scanned: usize,
    lines: u64,
    downstream: H,
}

impl<H: LineHandler> Framer<H> {
    /// 다음 단계를 감싸는 프레이머를 생성합니다.
    pub fn new(downstream: H) -> Self {
        Self {
            pending: BytesMut::with_capacity(8 * 1024),
            scanned: 0,
            lines: 0,
            downstream,
        }
    }

    /// 읽은 청크를 밀어 넣고 완성된 줄을 모두 내보냅니다.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), PipelineError> {
        self.pending.extend_from_slice(chunk);

        while let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|&b| b == b'\n')
        {
            let end = self.scanned + offset + 1;
            let line = self.pending.split_to(end).freeze();
            self.scanned = 0;
            self.emit(line)?;
        }
        self.scanned = self.pending.len();

        Ok(())
    }

    /// 스트림 종료: 남은 조각을 마지막 줄로 내보내고 다음 단계를 마무리합니다.
    pub fn finish(&mut self) -> Result<(), PipelineError> {
        if !self.pending.is_empty() {
            let line = self.pending.split().freeze();
            self.scanned = 0;
            tracing::debug!(len = line.len(), "flushing unterminated final line");
            self.emit(line)?;
        }
        self.downstream.finish()
    }

    /// 지금까지 내보낸 줄 수
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// 줄바꿈을 기다리는 바이트 수
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 다음 단계 참조
    pub fn get_ref(&self) -> &H {
        &self.downstream
    }

    /// 다음 단계 가변 참조
    pub fn get_mut(&mut self) -> &mut H {
        &mut self.downstream
    }

    fn emit(&mut self, line: Bytes) -> Result<(), PipelineError> {
        self.lines += 1;
        counter!(m::LINES_READ_TOTAL).increment(1);
        self.downstream.feed(line)
    }
}
