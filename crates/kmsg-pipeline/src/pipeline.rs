//! 파이프라인 조립
//!
//! [`KmsgPipeline`]은 프레이머 → 재처리 스킵퍼 → 포워더를 한 줄로 엮은 것입니다.
//! 모든 처리는 `push()`를 호출한 스레드에서 동기적으로 끝납니다.
//!
//! # 사용 예시
//! ```no_run
//! # fn example() -> Result<(), kmsieve_pipeline::PipelineError> {
//! use kmsieve_pipeline::{CheckpointStore, KmsgPipelineBuilder, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let checkpoint = CheckpointStore::open(&config.checkpoint_path)?;
//! let dump = config.open_dump()?.map(|(_, file)| file);
//! let mut pipeline = KmsgPipelineBuilder::new()
//!     .config(config)
//!     .checkpoint(checkpoint)
//!     .keep_sink(std::io::stdout())
//!     .dump_sink(dump)
//!     .build()?;
//!
//! pipeline.push(b"6,0,0,-;hello\n")?;
//! let stats = pipeline.finish()?;
//! # Ok(())
//! # }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::forwarder::Forwarder;
use crate::framer::Framer;
use crate::replay::ReplaySkipper;
use crate::rule::IieEngine;
use crate::sink::{DumpFile, Sinks};

/// 파이프라인 누적 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// 프레이머가 내보낸 줄
    pub lines_read: u64,
    /// 체크포인트 이전이라 건너뛴 줄
    pub replay_skipped: u64,
    /// keep 싱크로 보낸 줄
    pub kept: u64,
    /// dump 싱크로 보낸 줄
    pub dumped: u64,
    /// dump 싱크 없이 버린 줄
    pub discarded: u64,
    /// 첫 줄 없이 도착해 버린 연속 줄
    pub orphaned: u64,
    /// 시퀀스 불연속 횟수
    pub sequence_gaps: u64,
    /// 현재 체크포인트 값
    pub checkpoint: u64,
}

type Chain<K, D> = Framer<ReplaySkipper<Forwarder<K, D>>>;

/// 조립된 kmsg 파이프라인
#[derive(Debug)]
pub struct KmsgPipeline<K, D = DumpFile> {
    chain: Chain<K, D>,
}

impl<K: Write, D: Write> KmsgPipeline<K, D> {
    /// 장치에서 읽은 청크를 처리합니다.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), PipelineError> {
        self.chain.push(chunk)
    }

    /// 스트림 종료: 남은 조각과 보류 중인 메시지를 내보내고 통계를 반환합니다.
    pub fn finish(&mut self) -> Result<PipelineStats, PipelineError> {
        self.chain.finish()?;
        let stats = self.stats();
        tracing::info!(
            lines_read = stats.lines_read,
            replay_skipped = stats.replay_skipped,
            kept = stats.kept,
            dumped = stats.dumped,
            discarded = stats.discarded,
            orphaned = stats.orphaned,
            sequence_gaps = stats.sequence_gaps,
            checkpoint = stats.checkpoint,
            "pipeline finished"
        );
        Ok(stats)
    }

    /// 현재까지의 통계
    pub fn stats(&self) -> PipelineStats {
        let skipper = self.chain.get_ref();
        let forwarder = skipper.get_ref();
        let counts = forwarder.sink_counts();
        PipelineStats {
            lines_read: self.chain.lines(),
            replay_skipped: skipper.skipped(),
            kept: counts.kept,
            dumped: counts.dumped,
            discarded: counts.discarded,
            orphaned: forwarder.orphaned(),
            sequence_gaps: skipper.gaps() + forwarder.gaps(),
            checkpoint: forwarder.checkpoint().value(),
        }
    }

    /// 아직 체크포인트를 따라잡는 중인지 확인합니다.
    pub fn is_replaying(&self) -> bool {
        self.chain.get_ref().is_skipping()
    }

    /// 포워더 참조 (싱크 내용 확인 등)
    pub fn forwarder(&self) -> &Forwarder<K, D> {
        self.chain.get_ref().get_ref()
    }
}

/// 파이프라인 빌더
pub struct KmsgPipelineBuilder<K, D = DumpFile> {
    config: PipelineConfig,
    engine: Option<IieEngine>,
    checkpoint: Option<CheckpointStore>,
    keep: Option<K>,
    dump: Option<D>,
}

impl<K: Write, D: Write> KmsgPipelineBuilder<K, D> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            engine: None,
            checkpoint: None,
            keep: None,
            dump: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 규칙 엔진을 지정합니다. 지정하지 않으면 모든 줄을 통과시킵니다.
    pub fn engine(mut self, engine: Option<IieEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// 열린 체크포인트 저장소를 지정합니다 (필수).
    pub fn checkpoint(mut self, checkpoint: CheckpointStore) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// keep 싱크를 지정합니다 (필수).
    pub fn keep_sink(mut self, keep: K) -> Self {
        self.keep = Some(keep);
        self
    }

    /// dump 싱크를 지정합니다.
    pub fn dump_sink(mut self, dump: Option<D>) -> Self {
        self.dump = dump;
        self
    }

    /// 파이프라인을 빌드합니다.
    ///
    /// # Errors
    /// 체크포인트나 keep 싱크가 지정되지 않은 경우
    pub fn build(self) -> Result<KmsgPipeline<K, D>, PipelineError> {
        let checkpoint = self.checkpoint.ok_or_else(|| PipelineError::Config {
            field: "checkpoint".to_owned(),
            reason: "checkpoint store is required".to_owned(),
        })?;
        let keep = self.keep.ok_or_else(|| PipelineError::Config {
            field: "keep_sink".to_owned(),
            reason: "keep sink is required".to_owned(),
        })?;

        let target = checkpoint.value();
        let forwarder = Forwarder::new(
            self.config.mode,
            self.engine,
            checkpoint,
            Sinks::new(keep, self.dump),
        );
        if forwarder.is_pass_through() {
            tracing::info!("no filter rules, forwarding every message");
        }

        tracing::debug!(mode = %self.config.mode, checkpoint = target, "pipeline built");

        Ok(KmsgPipeline {
            chain: Framer::new(ReplaySkipper::new(target, forwarder)),
        })
    }
}

impl<K: Write, D: Write> Default for KmsgPipelineBuilder<K, D> {
    fn default() -> Self {
        Self::new()
    }
}
