#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: 규칙 파싱, IIE 결정 그래프 엔진, 규칙 파일 로더
//! - [`record`]: kmsg 줄 분류 및 시퀀스 번호 파싱
//! - [`framer`]: 바이트 청크를 줄로 재조립 ([`LineHandler`] 단계 trait)
//! - [`checkpoint`]: 시퀀스 번호 체크포인트 영속화
//! - [`replay`]: 재시작 시 체크포인트 이전 레코드 건너뛰기
//! - [`forwarder`]: 판정 및 keep/dump 라우팅 (첫 줄 / 전체 메시지 모드)
//! - [`sink`]: keep/dump 싱크
//! - [`pipeline`]: 전체 조립 및 통계
//! - [`config`]: 파이프라인 설정 (core 설정에서 변환)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! chunks -> Framer -> ReplaySkipper -> Forwarder -> keep sink (stdout)
//!                         |              |   |
//!                    checkpoint N    IieEngine  +-> dump sink (optional)
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod framer;
pub mod pipeline;
pub mod record;
pub mod replay;
pub mod rule;
pub mod sink;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{KmsgPipeline, KmsgPipelineBuilder, PipelineStats};

// 설정
pub use config::PipelineConfig;

// 에러
pub use error::PipelineError;

// 규칙 엔진
pub use rule::{IieEngine, Rule, RuleKind, RuleLoader, Trace};

// 단계
pub use checkpoint::CheckpointStore;
pub use forwarder::Forwarder;
pub use framer::{Framer, LineHandler};
pub use replay::ReplaySkipper;
pub use sink::{DumpFile, Sinks, open_dump_file};
