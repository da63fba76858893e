//! 실시간 판정 및 라우팅 단계
//!
//! 첫 줄마다 체크포인트를 먼저 갱신한 뒤 판정하고 싱크로 보냅니다.
//! 판정 방식은 [`FilterMode`]에 따라 두 가지입니다.
//!
//! - `LeadingLine`: 첫 줄만으로 즉시 판정하고, 연속 줄은 첫 줄의 판정을 따릅니다.
//! - `WholeMessage`: 다음 첫 줄이 오거나 스트림이 끝날 때까지 메시지를 모은 뒤
//!   전체 텍스트로 판정합니다.
//!
//! 규칙 엔진이 없거나 비어 있으면 모든 줄을 keep 싱크로 보내며, 체크포인트는 그대로 전진합니다.

use std::io::Write;

use bytes::Bytes;
use metrics::counter;

use kmsieve_core::config::FilterMode;
use kmsieve_core::metrics as m;

use crate::checkpoint::CheckpointStore;
use crate::error::PipelineError;
use crate::framer::LineHandler;
use crate::record::{LineKind, classify, match_text, parse_sequence};
use crate::rule::IieEngine;
use crate::sink::{SinkCounts, Sinks};

/// 현재 메시지의 판정 상태 (첫 줄 모드)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageState {
    /// 아직 첫 줄을 보지 못함
    Undecided,
    Included,
    Excluded,
}

/// 판정 및 라우팅 단계
#[derive(Debug)]
pub struct Forwarder<K, D> {
    mode: FilterMode,
    engine: Option<IieEngine>,
    checkpoint: CheckpointStore,
    sinks: Sinks<K, D>,
    last_seq: Option<u64>,
    state: MessageState,
    /// 전체 메시지 모드에서 모으는 중인 줄
    message: Vec<Bytes>,
    /// 전체 메시지 텍스트 조립용 버퍼
    scratch: Vec<u8>,
    orphaned: u64,
    gaps: u64,
}

impl<K: Write, D: Write> Forwarder<K, D> {
    /// 새 단계를 생성합니다.
    ///
    /// 시퀀스 카운터는 체크포인트 값 - 1에서 시작합니다.
    pub fn new(
        mode: FilterMode,
        engine: Option<IieEngine>,
        checkpoint: CheckpointStore,
        sinks: Sinks<K, D>,
    ) -> Self {
        // 규칙이 없으면 엔진을 아예 부르지 않음
        let engine = engine.filter(|e| !e.is_empty());
        let last_seq = checkpoint.value().checked_sub(1);
        Self {
            mode,
            engine,
            checkpoint,
            sinks,
            last_seq,
            state: MessageState::Undecided,
            message: Vec::new(),
            scratch: Vec::new(),
            orphaned: 0,
            gaps: 0,
        }
    }

    /// 규칙 없이 모든 줄을 통과시키는지 확인합니다.
    pub fn is_pass_through(&self) -> bool {
        self.engine.is_none()
    }

    /// 체크포인트 저장소
    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// 싱크별 누적 줄 수
    pub fn sink_counts(&self) -> SinkCounts {
        self.sinks.counts()
    }

    /// 첫 줄 없이 도착해 버린 연속 줄 수
    pub fn orphaned(&self) -> u64 {
        self.orphaned
    }

    /// 감지한 시퀀스 불연속 횟수
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// 싱크 참조
    pub fn sinks(&self) -> &Sinks<K, D> {
        &self.sinks
    }

    fn decide(&self, text: &[u8]) -> bool {
        match &self.engine {
            Some(engine) => engine.include(text),
            None => true,
        }
    }

    /// 첫 줄의 시퀀스 번호를 확인하고 체크포인트를 갱신합니다.
    fn observe_sequence(&mut self, line: &[u8]) -> Result<(), PipelineError> {
        let Some(seq) = parse_sequence(line) else {
            tracing::warn!(
                line = %String::from_utf8_lossy(line).trim_end(),
                "cannot parse sequence number, checkpoint not advanced"
            );
            return Ok(());
        };

        if let Some(prev) = self.last_seq {
            if prev.checked_add(1) != Some(seq) {
                self.gaps += 1;
                counter!(m::SEQUENCE_GAPS_TOTAL).increment(1);
                tracing::warn!(
                    expected = prev.saturating_add(1),
                    got = seq,
                    "sequence gap, kernel ring buffer may have been overwritten"
                );
            }
        }
        self.last_seq = Some(seq);
        self.checkpoint.update(seq)
    }

    fn orphan(&mut self, line: &[u8]) {
        self.orphaned += 1;
        counter!(m::LINES_ORPHANED_TOTAL).increment(1);
        tracing::warn!(
            line = %String::from_utf8_lossy(line).trim_end(),
            "dropping continuation line without a primary line"
        );
    }

    fn feed_leading_line(&mut self, line: Bytes) -> Result<(), PipelineError> {
        match classify(&line) {
            LineKind::Primary => {
                self.observe_sequence(&line)?;
                let included = self.decide(match_text(&line));
                self.state = if included {
                    MessageState::Included
                } else {
                    MessageState::Excluded
                };
                tracing::trace!(included, "routing message");
                self.sinks.route(included, &line)
            }
            LineKind::Continuation => match self.state {
                MessageState::Undecided => {
                    self.orphan(&line);
                    Ok(())
                }
                MessageState::Included => self.sinks.keep(&line),
                MessageState::Excluded => self.sinks.dump(&line),
            },
        }
    }

    fn feed_whole_message(&mut self, line: Bytes) -> Result<(), PipelineError> {
        match classify(&line) {
            LineKind::Primary => {
                // 이전 메시지를 먼저 내보낸 뒤 새 시퀀스 번호를 기록
                self.flush_message()?;
                self.observe_sequence(&line)?;
                self.message.push(line);
                Ok(())
            }
            LineKind::Continuation if self.message.is_empty() => {
                self.orphan(&line);
                Ok(())
            }
            LineKind::Continuation => {
                self.message.push(line);
                Ok(())
            }
        }
    }

    /// 모아둔 메시지 전체를 판정하고 내보냅니다.
    fn flush_message(&mut self) -> Result<(), PipelineError> {
        if self.message.is_empty() {
            return Ok(());
        }

        let included = match &self.engine {
            Some(engine) => {
                self.scratch.clear();
                for line in &self.message {
                    self.scratch.extend_from_slice(line);
                }
                engine.include(match_text(&self.scratch))
            }
            None => true,
        };
        tracing::trace!(included, lines = self.message.len(), "routing message");

        let message = std::mem::take(&mut self.message);
        for line in &message {
            self.sinks.route(included, line)?;
        }
        // 버퍼 용량 재사용
        self.message = message;
        self.message.clear();
        Ok(())
    }
}

impl<K: Write, D: Write> LineHandler for Forwarder<K, D> {
    fn feed(&mut self, line: Bytes) -> Result<(), PipelineError> {
        match self.mode {
            FilterMode::LeadingLine => self.feed_leading_line(line),
            FilterMode::WholeMessage => self.feed_whole_message(line),
        }
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        self.flush_message()?;
        self.sinks.flush()?;
        // 마지막 메시지까지 끝났으므로 다음에 기대하는 번호로 전진
        if let Some(last) = self.last_seq {
            self.checkpoint.update(last.saturating_add(1))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleLoader;
    use tempfile::TempDir;

    type TestForwarder = Forwarder<Vec<u8>, Vec<u8>>;

    fn forwarder(mode: FilterMode, rules: Option<&str>, dump: bool) -> (TempDir, TestForwarder) {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = CheckpointStore::open(dir.path().join("checkpoint")).unwrap();
        let engine = rules.map(|r| RuleLoader::parse_str(r, "<test>").unwrap());
        let sinks = Sinks::new(Vec::new(), dump.then(Vec::new));
        (dir, Forwarder::new(mode, engine, checkpoint, sinks))
    }

    fn feed(fw: &mut TestForwarder, lines: &[&str]) {
        for line in lines {
            fw.feed(Bytes::copy_from_slice(line.as_bytes())).unwrap();
        }
    }

    fn kept(fw: &TestForwarder) -> String {
        String::from_utf8(fw.sinks().keep_ref().clone()).unwrap()
    }

    fn dumped(fw: &TestForwarder) -> String {
        String::from_utf8(fw.sinks().dump_ref().cloned().unwrap_or_default()).unwrap()
    }

    #[test]
    fn leading_line_routes_continuations_with_primary() {
        let (_dir, mut fw) = forwarder(FilterMode::LeadingLine, Some("e /usb/\n"), true);
        feed(
            &mut fw,
            &[
                "6,1,0,-;usb 1-1: attached\n",
                " SUBSYSTEM=usb\n",
                "6,2,0,-;eth0: link up\n",
                " SUBSYSTEM=net\n",
            ],
        );
        assert_eq!(kept(&fw), "6,2,0,-;eth0: link up\n SUBSYSTEM=net\n");
        assert_eq!(dumped(&fw), "6,1,0,-;usb 1-1: attached\n SUBSYSTEM=usb\n");
    }

    #[test]
    fn leading_line_ignores_continuation_content() {
        let (_dir, mut fw) = forwarder(FilterMode::LeadingLine, Some("e /bar/\n"), false);
        feed(&mut fw, &["6,1,0,-;foo\n", " KEY=bar\n"]);
        assert_eq!(kept(&fw), "6,1,0,-;foo\n KEY=bar\n");
    }

    #[test]
    fn excluded_lines_without_dump_are_discarded() {
        let (_dir, mut fw) = forwarder(FilterMode::LeadingLine, Some("e /noise/\n"), false);
        feed(&mut fw, &["6,1,0,-;noise\n", " K=v\n"]);
        assert_eq!(kept(&fw), "");
        assert_eq!(fw.sink_counts().discarded, 2);
    }

    #[test]
    fn orphan_continuations_are_dropped() {
        for mode in [FilterMode::LeadingLine, FilterMode::WholeMessage] {
            let (_dir, mut fw) = forwarder(mode, None, true);
            feed(&mut fw, &[" ORPHAN=1\n", "6,1,0,-;msg\n"]);
            fw.finish().unwrap();
            assert_eq!(kept(&fw), "6,1,0,-;msg\n");
            assert_eq!(fw.orphaned(), 1);
        }
    }

    #[test]
    fn whole_message_matches_continuation_text() {
        let (_dir, mut fw) = forwarder(FilterMode::WholeMessage, Some("e /bar/\n"), true);
        feed(&mut fw, &["6,1,0,-;foo\n", " KEY=bar\n"]);
        // 다음 첫 줄이 오기 전까지 보류
        assert_eq!(fw.sink_counts(), SinkCounts::default());

        feed(&mut fw, &["6,2,0,-;plain\n"]);
        assert_eq!(dumped(&fw), "6,1,0,-;foo\n KEY=bar\n");
        assert_eq!(kept(&fw), "");

        fw.finish().unwrap();
        assert_eq!(kept(&fw), "6,2,0,-;plain\n");
    }

    #[test]
    fn whole_message_pattern_can_span_lines() {
        let (_dir, mut fw) = forwarder(FilterMode::WholeMessage, Some("e /foo\\n KEY/\n"), true);
        feed(&mut fw, &["6,1,0,-;foo\n", " KEY=1\n"]);
        fw.finish().unwrap();
        assert_eq!(kept(&fw), "");
        assert_eq!(fw.sink_counts().dumped, 2);
    }

    #[test]
    fn checkpoint_tracks_message_in_progress_and_advances_on_finish() {
        let (dir, mut fw) = forwarder(FilterMode::LeadingLine, None, false);
        feed(&mut fw, &["6,0,0,-;a\n", "6,1,0,-;b\n", "6,2,0,-;c\n"]);
        assert_eq!(fw.checkpoint().value(), 2);

        fw.finish().unwrap();
        assert_eq!(fw.checkpoint().value(), 3);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("checkpoint")).unwrap(),
            "3"
        );
    }

    #[test]
    fn whole_message_checkpoint_follows_new_primary() {
        let (_dir, mut fw) = forwarder(FilterMode::WholeMessage, None, false);
        feed(&mut fw, &["6,7,0,-;a\n", " K=v\n", "6,8,0,-;b\n"]);
        assert_eq!(fw.checkpoint().value(), 8);
        assert_eq!(kept(&fw), "6,7,0,-;a\n K=v\n");
    }

    #[test]
    fn empty_rule_set_passes_through() {
        let (_dir, mut fw) = forwarder(FilterMode::LeadingLine, Some("# only comments\n"), true);
        assert!(fw.is_pass_through());
        feed(&mut fw, &["6,0,0,-;x\n", " K=v\n", "6,1,0,-;y\n"]);
        fw.finish().unwrap();
        assert_eq!(kept(&fw), "6,0,0,-;x\n K=v\n6,1,0,-;y\n");
        assert_eq!(fw.checkpoint().value(), 2);
    }

    #[test]
    fn unparseable_primary_is_routed_without_checkpoint() {
        let (_dir, mut fw) = forwarder(FilterMode::LeadingLine, None, false);
        feed(&mut fw, &["6,4,0,-;a\n", "truncated\n"]);
        assert_eq!(fw.checkpoint().value(), 4);
        assert_eq!(kept(&fw), "6,4,0,-;a\ntruncated\n");
    }

    #[test]
    fn gap_against_seeded_counter_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");
        CheckpointStore::overwrite(&path, 10).unwrap();
        let checkpoint = CheckpointStore::open(&path).unwrap();
        let sinks: Sinks<Vec<u8>, Vec<u8>> = Sinks::new(Vec::new(), None);
        let mut fw = Forwarder::new(FilterMode::LeadingLine, None, checkpoint, sinks);

        feed(&mut fw, &["6,10,0,-;expected\n", "6,13,0,-;jump\n"]);
        assert_eq!(fw.gaps(), 1);
    }

    #[test]
    fn finish_without_messages_keeps_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint");
        CheckpointStore::overwrite(&path, 5).unwrap();
        let checkpoint = CheckpointStore::open(&path).unwrap();
        let sinks: Sinks<Vec<u8>, Vec<u8>> = Sinks::new(Vec::new(), None);
        let mut fw = Forwarder::new(FilterMode::WholeMessage, None, checkpoint, sinks);

        fw.finish().unwrap();
        assert_eq!(fw.checkpoint().value(), 5);
    }
}
