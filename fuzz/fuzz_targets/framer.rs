#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use kmsieve_pipeline::{Framer, LineHandler, PipelineError};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 스트림 전체 바이트
    stream: Vec<u8>,
    /// 청크 경계 (read() 크기 흉내)
    cuts: Vec<u8>,
}

#[derive(Default)]
struct Collect {
    lines: Vec<Bytes>,
    finished: bool,
}

impl LineHandler for Collect {
    fn feed(&mut self, line: Bytes) -> Result<(), PipelineError> {
        self.lines.push(line);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        self.finished = true;
        Ok(())
    }
}

fuzz_target!(|input: FuzzInput| {
    let mut framer = Framer::new(Collect::default());

    let mut rest = input.stream.as_slice();
    for &cut in &input.cuts {
        if rest.is_empty() {
            break;
        }
        let (chunk, tail) = rest.split_at(usize::from(cut).min(rest.len()));
        framer.push(chunk).expect("collecting handler never fails");
        rest = tail;
    }
    framer.push(rest).expect("collecting handler never fails");
    framer.finish().expect("collecting handler never fails");

    // 청크 경계와 무관하게 줄을 이어 붙이면 원래 스트림이어야 함
    let collected = framer.get_ref();
    assert!(collected.finished);
    let joined: Vec<u8> = collected.lines.iter().flat_map(|l| l.iter().copied()).collect();
    assert_eq!(joined, input.stream);

    // 마지막 줄을 제외한 모든 줄은 줄바꿈으로 끝나고 내부에 줄바꿈이 없음
    for (i, line) in collected.lines.iter().enumerate() {
        let body = line.strip_suffix(b"\n").unwrap_or(line);
        assert!(!body.contains(&b'\n'));
        if i + 1 < collected.lines.len() {
            assert!(line.ends_with(b"\n"));
        }
    }
    assert_eq!(framer.lines(), collected.lines.len() as u64);
});
