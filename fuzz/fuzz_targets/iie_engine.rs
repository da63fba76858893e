#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use kmsieve_pipeline::{IieEngine, Rule, RuleKind};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 규칙 목록 (최대 16개로 제한)
    rules: Vec<FuzzRule>,
    /// 판정 대상 메시지
    text: Vec<u8>,
}

#[derive(Arbitrary, Debug)]
struct FuzzRule {
    include: bool,
    pattern: String,
}

fuzz_target!(|input: FuzzInput| {
    let rules: Vec<Rule> = input
        .rules
        .iter()
        .take(16)
        .filter_map(|r| {
            let kind = if r.include {
                RuleKind::Include
            } else {
                RuleKind::Exclude
            };
            Rule::new(kind, &r.pattern).ok()
        })
        .collect();

    let engine = IieEngine::from_rules(rules.iter().cloned());

    // 규칙을 순서대로 훑는 참조 판정: 현재 판정을 뒤집을 수 있는 규칙만 평가
    let mut expected = rules.first().is_none_or(|r| !r.kind().effect());
    for rule in &rules {
        if expected != rule.kind().effect() && rule.is_match(&input.text) {
            expected = rule.kind().effect();
        }
    }

    let included = engine.include(&input.text);
    assert_eq!(included, expected);

    let trace = engine.trace(&input.text);
    assert_eq!(trace.included, included);
    assert!(trace.flipped.iter().all(|i| trace.evaluated.contains(i)));
});
