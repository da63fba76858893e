//! IIE (Iterative Inclusion-Exclusion) 규칙 엔진
//!
//! 순서가 있는 포함/제외 규칙 목록을 결정 그래프로 엮어
//! 메시지 하나에 대한 포함 여부를 판정합니다.
//!
//! # 판정 의미
//! 규칙을 앞에서부터 순서대로 적용하되, 현재 판정이 이미 규칙이 주장하는 값과 같으면
//! 그 규칙은 건너뜁니다 (패턴 평가도 하지 않음). 패턴이 매칭되면 판정이 규칙의 값으로 바뀝니다.
//! 아무 규칙도 매칭되지 않으면 첫 규칙의 반대 값이 기본 판정입니다.
//!
//! # 그래프 구조
//! 각 규칙 노드는 두 개의 후속 인덱스를 가집니다.
//! - `on_miss`: 매칭 실패 시 (판정 유지) 다음으로 평가할 같은 종류의 규칙
//! - `on_match`: 매칭 성공 시 (판정 반전) 다음으로 평가할 반대 종류의 규칙
//!
//! 규칙을 추가할 때마다 같은 종류의 꼬리(`on_miss`)와, 아직 `on_match`가 비어 있는
//! 반대 종류 규칙들을 새 규칙에 연결합니다. 따라서 평가 횟수는 판정을 바꿀 수 있는
//! 규칙 수에 비례합니다.
//!
//! ```
//! use kmsieve_pipeline::rule::{IieEngine, Rule};
//!
//! let mut engine = IieEngine::new();
//! engine.push(Rule::parse("e /foo/").unwrap());
//! engine.push(Rule::parse("i /foobar/").unwrap());
//!
//! assert!(!engine.include(b"a foo"));
//! assert!(engine.include(b"a foobar"));
//! assert!(engine.include(b"a bar"));
//! ```

pub mod loader;
pub mod types;

pub use loader::RuleLoader;
pub use types::{Rule, RuleKind, RuleParseError};

use metrics::counter;
use serde::Serialize;

use kmsieve_core::metrics as m;

/// 그래프 노드 — 규칙과 두 후속 인덱스
#[derive(Debug, Clone)]
struct Node {
    rule: Rule,
    on_match: Option<usize>,
    on_miss: Option<usize>,
}

/// 판정 추적 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trace {
    /// 최종 판정 (`true` = 포함)
    pub included: bool,
    /// 패턴이 평가된 규칙 인덱스 (평가 순서)
    pub evaluated: Vec<usize>,
    /// 판정을 뒤집은 규칙 인덱스
    pub flipped: Vec<usize>,
}

/// IIE 규칙 엔진
///
/// 시작 시 한 번 구성되고 이후 읽기 전용입니다.
#[derive(Debug, Clone, Default)]
pub struct IieEngine {
    nodes: Vec<Node>,
    /// 종류별 마지막 규칙 (`RuleKind::index()`로 인덱싱)
    tails: [Option<usize>; 2],
    /// `on_match`가 아직 연결되지 않은 규칙들 (종류별)
    pending_flip: [Vec<usize>; 2],
}

impl IieEngine {
    /// 규칙이 없는 엔진을 생성합니다. 모든 메시지를 포함합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 규칙 목록으로 엔진을 구성합니다.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut engine = Self::new();
        for rule in rules {
            engine.push(rule);
        }
        engine
    }

    /// 규칙을 체인 끝에 추가하고 후속 링크를 갱신합니다.
    pub fn push(&mut self, rule: Rule) {
        let idx = self.nodes.len();
        let kind = rule.kind();

        if let Some(tail) = self.tails[kind.index()] {
            self.nodes[tail].on_miss = Some(idx);
        }
        self.tails[kind.index()] = Some(idx);

        // 반대 종류 규칙이 매칭된 뒤에는 이 규칙이 다음 후보
        let waiting = std::mem::take(&mut self.pending_flip[kind.opposite().index()]);
        for w in waiting {
            self.nodes[w].on_match = Some(idx);
        }
        self.pending_flip[kind.index()].push(idx);

        self.nodes.push(Node {
            rule,
            on_match: None,
            on_miss: None,
        });
    }

    /// 규칙 수
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 규칙이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 등록된 규칙 (추가 순서)
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.nodes.iter().map(|n| &n.rule)
    }

    /// 아무 규칙도 매칭되지 않았을 때의 판정
    pub fn default_decision(&self) -> bool {
        self.nodes
            .first()
            .is_none_or(|head| !head.rule.kind().effect())
    }

    /// 메시지 텍스트를 포함해야 하는지 판정합니다.
    pub fn include(&self, text: &[u8]) -> bool {
        let mut state = self.default_decision();
        let mut cur = self.head();
        let mut evaluations = 0u64;

        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            debug_assert_ne!(state, node.rule.kind().effect());
            evaluations += 1;
            if node.rule.is_match(text) {
                state = node.rule.kind().effect();
                cur = node.on_match;
            } else {
                cur = node.on_miss;
            }
        }

        counter!(m::RULE_EVALUATIONS_TOTAL).increment(evaluations);
        state
    }

    /// `include`와 같은 경로를 따라가며 평가/반전된 규칙을 기록합니다.
    pub fn trace(&self, text: &[u8]) -> Trace {
        let mut trace = Trace {
            included: self.default_decision(),
            evaluated: Vec::new(),
            flipped: Vec::new(),
        };
        let mut cur = self.head();

        while let Some(idx) = cur {
            let node = &self.nodes[idx];
            trace.evaluated.push(idx);
            if node.rule.is_match(text) {
                trace.included = node.rule.kind().effect();
                trace.flipped.push(idx);
                cur = node.on_match;
            } else {
                cur = node.on_miss;
            }
        }

        trace
    }

    fn head(&self) -> Option<usize> {
        if self.nodes.is_empty() { None } else { Some(0) }
    }
}
