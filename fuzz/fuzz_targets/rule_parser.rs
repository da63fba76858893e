#![no_main]

use libfuzzer_sys::fuzz_target;
use kmsieve_pipeline::rule::RuleLoader;
use kmsieve_pipeline::Rule;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        // 파일 단위 파싱과 줄 단위 파싱 모두 패닉 없이 Ok/Err 반환해야 함
        let _ = RuleLoader::parse_str(content, "fuzz/rules");
        for line in content.lines().take(64) {
            if let Ok(rule) = Rule::parse(line) {
                let _ = rule.is_match(line.as_bytes());
            }
        }
    }
});
