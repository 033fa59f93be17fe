#![no_main]
use libfuzzer_sys::fuzz_target;
use parley::config::PiiConfig;
use parley::pii::{redact, PatternDetector};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let config = PiiConfig {
        enabled: true,
        default_threshold: Some(0.5),
        ..PiiConfig::default()
    };
    let (once, _) = redact(text, &PatternDetector::scan(text), &config);
    let (twice, redacted) = redact(&once, &PatternDetector::scan(&once), &config);
    assert_eq!(once, twice);
    assert_eq!(redacted, 0);
});
