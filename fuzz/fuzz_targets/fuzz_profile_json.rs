#![no_main]
use libfuzzer_sys::fuzz_target;
use soarm_config::{CalibrationProfile, LegacyTickProfile};

fuzz_target!(|data: &str| {
    // Whatever parses must survive a write/read cycle.
    if let Ok(p) = CalibrationProfile::from_json(data)
        && let Ok(text) = p.to_json_pretty()
    {
        let again = CalibrationProfile::from_json(&text);
        assert!(again.is_ok(), "re-read failed: {text}");
    }
    let _ = LegacyTickProfile::from_json(data);
});
