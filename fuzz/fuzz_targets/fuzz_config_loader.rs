#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse, fail validation, or yield a
// config whose limits are ordered.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = soarm_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        for [min, max] in cfg.limits.joint_limits {
            assert!(min <= max);
        }
    }
});
