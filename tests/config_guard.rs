use regex::Regex;
use std::fs;
use std::path::Path;

/// Fail CI if a config file or .env carries a 64-hex private key. The
/// wallet key must come from the environment at deploy time, never from a
/// committed file.
#[test]
fn no_committed_wallet_keys() {
    let hex_key = Regex::new(r"0x?[a-fA-F0-9]{64}").unwrap();
    let candidates = ["config.toml", "config.prod.toml", "config.dev.toml", ".env"];
    for file in candidates {
        if !Path::new(file).exists() {
            continue;
        }
        let body = fs::read_to_string(file).expect("read config");
        for (idx, line) in body.lines().enumerate() {
            if hex_key.is_match(line) {
                panic!("Secret-looking hex in {} at line {}", file, idx + 1);
            }
            let lowered = line.to_ascii_lowercase();
            if lowered.starts_with("wallet_key") && !lowered.contains("${") {
                panic!(
                    "wallet_key set literally in {} at line {}; use an env reference",
                    file,
                    idx + 1
                );
            }
        }
    }
}
