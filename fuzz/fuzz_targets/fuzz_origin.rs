#![no_main]

use arbitrary::Arbitrary;
use keepkey_core::Origin;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    scheme: u8,
    host: String,
    port: Option<u16>,
    rest: String,
    raw: String,
}

const SCHEMES: [&str; 4] = ["http", "https", "chrome-extension", "file"];

fn check(value: &str) {
    if let Ok(origin) = Origin::parse(value) {
        // Normalized origins carry no path, query or fragment
        let after_scheme = origin.as_str().split_once("://").map(|(_, r)| r).unwrap();
        assert!(!after_scheme.contains('/'));
        assert!(!after_scheme.contains('?'));
        assert!(!after_scheme.contains('#'));

        // Normalization is idempotent
        let again = Origin::parse(origin.as_str()).unwrap();
        assert_eq!(origin, again);
    }
}

fuzz_target!(|input: Input| {
    // Header values as received
    check(&input.raw);

    // Referer-shaped values
    let scheme = SCHEMES[input.scheme as usize % SCHEMES.len()];
    let value = match input.port {
        Some(port) => format!("{}://{}:{}/{}", scheme, input.host, port, input.rest),
        None => format!("{}://{}/{}", scheme, input.host, input.rest),
    };
    check(&value);
});
