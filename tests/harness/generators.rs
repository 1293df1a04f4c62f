// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for abuse simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of peer socket addresses, one per client.
pub fn generate_peers(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            format!("{}:{}", IpAddr::V4(Ipv4Addr::new(10, a, b, c)), 50_000 + i % 1000)
        })
        .collect()
}

/// Origins that resemble the allowed one but must not match it.
pub fn lookalike_origins(allowed: &str) -> Vec<String> {
    let host = allowed
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    vec![
        format!("http://{host}"),
        format!("{allowed}/"),
        format!("{allowed}:443"),
        format!("https://www.{host}"),
        format!("https://{host}.evil.example"),
        format!("https://evil-{host}"),
        allowed.to_uppercase(),
        "null".to_string(),
    ]
}

/// Digit-field values that must fail validation for the given length.
pub fn bad_digit_values(len: usize) -> Vec<String> {
    let digits = "9".repeat(len);
    vec![
        "9".repeat(len - 1),
        "9".repeat(len + 1),
        format!(" {}", &digits[1..]),
        format!("{}a", &digits[1..]),
        format!("+{}", &digits[1..]),
        // Non-ASCII digits (Devanagari)
        "\u{0969}".repeat(len),
    ]
}
