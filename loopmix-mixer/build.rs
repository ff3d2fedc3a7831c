//! Stamps the `loopmix` binary with its build identity
//!
//! `main.rs` prints these in the startup banner via `env!`.

use std::process::Command;

/// `git describe` output for the checkout, or "unknown" outside a repository
fn describe_checkout() -> String {
    Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn main() {
    let stamps = [
        ("LOOPMIX_GIT_HASH", describe_checkout()),
        (
            "LOOPMIX_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
        (
            "LOOPMIX_BUILD_PROFILE",
            std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_owned()),
        ),
    ];
    for (key, value) in stamps {
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../.git/HEAD");
}
