//! Build identification shared by both service binaries
//!
//! Exposes `GIT_HASH`, `BUILD_TIMESTAMP` and `BUILD_PROFILE` to the crate
//! being built; tfeed-fr points its `build` key at this file.

use std::process::Command;

/// Trimmed stdout of a successful command
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    Some(text.trim().to_owned())
}

fn emit(key: &str, value: &str) {
    println!("cargo:rustc-env={}={}", key, value);
}

fn main() {
    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"])
        .unwrap_or_else(|| "unknown".into());
    let built_at = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".into());

    emit("GIT_HASH", &git_hash);
    emit("BUILD_TIMESTAMP", &built_at);
    emit("BUILD_PROFILE", &profile);
}
