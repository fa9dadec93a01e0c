//! Bakes build metadata into the `hello` info block.
//!
//! Values already present in the environment win, so a release pipeline
//! can pin them. Anything git cannot answer (no repository, no git on the
//! path) is simply left unset.

use std::env;
use std::path::Path;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    for key in [
        "RESONA_VERSION",
        "RESONA_BUILD_NUMBER",
        "RESONA_RUSTC_VERSION",
        "RESONA_BUILD_TIME",
        "RESONA_COMMIT",
        "RESONA_COMMIT_TIME",
        "RESONA_BRANCH",
    ] {
        println!("cargo:rerun-if-env-changed={key}");
    }
    for path in ["../../.git/HEAD", "../../.git/packed-refs"] {
        if Path::new(path).exists() {
            println!("cargo:rerun-if-changed={path}");
        }
    }

    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    emit("RESONA_RUSTC_VERSION", || {
        run(&rustc, &["--version"]).map(|v| v.trim_start_matches("rustc ").to_string())
    });
    emit("RESONA_BUILD_TIME", || {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis().to_string())
    });
    emit("RESONA_COMMIT", || run("git", &["rev-parse", "--short", "HEAD"]));
    emit("RESONA_COMMIT_TIME", || {
        run("git", &["show", "-s", "--format=%ct", "HEAD"])
            .and_then(|secs| secs.parse::<i64>().ok())
            .map(|secs| (secs * 1000).to_string())
    });
    emit("RESONA_BRANCH", || {
        run("git", &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
    });
}

fn emit(key: &str, value: impl FnOnce() -> Option<String>) {
    if env::var_os(key).is_some() {
        return;
    }
    if let Some(value) = value() {
        println!("cargo:rustc-env={key}={value}");
    }
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
