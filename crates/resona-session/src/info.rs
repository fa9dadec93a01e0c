//! The static info block sent in every `hello`.
//!
//! Build metadata is read from the compile-time environment, which the
//! crate's build script fills from rustc and git. Release
//! pipelines that template these values leave `@placeholder@` text behind
//! when the template is not filled in; such values (and empty ones) are
//! reported as sentinels instead of leaking raw template text to clients.

use resona_protocol::NodeInfo;

use crate::LibraryVersions;

const UNKNOWN: &str = "Unknown";
const UNOFFICIAL: &str = "Unofficial";

/// Assemble the node info block for this build.
pub fn node_info(libraries: &LibraryVersions) -> NodeInfo {
    NodeInfo {
        version: resolve(
            option_env!("RESONA_VERSION").or(Some(env!("CARGO_PKG_VERSION"))),
            UNKNOWN,
        ),
        build: resolve(option_env!("RESONA_BUILD_NUMBER"), UNOFFICIAL),
        host_runtime_version: resolve(option_env!("RESONA_RUSTC_VERSION"), UNKNOWN),
        audio_library_version: resolve(Some(&libraries.audio), UNKNOWN),
        dsp_library_version: resolve(Some(&libraries.dsp), UNKNOWN),
        build_time: timestamp(option_env!("RESONA_BUILD_TIME")),
        commit_time: timestamp(option_env!("RESONA_COMMIT_TIME")),
        commit: known(option_env!("RESONA_COMMIT")).map(str::to_owned),
        branch: known(option_env!("RESONA_BRANCH")).map(str::to_owned),
    }
}

fn known(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && !v.starts_with('@'))
}

fn resolve(value: Option<&str>, sentinel: &str) -> String {
    known(value).unwrap_or(sentinel).to_owned()
}

/// Epoch milliseconds, or `None` for placeholders and garbage.
fn timestamp(value: Option<&str>) -> Option<i64> {
    known(value)?.parse().ok()
}
