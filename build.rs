use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

/// `status` prints `BUILD_ID` so field reports can be matched to a binary.
fn main() {
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let built_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();

    println!("cargo:rustc-env=BUILD_ID={version}+{built_at}");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
