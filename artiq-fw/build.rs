//! Embeds the build identification string `IDENT` replies with (S2: must be
//! non-empty ASCII containing `ARTIQ runtime built`). Real ARTIQ stamps this
//! from git describe plus a timestamp; this workspace isn't guaranteed to be
//! a git checkout, so it falls back to `CARGO_PKG_VERSION` when `git` isn't
//! available.

use std::env;
use std::process::Command;

fn main() {
    let git_describe = Command::new("git")
        .args(["describe", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string());

    let revision = git_describe.unwrap_or_else(|| env::var("CARGO_PKG_VERSION").unwrap());
    println!("cargo:rustc-env=ARTIQ_FW_BUILD_IDENT=ARTIQ runtime built {revision}");
    println!("cargo:rerun-if-changed=build.rs");
}
