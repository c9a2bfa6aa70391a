use std::env;
use std::process::Command;

fn main() {
    let version = env::var("CARGO_PKG_VERSION").unwrap();
    let profile = env::var("PROFILE").unwrap();

    // Release builds carry the plain package version; dev builds are tagged
    // with the commit they were built from.
    let full_version = if profile == "release" {
        version
    } else {
        let hash = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".into());
        let suffix = if worktree_dirty() { ".dirty" } else { "" };
        format!("{}-dev+{}{}", version, hash, suffix)
    };

    println!("cargo:rustc-env=OFFLINE_BUILDER_VERSION={}", full_version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn worktree_dirty() -> bool {
    git(&["status", "--porcelain", "--untracked-files=no"])
        .map(|status| !status.is_empty())
        .unwrap_or(false)
}
