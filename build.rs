use std::process::Command;

fn main() {
    // Record build metadata for `--version`
    let build_time = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    println!("cargo:rustc-env=SAT_IMAGER_BUILD_TIME={}", build_time);

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=SAT_IMAGER_GIT_HASH={}", git_hash);

    println!("cargo:rerun-if-changed=.git/HEAD");
}
