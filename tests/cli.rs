use assert_cmd::Command;
use predicates::prelude::*;

fn reelscribe() -> Command {
    let mut cmd = Command::cargo_bin("reelscribe").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_detect_tiktok_short_link() {
    reelscribe()
        .args(["detect", "https://vm.tiktok.com/ZMN123ABC/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Platform: TikTok"))
        .stdout(predicate::str::contains("Content: video"));
}

#[test]
fn test_detect_youtube_is_unsupported() {
    reelscribe()
        .args(["detect", "https://youtube.com/watch?v=1", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""platform": "unsupported""#));
}

#[test]
fn test_detect_normalizes_mobile_instagram() {
    reelscribe()
        .args(["detect", "m.instagram.com/reel/Cx1AbC-9z/?igsh=abc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Normalized: https://www.instagram.com/reel/Cx1AbC-9z/"));
}

#[test]
fn test_platforms_lists_fallbacks() {
    reelscribe()
        .arg("platforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("TikTok (fallback: scraped transcript)"))
        .stdout(predicate::str::contains("Instagram (fallback: none)"));
}

#[test]
fn test_unknown_platform_flag_is_rejected() {
    reelscribe()
        .args(["transcribe", "clip.mp4", "--platform", "myspace"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown platform"));
}

#[test]
fn test_detect_instagram_explore_is_not_a_profile() {
    reelscribe()
        .args(["detect", "https://www.instagram.com/explore/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Content: unknown"));
}
