//! Drives the `rusket-mf` binary end to end.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rusket-mf"))
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to spawn rusket-mf")
}

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("y.txt"), "5 3\n4 2\n").unwrap();
    fs::write(dir.path().join("r.txt"), "1 1\n1 1\n").unwrap();
    dir
}

const DATA: [&str; 4] = ["--width", "2", "--params-dir", "params"];

#[test]
fn test_train_prints_time_then_cost() {
    let dir = setup();
    let mut args = vec!["train", "-k", "2", "--iterations", "20", "--learning-rate", "0.01"];
    args.extend(DATA);
    let out = run(dir.path(), &args);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    let parts: Vec<&str> = lines[0].split(':').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[1].len(), 2);
    assert_eq!(parts[2].len(), 2);
    let cost: f64 = lines[1].parse().unwrap();
    assert!(cost > 0.0 && cost < 27.0);

    assert!(dir.path().join("params/w.param").exists());
    assert!(dir.path().join("params/x.param").exists());
    assert!(dir.path().join("params/b.param").exists());

    // `cost` reports the persisted state without training
    let mut args = vec!["cost", "-k", "2"];
    args.extend(DATA);
    let out = run(dir.path(), &args);
    assert!(out.status.success());
    let reported: f64 = String::from_utf8(out.stdout).unwrap().trim().parse().unwrap();
    assert!((reported - cost).abs() < 1e-6 * cost);
}

#[test]
fn test_reset_then_predict_uses_initial_values() {
    let dir = setup();
    let mut args = vec!["train", "-k", "2", "--iterations", "5"];
    args.extend(DATA);
    assert!(run(dir.path(), &args).status.success());

    let out = run(dir.path(), &["reset", "--params-dir", "params"]);
    assert!(out.status.success());
    assert!(!dir.path().join("params/w.param").exists());

    let mut args = vec!["predict", "-k", "2", "--user", "1", "--item", "0"];
    args.extend(DATA);
    let out = run(dir.path(), &args);
    assert!(out.status.success());
    let predicted: f32 = String::from_utf8(out.stdout).unwrap().trim().parse().unwrap();
    assert_eq!(predicted, 0.0);
}

#[test]
fn test_config_file_and_errors() {
    let dir = setup();
    fs::write(
        dir.path().join("mf.toml"),
        "[data]\nwidth = 2\n\n[train]\nfeatures = 2\nmax_iterations = 3\n\n[storage]\ndir = \"p\"\n",
    )
    .unwrap();
    let out = run(dir.path(), &["--config", "mf.toml", "train", "--fresh"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(dir.path().join("p/w.param").exists());

    let out = run(dir.path(), &["train", "--ratings", "missing.txt", "--width", "2"]);
    assert!(!out.status.success());

    let out = run(dir.path(), &["predict", "--width", "2", "--user", "9", "--item", "0"]);
    assert!(!out.status.success());
}

#[test]
fn test_verbose_table_rows_follow_updates() {
    let dir = setup();
    let mut args = vec!["train", "-k", "2", "-i", "3", "-v"];
    args.extend(DATA);
    let out = run(dir.path(), &args);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout).unwrap();
    let rows: Vec<(usize, f64)> = stdout
        .lines()
        .filter_map(|line| {
            let mut cols = line.split('|').map(str::trim);
            let label = cols.next()?.parse().ok()?;
            let cost = cols.next()?.parse().ok()?;
            Some((label, cost))
        })
        .collect();
    let labels: Vec<usize> = rows.iter().map(|&(l, _)| l).collect();
    assert_eq!(labels, vec![0, 1, 2, 3], "{stdout}");
    assert!((rows[0].1 - 28.0).abs() < 1e-6);

    // the last table row is the reported final cost
    let final_cost: f64 = stdout.lines().last().unwrap().parse().unwrap();
    assert!((rows[3].1 - final_cost).abs() < 1e-5);
    assert!(rows.windows(2).all(|w| w[1].1 < w[0].1));
}

#[test]
fn test_cost_and_predict_infer_feature_count() {
    let dir = setup();
    let mut args = vec!["train", "-k", "2", "-i", "3"];
    args.extend(DATA);
    let out = run(dir.path(), &args);
    assert!(out.status.success());
    let trained: f64 = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .last()
        .unwrap()
        .parse()
        .unwrap();

    let out = run(dir.path(), &["cost", "--width", "2", "--params-dir", "params"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let reported: f64 = String::from_utf8(out.stdout).unwrap().trim().parse().unwrap();
    assert!((reported - trained).abs() < 1e-6 * trained);

    let out = run(
        dir.path(),
        &["predict", "--width", "2", "--params-dir", "params", "--user", "0", "--item", "1"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    // an explicit -k that disagrees with the saved width is still rejected
    let out = run(dir.path(), &["cost", "-k", "3", "--width", "2", "--params-dir", "params"]);
    assert!(!out.status.success());
}
