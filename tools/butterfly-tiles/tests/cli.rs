use std::fs::File;
use std::io::Write;
use std::path::Path;

use assert_cmd::Command;
use butterfly_extract::pbf::{BlockBuilder, PbfWriter, RawNode, RawWay};
use butterfly_geometry::BBox;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_input(path: &Path) {
    let nodes: Vec<RawNode> = [(10.0, 10.0), (10.0, 11.0), (11.0, 11.0), (11.0, 10.0)]
        .iter()
        .enumerate()
        .map(|(i, &(lat, lon))| RawNode::new(i as i64 + 1, lat, lon))
        .collect();
    let mut writer = PbfWriter::new(File::create(path).unwrap(), false);
    writer.write_header(Some(BBox::new(9.0, 12.0, 9.0, 12.0))).unwrap();
    writer.write_block(BlockBuilder::new().dense(&nodes).finish()).unwrap();
    writer
        .write_block(
            BlockBuilder::new()
                .ways(&[RawWay::new(1, &[1, 2, 3, 4, 1]).tag("landuse", "forest")])
                .finish(),
        )
        .unwrap();
}

fn tiles() -> Command {
    Command::cargo_bin("butterfly-tiles").unwrap()
}

#[test]
fn test_cli_help_works() {
    tiles()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("butterfly-tiles"))
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_version_works() {
    tiles()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_convert_then_inspect() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("forest.osm.pbf");
    let output = dir.path().join("tiles");
    write_input(&input);

    tiles()
        .arg("convert")
        .arg(&input)
        .arg(&output)
        .args(["--lods", "0-0-0-0-0-0-0-0-0-0-0-0-0-0-1-2", "--sort", "most", "--line", "vw"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Tiles written"))
        .stdout(predicate::str::contains("LOD 15"));

    assert!(output.join("data14").exists());
    assert!(output.join("lookup15").exists());

    tiles()
        .arg("inspect")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("most-nodes"))
        .stdout(predicate::str::contains("Visvalingam-Whyatt"))
        .stdout(predicate::str::contains("LOD 15: 4 tiles"));
}

#[test]
fn test_config_file_is_overridden_by_flags() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("forest.osm.pbf");
    let output = dir.path().join("tiles");
    write_input(&input);
    let config = dir.path().join("tiles.toml");
    let mut file = File::create(&config).unwrap();
    writeln!(file, "debug_text = true\nsorting = \"subdivide\"").unwrap();

    tiles()
        .arg("convert")
        .arg(&input)
        .arg(&output)
        .arg("--config")
        .arg(&config)
        .args(["--sort", "first"])
        .assert()
        .success();

    assert!(output.join("meta.txt").exists());
    tiles()
        .arg("inspect")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("first-node"));
}

#[test]
fn test_bad_sort_value_suggests_the_closest() {
    tiles()
        .args(["convert", "in.osm.pbf", "out", "--sort", "subdivid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("did you mean 'subdivide'"));
}

#[test]
fn test_missing_input_reports_error() {
    let dir = TempDir::new().unwrap();
    tiles()
        .arg("convert")
        .arg(dir.path().join("absent.osm.pbf"))
        .arg(dir.path().join("tiles"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("❌ Error"));
}

#[test]
fn test_inspect_without_database_fails() {
    let dir = TempDir::new().unwrap();
    tiles().arg("inspect").arg(dir.path()).assert().failure();
}
