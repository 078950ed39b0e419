use assert_cmd::cargo::cargo_bin_cmd;
use lopdf::{dictionary, Object, Stream};
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Write a PDF with one page per `(width, height, rotate)` entry
///
/// A zero width leaves the page without a MediaBox.
fn write_pdf(dir: &Path, name: &str, pages: &[(f32, f32, i64)], title: &str) -> PathBuf {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));

    let kids: Vec<Object> = pages
        .iter()
        .map(|&(width, height, rotate)| {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Rotate" => rotate,
            };
            if width > 0.0 {
                let media_box: Vec<Object> =
                    [0.0, 0.0, width, height].into_iter().map(Object::from).collect();
                page.set("MediaBox", media_box);
            }
            Object::Reference(doc.add_object(page))
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! { "Title" => Object::string_literal(title) });
    doc.trailer.set("Info", info_id);

    let path = dir.join(name);
    doc.save(&path).expect("fixture should be written");
    path
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should contain valid json")
}

#[test]
fn info_emits_stable_json_contract() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_pdf(
        temp.path(),
        "small.pdf",
        &[(612.0, 792.0, 0), (842.0, 595.0, 90)],
        "Quarterly Report",
    );

    let output = cargo_bin_cmd!("pageview")
        .arg("info")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["title"], "Quarterly Report");
    assert_eq!(value["author"], Value::Null);

    let pages = value["pages"].as_array().expect("pages should be an array");
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0]["width"], 612.0);
    assert_eq!(pages[0]["height"], 792.0);
    assert_eq!(pages[1]["rotation"], 90);
    assert_eq!(pages[1]["substituted"], false);
}

#[test]
fn info_substitutes_default_size_for_page_without_media_box() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_pdf(
        temp.path(),
        "no-media-box.pdf",
        &[(300.0, 400.0, 0), (0.0, 0.0, 0)],
        "Partial",
    );

    let output = cargo_bin_cmd!("pageview")
        .arg("info")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page_count"], 2);

    let pages = value["pages"].as_array().expect("pages should be an array");
    assert_eq!(pages[0]["width"], 300.0);
    assert_eq!(pages[0]["substituted"], false);
    assert_eq!(pages[1]["width"], 612.0);
    assert_eq!(pages[1]["height"], 792.0);
    assert_eq!(pages[1]["substituted"], true);
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pageview")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = temp.path().join("invalid.pdf");
    std::fs::write(&file, b"this is not a pdf").expect("fixture should be written");

    cargo_bin_cmd!("pageview")
        .arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = temp.path().join("encrypted-marker.pdf");
    std::fs::write(&file, b"%PDF-1.5\ntrailer << /Encrypt 5 0 R >>\n%%EOF\n")
        .expect("fixture should be written");

    cargo_bin_cmd!("pageview")
        .arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn render_writes_png_at_requested_scale() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "two.pdf", &[(612.0, 792.0, 0), (300.0, 400.0, 0)], "Two");
    let out = temp.path().join("page2.png");

    cargo_bin_cmd!("pageview")
        .arg("render")
        .arg(&file)
        .args(["--page", "2", "--scale", "2", "--out"])
        .arg(&out)
        .assert()
        .success();

    let dimensions = image::image_dimensions(&out).expect("output should be a readable png");
    assert_eq!(dimensions, (600, 800));
}

#[test]
fn render_rejects_page_out_of_range() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "one.pdf", &[(612.0, 792.0, 0)], "One");
    let out = temp.path().join("page.png");

    cargo_bin_cmd!("pageview")
        .arg("render")
        .arg(&file)
        .args(["--page", "3", "--out"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to render page 3"));
    assert!(!out.exists());

    cargo_bin_cmd!("pageview")
        .arg("render")
        .arg(&file)
        .args(["--page", "0", "--out"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("page numbers start at 1"));
}

#[test]
fn simulate_synthetic_renders_visible_pages_at_base_scale() {
    let output = cargo_bin_cmd!("pageview")
        .args(["simulate", "--synthetic", "3", "--width", "612", "--height", "800"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page_count"], 3);
    assert_eq!(value["fit_scale"], 1.0);
    assert_eq!(value["visible_pages"], serde_json::json!([0, 1]));

    let draw = value["draw"].as_array().expect("draw should be an array");
    assert_eq!(draw.len(), 2);
    assert!(draw.iter().all(|command| command["kind"] == "bitmap"));
    assert!(draw.iter().all(|command| command["rendered_scale"] == 2.0));
    assert_eq!(draw[1]["y"], 808.0);
    assert_eq!(value["renders"]["failed"], 0);
}

#[test]
fn simulate_scroll_moves_current_page() {
    let output = cargo_bin_cmd!("pageview")
        .args(["simulate", "--synthetic", "10", "--scroll", "1000"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["scroll_y"], 1000.0);
    assert_eq!(value["current_page"], 1);
}

#[test]
fn simulate_pinch_upgrades_to_next_quality_tier() {
    let output = cargo_bin_cmd!("pageview")
        .args(["simulate", "--synthetic", "4", "--pinch", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["scale"], 3.0);

    let draw = value["draw"].as_array().expect("draw should be an array");
    assert!(!draw.is_empty());
    assert!(draw.iter().all(|command| command["rendered_scale"] == 3.0));
}

#[test]
fn simulate_reads_pdf_files() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "two.pdf", &[(300.0, 400.0, 0), (300.0, 400.0, 0)], "Two");

    let output = cargo_bin_cmd!("pageview")
        .arg("simulate")
        .arg(&file)
        .args(["--width", "600", "--height", "400"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["fit_scale"], 2.0);
}

#[test]
fn simulate_rejects_bad_config() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config = temp.path().join("viewer.toml");
    std::fs::write(&config, "upgrade_threshold = 0.5\n").expect("config should be written");

    cargo_bin_cmd!("pageview")
        .args(["simulate", "--synthetic", "2", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("upgrade_threshold"));
}

#[test]
fn simulate_requires_a_document() {
    cargo_bin_cmd!("pageview").arg("simulate").assert().failure();
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pageview")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
