mod support;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use support::{FakeApi, TOKEN};

fn harvest_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_harvest"))
}

/// Write token, database credential and config files pointing at `base_url`.
fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("token.txt"), format!("{}\n", TOKEN)).unwrap();
    fs::write(
        root.join("database.txt"),
        format!("sqlite:{}/data/harvest.sqlite\n", root.display()),
    )
    .unwrap();

    let config_content = format!(
        r#"[api]
base_url = "{base}"
marketplace = "wb"
token_file = "{root}/token.txt"
request_delay_ms = 0

[output]
dir = "{root}/out"

[db]
credential_file = "{root}/database.txt"
"#,
        base = base_url,
        root = root.display(),
    );

    let config_path = config_dir.join("harvest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Run the binary off the async runtime so the fake API keeps serving.
async fn run_harvest(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = harvest_binary();
    let config = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let output = tokio::task::spawn_blocking(move || {
        Command::new(&binary)
            .arg("--config")
            .arg(&config)
            .args(&args)
            .output()
            .unwrap_or_else(|e| panic!("Failed to run harvest binary at {:?}: {}", binary, e))
    })
    .await
    .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_category_paginates_and_writes_one_workbook() {
    let api = FakeApi::new(12_000, 0);
    let base = api.clone().spawn().await;
    let (tmp, config_path) = setup_test_env(&base);

    let (stdout, stderr, success) = run_harvest(
        &config_path,
        &[
            "category",
            "Pets/Dogs",
            "--from",
            "2023-03-01",
            "--to",
            "2023-03-31",
        ],
    )
    .await;
    assert!(success, "category failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rows: 12000"), "stdout={}", stdout);
    assert!(stdout.trim_end().ends_with("ok"));

    let pages = api.recorded("category");
    let starts: Vec<u64> = pages
        .iter()
        .map(|r| r.body["startRow"].as_u64().unwrap())
        .collect();
    assert_eq!(starts, vec![0, 5000, 10000]);
    assert_eq!(pages[0].query.get("d1").unwrap(), "2023-03-01");
    assert_eq!(pages[0].query.get("d2").unwrap(), "2023-03-31");
    assert_eq!(pages[0].query.get("path").unwrap(), "Pets/Dogs");
    assert_eq!(pages[0].body["sortModel"][0]["colId"], "revenue");
    assert_eq!(pages[0].body["filterModel"]["sales"]["filter"], 10);

    let file = tmp
        .path()
        .join("out")
        .join("Pets Dogs 01.03.2023-31.03.2023.xlsx");
    assert!(file.exists(), "missing {}", file.display());
    let rows = market_harvest::xlsx::read_first_sheet(&fs::read(&file).unwrap()).unwrap();
    assert_eq!(rows.len(), 12_001);
    assert_eq!(
        rows[0],
        vec!["id", "name", "revenue", "seller.name", "date"]
    );
    assert_eq!(rows[1][4], "31.03.2023");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_brand_separate_files_one_per_week() {
    let api = FakeApi::new(0, 4);
    let base = api.clone().spawn().await;
    let (tmp, config_path) = setup_test_env(&base);

    let (stdout, stderr, success) = run_harvest(
        &config_path,
        &[
            "brand",
            "ACME",
            "--from",
            "01.03.2023",
            "--to",
            "12.03.2023",
            "--separate-files",
        ],
    )
    .await;
    assert!(success, "brand failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("sub-ranges: 2"));

    let out = tmp.path().join("out");
    assert!(out.join("ACME 01.03.2023-05.03.2023.xlsx").exists());
    assert!(out.join("ACME 06.03.2023-12.03.2023.xlsx").exists());

    let brand_requests = api.recorded("brand");
    assert!(brand_requests.iter().all(|r| r.body.get("sortModel").is_none()));
    assert_eq!(brand_requests[0].body["filterModel"]["sales"]["filter"], 1);

    let rows = market_harvest::xlsx::read_first_sheet(
        &fs::read(out.join("ACME 01.03.2023-05.03.2023.xlsx")).unwrap(),
    )
    .unwrap();
    assert_eq!(rows[0], vec!["sku", "name", "sales", "date"]);
    assert_eq!(rows[1][0], "1000");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_brand_to_db_creates_table() {
    let api = FakeApi::new(0, 3);
    let base = api.clone().spawn().await;
    let (tmp, config_path) = setup_test_env(&base);

    let args = [
        "brand", "ACME", "--from", "2023-03-06", "--to", "2023-03-19", "--to-db",
    ];
    let (stdout, stderr, success) = run_harvest(&config_path, &args).await;
    assert!(success, "brand --to-db failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("table: brand_ACME (created)"), "stdout={}", stdout);
    assert!(stdout.contains("inserted: 6"));
    assert!(stdout.contains("row errors: 0"));
    assert!(!tmp.path().join("out").exists());

    let url = format!("sqlite:{}/data/harvest.sqlite", tmp.path().display());
    let pool = market_harvest::db::connect_url(&url).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM \"brand_ACME\"")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sku_list_info_and_sales() {
    let api = FakeApi::new(0, 0);
    let base = api.clone().spawn().await;
    let (tmp, config_path) = setup_test_env(&base);

    let list = tmp.path().join("skus.csv");
    fs::write(&list, "\u{FEFF}sku;note\n111;a\n222;b\n").unwrap();

    let (stdout, stderr, success) = run_harvest(
        &config_path,
        &[
            "sku",
            list.to_str().unwrap(),
            "--from",
            "2023-03-01",
            "--to",
            "2023-03-07",
            "--info",
            "--sales",
        ],
    )
    .await;
    assert!(success, "sku failed: stdout={}, stderr={}", stdout, stderr);

    let out = tmp.path().join("out").join("SKU_list");
    let info = out.join("SKU's info.xlsx");
    assert!(info.exists());
    assert!(out.join("sales").join("111_sale.xlsx").exists());
    assert!(out.join("sales").join("222_sale.xlsx").exists());

    let rows = market_harvest::xlsx::read_first_sheet(&fs::read(&info).unwrap()).unwrap();
    assert_eq!(rows[0], vec!["id", "name", "photos"]);
    assert_eq!(rows[1], vec!["111", "card 111", "//img/111/1.jpg"]);

    let batches = api.recorded("items/batch");
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].body["ids"], serde_json::json!([111, 222]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsupported_sku_file_is_rejected() {
    let api = FakeApi::new(0, 0);
    let base = api.clone().spawn().await;
    let (tmp, config_path) = setup_test_env(&base);

    let list = tmp.path().join("skus.txt");
    fs::write(&list, "sku\n1\n").unwrap();

    let (_stdout, stderr, success) = run_harvest(
        &config_path,
        &["sku", list.to_str().unwrap(), "--from", "2023-03-01", "--to", "2023-03-02"],
    )
    .await;
    assert!(!success);
    assert!(stderr.contains("unsupported input format"), "stderr={}", stderr);
    assert!(api.requests.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_month_does_not_abort_run() {
    let api = FakeApi::new(5, 0);
    let base = api.clone().spawn().await;
    let (tmp, config_path) = setup_test_env(&base);

    let (stdout, stderr, success) = run_harvest(
        &config_path,
        &["category", "Broken", "--from", "2023-01-01", "--to", "2023-02-28"],
    )
    .await;
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("failed: 2"));
    assert!(stdout.contains("rows: 0"));
    // nothing fetched, nothing written
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(harvest_binary())
        .arg("--config")
        .arg(tmp.path().join("nope.toml"))
        .args(["category", "x", "--from", "2023-01-01", "--to", "2023-01-31"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read config file"));
}

#[test]
fn test_bad_date_is_a_usage_error() {
    let output = Command::new(harvest_binary())
        .args(["category", "x", "--from", "March", "--to", "2023-01-31"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid date"));
}
