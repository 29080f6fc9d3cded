#![allow(dead_code)]

use intake_etl::config::{DatabaseConfig, InputPolicy, PipelineConfig};
use intake_etl::db::{query_count, DatabaseManager};
use intake_etl::pipeline::storage::SchemaProvisioner;
use intake_etl::types::Dataset;
use libsql::Connection;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub fn schema_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("sql/schema.sql")
}

/// A sandboxed configuration: intake, archive and database all under `root`.
pub fn test_config(root: &Path) -> PipelineConfig {
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    PipelineConfig {
        data_dir,
        archive_dir: root.join("data_archive"),
        schema_path: schema_path(),
        database: DatabaseConfig {
            url: root.join("intake.db").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        },
        input_policy: InputPolicy::AnyEncoding,
        ..PipelineConfig::default()
    }
}

/// Open the sandbox database and apply the schema.
pub async fn provisioned(config: &PipelineConfig) -> anyhow::Result<(DatabaseManager, Connection)> {
    let db = DatabaseManager::new(&config.database).await?;
    let conn = db.get_connection().await?;
    SchemaProvisioner::new(&config.schema_path).provision(&conn).await?;
    Ok((db, conn))
}

pub async fn row_count(conn: &Connection, dataset: Dataset) -> anyhow::Result<u64> {
    Ok(query_count(conn, &format!("SELECT COUNT(*) FROM {}", dataset.table())).await?)
}

pub fn write_customers_csv(dir: &Path, n: usize) -> PathBuf {
    let mut body = String::from(
        "customer_id,first_name,last_name,email,phone,city,registration_date,customer_type\n",
    );
    for i in 1..=n {
        writeln!(
            body,
            "{i},First{i},Last{i},user{i}@example.com,555-{:04},City{},2023-01-{:02},{}",
            i % 10_000,
            i % 7,
            i % 28 + 1,
            if i % 3 == 0 { "premium" } else { "regular" }
        )
        .unwrap();
    }
    let path = dir.join("customers.csv");
    fs::write(&path, body).unwrap();
    path
}

pub fn write_customers_json(dir: &Path, n: usize) -> PathBuf {
    let records: Vec<serde_json::Value> = (1..=n)
        .map(|i| {
            serde_json::json!({
                "customer_id": i,
                "first_name": format!("Json{i}"),
                "email": format!("json{i}@example.com"),
            })
        })
        .collect();
    let path = dir.join("customers.json");
    fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
    path
}

const CATEGORIES: [&str; 3] = ["books", "games", "tools"];

pub fn write_products_json(dir: &Path, n: usize) -> PathBuf {
    let records: Vec<serde_json::Value> = (1..=n)
        .map(|i| {
            let category = CATEGORIES[i % CATEGORIES.len()];
            serde_json::json!({
                "product_id": i,
                "product_name": format!("Product {i}"),
                "category": category,
                "price": (i as f64) * 1.25,
                "stock_quantity": i % 50,
            })
        })
        .collect();
    let path = dir.join("products.json");
    fs::write(&path, serde_json::to_string_pretty(&records).unwrap()).unwrap();
    path
}

/// Orders `1..=n`; the order whose id equals `orphan_at` points at a
/// customer that does not exist.
pub fn write_orders_yaml(dir: &Path, n: usize, customers: usize, orphan_at: Option<usize>) -> PathBuf {
    let mut body = String::new();
    for i in 1..=n {
        let customer_id = if orphan_at == Some(i) {
            customers + 1_000_000
        } else {
            (i - 1) % customers + 1
        };
        writeln!(body, "- order_id: {i}").unwrap();
        writeln!(body, "  customer_id: {customer_id}").unwrap();
        writeln!(body, "  product_id: {}", (i - 1) % customers + 1).unwrap();
        writeln!(body, "  quantity: {}", i % 5 + 1).unwrap();
        writeln!(body, "  order_date: \"2024-02-{:02}\"", i % 28 + 1).unwrap();
        writeln!(body, "  total_amount: {}.5", i).unwrap();
    }
    let path = dir.join("orders.yaml");
    fs::write(&path, body).unwrap();
    path
}

/// Regular files directly under `dir`, sorted by name.
pub fn file_names(dir: &Path) -> Vec<String> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
