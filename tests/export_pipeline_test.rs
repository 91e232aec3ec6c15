use export_engine::config::DatabaseConfig;
use export_engine::db::{DataSourceExecutor, DbPool, StaticScripts};
use export_engine::models::{
    Column, DataSource, Export, ExportRequest, FieldModel, FieldType, Join, JoinType, Query,
};
use export_engine::pipeline::{ExportFactoryResolver, FnFilter, MetaExportResolver};
use export_engine::writer::{OutputConfig, StyleDefaults};
use export_engine::{ExportError, ExportRepository, ExportService, ExportState, InMemoryCatalog};
use serde_json::json;
use std::sync::Arc;
use tempfile::NamedTempFile;

async fn orders_db(temp_file: &NamedTempFile) -> DbPool {
    let url = format!("sqlite:{}?mode=rwc", temp_file.path().display());
    let config = DatabaseConfig::parse(&url).unwrap();
    let pool = DbPool::connect(&config).await.unwrap();

    if let DbPool::SQLite(p) = &pool {
        for sql in [
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, total REAL, status TEXT)",
            "INSERT INTO customers (id, name) VALUES (1, 'Ada'), (2, 'Grace')",
            "INSERT INTO orders (id, customer_id, total, status) VALUES \
             (1, 1, 9.5, 'open'), (2, 2, 3.0, 'closed'), (3, NULL, 12.25, 'open')",
        ] {
            sqlx::query(sql).execute(p).await.unwrap();
        }
    } else {
        panic!("Expected SQLite pool");
    }
    pool
}

fn scripts() -> Arc<StaticScripts> {
    Arc::new(
        StaticScripts::new()
            .with_script("orders", "SELECT id, total FROM orders WHERE id < 3 ORDER BY id")
            .with_script("all_orders", "SELECT id, total, status FROM orders ORDER BY id")
            .with_script("purge", "DELETE FROM orders"),
    )
}

fn orders_export() -> Export {
    Export::new(
        "orders",
        vec![
            FieldModel::new("total", 1).with_type(FieldType::Number),
            FieldModel::new("id", 0).with_type(FieldType::Number),
        ],
        DataSource::script("orders", "orders"),
    )
}

fn service_for(pool: &DbPool, catalog: Arc<InMemoryCatalog>, styles: StyleDefaults) -> ExportService {
    let executor = DataSourceExecutor::new(pool.clone(), scripts());
    let resolver = Arc::new(MetaExportResolver::new(catalog, executor));
    ExportService::new(resolver, Arc::new(styles))
}

fn catalog_with(exports: Vec<Export>) -> Arc<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    for export in exports {
        ExportRepository::save(&catalog, export).unwrap();
    }
    Arc::new(catalog)
}

#[tokio::test]
async fn test_csv_export_end_to_end() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let service = service_for(&pool, catalog_with(vec![orders_export()]), StyleDefaults::new());

    let outcome = service
        .run(&ExportRequest::new("orders", "CSV"), &OutputConfig::new())
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(outcome.bytes.clone()).unwrap(),
        "id,total\r\n1,9.5\r\n2,3.0\r\n"
    );
    assert_eq!(outcome.rows_written, 2);
    assert!(!outcome.has_warnings());
    assert_eq!(outcome.state, ExportState::Completed);
    pool.close().await;
}

#[tokio::test]
async fn test_csv_ignores_styles() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let styles = StyleDefaults::new()
        .with("header.background", "#zzz")
        .with("cell.font.color", "#000080");
    let service = service_for(&pool, catalog_with(vec![orders_export()]), styles);
    let output = OutputConfig::new().with_style("header.background", "#1c8214");

    let outcome = service
        .run(&ExportRequest::new("orders", "csv"), &output)
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(outcome.bytes.clone()).unwrap(),
        "id,total\r\n1,9.5\r\n2,3.0\r\n"
    );
    assert!(!outcome.has_warnings());
    pool.close().await;
}

#[tokio::test]
async fn test_xlsx_and_pdf_render_from_same_rows() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let service = service_for(&pool, catalog_with(vec![orders_export()]), StyleDefaults::new());

    let xlsx = service
        .run(&ExportRequest::new("orders", "xlsx"), &OutputConfig::new())
        .await
        .unwrap();
    assert!(xlsx.bytes.starts_with(b"PK"));
    assert_eq!(xlsx.rows_written, 2);
    assert_eq!(xlsx.file_name(), "orders.xlsx");

    let pdf = service
        .run(&ExportRequest::new("orders", "pdf"), &OutputConfig::new())
        .await
        .unwrap();
    assert!(pdf.bytes.starts_with(b"%PDF"));
    assert_eq!(pdf.rows_written, 2);
    pool.close().await;
}

#[tokio::test]
async fn test_malformed_style_falls_back_with_warning() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let styles = StyleDefaults::new().with("header.background", "#zzz");
    let service = service_for(&pool, catalog_with(vec![orders_export()]), styles);

    let outcome = service
        .run(&ExportRequest::new("orders", "xlsx"), &OutputConfig::new())
        .await
        .unwrap();

    assert!(outcome.bytes.starts_with(b"PK"));
    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(
        &outcome.warnings[0],
        ExportError::StyleConfig { key, value, .. } if key == "header.background" && value == "#zzz"
    ));
    pool.close().await;
}

#[tokio::test]
async fn test_columns_follow_field_index() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let export = Export::new(
        "all_orders",
        vec![
            FieldModel::new("status", 2).with_label("State"),
            FieldModel::new("id", 0).with_label("Order"),
            FieldModel::new("total", 1).with_type(FieldType::Number),
        ],
        DataSource::script("all_orders", "all_orders"),
    );
    let service = service_for(&pool, catalog_with(vec![export]), StyleDefaults::new());

    let outcome = service
        .run(&ExportRequest::new("all_orders", "csv"), &OutputConfig::new())
        .await
        .unwrap();

    let text = String::from_utf8(outcome.bytes).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("Order,total,State"));
    assert_eq!(lines.next(), Some("1,9.5,open"));
    pool.close().await;
}

#[tokio::test]
async fn test_request_parameters_filter_rows() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let export = Export::new(
        "all_orders",
        vec![FieldModel::new("id", 0), FieldModel::new("status", 1)],
        DataSource::script("all_orders", "all_orders"),
    );
    let service = service_for(&pool, catalog_with(vec![export]), StyleDefaults::new());

    let request = ExportRequest::new("all_orders", "csv")
        .with_parameter("status", json!("open"))
        .with_parameter("unrelated", json!(1));
    let outcome = service.run(&request, &OutputConfig::new()).await.unwrap();

    assert_eq!(
        String::from_utf8(outcome.bytes).unwrap(),
        "id,status\r\n1,open\r\n3,open\r\n"
    );
    assert_eq!(outcome.rows_fetched, 3);
    assert_eq!(outcome.rows_written, 2);
    pool.close().await;
}

#[tokio::test]
async fn test_failing_filter_drops_only_its_row() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let export = Export::new(
        "all_orders",
        vec![FieldModel::new("id", 0)],
        DataSource::script("all_orders", "all_orders"),
    );
    let service = service_for(&pool, catalog_with(vec![export]), StyleDefaults::new())
        .with_filter(FnFilter::new("closed orders unsupported", |row| {
            if row["status"] == json!("closed") {
                Err(ExportError::calculation("status", "cannot evaluate"))
            } else {
                Ok(true)
            }
        }));

    let outcome = service
        .run(&ExportRequest::new("all_orders", "csv"), &OutputConfig::new())
        .await
        .unwrap();

    assert_eq!(
        String::from_utf8(outcome.bytes).unwrap(),
        "id\r\n1\r\n3\r\n"
    );
    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(&outcome.warnings[0], ExportError::Filter { .. }));
    pool.close().await;
}

#[tokio::test]
async fn test_unconfigured_data_source_fetches_nothing() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let executor = DataSourceExecutor::new(pool.clone(), scripts());

    let rows = executor
        .fetch(&DataSource::unconfigured("pending"))
        .await
        .unwrap();
    assert!(rows.is_empty());
    pool.close().await;
}

#[tokio::test]
async fn test_factory_lookup() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let pending = Export::new(
        "pending",
        vec![FieldModel::new("id", 0)],
        DataSource::unconfigured("pending"),
    );
    let catalog = catalog_with(vec![orders_export(), pending]);
    let resolver = MetaExportResolver::new(catalog, DataSourceExecutor::new(pool.clone(), scripts()));

    assert!(resolver.has_factory("orders"));
    assert!(!resolver.has_factory("pending"));
    assert!(!resolver.has_factory("missing"));
    assert!(matches!(
        resolver.resolve("missing"),
        Err(ExportError::NotFound { export }) if export == "missing"
    ));
    assert_eq!(resolver.available_exports(), vec!["orders".to_string()]);
    pool.close().await;
}

#[tokio::test]
async fn test_invalid_request_reports_every_violation() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let service = service_for(&pool, catalog_with(vec![orders_export()]), StyleDefaults::new());

    let err = service
        .run(&ExportRequest::new("  ", "docx"), &OutputConfig::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::RequestValidation { .. }));
    assert_eq!(err.violations().len(), 2);
    pool.close().await;
}

#[tokio::test]
async fn test_mutating_script_is_rejected() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let export = Export::new(
        "purge",
        vec![FieldModel::new("id", 0)],
        DataSource::script("purge", "purge"),
    );
    let service = service_for(&pool, catalog_with(vec![export]), StyleDefaults::new());

    let err = service
        .run(&ExportRequest::new("purge", "csv"), &OutputConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::DataFetch { .. }));

    // Table is untouched
    let executor = DataSourceExecutor::new(pool.clone(), scripts());
    let rows = executor
        .fetch(&DataSource::script("all_orders", "all_orders"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    pool.close().await;
}

fn customer_orders_query() -> Query {
    Query::new("customer_orders")
        .with_column(Column::new("orders", "id", 0).with_type(FieldType::Number))
        .with_column(Column::new("orders", "total", 2).with_type(FieldType::Number))
        .with_column(Column::new("customers", "name", 1))
        .with_column(Column::new("customers", "id", 0).with_type(FieldType::Number))
        .with_join(Join::new(
            JoinType::Left,
            ("orders", "customer_id"),
            ("customers", "id"),
        ))
}

#[test]
fn test_query_sql_is_deterministic() {
    let query = customer_orders_query();
    let expected = concat!(
        r#"SELECT t0."id" AS "orders_id", t0."total" AS "total", t1."name" AS "name", "#,
        r#"t1."id" AS "customers_id" FROM "orders" AS t0 "#,
        r#"LEFT JOIN "customers" AS t1 ON t0."customer_id" = t1."id""#
    );

    assert_eq!(query.to_sql().unwrap(), expected);
    assert_eq!(query.to_sql().unwrap(), query.clone().to_sql().unwrap());
}

#[tokio::test]
async fn test_query_data_source_joins_tables() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    let catalog = InMemoryCatalog::from_document(export_engine::catalog::CatalogDocument {
        queries: vec![customer_orders_query()],
        exports: Vec::new(),
    })
    .unwrap();
    let service = service_for(&pool, Arc::new(catalog), StyleDefaults::new());

    let outcome = service
        .run(&ExportRequest::new("customer_orders", "csv"), &OutputConfig::new())
        .await
        .unwrap();

    let text = String::from_utf8(outcome.bytes).unwrap();
    let mut lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.remove(0), "ID,TOTAL,NAME,ID");
    lines.sort();
    assert_eq!(lines, vec!["1,9.5,Ada,1", "2,3.0,Grace,2", "3,12.25,,"]);
    pool.close().await;
}

#[tokio::test]
async fn test_query_over_reserved_word_columns() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = orders_db(&temp_file).await;
    if let DbPool::SQLite(p) = &pool {
        sqlx::query(r#"CREATE TABLE "group" (id INTEGER PRIMARY KEY, "order" INTEGER)"#)
            .execute(p)
            .await
            .unwrap();
        sqlx::query(r#"INSERT INTO "group" (id, "order") VALUES (1, 10)"#)
            .execute(p)
            .await
            .unwrap();
    }
    let query = Query::new("groups")
        .with_column(Column::new("group", "id", 0).with_type(FieldType::Number))
        .with_column(Column::new("group", "order", 1).with_type(FieldType::Number));
    let executor = DataSourceExecutor::new(pool.clone(), scripts());

    let rows = executor
        .fetch(&DataSource::query("groups", query))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["order"], json!(10));
    pool.close().await;
}
