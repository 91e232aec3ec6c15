use export_engine::config::DatabaseConfig;
use export_engine::db::{DataSourceExecutor, DbPool, FileScriptSource};
use export_engine::models::ExportRequest;
use export_engine::pipeline::MetaExportResolver;
use export_engine::writer::{OutputConfig, StyleDefaults};
use export_engine::{ExportError, ExportService, InMemoryCatalog};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

const CATALOG: &str = r#"{
    "queries": [
        {
            "name": "products",
            "columns": [
                {"name": "sku", "table": "products", "index": 0},
                {"name": "price", "table": "products", "field_type": "NUMBER", "index": 1}
            ]
        }
    ],
    "exports": [
        {
            "name": "cheap_products",
            "fields": [
                {"name": "sku", "property_name": "sku", "label": "SKU", "index": 0},
                {"name": "price", "property_name": "price", "label": "Price", "index": 1, "field_type": "NUMBER"}
            ],
            "data_source": {"name": "cheap_products", "script": "cheap_products"}
        },
        {
            "name": "draft",
            "fields": [{"name": "sku", "property_name": "sku", "index": 0}],
            "data_source": {"name": "draft"}
        }
    ]
}"#;

struct Fixture {
    _db_file: NamedTempFile,
    dir: TempDir,
    pool: DbPool,
}

impl Fixture {
    async fn new() -> Self {
        let db_file = NamedTempFile::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", db_file.path().display());
        let pool = DbPool::connect(&DatabaseConfig::parse(&url).unwrap())
            .await
            .unwrap();

        if let DbPool::SQLite(p) = &pool {
            sqlx::query("CREATE TABLE products (sku TEXT PRIMARY KEY, price REAL)")
                .execute(p)
                .await
                .unwrap();
            sqlx::query("INSERT INTO products VALUES ('A-1', 4.5), ('B-2', 19.0), ('C-3', 0.75)")
                .execute(p)
                .await
                .unwrap();
        }

        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("scripts")).unwrap();
        std::fs::write(dir.path().join("catalog.json"), CATALOG).unwrap();
        std::fs::write(
            dir.path().join("scripts/cheap_products.sql"),
            "SELECT sku, price FROM products WHERE price < 10 ORDER BY sku",
        )
        .unwrap();

        Self {
            _db_file: db_file,
            dir,
            pool,
        }
    }

    fn service(&self, styles: StyleDefaults) -> ExportService {
        let catalog = InMemoryCatalog::from_file(&self.dir.path().join("catalog.json")).unwrap();
        let scripts = Arc::new(FileScriptSource::new(
            self.dir.path().join("scripts"),
            Duration::from_secs(60),
        ));
        let executor = DataSourceExecutor::new(self.pool.clone(), scripts);
        let resolver = Arc::new(MetaExportResolver::new(Arc::new(catalog), executor));
        ExportService::new(resolver, Arc::new(styles))
    }
}

#[tokio::test]
async fn test_catalog_file_lists_configured_exports() {
    let fixture = Fixture::new().await;
    let service = fixture.service(StyleDefaults::new());

    // "draft" has no row source
    assert_eq!(
        service.available_exports(),
        vec!["cheap_products".to_string(), "products".to_string()]
    );

    let err = service
        .run(&ExportRequest::new("draft", "csv"), &OutputConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::RequestValidation { .. }));
    fixture.pool.close().await;
}

#[tokio::test]
async fn test_script_export_from_directory() {
    let fixture = Fixture::new().await;
    let service = fixture.service(StyleDefaults::new());

    let outcome = service
        .run(&ExportRequest::new("cheap_products", "csv"), &OutputConfig::new())
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(outcome.bytes).unwrap(),
        "SKU,Price\r\nA-1,4.5\r\nC-3,0.75\r\n"
    );
    fixture.pool.close().await;
}

#[tokio::test]
async fn test_missing_script_fails_the_export() {
    let fixture = Fixture::new().await;
    std::fs::remove_file(fixture.dir.path().join("scripts/cheap_products.sql")).unwrap();
    let service = fixture.service(StyleDefaults::new());

    let err = service
        .run(&ExportRequest::new("cheap_products", "csv"), &OutputConfig::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::DataFetch { .. }));
    assert!(err.to_string().contains("cheap_products"));
    fixture.pool.close().await;
}

#[tokio::test]
async fn test_derived_query_export() {
    let fixture = Fixture::new().await;
    let service = fixture.service(StyleDefaults::new());

    let outcome = service
        .run(&ExportRequest::new("products", "csv"), &OutputConfig::new())
        .await
        .unwrap();
    let text = String::from_utf8(outcome.bytes).unwrap();
    let mut lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.remove(0), "SKU,PRICE");
    lines.sort();
    assert_eq!(lines, vec!["A-1,4.5", "B-2,19.0", "C-3,0.75"]);
    fixture.pool.close().await;
}

#[tokio::test]
async fn test_style_file_applies_to_xlsx() {
    let fixture = Fixture::new().await;
    let styles_path = fixture.dir.path().join("styles.toml");
    std::fs::write(
        &styles_path,
        "[header]\nbackground = \"#1c8214\"\n\n[header.font]\ncolor = \"#ffffff\"\n",
    )
    .unwrap();
    let styles = StyleDefaults::from_file(&styles_path).unwrap();
    assert_eq!(styles.get("header.background"), Some("#1c8214"));
    assert_eq!(styles.get("header.font.color"), Some("#ffffff"));

    let outcome = fixture
        .service(styles)
        .run(
            &ExportRequest::new("cheap_products", "xlsx"),
            &OutputConfig::new().with_title("Cheap products"),
        )
        .await
        .unwrap();
    assert!(outcome.bytes.starts_with(b"PK"));
    assert!(!outcome.has_warnings());
    fixture.pool.close().await;
}
