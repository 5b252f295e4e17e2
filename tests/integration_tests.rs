use async_trait::async_trait;
use catalog_sync::feed::{Feed, FeedKind};
use catalog_sync::normalize::normalize_table;
use catalog_sync::source::{Cell, RawTable, RowSource, SourceError, WorkbookSource, parse_gviz};
use catalog_sync::sync::{Orchestrator, Outcome};
use chrono::Utc;
use rust_xlsxwriter::Workbook;
use serde_json::json;
use std::fs;
use std::path::PathBuf;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_products_workbook(dir: &std::path::Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let headers = [
        "CODIGO",
        "ARTICULO",
        "RUBRO",
        "BULTO",
        "P_LISTA_D",
        "P_LISTA_E",
        "P_LISTA_F",
    ];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    sheet.write_string(1, 0, "P100").unwrap();
    sheet.write_string(1, 1, "MARTILLO").unwrap();
    sheet.write_string(1, 2, "HERRAM").unwrap();
    sheet.write_number(1, 3, 12).unwrap();
    sheet.write_number(1, 4, 1500).unwrap();
    sheet.write_number(1, 5, 1400).unwrap();
    sheet.write_number(1, 6, 1300).unwrap();
    workbook.save(dir.join("PRODUCTOS.xlsx")).unwrap();
}

/// Serves gviz bodies for the feeds it knows and refuses the rest.
struct CannedRemote {
    bodies: Vec<(FeedKind, &'static str)>,
}

#[async_trait]
impl RowSource for CannedRemote {
    fn label(&self) -> &'static str {
        "remote"
    }

    async fn fetch_rows(&self, feed: &Feed) -> Result<RawTable, SourceError> {
        match self.bodies.iter().find(|(kind, _)| *kind == feed.kind) {
            Some((_, body)) => parse_gviz(body),
            None => Err(SourceError::RemoteUnavailable("connection timed out".into())),
        }
    }
}

const PRODUCTS_GVIZ: &str = "/*O_o*/\ngoogle.visualization.Query.setResponse({\"status\":\"ok\",\"table\":{\"cols\":[{\"label\":\"CODIGO\",\"type\":\"string\"},{\"label\":\"ARTICULO\",\"type\":\"string\"},{\"label\":\"RUBRO\",\"type\":\"string\"},{\"label\":\"BULTO\",\"type\":\"number\"},{\"label\":\"P_LISTA_D\",\"type\":\"number\"},{\"label\":\"P_LISTA_E\",\"type\":\"number\"},{\"label\":\"P_LISTA_F\",\"type\":\"number\"}],\"rows\":[{\"c\":[{\"v\":\"R200\"},{\"v\":\"PINZA\"},{\"v\":\"HERRAM\"},{\"v\":6.0},{\"v\":990.5},{\"v\":900.0},{\"v\":850.0}]}]}});";

#[tokio::test]
async fn test_local_products_workbook_end_to_end() {
    let dir = temp_dir("catalog_sync_it_products");
    write_products_workbook(&dir);

    let source = WorkbookSource::new(&dir);
    let table = source
        .fetch_rows(&Feed::new(FeedKind::Products, None))
        .await
        .expect("workbook should be readable");
    let normalized = normalize_table(FeedKind::Products, &table, Utc::now()).unwrap();

    assert_eq!(
        serde_json::to_value(&normalized.output).unwrap(),
        json!({"P100": {
            "name": "MARTILLO",
            "category": "HERRAM",
            "bulk": 12,
            "prices": {"D": 1500, "E": 1400, "F": 1300}
        }})
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_partial_failure_run_summary() {
    let excel = temp_dir("catalog_sync_it_partial_excel");
    let json_dir = temp_dir("catalog_sync_it_partial_json");
    fs::write(
        excel.join("CLIENTES_PERMISOS.csv"),
        "CUENTA,NOMBRE,CATEGORIAS,LISTA_PRECIOS\n100.0,FERRETERIA SUR,\"A, B\",D\n",
    )
    .unwrap();

    let remote = CannedRemote {
        bodies: vec![(FeedKind::Products, PRODUCTS_GVIZ)],
    };
    let local = WorkbookSource::new(&excel);
    let orchestrator = Orchestrator::new(&remote, &local, &json_dir);

    let feeds = [
        Feed::new(FeedKind::Products, Some("products-sheet".into())),
        Feed::new(FeedKind::Clients, Some("clients-sheet".into())),
        Feed::new(FeedKind::Groups, Some("groups-sheet".into())),
        Feed::new(FeedKind::ImageCatalog, Some("images-sheet".into())),
    ];
    let summary = orchestrator.run(&feeds).await;

    assert_eq!(summary.reports.len(), 4);
    assert_eq!(summary.get(FeedKind::Products).unwrap().outcome, Outcome::RemoteSuccess);
    assert_eq!(summary.get(FeedKind::Clients).unwrap().outcome, Outcome::LocalFallback);
    assert_eq!(summary.get(FeedKind::Groups).unwrap().outcome, Outcome::LocalFailed);
    assert_eq!(summary.get(FeedKind::ImageCatalog).unwrap().outcome, Outcome::LocalFailed);
    assert_eq!(summary.updated(), 2);

    let products: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(json_dir.join("products.json")).unwrap()).unwrap();
    assert_eq!(
        products,
        json!({"R200": {
            "name": "PINZA",
            "category": "HERRAM",
            "bulk": 6,
            "prices": {"D": 990.5, "E": 900, "F": 850}
        }})
    );

    let clients: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(json_dir.join("clients.json")).unwrap()).unwrap();
    assert_eq!(
        clients,
        json!({"100": {"name": "FERRETERIA SUR", "categories": "A, B", "priceList": "D"}})
    );
    assert!(!json_dir.join("groups.json").exists());

    let printed = summary.to_string();
    assert!(printed.contains("remote-success"));
    assert!(printed.contains("local-fallback"));

    fs::remove_dir_all(&excel).unwrap();
    fs::remove_dir_all(&json_dir).unwrap();
}

#[tokio::test]
async fn test_group_catalog_tabs_become_groups() {
    let dir = temp_dir("catalog_sync_it_group_tabs");
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("MAYORISTAS").unwrap();
    sheet.write_string(0, 0, "Codigo_Producto").unwrap();
    sheet.write_string(1, 0, "P100").unwrap();
    sheet.write_string(2, 0, "  ").unwrap();
    sheet.write_string(3, 0, "R200").unwrap();
    sheet.write_string(4, 0, "P100").unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("OBRAS").unwrap();
    sheet.write_string(0, 0, "Descripcion").unwrap();
    sheet.write_string(0, 1, "Codigo_Producto").unwrap();
    sheet.write_number(1, 1, 4410).unwrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("NOTAS").unwrap();
    sheet.write_string(0, 0, "Comentario").unwrap();

    workbook.save(dir.join("CATALOGOS_GRUPOS.xlsx")).unwrap();

    let source = WorkbookSource::new(&dir);
    let table = source
        .fetch_rows(&Feed::new(FeedKind::GroupCatalog, None))
        .await
        .unwrap();
    assert!(table.rows.iter().all(|r| r[0] != Cell::Text("NOTAS".into())));

    let normalized = normalize_table(FeedKind::GroupCatalog, &table, Utc::now()).unwrap();
    assert_eq!(
        serde_json::to_value(&normalized.output).unwrap(),
        json!({"MAYORISTAS": ["P100", "R200"], "OBRAS": ["4410"]})
    );

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_missing_named_feed_file_reports_path() {
    let dir = temp_dir("catalog_sync_it_missing");
    let source = WorkbookSource::new(&dir);

    let err = source
        .fetch_rows(&Feed::new(FeedKind::Promotions, None))
        .await
        .unwrap_err();

    match err {
        SourceError::LocalFileMissing(path) => assert!(path.ends_with("PROMOCIONES.xlsx")),
        other => panic!("unexpected error: {other}"),
    }
    fs::remove_dir_all(&dir).unwrap();
}
