//! End-to-end tests for the fetch and load stages.
//!
//! The registry archive is built in memory and served from a throwaway HTTP
//! server on localhost; the destination is a SQLite file in a temp dir.

use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use airframes::filter::resolve_datasets;
use airframes::{fetch, load, PipelineConfig, PipelineError, SilentUi};

// =============================================================================
// Fixtures
// =============================================================================

const MASTER: &str = "N-NUMBER,SERIAL NUMBER,MFR MDL CODE,YEAR MFR,NAME,\n\
1    ,1071          ,3980115,1988,FEDERAL AVIATION ADMINISTRATION,\n\
10000,1             ,056A002,1947,BRASHER JEFFREY,\n\
10001,13-4463       ,7100510,    ,,\n";

const ACFTREF: &str = "CODE,MFR,MODEL,\n3980115,BOEING,737-800,\n056A002,AERONCA,7AC,\n";
const DEALER: &str = "CERTIFICATE-NUMBER,OWNERSHIP,NAME,\nA000001,1,ACME AIRCRAFT SALES,\n";
const DEREG: &str = "N-NUMBER,SERIAL-NUMBER,\n99999,X1,\n";
const DOCINDEX: &str = "TYPE-COLLATERAL,COLLATERAL,\n1,N100,\n2,N200,\n";
const ENGINE: &str = "CODE,MFR,MODEL,TYPE,\n54556,LYCOMING,O-320,1,\n";
const RESERVED: &str = "N-NUMBER,REGISTRANT,\n101AB,SMITH JOHN,\n";

/// Registry files in the layout the FAA archive uses
const REGISTRY_FILES: &[(&str, &str)] = &[
    ("ACFTREF.txt", ACFTREF),
    ("DEALER.txt", DEALER),
    ("DEREG.txt", DEREG),
    ("DOCINDEX.txt", DOCINDEX),
    ("ENGINE.txt", ENGINE),
    ("MASTER.txt", MASTER),
    ("RESERVED.txt", RESERVED),
];

static ARCHIVE: Lazy<Vec<u8>> = Lazy::new(|| {
    let mut entries: Vec<(&str, &str)> = REGISTRY_FILES.to_vec();
    entries.push(("ardata.pdf", "%PDF-1.4"));
    build_zip(&entries)
});

fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

// =============================================================================
// Local HTTP server
// =============================================================================

/// Serve `body` with `status` to every request. Returns the URL and a channel
/// receiving each raw request head.
fn serve(status: &'static str, body: Vec<u8>) -> (String, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/database/ReleasableAircraft.zip", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let head = read_request_head(&mut stream);
            if tx.send(head).is_err() {
                break;
            }
            let header = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
            stream.flush().unwrap();
        }
    });

    (url, rx)
}

fn read_request_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&head).into_owned()
}

// =============================================================================
// Helpers
// =============================================================================

fn config_for(dir: &TempDir, url: &str) -> PipelineConfig {
    PipelineConfig::default()
        .with_data_dir(dir.path().join("data"))
        .with_destination(dir.path().join("airframes.sqlite"))
        .with_archive_url(url)
}

fn write_registry_files(data_dir: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(data_dir).unwrap();
    for (name, body) in files {
        fs::write(data_dir.join(name), body).unwrap();
    }
}

fn run_load(config: &PipelineConfig, only: Option<&[&str]>) -> airframes::Result<airframes::LoadInfo> {
    let only = only.map(|names| names.iter().map(|s| s.to_string()).collect());
    let datasets = resolve_datasets(config, only, None)?;
    load(config, &datasets, &mut SilentUi::new())
}

fn table_names(db: &Path) -> Vec<String> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name")
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap();
    names
}

fn table_rows(db: &Path, table: &str, order_by: &str) -> Vec<Vec<Option<String>>> {
    let conn = Connection::open(db).unwrap();
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM \"{}\" ORDER BY \"{}\"", table, order_by))
        .unwrap();
    let width = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get::<_, Option<String>>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap();
    rows
}

fn column_names(db: &Path, table: &str) -> Vec<String> {
    let conn = Connection::open(db).unwrap();
    let stmt = conn.prepare(&format!("SELECT * FROM \"{}\"", table)).unwrap();
    stmt.column_names().iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Fetch
// =============================================================================

#[test]
fn test_fetch_downloads_and_extracts() {
    let dir = tempfile::tempdir().unwrap();
    let (url, requests) = serve("200 OK", ARCHIVE.clone());
    let config = config_for(&dir, &url);

    let report = fetch(&config, &mut SilentUi::new()).unwrap();

    assert_eq!(report.bytes, ARCHIVE.len() as u64);
    assert_eq!(report.extracted.len(), REGISTRY_FILES.len() + 1);
    assert_eq!(fs::read(config.archive_path()).unwrap(), *ARCHIVE);
    for (name, body) in REGISTRY_FILES {
        assert_eq!(fs::read_to_string(config.data_dir.join(name)).unwrap(), *body);
    }

    let head = requests.recv().unwrap().to_lowercase();
    assert!(head.starts_with("get /database/releasableaircraft.zip"));
    assert!(head.contains("user-agent: mozilla/5.0"));
    assert!(head.contains("referer: https://registry.faa.gov/aircraftinquiry/"));
    assert!(head.contains("accept-encoding: compress, gzip"));
}

#[test]
fn test_fetch_overwrites_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _requests) = serve("200 OK", ARCHIVE.clone());
    let config = config_for(&dir, &url);

    write_registry_files(&config.data_dir, &[("MASTER.txt", "stale"), ("ReleasableAircraft.zip", "old")]);

    fetch(&config, &mut SilentUi::new()).unwrap();
    fetch(&config, &mut SilentUi::new()).unwrap();

    assert_eq!(fs::read_to_string(config.data_dir.join("MASTER.txt")).unwrap(), MASTER);
    assert_eq!(fs::read(config.archive_path()).unwrap(), *ARCHIVE);
    assert!(!config.data_dir.join("ReleasableAircraft.zip.part").exists());
}

#[test]
fn test_fetch_http_error_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _requests) = serve("403 Forbidden", b"denied".to_vec());
    let config = config_for(&dir, &url);

    let err = fetch(&config, &mut SilentUi::new()).unwrap_err();
    match err {
        PipelineError::HttpStatus { status, .. } => assert_eq!(status.as_u16(), 403),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!config.archive_path().exists());
}

#[test]
fn test_fetch_rejects_corrupt_archive() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _requests) = serve("200 OK", b"<html>maintenance</html>".to_vec());
    let config = config_for(&dir, &url);

    let err = fetch(&config, &mut SilentUi::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Archive { .. }));
}

#[test]
fn test_fetch_flags_missing_dataset_file() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<_> = REGISTRY_FILES
        .iter()
        .filter(|(name, _)| *name != "RESERVED.txt")
        .copied()
        .collect();
    let (url, _requests) = serve("200 OK", build_zip(&files));
    let config = config_for(&dir, &url);

    let err = fetch(&config, &mut SilentUi::new()).unwrap_err();
    match err {
        PipelineError::MissingDatasetFile { identifier, .. } => assert_eq!(identifier, "RESERVED"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_fetch_does_not_require_disabled_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<_> = REGISTRY_FILES
        .iter()
        .filter(|(name, _)| *name != "DEREG.txt")
        .copied()
        .collect();
    let (url, _requests) = serve("200 OK", build_zip(&files));
    let config = config_for(&dir, &url);

    assert!(fetch(&config, &mut SilentUi::new()).is_ok());
}

// =============================================================================
// Load
// =============================================================================

#[test]
fn test_load_master_replaces_prior_contents() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "http://unused.invalid/");
    let db = config.destination.clone();

    write_registry_files(
        &config.data_dir,
        &[("aircraft_MASTER.txt", "N-NUMBER,SERIAL NUMBER,\nOLD1,A,\nOLD2,B,\nOLD3,C,\nOLD4,D,\n")],
    );
    run_load(&config, Some(&["MASTER"])).unwrap();
    assert_eq!(table_rows(&db, "master", "n_number").len(), 4);

    fs::write(config.data_dir.join("aircraft_MASTER.txt"), MASTER).unwrap();
    let info = run_load(&config, Some(&["MASTER"])).unwrap();

    assert_eq!(info.tables.len(), 1);
    assert_eq!(info.tables[0].table_name, "master");
    assert_eq!(info.tables[0].row_count, 3);

    assert_eq!(
        column_names(&db, "master"),
        ["n_number", "serial_number", "mfr_mdl_code", "year_mfr", "name", "unnamed_5"]
    );
    let rows = table_rows(&db, "master", "n_number");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0][0].as_deref(), Some("1    "));
    assert_eq!(rows[0][4].as_deref(), Some("FEDERAL AVIATION ADMINISTRATION"));
    assert_eq!(rows[1][1].as_deref(), Some("1             "));
    assert_eq!(rows[2][3].as_deref(), Some("    "));
    assert_eq!(rows[2][4], None);
    assert!(rows.iter().all(|r| !r[0].as_deref().unwrap().starts_with("OLD")));
}

#[test]
fn test_load_all_skips_disabled_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "http://unused.invalid/");
    write_registry_files(&config.data_dir, REGISTRY_FILES);

    let info = run_load(&config, None).unwrap();

    let loaded: Vec<_> = info.tables.iter().map(|t| t.table_name.as_str()).collect();
    assert_eq!(loaded, ["acftref", "dealer", "docindex", "engine", "master", "reserved"]);
    assert_eq!(
        table_names(&config.destination),
        ["acftref", "dealer", "docindex", "engine", "master", "reserved"]
    );
    assert_eq!(info.total_rows(), 2 + 1 + 2 + 1 + 3 + 1);
}

#[test]
fn test_full_load_leaves_existing_dereg_table_alone() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "http://unused.invalid/");
    write_registry_files(&config.data_dir, REGISTRY_FILES);

    let conn = Connection::open(&config.destination).unwrap();
    conn.execute_batch("CREATE TABLE dereg (n_number TEXT); INSERT INTO dereg VALUES ('keep');")
        .unwrap();
    drop(conn);

    let info = run_load(&config, None).unwrap();

    assert!(info.tables.iter().all(|t| t.table_name != "dereg"));
    assert_eq!(column_names(&config.destination, "dereg"), ["n_number"]);
    assert_eq!(
        table_rows(&config.destination, "dereg", "n_number"),
        vec![vec![Some("keep".to_string())]]
    );
}

#[test]
fn test_repeated_load_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "http://unused.invalid/");
    write_registry_files(&config.data_dir, REGISTRY_FILES);

    run_load(&config, None).unwrap();
    let first = table_rows(&config.destination, "acftref", "code");
    run_load(&config, None).unwrap();
    let second = table_rows(&config.destination, "acftref", "code");

    assert_eq!(first, second);
    assert_eq!(second.len(), 2);

    let conn = Connection::open(&config.destination).unwrap();
    let loads: i64 = conn
        .query_row("SELECT COUNT(DISTINCT load_id) FROM _loads WHERE table_name = 'acftref'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(loads, 2);
}

#[test]
fn test_missing_file_aborts_remaining_datasets() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "http://unused.invalid/");
    let files: Vec<_> = REGISTRY_FILES
        .iter()
        .filter(|(name, _)| *name != "ENGINE.txt")
        .copied()
        .collect();
    write_registry_files(&config.data_dir, &files);

    let err = run_load(&config, None).unwrap_err();
    match err {
        PipelineError::MissingDatasetFile { identifier, pattern } => {
            assert_eq!(identifier, "ENGINE");
            assert_eq!(pattern, "*ENGINE.txt");
        }
        other => panic!("unexpected error {:?}", other),
    }

    assert_eq!(
        table_names(&config.destination),
        ["acftref", "dealer", "docindex"]
    );
}

#[test]
fn test_ambiguous_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "http://unused.invalid/");
    write_registry_files(
        &config.data_dir,
        &[("DEALER.txt", DEALER), ("2023_DEALER.txt", DEALER)],
    );

    let err = run_load(&config, Some(&["DEALER"])).unwrap_err();
    assert!(matches!(err, PipelineError::AmbiguousDatasetFile { .. }));
    assert!(table_names(&config.destination).is_empty());
}

#[test]
fn test_bad_row_keeps_previous_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "http://unused.invalid/");
    write_registry_files(&config.data_dir, &[("ENGINE.txt", ENGINE)]);
    run_load(&config, Some(&["ENGINE"])).unwrap();

    fs::write(config.data_dir.join("ENGINE.txt"), "CODE,MFR,\n1,A,\n2\n").unwrap();
    let err = run_load(&config, Some(&["ENGINE"])).unwrap_err();
    assert!(matches!(err, PipelineError::Csv { .. }));

    let rows = table_rows(&config.destination, "engine", "code");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1].as_deref(), Some("LYCOMING"));
}

// =============================================================================
// Fetch then load
// =============================================================================

#[test]
fn test_fetch_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let (url, _requests) = serve("200 OK", ARCHIVE.clone());
    let config = config_for(&dir, &url);

    fetch(&config, &mut SilentUi::new()).unwrap();
    let info = run_load(&config, None).unwrap();

    assert_eq!(info.tables.len(), 6);
    assert_eq!(info.dataset_name, "src_airframes");
    let reserved = table_rows(&config.destination, "reserved", "n_number");
    assert_eq!(
        reserved,
        vec![vec![Some("101AB".to_string()), Some("SMITH JOHN".to_string()), None]]
    );
}
