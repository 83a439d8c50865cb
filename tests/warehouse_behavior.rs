//! Behavior-driven tests for the safe incremental loader
//!
//! These tests verify HOW the warehouse keeps date-keyed tables free of
//! duplicates across runs, how writes stay atomic, and what the auditor
//! reports, focusing on observable table contents.

use std::path::Path;
use std::time::Duration;

use mercados_warehouse::audit::{audit, AuditFinding};
use mercados_warehouse::loader::{existing_keys, write};
use mercados_warehouse::records::{DailyBarRecord, PerformanceRecord, SplitRecord};
use mercados_warehouse::tables::{
    Column, ColumnType, DATE_KEYED_TABLES, MERCADO_DIARIO, RENDIMIENTO_FINANCIERO, SPLITS,
};
use mercados_warehouse::{
    connect, inventory, ConnectionHandle, KeyTuple, TableRow, TableSpec, WarehouseConfig,
    WarehouseError,
};
use duckdb::types::Value;
use tempfile::tempdir;
use time::{Date, Month};

fn config_in(dir: &Path) -> WarehouseConfig {
    WarehouseConfig {
        connect_retry_delay: Duration::ZERO,
        max_pool_size: 2,
        ..WarehouseConfig::at(dir.join("warehouse.duckdb"))
    }
}

fn open(dir: &Path) -> ConnectionHandle {
    connect(config_in(dir)).expect("warehouse connect")
}

fn row_count(handle: &ConnectionHandle, table: &str) -> i64 {
    let connection = handle.acquire().expect("acquire");
    connection
        .query_row(
            &format!("SELECT COUNT(*) FROM {}", handle.qualified(table)),
            [],
            |row| row.get(0),
        )
        .expect("count rows")
}

fn jan(day: u8) -> Date {
    Date::from_calendar_date(2024, Month::January, day).expect("valid date")
}

fn bar(ticker: &str, date: Date, close: f64) -> DailyBarRecord {
    DailyBarRecord {
        ticker: ticker.to_string(),
        market: "IBEX_35".to_string(),
        date,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000,
    }
}

// A probe table with a CHECK constraint, used to force a failure in the
// middle of a batch.
const PROBE: TableSpec = TableSpec {
    name: "probe",
    columns: &[
        Column {
            name: "ticker",
            ty: ColumnType::Text,
        },
        Column {
            name: "date",
            ty: ColumnType::Date,
        },
        Column {
            name: "value",
            ty: ColumnType::Double,
        },
    ],
    key_columns: Some(&["ticker", "date"]),
};

struct ProbeRow {
    ticker: &'static str,
    date: Date,
    value: f64,
}

impl TableRow for ProbeRow {
    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.ticker.to_string()),
            Value::Text(self.date.to_string()),
            Value::Double(self.value),
        ]
    }

    fn key(&self) -> Option<KeyTuple> {
        Some(vec![self.ticker.to_string(), self.date.to_string()])
    }
}

fn create_probe(handle: &ConnectionHandle) {
    let connection = handle.acquire().expect("acquire");
    connection
        .execute_batch(&format!(
            "CREATE TABLE {} (ticker TEXT, \"date\" DATE, value DOUBLE CHECK (value >= 0))",
            handle.qualified(PROBE.name)
        ))
        .expect("create probe table");
}

// =============================================================================
// Loader: Incremental Writes
// =============================================================================

#[test]
fn when_the_same_batch_is_loaded_twice_the_second_run_writes_nothing() {
    // Given: A warehouse that already received a batch of bars
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    let bars = vec![bar("SAN.MC", jan(2), 3.5), bar("SAN.MC", jan(3), 3.6)];
    let first = write(&handle, &MERCADO_DIARIO, &bars).expect("first write");
    assert_eq!(first.written, 2);

    // When: The identical batch is loaded again
    let second = write(&handle, &MERCADO_DIARIO, &bars).expect("second write");

    // Then: Nothing new is appended and the table is unchanged
    assert!(second.is_noop());
    assert_eq!(second.skipped_existing, 2);
    assert_eq!(row_count(&handle, "mercado_diario"), 2);
}

#[test]
fn when_some_keys_exist_only_the_missing_rows_are_appended() {
    // Given: Ticker B already has its bar for the day
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    write(&handle, &MERCADO_DIARIO, &[bar("B.MC", jan(2), 2.0)]).expect("seed");

    // When: A batch with A, B and C for the same day arrives
    let batch = vec![
        bar("A.MC", jan(2), 1.0),
        bar("B.MC", jan(2), 20.0),
        bar("C.MC", jan(2), 3.0),
    ];
    let outcome = write(&handle, &MERCADO_DIARIO, &batch).expect("write");

    // Then: Only A and C are written, and the stored B keeps its original value
    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.skipped_existing, 1);
    assert_eq!(row_count(&handle, "mercado_diario"), 3);

    let connection = handle.acquire().expect("acquire");
    let stored_b: f64 = connection
        .query_row(
            &format!(
                "SELECT \"closing price\" FROM {} WHERE ticker = 'B.MC'",
                handle.qualified("mercado_diario")
            ),
            [],
            |row| row.get(0),
        )
        .expect("read B");
    assert_eq!(stored_b, 2.0);
}

#[test]
fn when_a_fetched_range_overlaps_stored_dates_only_the_new_days_are_appended() {
    // Given: ABC bars stored for 2024-01-01 through 2024-01-03
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    let stored: Vec<_> = (1..=3).map(|day| bar("ABC", jan(day), 1.0)).collect();
    write(&handle, &MERCADO_DIARIO, &stored).expect("seed");

    // When: A fetch covering 2024-01-02 through 2024-01-05 is loaded
    let fetched: Vec<_> = (2..=5).map(|day| bar("ABC", jan(day), 7.0)).collect();
    let outcome = write(&handle, &MERCADO_DIARIO, &fetched).expect("write");

    // Then: Only 01-04 and 01-05 are appended and the overlapping days keep their values
    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.skipped_existing, 2);
    assert_eq!(row_count(&handle, "mercado_diario"), 5);

    let connection = handle.acquire().expect("acquire");
    let mut statement = connection
        .prepare(&format!(
            "SELECT CAST(\"date\" AS VARCHAR), \"closing price\" FROM {} \
             WHERE ticker = 'ABC' ORDER BY \"date\"",
            handle.qualified("mercado_diario")
        ))
        .expect("prepare");
    let stored: Vec<(String, f64)> = statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(
        stored,
        vec![
            (String::from("2024-01-01"), 1.0),
            (String::from("2024-01-02"), 1.0),
            (String::from("2024-01-03"), 1.0),
            (String::from("2024-01-04"), 7.0),
            (String::from("2024-01-05"), 7.0),
        ]
    );
    drop(statement);
    drop(connection);

    // And: Loading the same fetch again changes nothing
    let again = write(&handle, &MERCADO_DIARIO, &fetched).expect("rewrite");
    assert!(again.is_noop());
    assert_eq!(row_count(&handle, "mercado_diario"), 5);
}

#[test]
fn when_the_input_is_empty_the_write_is_a_successful_no_op() {
    // Given: A fresh warehouse
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());

    // When: An empty dataset is written
    let outcome = write::<SplitRecord>(&handle, &SPLITS, &[]).expect("empty write");

    // Then: It succeeds without touching the table
    assert!(outcome.is_noop());
    assert_eq!(outcome.received, 0);
    assert_eq!(row_count(&handle, "splits"), 0);
}

#[test]
fn when_a_batch_repeats_a_key_only_the_first_row_is_kept() {
    // Given: A fresh warehouse
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());

    // When: One batch carries the same (ticker, date) twice
    let batch = vec![
        bar("SAN.MC", jan(2), 3.5),
        bar("SAN.MC", jan(2), 9.9),
        bar("SAN.MC", jan(3), 3.6),
    ];
    let outcome = write(&handle, &MERCADO_DIARIO, &batch).expect("write");

    // Then: The key is stored once and the auditor stays quiet
    assert_eq!(outcome.written, 2);
    assert_eq!(outcome.skipped_in_batch, 1);
    let report = audit(&handle, &DATE_KEYED_TABLES);
    assert!(report.is_clean(), "unexpected findings: {report:?}");
}

#[test]
fn snapshot_tables_accumulate_rows_across_runs() {
    // Given: A performance snapshot already written once
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    let snapshot = vec![PerformanceRecord {
        ticker: "ISA.CL".to_string(),
        market: "COLCAP".to_string(),
        market_cap: 1.0e12,
        fifty_day_average: 17_000.0,
        two_hundred_day_average: 16_500.0,
        fifty_two_week_change_percent: 4.2,
    }];
    write(&handle, &RENDIMIENTO_FINANCIERO, &snapshot).expect("first snapshot");

    // When: The identical snapshot is written again
    let outcome = write(&handle, &RENDIMIENTO_FINANCIERO, &snapshot).expect("second snapshot");

    // Then: It is appended without any filtering
    assert_eq!(outcome.written, 1);
    assert_eq!(row_count(&handle, "rendimiento_financiero"), 2);
}

#[test]
fn large_batches_are_chunked_but_fully_written() {
    // Given: A warehouse with a tiny chunk size
    let temp = tempdir().expect("tempdir");
    let handle = connect(WarehouseConfig {
        chunk_size: 3,
        ..config_in(temp.path())
    })
    .expect("connect");

    // When: Ten bars are written
    let bars: Vec<_> = (1..=10).map(|day| bar("TEF.MC", jan(day), f64::from(day))).collect();
    let outcome = write(&handle, &MERCADO_DIARIO, &bars).expect("write");

    // Then: Every bar lands
    assert_eq!(outcome.written, 10);
    assert_eq!(row_count(&handle, "mercado_diario"), 10);
}

// =============================================================================
// Loader: Atomicity
// =============================================================================

#[test]
fn when_a_chunk_fails_the_whole_batch_is_rolled_back() {
    // Given: A probe table holding one row, and a chunk size of two
    let temp = tempdir().expect("tempdir");
    let handle = connect(WarehouseConfig {
        chunk_size: 2,
        ..config_in(temp.path())
    })
    .expect("connect");
    create_probe(&handle);
    write(
        &handle,
        &PROBE,
        &[ProbeRow {
            ticker: "SEED",
            date: jan(1),
            value: 1.0,
        }],
    )
    .expect("seed");

    // When: The fourth of five rows violates the CHECK constraint
    let rows: Vec<_> = (2..=6)
        .map(|day| ProbeRow {
            ticker: "X",
            date: jan(day),
            value: if day == 5 { -1.0 } else { 1.0 },
        })
        .collect();
    let error = write(&handle, &PROBE, &rows).expect_err("write must fail");

    // Then: The error names the table and the first chunk was undone too
    assert!(matches!(error, WarehouseError::Write { table: "probe", .. }));
    assert_eq!(row_count(&handle, "probe"), 1);
}

// =============================================================================
// Existing-Key Index
// =============================================================================

#[test]
fn existing_keys_of_a_missing_table_is_an_empty_set() {
    // Given: A warehouse without the probe table
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());

    // When / Then: Reading its keys yields nothing instead of an error
    assert!(existing_keys(&handle, &PROBE).is_empty());
}

#[test]
fn existing_keys_render_dates_like_the_rows_do() {
    // Given: One stored split
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    let split = SplitRecord {
        date: jan(15),
        ticker: "ITX.MC".to_string(),
        ratio: 5.0,
        market: "IBEX_35".to_string(),
    };
    write(&handle, &SPLITS, &[split.clone()]).expect("write");

    // When: Its keys are read back
    let keys = existing_keys(&handle, &SPLITS);

    // Then: They match the key the record itself produces
    assert_eq!(keys.len(), 1);
    assert!(keys.contains(&split.key().expect("split is keyed")));
}

// =============================================================================
// Duplicate Auditor
// =============================================================================

#[test]
fn auditor_reports_duplicates_written_outside_the_loader() {
    // Given: Two identical bars inserted behind the loader's back
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    {
        let connection = handle.acquire().expect("acquire");
        let sql = format!(
            "INSERT INTO {} VALUES ('SAN.MC', 'IBEX_35', DATE '2024-01-02', 1, 1, 1, 1, 1), \
                                   ('SAN.MC', 'IBEX_35', DATE '2024-01-02', 1, 1, 1, 1, 1)",
            handle.qualified("mercado_diario")
        );
        connection.execute_batch(&sql).expect("raw insert");
    }

    // When: The auditor runs
    let report = audit(&handle, &DATE_KEYED_TABLES);

    // Then: It reports one duplicated group and leaves the data alone
    assert_eq!(
        report.findings.get("mercado_diario"),
        Some(&AuditFinding::Duplicates { groups: 1 })
    );
    assert_eq!(report.findings.get("splits"), Some(&AuditFinding::Clean));
    assert_eq!(report.violation_count(), 1);
    assert_eq!(row_count(&handle, "mercado_diario"), 2);
}

#[test]
fn auditor_marks_tables_it_cannot_query_as_unchecked() {
    // Given: The dividend table was dropped
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    {
        let connection = handle.acquire().expect("acquire");
        connection
            .execute_batch(&format!("DROP TABLE {}", handle.qualified("dividendos")))
            .expect("drop");
    }

    // When: The auditor runs
    let report = audit(&handle, &DATE_KEYED_TABLES);

    // Then: The missing table is reported, the others are still checked
    assert!(matches!(
        report.findings.get("dividendos"),
        Some(AuditFinding::Unchecked { .. })
    ));
    assert_eq!(report.findings.get("mercado_diario"), Some(&AuditFinding::Clean));
    assert_eq!(report.findings.len(), 4);
}

// =============================================================================
// Connection Manager
// =============================================================================

#[test]
fn when_the_store_cannot_be_opened_connect_gives_up_after_three_attempts() {
    // Given: A database path that points at a directory
    let temp = tempdir().expect("tempdir");
    let config = WarehouseConfig {
        connect_retry_delay: Duration::ZERO,
        ..WarehouseConfig::at(temp.path())
    };

    // When: Connecting
    let error = connect(config).err().expect("connect must fail");

    // Then: A fatal connection error reports the attempts made
    assert!(error.is_fatal());
    match error {
        WarehouseError::Connection { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn reconnecting_keeps_previously_loaded_keys() {
    // Given: A run that stored bars and closed its handle
    let temp = tempdir().expect("tempdir");
    let bars = vec![bar("BBVA.MC", jan(2), 9.1)];
    {
        let handle = open(temp.path());
        write(&handle, &MERCADO_DIARIO, &bars).expect("first run");
        handle.close();
    }

    // When: A second run reconnects and loads the same bars
    let handle = open(temp.path());
    let outcome = write(&handle, &MERCADO_DIARIO, &bars).expect("second run");

    // Then: The stored keys are honoured
    assert!(outcome.is_noop());
    assert_eq!(row_count(&handle, "mercado_diario"), 1);
}

// =============================================================================
// Inventory
// =============================================================================

#[test]
fn inventory_lists_every_market_table() {
    // Given: A warehouse with a couple of bars
    let temp = tempdir().expect("tempdir");
    let handle = open(temp.path());
    write(
        &handle,
        &MERCADO_DIARIO,
        &[bar("SAN.MC", jan(2), 3.5), bar("SAN.MC", jan(3), 3.6)],
    )
    .expect("write");

    // When: The inventory is taken
    let inventory = inventory(&handle).expect("inventory");

    // Then: All eight tables are listed with their counts
    assert_eq!(inventory.tables.len(), 8);
    assert_eq!(inventory.rows("mercado_diario"), Some(2));
    assert_eq!(inventory.rows("activos"), Some(0));
    assert!(inventory.markets.is_empty());
}
