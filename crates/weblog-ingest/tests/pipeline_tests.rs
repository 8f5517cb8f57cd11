//! Pipeline behaviour over in-memory line streams

mod common;

use common::{
    line, lines_then_error, ok_lines, RecordingSink, APT_LINE, BAD_DATE_LINE, GARBAGE_LINE,
};
use tempfile::TempDir;
use weblog_ingest::config::IngestConfig;
use weblog_ingest::mirror::RawLineMirror;
use weblog_ingest::pipeline::{Pipeline, SourceState};
use weblog_ingest::IngestError;

fn pipeline(chunk_size: usize, sink: RecordingSink) -> Pipeline<RecordingSink> {
    let config = IngestConfig::new().with_chunk_size(chunk_size);
    Pipeline::from_config(&config, sink).unwrap()
}

// ============================================================================
// Mapping
// ============================================================================

#[tokio::test]
async fn test_apt_line_end_to_end() {
    let sink = RecordingSink::new();
    let report = pipeline(5, sink.clone()).run(ok_lines([APT_LINE])).await.unwrap();

    assert_eq!(report.state, SourceState::Eof);
    assert_eq!(report.records_mapped, 1);
    assert_eq!(sink.batch_sizes(), vec![1]);

    let record = &sink.batches()[0][0];
    assert_eq!(record.ip_address, "93.180.71.3");
    assert_eq!(record.additional_ip_info, None);
    assert_eq!(record.date.to_rfc3339(), "2015-05-17T10:05:03+00:00");
    assert_eq!(record.method, "GET");
    assert_eq!(record.uri, "/downloads/product_1");
    assert_eq!(record.http_version, "HTTP/1.1");
    assert_eq!(record.status, 304);
    assert_eq!(record.body_length, 0);
    assert_eq!(record.referer_from, None);
    assert_eq!(
        record.user_agent.as_deref(),
        Some("Debian APT-HTTP/1.3 (0.8.16~exp12ubuntu10.21)")
    );
}

#[tokio::test]
async fn test_unparseable_date_is_dropped() {
    let sink = RecordingSink::new();
    let lines = vec![line(1), BAD_DATE_LINE.to_string(), line(2), line(3)];

    let report = pipeline(2, sink.clone()).run(ok_lines(lines)).await.unwrap();

    assert_eq!(report.lines_matched, 4);
    assert_eq!(report.mapping_failures, 1);
    assert_eq!(report.records_mapped, 3);
    assert_eq!(sink.batch_sizes(), vec![2, 1]);
    assert_eq!(sink.uris(), vec!["/item/1", "/item/2", "/item/3"]);
}

#[tokio::test]
async fn test_leading_zero_address_maps_as_written() {
    let sink = RecordingSink::new();
    let line = r#"010.000.071.003 - - [17/May/2015:10:05:03 +0000] "GET / HTTP/1.1" 200 5 "-" "ua" "-""#;

    let report = pipeline(5, sink.clone()).run(ok_lines([line])).await.unwrap();

    assert_eq!(report.lines_matched, 1);
    assert_eq!(report.records_mapped, 1);
    assert_eq!(report.mapping_failures, 0);
    assert_eq!(sink.batches()[0][0].ip_address, "010.000.071.003");
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test]
async fn test_blank_and_unmatched_lines_are_skipped() {
    let sink = RecordingSink::new();
    let lines = vec![
        String::new(),
        line(1),
        "\r".to_string(),
        GARBAGE_LINE.to_string(),
        line(2),
        String::new(),
    ];

    let report = pipeline(5, sink.clone()).run(ok_lines(lines)).await.unwrap();

    assert_eq!(report.lines_read, 6);
    assert_eq!(report.blank_lines, 3);
    assert_eq!(report.lines_unmatched, 1);
    assert_eq!(report.lines_matched, 2);
    assert_eq!(sink.uris(), vec!["/item/1", "/item/2"]);
}

#[tokio::test]
async fn test_empty_source_never_calls_sink() {
    let sink = RecordingSink::new();
    let report = pipeline(5, sink.clone())
        .run(ok_lines(Vec::<String>::new()))
        .await
        .unwrap();

    assert_eq!(report.state, SourceState::Eof);
    assert_eq!(report.lines_read, 0);
    assert_eq!(sink.call_count(), 0);
}

// ============================================================================
// Batching
// ============================================================================

#[tokio::test]
async fn test_batches_preserve_order() {
    let sink = RecordingSink::new();
    let lines: Vec<String> = (0..12).map(line).collect();

    let report = pipeline(5, sink.clone()).run(ok_lines(lines)).await.unwrap();

    // ceil(12 / 5) inserts, the last one partial
    assert_eq!(sink.batch_sizes(), vec![5, 5, 2]);
    let expected: Vec<String> = (0..12).map(|n| format!("/item/{n}")).collect();
    assert_eq!(sink.uris(), expected);
    assert_eq!(report.batches.batches_flushed, 3);
    assert_eq!(report.batches.records_persisted, 12);
}

#[tokio::test]
async fn test_exact_multiple_has_no_empty_final_batch() {
    let sink = RecordingSink::new();
    let lines: Vec<String> = (0..10).map(line).collect();

    pipeline(5, sink.clone()).run(ok_lines(lines)).await.unwrap();

    assert_eq!(sink.batch_sizes(), vec![5, 5]);
    assert_eq!(sink.call_count(), 2);
}

#[tokio::test]
async fn test_failed_batch_is_discarded_and_run_continues() {
    let sink = RecordingSink::failing_on(vec![1]);
    let lines: Vec<String> = (0..7).map(line).collect();

    let report = pipeline(3, sink.clone()).run(ok_lines(lines)).await.unwrap();

    assert_eq!(report.state, SourceState::Eof);
    assert_eq!(sink.call_count(), 3);
    assert_eq!(sink.batch_sizes(), vec![3, 1]);
    assert_eq!(sink.uris(), vec!["/item/0", "/item/1", "/item/2", "/item/6"]);
    assert_eq!(report.batches.batches_failed, 1);
    assert_eq!(report.batches.records_discarded, 3);
    assert_eq!(report.batches.records_persisted, 4);
}

// ============================================================================
// Source failure
// ============================================================================

#[tokio::test]
async fn test_source_error_aborts_without_flushing_pending() {
    let sink = RecordingSink::new();
    let lines: Vec<String> = (0..7).map(line).collect();

    let result = pipeline(5, sink.clone()).run(lines_then_error(lines)).await;

    assert!(matches!(result, Err(IngestError::Read(_))));
    // first full batch stays stored, the two pending records are not flushed
    assert_eq!(sink.batch_sizes(), vec![5]);
}

// ============================================================================
// Mirroring
// ============================================================================

#[tokio::test]
async fn test_mirror_receives_matched_lines_verbatim() {
    let dir = TempDir::new().unwrap();
    let mirror_path = dir.path().join("nested").join("mirror.log");
    let config = IngestConfig::new()
        .with_save(true)
        .with_mirror_path(&mirror_path);

    let sink = RecordingSink::new();
    let lines = vec![
        APT_LINE.to_string(),
        GARBAGE_LINE.to_string(),
        String::new(),
        BAD_DATE_LINE.to_string(),
    ];
    let report = Pipeline::from_config(&config, sink)
        .unwrap()
        .run(ok_lines(lines))
        .await
        .unwrap();

    assert_eq!(report.lines_mirrored, 2);
    let contents = std::fs::read_to_string(&mirror_path).unwrap();
    assert_eq!(contents, format!("{APT_LINE}\n{BAD_DATE_LINE}\n"));
}

#[tokio::test]
async fn test_mirror_appends_across_runs() {
    let dir = TempDir::new().unwrap();
    let mirror_path = dir.path().join("mirror.log");

    for n in 0..2 {
        let pipeline = pipeline(5, RecordingSink::new())
            .with_mirror(RawLineMirror::to_path(&mirror_path));
        pipeline.run(ok_lines([line(n)])).await.unwrap();
    }

    let contents = std::fs::read_to_string(&mirror_path).unwrap();
    assert_eq!(contents, format!("{}\n{}\n", line(0), line(1)));
}

#[tokio::test]
async fn test_mirror_file_not_created_without_matches() {
    let dir = TempDir::new().unwrap();
    let mirror_dir = dir.path().join("logs");
    let config = IngestConfig::new().with_save(true).with_mirror_dir(&mirror_dir);

    Pipeline::from_config(&config, RecordingSink::new())
        .unwrap()
        .run(ok_lines([GARBAGE_LINE]))
        .await
        .unwrap();

    assert!(!mirror_dir.exists());
}

#[tokio::test]
async fn test_uncreatable_mirror_dir_aborts_run() {
    let dir = TempDir::new().unwrap();
    let regular_file = dir.path().join("not-a-dir");
    std::fs::write(&regular_file, b"").unwrap();
    let config = IngestConfig::new()
        .with_save(true)
        .with_mirror_dir(regular_file.join("sub"));

    let sink = RecordingSink::new();
    let lines: Vec<String> = (0..7).map(line).collect();
    let result = Pipeline::from_config(&config, sink.clone())
        .unwrap()
        .run(ok_lines(lines))
        .await;

    assert!(matches!(result, Err(IngestError::Mirror { .. })));
    assert_eq!(sink.call_count(), 0);
}

#[tokio::test]
async fn test_mirror_is_flushed_when_source_fails() {
    let dir = TempDir::new().unwrap();
    let mirror_path = dir.path().join("mirror.log");
    let config = IngestConfig::new()
        .with_chunk_size(5)
        .with_save(true)
        .with_mirror_path(&mirror_path);

    let sink = RecordingSink::new();
    let lines: Vec<String> = (0..3).map(line).collect();
    let result = Pipeline::from_config(&config, sink.clone())
        .unwrap()
        .run(lines_then_error(lines.clone()))
        .await;

    assert!(matches!(result, Err(IngestError::Read(_))));
    assert_eq!(sink.call_count(), 0);

    let contents = std::fs::read_to_string(&mirror_path).unwrap();
    assert_eq!(contents, format!("{}\n{}\n{}\n", lines[0], lines[1], lines[2]));
}
