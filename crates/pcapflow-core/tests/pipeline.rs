mod support;

use std::fs;

use pcapflow_core::{ExportError, ExportFormat, ExportSink, Pipeline, PipelineError, PipelineState};
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn offline_json_export_keeps_protocol_order() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("capture.pcapng");
    support::write_pcapng(&input, &support::mixed_frames());

    let mut pipeline = Pipeline::new().with_export(ExportSink::new(ExportFormat::Json, dir.path()));
    let summary = pipeline.run_offline(&input).unwrap();

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.frame_errors, 0);

    let path = summary.export_path.unwrap();
    assert_eq!(path, dir.path().join("pcap_data.json"));
    let written: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    let protocols: Vec<&str> = written
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["protocol"].as_str().unwrap())
        .collect();
    assert_eq!(protocols, vec!["TCP", "UDP", "Unknown"]);
    assert_eq!(written[0]["src_ip"], "10.0.0.1");
    assert!(written[2].get("src_ip").is_none());
}

#[test]
fn offline_csv_export_fills_placeholders() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("capture.pcapng");
    support::write_pcapng(&input, &support::mixed_frames());

    let mut pipeline = Pipeline::new().with_export(ExportSink::new(ExportFormat::Csv, dir.path()));
    let summary = pipeline.run_offline(&input).unwrap();

    let contents = fs::read_to_string(summary.export_path.unwrap()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "timestamp,size,protocol,src_ip,dst_ip");
    assert!(lines[1].ends_with(",TCP,10.0.0.1,10.0.0.2"));
    assert!(lines[3].ends_with(",Unknown,N/A,N/A"));
}

#[test]
fn empty_capture_csv_export_fails_without_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("empty.pcapng");
    support::write_pcapng(&input, &[]);

    let mut pipeline = Pipeline::new().with_export(ExportSink::new(ExportFormat::Csv, dir.path()));
    let err = pipeline.run_offline(&input).unwrap_err();

    assert!(matches!(err, PipelineError::Export(ExportError::Empty)));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(!dir.path().join("pcap_data.csv").exists());
}

#[test]
fn empty_capture_json_export_writes_empty_array() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("empty.pcapng");
    support::write_pcapng(&input, &[]);

    let mut pipeline = Pipeline::new().with_export(ExportSink::new(ExportFormat::Json, dir.path()));
    let summary = pipeline.run_offline(&input).unwrap();

    assert_eq!(fs::read_to_string(summary.export_path.unwrap()).unwrap(), "[]");
}
