//! Integration tests for report exports written to disk.

use outbreak_output::{
    ConfusionMatrix, EpochMetrics, ExportFormat, Exporter, MetricsReport, ReportBuilder,
    StopReason, TimeSliceMetrics, TrainingHistory,
};
use std::fs;
use tempfile::TempDir;

fn history() -> TrainingHistory {
    let mut history = TrainingHistory::new(4.0);
    for (epoch, val_loss) in [(1, 0.9), (2, 0.7), (3, 0.8)] {
        history.push(EpochMetrics {
            epoch,
            train_loss: 1.0 / epoch as f64,
            val_loss,
            val_auc: 0.5 + epoch as f64 / 10.0,
            learning_rate: 0.001,
            improved: epoch < 3,
        });
    }
    history.finish(StopReason::EarlyStopping);
    history
}

#[test]
fn test_full_export_workflow() {
    let dir = TempDir::new().unwrap();
    let slices = vec![
        TimeSliceMetrics {
            time_key: 2020,
            n_windows: 40,
            auc: 0.8,
            accuracy: 0.9,
            outbreak_rate: 0.15,
        },
        TimeSliceMetrics {
            time_key: 2021,
            n_windows: 60,
            auc: 0.0,
            accuracy: 1.0,
            outbreak_rate: 0.0,
        },
    ];
    let report = MetricsReport::new(0.82, 0.5, ConfusionMatrix::new(80, 5, 4, 11), slices);

    let metrics_path = dir.path().join("eval").join("metrics.json");
    report
        .export_to_file(&metrics_path, ExportFormat::from_path(&metrics_path).unwrap())
        .unwrap();
    let back: MetricsReport =
        serde_json::from_str(&fs::read_to_string(&metrics_path).unwrap()).unwrap();
    assert_eq!(back.per_time_slice.len(), 2);
    assert_eq!(back.confusion_matrix.tp, 11);

    let slices_path = dir.path().join("eval").join("slices.csv");
    report
        .per_time_slice
        .export_to_file(&slices_path, ExportFormat::Csv)
        .unwrap();
    let csv = fs::read_to_string(&slices_path).unwrap();
    assert!(csv.starts_with("time_key,n_windows,auc,accuracy,outbreak_rate"));
    assert_eq!(csv.lines().count(), 3);

    let history_path = dir.path().join("history.csv");
    history()
        .export_to_file(&history_path, ExportFormat::Csv)
        .unwrap();
    assert_eq!(fs::read_to_string(&history_path).unwrap().lines().count(), 4);

    let envelope = ReportBuilder::new()
        .title("evaluation")
        .model_version("outbreak_v2")
        .section("metrics", &report)
        .unwrap()
        .section("history", &history())
        .unwrap()
        .build();
    let json = envelope.to_json().unwrap();
    assert!(json.contains("\"outbreak_v2\""));
    assert!(json.contains("\"early_stopping\""));
}

#[test]
fn test_terminal_rendering() {
    let report = MetricsReport::new(0.5, 0.5, ConfusionMatrix::new(10, 0, 0, 0), Vec::new());
    let ascii = report.to_ascii_table();
    assert!(ascii.contains("10 windows"));
    assert!(!ascii.contains("By Period"));

    let table = history().to_ascii_table();
    assert!(table.contains("Best epoch 2"));
}
