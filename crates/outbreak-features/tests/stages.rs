//! Label, lag and window stages chained the way the pipeline runs them.

use outbreak_data::{ColumnNames, FeatureFrame, TimeBoundary};
use outbreak_features::{
    FrameStage, LagFeatureBuilder, OutbreakLabeler, SequenceWindower, TemporalSplitter,
};
use polars::prelude::*;

fn spike_series() -> FeatureFrame {
    let df = df!(
        "entity_id" => ["00001"; 6],
        "time_key" => [2015i64, 2016, 2017, 2018, 2019, 2020],
        "target_signal" => [5.0, 5.0, 5.0, 5.0, 20.0, 5.0],
    )
    .unwrap();
    FeatureFrame::new(df, ColumnNames::default()).unwrap()
}

#[test]
fn test_single_spike_scenario() {
    let labeled = OutbreakLabeler::default().apply(&spike_series()).unwrap();
    let lagged = LagFeatureBuilder::new(vec![1])
        .unwrap()
        .apply(&labeled)
        .unwrap();
    assert_eq!(lagged.height(), 5);

    let set = SequenceWindower::new(3).unwrap().windows(&lagged).unwrap();
    assert_eq!(set.feature_columns, vec!["target_signal", "target_signal_lag_1"]);
    assert_eq!(set.len(), 3);
    assert_eq!(set.labels(), vec![0, 1, 0]);

    let spike = &set.windows[1];
    assert_eq!(spike.end_time, 2019);
    assert_eq!(spike.sequence[[2, 0]], 20.0);
    assert_eq!(spike.sequence[[2, 1]], 5.0);
}

#[test]
fn test_windows_stay_inside_their_pool() {
    let df = df!(
        "entity_id" => ["a", "a", "a", "a", "a", "a", "b", "b", "b", "b", "b", "b"],
        "time_key" => [2013i64, 2014, 2015, 2016, 2017, 2018, 2013, 2014, 2015, 2016, 2017, 2018],
        "target_signal" => [1.0, 3.0, 2.0, 8.0, 2.0, 1.0, 4.0, 4.0, 5.0, 4.0, 9.0, 4.0],
    )
    .unwrap();
    let frame = FeatureFrame::new(df, ColumnNames::default()).unwrap();
    let labeled = OutbreakLabeler::default().apply(&frame).unwrap();
    let split = TemporalSplitter::new(TimeBoundary::Integer(2015))
        .split(&labeled)
        .unwrap();

    let windower = SequenceWindower::new(2).unwrap();
    let train = windower.windows(&split.train).unwrap();
    let validation = windower
        .clone()
        .with_feature_columns(train.feature_columns.clone())
        .windows(&split.validation)
        .unwrap();

    // 3 rows per entity and pool, 2 windows each
    assert_eq!(train.len(), 4);
    assert_eq!(validation.len(), 4);
    assert!(train.windows.iter().all(|w| w.end_time <= 2015));
    assert!(validation.windows.iter().all(|w| w.end_time > 2015));
    for window in train.windows.iter().chain(&validation.windows) {
        let first = window.sequence[[0, 0]];
        let entity_values: &[f64] = if window.entity == "a" {
            &[1.0, 3.0, 2.0, 8.0, 2.0, 1.0]
        } else {
            &[4.0, 4.0, 5.0, 4.0, 9.0, 4.0]
        };
        assert!(entity_values.contains(&first));
    }
}
