use std::time::Duration;

use energy_core::{DataType, Reading, SchedulerError, SourceRegistry};
use energy_dispatcher::MultiSourceCollector;
use energy_infrastructure::{TimeoutConfig, TimeoutHandler};
use energy_testing_utils::{sample_weather_batch, seoul, test_metrics, MockDataSource};

fn collector(sources: Vec<MockDataSource>, source_timeout: Duration) -> MultiSourceCollector {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry.register(source.into_arc());
    }
    MultiSourceCollector::new(
        registry,
        TimeoutHandler::new(TimeoutConfig::with_source_timeout(source_timeout)),
        test_metrics(),
    )
}

fn chain(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_fallback_to_second_source() {
    let primary = MockDataSource::failing("openweather", "HTTP 503");
    let backup = MockDataSource::succeeding("weatherapi", sample_weather_batch(5));
    let collector = collector(
        vec![primary.clone(), backup.clone()],
        Duration::from_secs(10),
    );

    let batch = collector
        .collect(&seoul(), DataType::CurrentWeather, &chain(&["openweather", "weatherapi"]))
        .await
        .unwrap();

    assert_eq!(batch.source_used, "weatherapi");
    assert_eq!(batch.readings.len(), 5);
    assert_eq!(batch.failed_sources.len(), 1);
    assert_eq!(batch.failed_sources[0].source, "openweather");
    assert_eq!(primary.call_count(), 1);
    assert_eq!(backup.call_count(), 1);
}

#[tokio::test]
async fn test_first_success_stops_the_chain() {
    let primary = MockDataSource::succeeding("openweather", sample_weather_batch(3));
    let backup = MockDataSource::succeeding("weatherapi", sample_weather_batch(3));
    let collector = collector(vec![primary.clone(), backup.clone()], Duration::from_secs(10));

    let batch = collector
        .collect(&seoul(), DataType::Forecast, &chain(&["openweather", "weatherapi"]))
        .await
        .unwrap();

    assert_eq!(batch.source_used, "openweather");
    assert!(batch.failed_sources.is_empty());
    assert_eq!(backup.call_count(), 0);
}

#[tokio::test]
async fn test_all_sources_failed_carries_reasons() {
    let collector = collector(
        vec![
            MockDataSource::failing("openweather", "HTTP 500"),
            MockDataSource::failing("noaa", "connection refused"),
        ],
        Duration::from_secs(10),
    );

    let err = collector
        .collect(
            &seoul(),
            DataType::CurrentWeather,
            &chain(&["openweather", "noaa", "accuweather"]),
        )
        .await
        .unwrap_err();

    match err {
        SchedulerError::AllSourcesFailed { failures } => {
            let sources: Vec<&str> = failures.iter().map(|f| f.source.as_str()).collect();
            assert_eq!(sources, vec!["openweather", "noaa", "accuweather"]);
            assert!(failures[1].reason.contains("connection refused"));
            assert!(failures[2].reason.contains("未注册"));
        }
        other => panic!("expected AllSourcesFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_times_out_and_next_is_tried() {
    let slow = MockDataSource::slow("openweather", Duration::from_secs(30), sample_weather_batch(2));
    let backup = MockDataSource::succeeding("noaa", sample_weather_batch(2));
    let collector = collector(vec![slow, backup], Duration::from_secs(5));

    let batch = collector
        .collect(&seoul(), DataType::CurrentWeather, &chain(&["openweather", "noaa"]))
        .await
        .unwrap();

    assert_eq!(batch.source_used, "noaa");
    assert!(batch.failed_sources[0].reason.contains("超时"));
}

#[tokio::test]
async fn test_schema_invalid_batch_counts_as_failure() {
    let no_temperature = vec![Reading::new()
        .with("timestamp", "2024-01-01T00:00:00Z")
        .with("humidity", 40.0)];
    let broken = MockDataSource::succeeding("openweather", no_temperature);
    let empty = MockDataSource::succeeding("weatherapi", Vec::new());
    let good = MockDataSource::succeeding("noaa", sample_weather_batch(1));
    let collector = collector(vec![broken, empty, good], Duration::from_secs(10));

    let batch = collector
        .collect(
            &seoul(),
            DataType::CurrentWeather,
            &chain(&["openweather", "weatherapi", "noaa"]),
        )
        .await
        .unwrap();

    assert_eq!(batch.source_used, "noaa");
    assert_eq!(batch.failed_sources.len(), 2);
}

#[tokio::test]
async fn test_unsupported_data_type_is_skipped_without_call() {
    let weather_only = MockDataSource::succeeding("openweather", sample_weather_batch(1))
        .supporting(vec![DataType::CurrentWeather]);
    let collector = collector(vec![weather_only.clone()], Duration::from_secs(10));

    let err = collector
        .collect(&seoul(), DataType::EnergyLoad, &chain(&["openweather"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::AllSourcesFailed { .. }));
    assert_eq!(weather_only.call_count(), 0);
}
