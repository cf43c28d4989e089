mod common;

use flightwx::{
    build_departure_features, load_dataset, parse_date, parse_timestamp, rebuild_feature_table,
    Dataset, FeatureError, FeatureJoinConfig, FeatureRequest, GeoBucket, LoadConfig, MatchPolicy,
    Store,
};
use rusqlite::types::Value;
use tempfile::{tempdir, TempDir};

use common::{airport, flight, mdt, weather, with, write_dataset_csv, FixtureRow};

struct Fixture {
    _temp: TempDir,
    store: Store,
}

fn seed(airports: &[FixtureRow], flights: &[FixtureRow], weather: &[FixtureRow]) -> Fixture {
    let temp = tempdir().expect("temp dir should be created");
    let mut store =
        Store::open(&temp.path().join("airline_data.db")).expect("store should open");

    for (dataset, rows) in [
        (Dataset::Airports, airports),
        (Dataset::Flights, flights),
        (Dataset::Weather, weather),
    ] {
        let file = write_dataset_csv(
            &temp.path().join(format!("{}.csv", dataset.table_name())),
            dataset,
            rows,
        );
        let report = load_dataset(&mut store, dataset, &[file], &LoadConfig::default())
            .expect("fixture load should succeed");
        assert!(report.failures.is_empty(), "{:?}", report.failures);
    }

    Fixture { _temp: temp, store }
}

fn mdt_request(start: &str, end: &str) -> FeatureRequest {
    FeatureRequest {
        airport_code: "MDT".to_string(),
        start_date: parse_date(start).expect("valid start date"),
        end_date: parse_date(end).expect("valid end date"),
    }
}

fn feature_rows(store: &Store) -> Vec<Vec<Value>> {
    let mut stmt = store
        .connection()
        .prepare("SELECT * FROM features ORDER BY row_index")
        .expect("features query should prepare");
    let width = stmt.column_count();
    stmt.query_map([], |row| {
        (0..width).map(|idx| row.get::<_, Value>(idx)).collect()
    })
    .expect("features query should run")
    .collect::<Result<Vec<_>, _>>()
    .expect("features rows should decode")
}

#[test]
fn departure_joins_observation_three_hours_earlier_exactly_once() {
    let fixture = seed(
        &[mdt()],
        &[flight("2017-06-01", "1400", "0")],
        &[
            weather("2017-06-01 10:00", "61"),
            weather("2017-06-01 11:00", "70"),
            weather("2017-06-01 14:00", "75"),
        ],
    );

    let (records, report) = build_departure_features(
        &fixture.store,
        &mdt_request("2017-06-01", "2017-06-01"),
        &FeatureJoinConfig::default(),
    )
    .expect("join should succeed");

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(
        record.weather.measurement_hour,
        parse_timestamp("2017-06-01 11:00").expect("valid timestamp")
    );
    assert_eq!(record.weather.dry_bulb_temp_f, Some(70.0));
    assert_eq!(record.location, GeoBucket { lat: 401, lon: -767 });
    assert_eq!(record.calendar.hour_of_day, 14);
    assert_eq!(record.calendar.day_of_week, 3);

    assert_eq!(report.location, Some(GeoBucket { lat: 401, lon: -767 }));
    assert_eq!(report.flights_read, 1);
    assert_eq!(report.weather_rows_read, 3);
    assert_eq!(report.records_emitted, 1);
    assert_eq!(report.unmatched_flights, 0);
    assert_eq!(report.ambiguous_flights, 0);
}

#[test]
fn early_departure_sees_previous_evening_observation() {
    let fixture = seed(
        &[mdt()],
        &[flight("2017-06-02", "130", "0")],
        &[weather("2017-06-01 22:40", "64")],
    );

    let (records, _) = build_departure_features(
        &fixture.store,
        &mdt_request("2017-06-02", "2017-06-02"),
        &FeatureJoinConfig::default(),
    )
    .expect("join should succeed");

    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].flight.departure_hour_scheduled,
        parse_timestamp("2017-06-02 01:00").expect("valid timestamp")
    );
}

#[test]
fn flights_outside_range_or_airport_are_excluded() {
    let fixture = seed(
        &[
            mdt(),
            airport("ATL", "1039705", "10397", 33.6367, -84.4281),
        ],
        &[
            flight("2017-06-01", "1400", "0"),
            flight("2017-06-03", "1400", "0"),
            with(flight("2017-06-01", "1400", "0"), "Origin", "ATL"),
        ],
        &[
            weather("2017-06-01 11:00", "70"),
            weather("2017-06-03 11:00", "70"),
        ],
    );

    let (records, report) = build_departure_features(
        &fixture.store,
        &mdt_request("2017-06-01", "2017-06-02"),
        &FeatureJoinConfig::default(),
    )
    .expect("join should succeed");

    assert_eq!(report.flights_read, 1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flight.origin, "MDT");
}

#[test]
fn unmatched_departures_are_counted_not_emitted() {
    let fixture = seed(
        &[mdt()],
        &[flight("2017-06-01", "1400", "0"), flight("2017-06-01", "1800", "0")],
        &[weather("2017-06-01 11:00", "70")],
    );

    let (records, report) = build_departure_features(
        &fixture.store,
        &mdt_request("2017-06-01", "2017-06-01"),
        &FeatureJoinConfig::default(),
    )
    .expect("join should succeed");

    assert_eq!(records.len(), 1);
    assert_eq!(report.unmatched_flights, 1);
}

#[test]
fn ambiguous_matches_fan_out_by_default_and_fail_when_strict() {
    let fixture = seed(
        &[mdt()],
        &[flight("2017-06-01", "1400", "0")],
        &[
            weather("2017-06-01 11:00", "70"),
            weather("2017-06-01 11:51", "71"),
        ],
    );
    let req = mdt_request("2017-06-01", "2017-06-01");

    let (records, report) =
        build_departure_features(&fixture.store, &req, &FeatureJoinConfig::default())
            .expect("fan-out join should succeed");
    assert_eq!(records.len(), 2);
    assert!(records[0].weather.row_index < records[1].weather.row_index);
    assert_eq!(report.ambiguous_flights, 1);

    let strict = FeatureJoinConfig {
        match_policy: MatchPolicy::Strict,
        ..FeatureJoinConfig::default()
    };
    let err = build_departure_features(&fixture.store, &req, &strict)
        .expect_err("strict join must reject duplicates");
    match err {
        FeatureError::AmbiguousWeatherMatch { matches, .. } => assert_eq!(matches, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_airport_yields_no_records() {
    let fixture = seed(&[mdt()], &[flight("2017-06-01", "1400", "0")], &[]);
    let mut req = mdt_request("2017-06-01", "2017-06-01");
    req.airport_code = "LAX".to_string();

    let (records, report) =
        build_departure_features(&fixture.store, &req, &FeatureJoinConfig::default())
            .expect("join should succeed");
    assert!(records.is_empty());
    assert_eq!(report.location, None);
}

#[test]
fn rebuilding_feature_table_twice_yields_identical_rows() {
    let mut fixture = seed(
        &[mdt()],
        &[
            flight("2017-06-01", "1400", "0"),
            flight("2017-06-01", "1530", "22"),
        ],
        &[
            weather("2017-06-01 11:00", "70"),
            weather("2017-06-01 12:10", "72"),
        ],
    );
    let requests = vec![mdt_request("2017-06-01", "2017-06-01")];
    let cfg = FeatureJoinConfig::default();

    let first = rebuild_feature_table(&mut fixture.store, &requests, &cfg)
        .expect("first rebuild should succeed");
    let rows_first = feature_rows(&fixture.store);
    let second = rebuild_feature_table(&mut fixture.store, &requests, &cfg)
        .expect("second rebuild should succeed");
    let rows_second = feature_rows(&fixture.store);

    assert_eq!(first, second);
    assert_eq!(first.rows_written, 2);
    assert_eq!(rows_first, rows_second);
    assert_eq!(rows_first[0][0], Value::Integer(1));
    assert_eq!(rows_first[1][0], Value::Integer(2));
    assert!(fixture.store.path().exists());
}

#[test]
fn inverted_range_is_rejected_before_any_query() {
    let fixture = seed(&[mdt()], &[], &[]);
    let err = build_departure_features(
        &fixture.store,
        &mdt_request("2017-06-02", "2017-06-01"),
        &FeatureJoinConfig::default(),
    )
    .expect_err("inverted range must be rejected");
    assert!(matches!(err, FeatureError::InvalidRequest(_)));
}
