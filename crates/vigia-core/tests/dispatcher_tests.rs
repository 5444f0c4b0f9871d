//! End-to-end dispatcher tests against a mock HTTP server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vigia_common::VigiaError;
use vigia_core::{
    CellValue, Classification, ColumnKey, ConfigStore, DataQuery, DataTable, Dispatcher,
    ErrorPolicy, FetchEngine, FetchPolicy, ItemLabel, ItemSelection, Language, RegionSelection,
    RowKey,
};

fn write_config(root: &Path, base: &str) {
    let manifests = format!(
        r#"{{
  "AEMET": {{
    "format": "json",
    "classification": "temporal",
    "region_representation": "aemet_stations",
    "api_key": "test-api-key",
    "endpoints": {{
      "climatology": "{base}/climatologias/fechaini/{{start}}/fechafin/{{end}}/estaciones/{{station}}"
    }}
  }},
  "COVID19": {{
    "format": "csv",
    "classification": "temporal",
    "region_representation": "code_ine",
    "endpoints": {{
      "legacy": "{base}/legacy/{{field}}.csv",
      "new_series": "{base}/casos_tecnica_ccaa.csv"
    }}
  }}
}}"#
    );
    std::fs::write(root.join("data-sources-config.json"), manifests).unwrap();

    std::fs::write(
        root.join("countries.json"),
        r#"{
  "ES": {
    "name": "España",
    "regions_file": "ES-regions.json",
    "representations": ["code_ine", "aemet_stations"]
  }
}"#,
    )
    .unwrap();

    std::fs::write(
        root.join("ES-regions.json"),
        r#"{
  "Madrid": {"population": 6779888, "code_ine": "13", "aemet_stations": ["3194U"]},
  "Cataluña": {"population": 7675217, "code_ine": "09", "aemet_stations": ["0076"]},
  "España": {"population": 47450795, "code_ine": "00", "aemet_stations": []}
}"#,
    )
    .unwrap();

    let sources = root.join("data_sources");
    std::fs::create_dir_all(&sources).unwrap();
    std::fs::write(
        sources.join("AEMET-config.json"),
        r#"{
  "rainfall": {
    "display_name": {"EN": "Rainfall", "ES": "Precipitación"},
    "description": {"EN": "Daily precipitation", "ES": "Precipitación diaria"},
    "data_unit": {"EN": "mm", "ES": "mm"},
    "field": "prec"
  }
}"#,
    )
    .unwrap();
    std::fs::write(
        sources.join("COVID19-config.json"),
        r#"{
  "hospitalized": {
    "display_name": {"EN": "Hospitalized", "ES": "Hospitalizados"},
    "description": {"EN": "Patients in hospital", "ES": "Pacientes hospitalizados"},
    "data_unit": {"EN": "people", "ES": "personas"},
    "family": "legacy",
    "field": "num_hosp"
  },
  "daily_cases": {
    "display_name": {"EN": "Daily cases", "ES": "Casos diarios"},
    "description": {"EN": "New confirmed cases per day", "ES": "Nuevos casos confirmados por día"},
    "data_unit": {"EN": "cases", "ES": "casos"},
    "family": "new_series",
    "field": "num_casos"
  }
}"#,
    )
    .unwrap();
}

fn dispatcher_for(server: &MockServer) -> (tempfile::TempDir, Dispatcher) {
    let dir = tempfile::TempDir::new().unwrap();
    write_config(dir.path(), &server.uri());
    let config = Arc::new(ConfigStore::load(dir.path()).unwrap());
    // fast backoff so throttling tests stay quick
    let policy = FetchPolicy {
        timeout: Duration::from_secs(5),
        delay_increase: Duration::from_millis(2),
        delay_ceiling: Duration::from_millis(6),
    };
    let engine = FetchEngine::with_policy(policy).unwrap();
    (dir, Dispatcher::with_engine(config, engine))
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn cell(table: &DataTable, d: &str, region: &str, item: &str) -> Option<f64> {
    table
        .get(
            &RowKey::Date(date(d)),
            &ColumnKey::temporal(region, ItemLabel::new(item)),
        )
        .and_then(CellValue::as_number)
}

const HOSPITALIZED_CSV: &str = "\
cod_ine,CCAA,2021-01-01,2021-01-03
13,Madrid,7,9
9,Cataluña,5,6
";

#[tokio::test]
async fn query_returns_one_row_per_day_with_display_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/legacy/num_hosp.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(HOSPITALIZED_CSV))
        .mount(&server)
        .await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    let query = DataQuery {
        items: ItemSelection::Names(vec!["Hospitalized".to_string()]),
        regions: RegionSelection::Names(vec!["Madrid".to_string(), "Cataluña".to_string()]),
        start_date: Some(date("2021-01-01")),
        end_date: Some(date("2021-01-03")),
        language: Language::En,
        error_policy: ErrorPolicy::Ignore,
    };
    let table = dispatcher.query(&query).await.unwrap().unwrap();

    assert_eq!(table.classification(), Classification::Temporal);
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.column_count(), 2);
    assert_eq!(cell(&table, "2021-01-01", "Madrid", "Hospitalized"), Some(7.0));
    assert_eq!(cell(&table, "2021-01-03", "Cataluña", "Hospitalized"), Some(6.0));
    // the source had no data for the middle day, but the row exists
    assert!(table.row_keys().any(|r| *r == RowKey::Date(date("2021-01-02"))));
    assert_eq!(cell(&table, "2021-01-02", "Madrid", "Hospitalized"), None);
}

#[tokio::test]
async fn unknown_item_yields_absent_result() {
    let server = MockServer::start().await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    let query = DataQuery {
        items: ItemSelection::Names(vec!["Barometric whimsy".to_string()]),
        regions: RegionSelection::Names(vec!["Madrid".to_string()]),
        start_date: Some(date("2021-01-01")),
        end_date: Some(date("2021-01-03")),
        language: Language::En,
        error_policy: ErrorPolicy::Ignore,
    };
    assert!(dispatcher.query(&query).await.unwrap().is_none());
}

#[tokio::test]
async fn inverted_date_range_honors_error_policy() {
    let server = MockServer::start().await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    let mut query = DataQuery {
        items: ItemSelection::Names(vec!["Hospitalized".to_string()]),
        regions: RegionSelection::Names(vec!["Madrid".to_string()]),
        start_date: Some(date("2021-01-03")),
        end_date: Some(date("2021-01-01")),
        language: Language::En,
        error_policy: ErrorPolicy::Ignore,
    };
    assert!(dispatcher.query(&query).await.unwrap().is_none());

    query.error_policy = ErrorPolicy::Raise;
    assert!(matches!(
        dispatcher.query(&query).await,
        Err(VigiaError::Validation(_))
    ));
}

#[tokio::test]
async fn future_end_date_honors_error_policy() {
    let server = MockServer::start().await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    let future = chrono::Local::now().date_naive() + chrono::Duration::days(7);
    let mut query = DataQuery {
        items: ItemSelection::Names(vec!["Hospitalized".to_string()]),
        regions: RegionSelection::Names(vec!["Madrid".to_string()]),
        start_date: Some(date("2021-01-01")),
        end_date: Some(future),
        language: Language::En,
        error_policy: ErrorPolicy::Ignore,
    };
    assert!(dispatcher.query(&query).await.unwrap().is_none());

    query.error_policy = ErrorPolicy::Raise;
    assert!(matches!(
        dispatcher.query(&query).await,
        Err(VigiaError::Validation(_))
    ));
}

#[tokio::test]
async fn persistent_throttling_is_transport_error_or_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/casos_tecnica_ccaa.csv"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    let mut query = DataQuery {
        items: ItemSelection::Names(vec!["Daily cases".to_string()]),
        regions: RegionSelection::Names(vec!["Madrid".to_string()]),
        start_date: Some(date("2021-01-01")),
        end_date: Some(date("2021-01-03")),
        language: Language::En,
        error_policy: ErrorPolicy::Raise,
    };
    assert!(matches!(
        dispatcher.query(&query).await,
        Err(VigiaError::Transport(_))
    ));

    query.error_policy = ErrorPolicy::Ignore;
    assert!(dispatcher.query(&query).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_source_drops_out_under_tolerant_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/legacy/num_hosp.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(HOSPITALIZED_CSV))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/casos_tecnica_ccaa.csv"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    // both items live in the same source, so the whole source fails; the
    // query still reports absent rather than erroring
    let query = DataQuery {
        items: ItemSelection::Names(vec![
            "Hospitalized".to_string(),
            "Daily cases".to_string(),
        ]),
        regions: RegionSelection::Names(vec!["Madrid".to_string()]),
        start_date: Some(date("2021-01-01")),
        end_date: Some(date("2021-01-03")),
        language: Language::En,
        error_policy: ErrorPolicy::Ignore,
    };
    assert!(dispatcher.query(&query).await.unwrap().is_none());
}

const AEMET_PATH: &str =
    "/climatologias/fechaini/2021-01-01T00:00:00UTC/fechafin/2021-01-03T23:59:59UTC/estaciones/3194U";

fn aemet_query(policy: ErrorPolicy) -> DataQuery {
    DataQuery {
        items: ItemSelection::Names(vec!["Rainfall".to_string()]),
        regions: RegionSelection::Names(vec!["Madrid".to_string()]),
        start_date: Some(date("2021-01-01")),
        end_date: Some(date("2021-01-03")),
        language: Language::En,
        error_policy: policy,
    }
}

// the meteorological adapter waits its 4 s courtesy delay before the request
#[tokio::test]
async fn aemet_envelope_is_followed_to_the_datos_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(AEMET_PATH))
        .and(query_param("api_key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "estado": 200,
            "datos": format!("{}/datos/1a2b", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/datos/1a2b"))
        .and(query_param("api_key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"fecha": "2021-01-01", "indicativo": "3194U", "prec": "1,5"},
            {"fecha": "2021-01-02", "indicativo": "3194U", "prec": "0,0"}
        ])))
        .mount(&server)
        .await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    // both mocks require the api_key parameter: an unmatched request would
    // answer 404 and fail the query under the strict policy
    let table = dispatcher
        .query(&aemet_query(ErrorPolicy::Raise))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cell(&table, "2021-01-01", "Madrid", "Rainfall"), Some(1.5));
    assert_eq!(cell(&table, "2021-01-02", "Madrid", "Rainfall"), Some(0.0));
    assert_eq!(table.row_count(), 3);
}

#[tokio::test]
async fn aemet_error_envelope_fails_the_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(AEMET_PATH))
        .and(query_param("api_key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "estado": 404,
            "descripcion": "no hay datos que satisfagan esos criterios"
        })))
        .mount(&server)
        .await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    // the in-band 404 aborts the source; nothing partial comes back
    assert!(matches!(
        dispatcher.query(&aemet_query(ErrorPolicy::Raise)).await,
        Err(VigiaError::Transport(_))
    ));
    assert!(dispatcher
        .query(&aemet_query(ErrorPolicy::Ignore))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn internal_language_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/legacy/num_hosp.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(HOSPITALIZED_CSV))
        .mount(&server)
        .await;
    let (_dir, dispatcher) = dispatcher_for(&server);

    let query = DataQuery {
        items: ItemSelection::Names(vec!["hospitalized".to_string()]),
        regions: RegionSelection::Names(vec!["Madrid".to_string()]),
        start_date: Some(date("2021-01-01")),
        end_date: Some(date("2021-01-03")),
        language: Language::Internal,
        error_policy: ErrorPolicy::Raise,
    };
    let table = dispatcher.query(&query).await.unwrap().unwrap();
    assert_eq!(cell(&table, "2021-01-01", "Madrid", "hospitalized"), Some(7.0));
}
