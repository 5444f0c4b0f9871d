//! Test fixtures: a small but complete configuration directory.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Write a configuration directory covering every source, with endpoint
/// templates rooted at `base` so tests can point them at a mock server.
pub fn write_fixture_config(base: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    write_fixture_config_at(dir.path(), base);
    dir
}

/// Same as [`write_fixture_config`] but into an existing directory.
pub fn write_fixture_config_at(root: &Path, base: &str) {
    let manifests = format!(
        r#"{{
  "AEMET": {{
    "format": "json",
    "classification": "temporal",
    "region_representation": "aemet_stations",
    "api_key": "test-api-key",
    "endpoints": {{
      "climatology": "{base}/api/valores/climatologicos/diarios/datos/fechaini/{{start}}/fechafin/{{end}}/estacion/{{station}}"
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
  }},
  "Mobility": {{
    "format": "csv",
    "classification": "temporal",
    "region_representation": "name_en",
    "endpoints": {{
      "google": "{base}/Global_Mobility_Report.csv",
      "apple": "{base}/applemobilitytrends.csv"
    }}
  }},
  "MoMo": {{
    "format": "csv",
    "classification": "temporal",
    "region_representation": "code_ine",
    "endpoints": {{
      "momo": "{base}/momo/data"
    }}
  }},
  "INE": {{
    "format": "json",
    "classification": "geographical",
    "region_representation": "name_ine",
    "endpoints": {{
      "series": "{base}/wstempus/js/ES/{{function}}/{{dataset}}?nult={{recent}}"
    }}
  }}
}}"#,
        base = base
    );
    fs::write(root.join("data-sources-config.json"), manifests).unwrap();

    let countries = r#"{
  "ES": {
    "name": "España",
    "regions_file": "ES-regions.json",
    "representations": ["code_ine", "name_en", "name_ine", "aemet_stations"]
  }
}"#;
    fs::write(root.join("countries.json"), countries).unwrap();

    let regions = r#"{
  "Madrid": {
    "population": 6779888,
    "code_ine": "13",
    "name_en": "Madrid",
    "name_ine": "Madrid, Comunidad de",
    "aemet_stations": ["3194U", "3195"]
  },
  "Cataluña": {
    "population": 7675217,
    "code_ine": "09",
    "name_en": "Catalonia",
    "name_ine": "Cataluña",
    "aemet_stations": ["0076"]
  },
  "CA Canarias": {
    "population": 2172944,
    "code_ine": "05",
    "name_en": "Canary Islands",
    "name_ine": "Canarias",
    "aemet_stations": ["C029O"]
  },
  "España": {
    "population": 47450795,
    "code_ine": "00",
    "name_en": "Spain",
    "name_ine": "Total Nacional",
    "aemet_stations": []
  }
}"#;
    fs::write(root.join("ES-regions.json"), regions).unwrap();

    let sources = root.join("data_sources");
    fs::create_dir_all(&sources).unwrap();

    let aemet = r#"{
  "rainfall": {
    "display_name": {"EN": "Rainfall", "ES": "Precipitación"},
    "description": {"EN": "Daily precipitation", "ES": "Precipitación diaria"},
    "data_unit": {"EN": "mm", "ES": "mm"},
    "field": "prec"
  },
  "max_temperature": {
    "display_name": {"EN": "Maximum temperature", "ES": "Temperatura máxima"},
    "description": {"EN": "Daily maximum temperature", "ES": "Temperatura máxima diaria"},
    "data_unit": {"EN": "°C", "ES": "°C"},
    "field": "tmax"
  }
}"#;
    fs::write(sources.join("AEMET-config.json"), aemet).unwrap();

    let covid = r#"{
  "daily_cases": {
    "display_name": {"EN": "Daily cases", "ES": "Casos diarios"},
    "description": {"EN": "New confirmed cases per day", "ES": "Nuevos casos confirmados por día"},
    "data_unit": {"EN": "cases", "ES": "casos"},
    "family": "new_series",
    "field": "num_casos"
  },
  "daily_deaths": {
    "display_name": {"EN": "Daily deaths", "ES": "Fallecidos diarios"},
    "description": {"EN": "Deaths per day", "ES": "Fallecidos por día"},
    "data_unit": {"EN": "deaths", "ES": "fallecidos"},
    "family": "new_series",
    "field": "num_def"
  },
  "hospitalized": {
    "display_name": {"EN": "Hospitalized", "ES": "Hospitalizados"},
    "description": {"EN": "Patients in hospital", "ES": "Pacientes hospitalizados"},
    "data_unit": {"EN": "people", "ES": "personas"},
    "family": "legacy",
    "field": "num_hosp"
  },
  "icu_admissions": {
    "display_name": {"EN": "ICU admissions", "ES": "Ingresos en UCI"},
    "description": {"EN": "Patients admitted to ICU", "ES": "Pacientes ingresados en UCI"},
    "data_unit": {"EN": "people", "ES": "personas"},
    "family": "legacy",
    "field": "num_uci"
  },
  "accumulated_cases": {
    "display_name": {"EN": "Accumulated cases", "ES": "Casos acumulados"},
    "description": {"EN": "Running total of cases", "ES": "Total acumulado de casos"},
    "data_unit": {"EN": "cases", "ES": "casos"},
    "family": "new_series",
    "field": "num_casos"
  },
  "accumulated_deaths": {
    "display_name": {"EN": "Accumulated deaths", "ES": "Fallecidos acumulados"},
    "description": {"EN": "Running total of deaths", "ES": "Total acumulado de fallecidos"},
    "data_unit": {"EN": "deaths", "ES": "fallecidos"},
    "family": "new_series",
    "field": "num_def"
  },
  "cases_avg_7d": {
    "display_name": {"EN": "Cases (7-day average)", "ES": "Casos (media 7 días)"},
    "description": {"EN": "Rolling 7-day mean of daily cases", "ES": "Media móvil de 7 días de casos diarios"},
    "data_unit": {"EN": "cases", "ES": "casos"},
    "family": "new_series",
    "field": "num_casos"
  },
  "incidence_14d": {
    "display_name": {"EN": "14-day incidence", "ES": "Incidencia a 14 días"},
    "description": {"EN": "Cases in the last 14 days per 100k inhabitants", "ES": "Casos en los últimos 14 días por 100k habitantes"},
    "data_unit": {"EN": "cases per 100k", "ES": "casos por 100k"},
    "family": "new_series",
    "field": "num_casos"
  },
  "deaths_per_cases_14d_pct": {
    "display_name": {"EN": "Deaths over cases (14 days)", "ES": "Fallecidos sobre casos (14 días)"},
    "description": {"EN": "Deaths as a percentage of cases over 14 days", "ES": "Fallecidos como porcentaje de casos en 14 días"},
    "data_unit": {"EN": "%", "ES": "%"},
    "family": "new_series",
    "field": "num_def"
  }
}"#;
    fs::write(sources.join("COVID19-config.json"), covid).unwrap();

    let mobility = r#"{
  "grocery_and_pharmacy": {
    "display_name": {"EN": "Grocery and pharmacy", "ES": "Supermercados y farmacias"},
    "description": {"EN": "Mobility change at groceries and pharmacies", "ES": "Cambio de movilidad en supermercados y farmacias"},
    "data_unit": {"EN": "% vs baseline", "ES": "% sobre referencia"},
    "provider": "Google",
    "field": "grocery_and_pharmacy_percent_change_from_baseline"
  },
  "workplaces": {
    "display_name": {"EN": "Workplaces", "ES": "Lugares de trabajo"},
    "description": {"EN": "Mobility change at workplaces", "ES": "Cambio de movilidad en lugares de trabajo"},
    "data_unit": {"EN": "% vs baseline", "ES": "% sobre referencia"},
    "provider": "Google",
    "field": "workplaces_percent_change_from_baseline"
  },
  "driving": {
    "display_name": {"EN": "Driving", "ES": "Conducción"},
    "description": {"EN": "Routing requests for driving", "ES": "Peticiones de ruta en coche"},
    "data_unit": {"EN": "% vs baseline", "ES": "% sobre referencia"},
    "provider": "Apple",
    "field": "driving"
  }
}"#;
    fs::write(sources.join("Mobility-config.json"), mobility).unwrap();

    let momo = r#"{
  "observed_deaths": {
    "display_name": {"EN": "Observed deaths", "ES": "Defunciones observadas"},
    "description": {"EN": "All-cause deaths observed", "ES": "Defunciones observadas por todas las causas"},
    "data_unit": {"EN": "deaths", "ES": "defunciones"},
    "field": "defunciones_observadas"
  },
  "expected_deaths": {
    "display_name": {"EN": "Expected deaths", "ES": "Defunciones esperadas"},
    "description": {"EN": "Deaths expected from the historical model", "ES": "Defunciones esperadas según el modelo histórico"},
    "data_unit": {"EN": "deaths", "ES": "defunciones"},
    "field": "defunciones_esperadas"
  }
}"#;
    fs::write(sources.join("MoMo-config.json"), momo).unwrap();

    let ine = r#"{
  "physical_activity": {
    "display_name": {"EN": "Physical activity", "ES": "Actividad física"},
    "description": {"EN": "Population by level of physical activity", "ES": "Población por nivel de actividad física"},
    "data_unit": {"EN": "%", "ES": "%"},
    "ine": {"function": "DATOS_TABLA", "dataset": "t00/mujeres_hombres/tablas_1/l0/d03001.px", "recent": 1}
  },
  "tobacco_consumption": {
    "display_name": {"EN": "Tobacco consumption", "ES": "Consumo de tabaco"},
    "description": {"EN": "Population by tobacco consumption", "ES": "Población por consumo de tabaco"},
    "data_unit": {"EN": "%", "ES": "%"},
    "ine": {"function": "DATOS_TABLA", "dataset": "t15/p419/a2017/p06/l0/01004.px", "recent": 1}
  }
}"#;
    fs::write(sources.join("INE-config.json"), ine).unwrap();
}
