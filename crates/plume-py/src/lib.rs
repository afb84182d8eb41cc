use plume_core::config::ScenarioConfig;
use plume_core::simulation::Simulation;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn parse_scenario(json: &str) -> PyResult<ScenarioConfig> {
    serde_json::from_str(json).map_err(|e| PyValueError::new_err(format!("invalid scenario JSON: {e}")))
}

#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Default scenario (no hosts, no populations) as JSON.
#[pyfunction]
fn default_config_json() -> PyResult<String> {
    serde_json::to_string_pretty(&ScenarioConfig::default())
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Parse and validate a scenario without running it.
#[pyfunction]
fn validate_config_json(json: &str) -> PyResult<()> {
    let scenario = parse_scenario(json)?;
    Simulation::try_new(scenario)
        .map(|_| ())
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Run a scenario to completion and return the run summary as JSON.
#[pyfunction]
fn run_scenario_json(json: &str) -> PyResult<String> {
    let scenario = parse_scenario(json)?;
    let mut sim = Simulation::try_new(scenario).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let summary = sim.run();
    serde_json::to_string(&summary).map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(default_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(validate_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(run_scenario_json, m)?)?;
    Ok(())
}
