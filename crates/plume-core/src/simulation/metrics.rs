use super::Simulation;
use crate::mosquito::{AgentState, PopulationCounts};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default)]
pub struct StepTimings {
    pub decision_us: u64,
    pub field_update_us: u64,
    pub total_us: u64,
    /// Whether populations decided during this step.
    pub decided: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StepMetrics {
    pub step: usize,
    pub time: f64,
    pub co2_total: f64,
    pub co2_max: f64,
    /// One entry per population, in scenario order.
    pub populations: Vec<PopulationCounts>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub population: usize,
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub state: AgentState,
    pub found_host: Option<u32>,
    pub decisions: u32,
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub steps: usize,
    pub final_time: f64,
    pub sample_every: usize,
    /// True when every agent reached a terminal state before `final_time`.
    pub stopped_early: bool,
    pub samples: Vec<StepMetrics>,
    #[serde(default)]
    pub final_counts: Vec<PopulationCounts>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSnapshot>,
}

impl RunSummary {
    pub fn total_found_host(&self) -> usize {
        self.final_counts.iter().map(|c| c.found_host).sum()
    }
}

impl Simulation {
    pub fn collect_step_metrics(&self) -> StepMetrics {
        let co2 = self.environment.co2();
        StepMetrics {
            step: self.step_index,
            time: self.environment.time(),
            co2_total: co2.total(),
            co2_max: co2.max(),
            populations: self.populations.iter().map(|p| p.counts()).collect(),
        }
    }

    pub fn agent_snapshots(&self) -> Vec<AgentSnapshot> {
        self.populations
            .iter()
            .enumerate()
            .flat_map(|(population, pop)| {
                pop.agents().iter().map(move |a| AgentSnapshot {
                    population,
                    id: a.id,
                    x: a.position[0],
                    y: a.position[1],
                    state: a.state,
                    found_host: a.found_host,
                    decisions: a.decisions,
                })
            })
            .collect()
    }
}
