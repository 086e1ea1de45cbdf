//! The constraint solver: matches SAT services to SIT targets.
//!
//! `solve` is a pure function over an immutable input. A replica expansion
//! (`count` requirement) does not mutate the input mid-iteration; it returns
//! a new input and the driver loop re-solves, bounded by a restart budget.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use stackway_core::{CapabilityMap, CapacityValue, ParameterMap, Service};

use crate::error::ResolutionError;

const CONFIG_KEY: &str = "config";
const COUNT_KEY: &str = "count";
const ZONE_KEY: &str = "zone";
const SERVICE_KEY: &str = "service";
const CAPACITY_KEYS: [&str; 2] = ["CPU", "RAM"];

/// Immutable input for one solver run: the resolved service set, the SAT's
/// cross-cutting requirements, and the SIT's capability maps keyed by dotted
/// target name.
#[derive(Debug, Clone)]
pub struct SolverInput {
    pub services: IndexMap<String, Service>,
    pub extra_functional_requirements: ParameterMap,
    pub capabilities: IndexMap<String, CapabilityMap>,
}

/// A successful solve: for every service the non-empty, ordered set of
/// acceptable targets, plus the recorded cross-service dependency edges.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub services: IndexMap<String, Service>,
    pub candidates: IndexMap<String, BTreeSet<String>>,
    /// `(dependent, dependency)` edges recorded from `service` requirements.
    pub dependencies: Vec<(String, String)>,
}

impl Resolution {
    /// The deterministic target choice for a service: the lexicographically
    /// smallest candidate.
    pub fn chosen_target(&self, service: &str) -> Option<&String> {
        self.candidates.get(service).and_then(|set| set.first())
    }

    /// Dependency names recorded for one service.
    pub fn depends_on(&self, service: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|(dependent, _)| dependent == service)
            .map(|(_, dependency)| dependency.clone())
            .collect()
    }

    /// A resolution binding every service to one explicit target, bypassing
    /// constraint evaluation.
    pub fn pinned(services: IndexMap<String, Service>, target: &str) -> Self {
        let candidates = services
            .keys()
            .map(|name| (name.clone(), BTreeSet::from([target.to_string()])))
            .collect();
        Self {
            services,
            candidates,
            dependencies: Vec::new(),
        }
    }
}

enum SolveStep {
    Solved(Resolution),
    Expand(SolverInput),
}

/// Runs the solver, re-solving after each replica expansion up to
/// `max_restarts` times.
pub fn solve(input: SolverInput, max_restarts: u32) -> Result<Resolution, ResolutionError> {
    let mut current = input;
    for _ in 0..=max_restarts {
        match solve_once(current)? {
            SolveStep::Solved(resolution) => return Ok(resolution),
            SolveStep::Expand(next) => current = next,
        }
    }
    Err(ResolutionError::RestartBudgetExhausted {
        budget: max_restarts,
    })
}

fn solve_once(input: SolverInput) -> Result<SolveStep, ResolutionError> {
    let mut candidates: IndexMap<String, BTreeSet<String>> = IndexMap::new();
    let mut zone_requirements: Vec<(String, String)> = Vec::new();
    let mut dependencies: Vec<(String, String)> = Vec::new();

    for (name, service) in &input.services {
        // Expansion looks only at the service's own requirements; clones it
        // produces carry no count key, so every expansion strictly shrinks
        // the set of count-bearing services and the loop terminates.
        if let Some(count_value) = service.non_functional_requirements.get(COUNT_KEY) {
            let count = count_value.as_u64().ok_or_else(|| {
                ResolutionError::InvalidRequirement {
                    service: name.clone(),
                    requirement: COUNT_KEY.to_string(),
                    message: format!("expected a non-negative integer, got {count_value}"),
                }
            })?;
            debug!(service = %name, count, "expanding replicas and re-solving");
            return Ok(SolveStep::Expand(expand_replicas(&input, name, count)));
        }

        let requirements = merged_requirements(service, &input.extra_functional_requirements);

        if let Some(zone) = requirements.get(ZONE_KEY) {
            let zone = zone
                .as_str()
                .ok_or_else(|| ResolutionError::InvalidRequirement {
                    service: name.clone(),
                    requirement: ZONE_KEY.to_string(),
                    message: "expected a string zone name".to_string(),
                })?;
            zone_requirements.push((name.clone(), zone.to_string()));
        }
        if let Some(dependency) = requirements.get(SERVICE_KEY) {
            let dependency =
                dependency
                    .as_str()
                    .ok_or_else(|| ResolutionError::InvalidRequirement {
                        service: name.clone(),
                        requirement: SERVICE_KEY.to_string(),
                        message: "expected a string service name".to_string(),
                    })?;
            dependencies.push((name.clone(), dependency.to_string()));
        }

        let mut service_candidates = BTreeSet::new();
        for (target, capabilities) in &input.capabilities {
            if is_eligible(&requirements, capabilities) {
                service_candidates.insert(target.clone());
            }
        }
        debug!(service = %name, candidates = service_candidates.len(), "evaluated targets");
        candidates.insert(name.clone(), service_candidates);
    }

    filter_shared_zones(&mut candidates, &zone_requirements)?;

    if candidates.values().any(BTreeSet::is_empty) {
        return Err(ResolutionError::UnsatisfiedService);
    }
    for (_, dependency) in &dependencies {
        if !candidates.contains_key(dependency) {
            return Err(ResolutionError::UnresolvedServiceDependency);
        }
    }
    detect_dependency_cycle(&dependencies)?;

    Ok(SolveStep::Solved(Resolution {
        services: input.services,
        candidates,
        dependencies,
    }))
}

/// Ordered merge of `{config: functional requirements}`, the service's
/// non-functional requirements, and the SAT's extra requirements.
fn merged_requirements(service: &Service, extra: &ParameterMap) -> ParameterMap {
    let mut requirements = ParameterMap::new();
    requirements.insert(
        CONFIG_KEY.to_string(),
        Value::from(service.functional_requirements.clone()),
    );
    for (key, value) in &service.non_functional_requirements {
        requirements.insert(key.clone(), value.clone());
    }
    for (key, value) in extra {
        requirements.insert(key.clone(), value.clone());
    }
    requirements
}

/// Evaluates every requirement key against one target's capabilities. Zone,
/// service, and count never disqualify here; unknown keys are accepted.
fn is_eligible(requirements: &ParameterMap, capabilities: &CapabilityMap) -> bool {
    for (key, requested) in requirements {
        match key.as_str() {
            CONFIG_KEY => {
                if !config_satisfied(requested, capabilities.get(CONFIG_KEY)) {
                    return false;
                }
            }
            key if CAPACITY_KEYS.contains(&key) => {
                if !capacity_satisfied(requested, capabilities.get(key)) {
                    return false;
                }
            }
            ZONE_KEY | SERVICE_KEY | COUNT_KEY => {}
            _ => {}
        }
    }
    true
}

/// Every requested functional requirement name must appear in the target's
/// `config` capability list.
fn config_satisfied(requested: &Value, offered: Option<&Value>) -> bool {
    let Some(requested) = requested.as_array() else {
        return false;
    };
    if requested.is_empty() {
        return true;
    }
    let Some(offered) = offered.and_then(Value::as_array) else {
        return false;
    };
    requested.iter().all(|req| offered.contains(req))
}

/// `requested <= offered`, compared within matching units. Anything that does
/// not parse as a capacity fails the comparison.
fn capacity_satisfied(requested: &Value, offered: Option<&Value>) -> bool {
    let (Some(requested), Some(offered)) = (
        capacity_of(requested),
        offered.and_then(capacity_of),
    ) else {
        return false;
    };
    requested.satisfied_by(&offered)
}

fn capacity_of(value: &Value) -> Option<CapacityValue> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64().map(|amount| CapacityValue::new(amount, "")),
        _ => None,
    }
}

/// Removes the expanded service and inserts `count` copies named
/// `service0 … service{count-1}`, each with the count key stripped.
fn expand_replicas(input: &SolverInput, service_name: &str, count: u64) -> SolverInput {
    let mut services = IndexMap::with_capacity(input.services.len() + count as usize);
    for (name, service) in &input.services {
        if name == service_name {
            let mut template = service.clone();
            template.non_functional_requirements.shift_remove(COUNT_KEY);
            for i in 0..count {
                let replica_name = format!("{service_name}{i}");
                let mut replica = template.clone();
                replica.name = replica_name.clone();
                services.insert(replica_name, replica);
            }
        } else {
            services.insert(name.clone(), service.clone());
        }
    }
    SolverInput {
        services,
        extra_functional_requirements: input.extra_functional_requirements.clone(),
        capabilities: input.capabilities.clone(),
    }
}

/// Partitions recorded `(service, zone)` entries by zone and intersects the
/// candidate sets of every partition of size > 1.
fn filter_shared_zones(
    candidates: &mut IndexMap<String, BTreeSet<String>>,
    zone_requirements: &[(String, String)],
) -> Result<(), ResolutionError> {
    let mut groups: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for (service, zone) in zone_requirements {
        groups.entry(zone.as_str()).or_default().push(service.as_str());
    }

    for (zone, members) in groups {
        if members.len() < 2 {
            continue;
        }
        let mut intersection: Option<BTreeSet<String>> = None;
        for member in &members {
            let Some(member_candidates) = candidates.get(*member) else {
                continue;
            };
            intersection = Some(match intersection {
                Some(acc) => acc
                    .intersection(member_candidates)
                    .cloned()
                    .collect(),
                None => member_candidates.clone(),
            });
        }
        let Some(intersection) = intersection else {
            continue;
        };
        if intersection.is_empty() {
            debug!(zone, "co-located services have no shared target");
            return Err(ResolutionError::ZoneConflict);
        }
        for member in members {
            if let Some(member_candidates) = candidates.get_mut(member) {
                *member_candidates = intersection.clone();
            }
        }
    }
    Ok(())
}

/// Rejects cyclic `service` requirements with a depth-first search.
fn detect_dependency_cycle(dependencies: &[(String, String)]) -> Result<(), ResolutionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        node: &str,
        adjacency: &HashMap<&str, Vec<&str>>,
        marks: &mut HashMap<String, Mark>,
    ) -> bool {
        match marks.get(node) {
            Some(Mark::Done) => return true,
            Some(Mark::Visiting) => return false,
            None => {}
        }
        marks.insert(node.to_string(), Mark::Visiting);
        if let Some(next) = adjacency.get(node) {
            for dependency in next {
                if !visit(dependency, adjacency, marks) {
                    return false;
                }
            }
        }
        marks.insert(node.to_string(), Mark::Done);
        true
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for (dependent, dependency) in dependencies {
        adjacency
            .entry(dependent.as_str())
            .or_default()
            .push(dependency.as_str());
    }

    let mut marks = HashMap::new();
    for node in adjacency.keys() {
        if !visit(node, &adjacency, &mut marks) {
            return Err(ResolutionError::DependencyCycle);
        }
    }
    Ok(())
}
