// SPDX-License-Identifier: Apache-2.0

//! Dependency planner: turns a flat step list plus `depends_on` and
//! `parallel_group` annotations into an [`ExecutionPlan`] — an ordered list
//! of phases, each a set of sequential steps plus parallel groups that all
//! run concurrently with each other.
//!
//! A `depends_on` reference may name either a step or a `parallel_group`;
//! naming a group means "after every member of that group". A group itself
//! is atomic: all of its members always land in the same phase together
//! (the "group barrier"), even if some members' individual dependencies
//! would let them run earlier alone.

use crate::config::{StepConfig, WorkflowConfig};
use crate::error::{OrchestratorError, Result};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub steps: Vec<StepConfig>,
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Phase {
    pub sequential: Vec<StepConfig>,
    pub parallel_groups: Vec<Group>,
}

pub type ExecutionPlan = Vec<Phase>;

/// Builds the execution plan for `config`. `config` is expected to have
/// already passed [`WorkflowConfig::validate`].
pub fn plan(config: &WorkflowConfig) -> Result<ExecutionPlan> {
    let declared_order: Vec<&str> = config.steps.iter().map(|s| s.name.as_str()).collect();
    let by_name: HashMap<&str, &StepConfig> = config.steps.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut group_members: HashMap<&str, HashSet<&str>> = HashMap::new();
    for step in &config.steps {
        if let Some(group) = &step.parallel_group {
            group_members.entry(group.as_str()).or_default().insert(step.name.as_str());
        }
    }

    // Expand depends_on references (step name or group name) into concrete
    // step-name dependencies.
    let mut expanded: HashMap<&str, HashSet<&str>> = HashMap::new();
    for step in &config.steps {
        let mut deps = HashSet::new();
        for reference in &step.depends_on {
            if let Some(members) = group_members.get(reference.as_str()) {
                deps.extend(members.iter().copied());
            } else if by_name.contains_key(reference.as_str()) {
                deps.insert(reference.as_str());
            } else {
                return Err(OrchestratorError::config(format!(
                    "step '{}' depends_on unknown step or group '{}'",
                    step.name, reference
                )));
            }
        }
        expanded.insert(step.name.as_str(), deps);
    }

    detect_cycles(&declared_order, &expanded)?;

    let mut remaining: HashSet<&str> = declared_order.iter().copied().collect();
    let mut satisfied: HashSet<&str> = HashSet::new();
    let mut phases = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = declared_order
            .iter()
            .copied()
            .filter(|name| remaining.contains(name) && expanded[name].is_subset(&satisfied))
            .collect();

        let mut sequential = Vec::new();
        let mut groups: Vec<Group> = Vec::new();
        let mut scheduled: HashSet<&str> = HashSet::new();
        let mut handled_groups: HashSet<&str> = HashSet::new();

        for &name in &ready {
            let step = by_name[name];
            match &step.parallel_group {
                None => {
                    sequential.push(step.clone());
                    scheduled.insert(name);
                }
                Some(group_name) => {
                    if handled_groups.contains(group_name.as_str()) {
                        continue;
                    }
                    let members = &group_members[group_name.as_str()];
                    let all_ready = members.iter().all(|m| ready.contains(m));
                    if all_ready {
                        handled_groups.insert(group_name.as_str());
                        let mut member_steps: Vec<StepConfig> = declared_order
                            .iter()
                            .filter(|n| members.contains(*n))
                            .map(|n| by_name[n].clone())
                            .collect();
                        member_steps.sort_by_key(|s| declared_order.iter().position(|n| *n == s.name).unwrap());
                        let max_parallel = member_steps.iter().filter_map(|s| s.max_parallel).min();
                        for m in members {
                            scheduled.insert(m);
                        }
                        groups.push(Group { name: group_name.clone(), steps: member_steps, max_parallel });
                    }
                }
            }
        }

        if scheduled.is_empty() {
            return Err(OrchestratorError::config(
                "dependency planning stalled: a step may depend on a fellow member of its own parallel_group, \
                 which can never be satisfied since group members run concurrently",
            ));
        }

        satisfied.extend(scheduled.iter().copied());
        remaining.retain(|name| !scheduled.contains(name));
        phases.push(Phase { sequential, parallel_groups: groups });
    }

    Ok(phases)
}

fn detect_cycles(declared_order: &[&str], expanded: &HashMap<&str, HashSet<&str>>) -> Result<()> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut nodes = HashMap::new();
    for name in declared_order {
        nodes.insert(*name, graph.add_node(name));
    }
    for (name, deps) in expanded {
        for dep in deps {
            graph.add_edge(nodes[dep], nodes[name], ());
        }
    }
    toposort(&graph, None)
        .map(|_| ())
        .map_err(|_| OrchestratorError::config("workflow contains a cyclic dependency"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, BackoffStrategy, Method, RetryConfig};
    use std::collections::HashMap as Map;

    fn step(name: &str, deps: &[&str], group: Option<&str>) -> StepConfig {
        StepConfig {
            name: name.to_string(),
            endpoint: "/x".to_string(),
            method: Method::Post,
            api_base: None,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            parallel_group: group.map(|g| g.to_string()),
            max_parallel: None,
            headers: Map::new(),
            payload: None,
            payload_template: None,
            auth: None,
            retry: RetryConfig { limit: 0, delay: "0s".into(), backoff: BackoffStrategy::Constant, timeout: None },
            timeout: "30s".to_string(),
            continue_on_error: false,
            extract_fields: Map::new(),
            response_transform: None,
            output_key: None,
            poll: None,
        }
    }

    fn config(steps: Vec<StepConfig>) -> WorkflowConfig {
        WorkflowConfig {
            name: "wf".to_string(),
            api_base: "https://api.example.com".to_string(),
            auth: Some(AuthConfig::None),
            variables: Map::new(),
            steps,
            monitoring: None,
        }
    }

    #[test]
    fn linear_chain_produces_one_step_per_phase() {
        let cfg = config(vec![step("a", &[], None), step("b", &["a"], None), step("c", &["b"], None)]);
        let plan = plan(&cfg).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].sequential[0].name, "a");
        assert_eq!(plan[1].sequential[0].name, "b");
        assert_eq!(plan[2].sequential[0].name, "c");
    }

    #[test]
    fn independent_steps_share_a_phase() {
        let cfg = config(vec![step("a", &[], None), step("b", &[], None)]);
        let plan = plan(&cfg).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].sequential.len(), 2);
    }

    #[test]
    fn group_waits_for_slowest_member_before_barrier() {
        let cfg = config(vec![
            step("setup", &[], None),
            step("fast", &[], Some("fanout")),
            step("slow", &["setup"], Some("fanout")),
        ]);
        let plan = plan(&cfg).unwrap();
        // phase 0: setup (fast is held back because its group sibling isn't ready yet)
        assert_eq!(plan[0].sequential.len(), 1);
        assert_eq!(plan[0].sequential[0].name, "setup");
        assert!(plan[0].parallel_groups.is_empty());
        // phase 1: the whole group together
        assert_eq!(plan[1].parallel_groups.len(), 1);
        let members: Vec<_> = plan[1].parallel_groups[0].steps.iter().map(|s| s.name.clone()).collect();
        assert_eq!(members, vec!["fast", "slow"]);
    }

    #[test]
    fn dependent_on_group_waits_for_all_members() {
        let cfg = config(vec![
            step("a", &[], Some("g")),
            step("b", &[], Some("g")),
            step("after", &["g"], None),
        ]);
        let plan = plan(&cfg).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].parallel_groups[0].name, "g");
        assert_eq!(plan[1].sequential[0].name, "after");
    }

    #[test]
    fn unknown_dependency_reference_errors() {
        let cfg = config(vec![step("a", &["ghost"], None)]);
        assert!(plan(&cfg).is_err());
    }

    #[test]
    fn cyclic_dependency_errors() {
        let cfg = config(vec![step("a", &["b"], None), step("b", &["a"], None)]);
        assert!(plan(&cfg).is_err());
    }

    #[test]
    fn self_group_dependency_is_rejected_as_stall() {
        let cfg = config(vec![step("a", &[], Some("g")), step("b", &["a"], Some("g"))]);
        assert!(plan(&cfg).is_err());
    }

    #[test]
    fn declaration_order_is_deterministic_tiebreak() {
        let cfg = config(vec![step("z", &[], None), step("a", &[], None), step("m", &[], None)]);
        let plan = plan(&cfg).unwrap();
        let names: Vec<_> = plan[0].sequential.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn single_member_group_lands_in_the_same_phase_as_an_equivalent_sequential_step() {
        let solo_group = config(vec![step("solo", &[], Some("g")), step("after", &["g"], None)]);
        let plan_a = plan(&solo_group).unwrap();

        let sequential = config(vec![step("solo", &[], None), step("after", &["solo"], None)]);
        let plan_b = plan(&sequential).unwrap();

        assert_eq!(plan_a.len(), plan_b.len());
        assert_eq!(plan_a[0].parallel_groups[0].steps[0].name, plan_b[0].sequential[0].name);
        assert_eq!(plan_a[1].sequential[0].name, plan_b[1].sequential[0].name);
    }
}
