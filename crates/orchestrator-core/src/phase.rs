// SPDX-License-Identifier: Apache-2.0

//! Phase runner: executes one planned [`crate::plan::Phase`] —
//! its sequential steps one at a time in declaration order, then its
//! parallel groups all concurrently with each other, each bounded by its
//! own `max_parallel`.
//!
//! A phase is a barrier: every group member runs to completion (success,
//! skip, or failure) before the phase is considered done, even if one
//! member fails partway through. The *first* hard failure (by declaration
//! order) is what aborts the workflow from proceeding to the next phase.

use crate::cancel::CancellationToken;
use crate::config::WorkflowConfig;
use crate::env::EnvSource;
use crate::error::Result;
use crate::plan::{Group, Phase};
use crate::state::WorkflowState;
use crate::step;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub async fn run_phase(
    client: &Client,
    workflow: &WorkflowConfig,
    phase: &Phase,
    phase_index: usize,
    state: &WorkflowState,
    env: &dyn EnvSource,
    token: &CancellationToken,
) -> Result<()> {
    tracing::info!(
        phase = phase_index,
        sequential = phase.sequential.len(),
        groups = phase.parallel_groups.len(),
        "starting phase"
    );

    for seq_step in &phase.sequential {
        let result = step::run_step(client, workflow, seq_step, phase_index, state, env, token).await?;
        state.record(result, seq_step.output_key.as_deref());
    }

    let group_futures = phase
        .parallel_groups
        .iter()
        .map(|group| run_group(client, workflow, group, phase_index, state, env, token));
    let outcomes = futures::future::join_all(group_futures).await;

    let mut first_err = None;
    for outcome in outcomes {
        if let Err(e) = outcome {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn run_group(
    client: &Client,
    workflow: &WorkflowConfig,
    group: &Group,
    phase_index: usize,
    state: &WorkflowState,
    env: &dyn EnvSource,
    token: &CancellationToken,
) -> Result<()> {
    let semaphore = group.max_parallel.map(|n| Arc::new(Semaphore::new(n.max(1))));

    let member_futures = group.steps.iter().map(|member| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = match semaphore {
                Some(sem) => Some(sem.acquire_owned().await.expect("semaphore is never closed")),
                None => None,
            };
            let result = step::run_step(client, workflow, member, phase_index, state, env, token).await?;
            state.record(result, member.output_key.as_deref());
            Ok::<(), crate::error::OrchestratorError>(())
        }
    });

    let outcomes = futures::future::join_all(member_futures).await;
    let mut first_err = None;
    for outcome in outcomes {
        if let Err(e) = outcome {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
