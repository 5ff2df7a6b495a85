// SPDX-License-Identifier: MIT

//! Desired-state builder: a mostly-pure function from the current config
//! snapshot plus a fixed instant to the ordered list of agent specs that
//! should exist right now.

use crate::draining::DrainRegistry;
use gc_adapters::session::SessionProvider;
use gc_adapters::{run_scale_check, ScaleCheckOutcome};
use gc_config::{AgentEntry, Config, PoolEntry, RigEntry};
use gc_core::pool::PoolDescriptor;
use gc_core::session_identity::{derive_session_identity, qualified_agent_name};
use gc_core::spec::{AgentSpec, StartupHints};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("image check failed for {reference}: {reason}")]
    ImageMissing { reference: String, reason: String },
    #[error("listing running sessions failed: {0}")]
    ListRunning(String),
}

/// Fixed, builder-scoped context. `now_epoch_ms` is captured once by the
/// caller at controller construction and threaded through every tick — the
/// beacon-stability invariant: recomputing it per call would make the
/// rendered prompt, and therefore the fingerprint, change every tick even
/// when nothing else did.
#[derive(Debug, Clone)]
pub struct CityContext {
    pub city_name: String,
    pub city_path: PathBuf,
    pub city_prefix: String,
    pub now_epoch_ms: u64,
}

/// Render `{{.Agent}}`, `{{.Rig}}`, `{{.CityRoot}}`, `{{.CityName}}`
/// placeholders. Deliberately not a general template engine — these four
/// substitutions are the entire supported surface.
fn render_template(template: &str, agent: &str, rig: Option<&str>, ctx: &CityContext) -> String {
    template
        .replace("{{.Agent}}", agent)
        .replace("{{.Rig}}", rig.unwrap_or(""))
        .replace("{{.CityRoot}}", &ctx.city_path.to_string_lossy())
        .replace("{{.CityName}}", &ctx.city_name)
}

fn resolve_work_dir(entry: &AgentEntry, rig: Option<&RigEntry>, ctx: &CityContext) -> PathBuf {
    let resolved = match &entry.work_dir {
        Some(template) => render_template(template, &entry.name, rig.map(|r| r.name.as_str()), ctx),
        None => match rig {
            Some(r) => return r.path.join(&entry.name),
            None => return ctx.city_path.join(&entry.name),
        },
    };
    let path = PathBuf::from(resolved);
    if path.is_absolute() {
        path
    } else {
        ctx.city_path.join(path)
    }
}

fn is_inside_suspended_rig(work_dir: &Path, suspended_rig_paths: &[PathBuf]) -> bool {
    suspended_rig_paths
        .iter()
        .any(|rig_path| work_dir.starts_with(rig_path))
}

fn build_env(
    entry: &AgentEntry,
    qualified_name: &str,
    work_dir: &Path,
    rig: Option<&RigEntry>,
    ctx: &CityContext,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = std::env::vars()
        .filter(|(key, _)| key == "PATH" || key.starts_with("GC_"))
        .collect();
    for (key, value) in &entry.env {
        env.insert(key.clone(), value.clone());
    }
    env.insert("GC_AGENT".to_string(), qualified_name.to_string());
    env.insert("GC_CITY".to_string(), ctx.city_name.clone());
    env.insert("GC_DIR".to_string(), work_dir.to_string_lossy().into_owned());
    if let Some(rig) = rig {
        env.insert("GC_RIG".to_string(), rig.name.clone());
    }
    env
}

/// Prepend the stable beacon line: city name, agent qualified name, and a
/// hook-mode bit, stamped with the builder's fixed `now`.
fn render_prompt(prompt: Option<&str>, qualified_name: &str, ctx: &CityContext) -> Option<String> {
    let body = prompt?;
    let beacon = format!(
        "<!-- gc-beacon city={} agent={} hook=0 ts={} -->",
        ctx.city_name, qualified_name, ctx.now_epoch_ms
    );
    Some(format!("{beacon}\n{body}"))
}

fn build_hints(entry: &AgentEntry) -> StartupHints {
    StartupHints {
        ready_prompt_prefix: entry.hints.ready_prompt_prefix.clone(),
        ready_delay_ms: entry.hints.ready_delay_ms,
        process_name_witnesses: entry.hints.process_name_witnesses.clone(),
        pre_start_commands: entry.hints.pre_start_commands.clone(),
        session_setup_commands: entry.hints.session_setup_commands.clone(),
        session_setup_script: entry.hints.session_setup_script.clone(),
        overlay_dir: entry.hints.overlay_dir.clone(),
        copy_files: entry.hints.copy_files.clone(),
        container_image: entry.hints.container_image.clone(),
    }
}

fn is_pool_entry(pool: &PoolEntry) -> bool {
    pool.max > 1
}

struct PendingPool<'a> {
    entry: &'a AgentEntry,
    pool: &'a PoolEntry,
    rig: Option<&'a RigEntry>,
    work_dir: PathBuf,
    qualified_base: String,
}

/// Run every unique `check-image` capability once before the first tick.
/// Collapses N agents sharing an image into one failure message instead of
/// N serial timeouts.
pub async fn precheck_images(
    config: &Config,
    session: &dyn SessionProvider,
) -> Result<(), BuildError> {
    let mut seen = BTreeSet::new();
    for entry in &config.agents {
        if let Some(image) = &entry.hints.container_image {
            seen.insert(image.clone());
        }
    }
    for image in seen {
        session
            .check_image(&image)
            .await
            .map_err(|source| BuildError::ImageMissing {
                reference: image,
                reason: source.to_string(),
            })?;
    }
    Ok(())
}

pub async fn build_desired_state(
    config: &Config,
    ctx: &CityContext,
    session: &dyn SessionProvider,
    draining: &DrainRegistry,
) -> Result<Vec<AgentSpec>, BuildError> {
    if config.workspace.suspended {
        return Ok(Vec::new());
    }

    let rigs_by_name: BTreeMap<&str, &RigEntry> =
        config.rigs.iter().map(|r| (r.name.as_str(), r)).collect();

    let suspended_rig_paths: Vec<PathBuf> = config
        .rigs
        .iter()
        .filter(|r| r.suspended)
        .map(|r| r.path.clone())
        .collect();

    let mut specs = Vec::new();
    let mut pending_pools = Vec::new();

    for entry in &config.agents {
        if entry.suspended {
            continue;
        }
        let rig = entry.rig.as_deref().and_then(|name| rigs_by_name.get(name).copied());
        let work_dir = resolve_work_dir(entry, rig, ctx);
        if is_inside_suspended_rig(&work_dir, &suspended_rig_paths) {
            continue;
        }

        let qualified_name = qualified_agent_name(entry.rig.as_deref(), &entry.name);

        match &entry.pool {
            Some(pool) if is_pool_entry(pool) => {
                pending_pools.push(PendingPool {
                    entry,
                    pool,
                    rig,
                    work_dir,
                    qualified_base: qualified_name,
                });
            }
            _ => {
                let session_identity = entry
                    .session_identity
                    .clone()
                    .unwrap_or_else(|| derive_session_identity(&ctx.city_name, &qualified_name));
                let env = build_env(entry, &qualified_name, &work_dir, rig, ctx);
                specs.push(AgentSpec {
                    qualified_name: qualified_name.clone(),
                    session_identity,
                    work_dir,
                    command: entry.command.clone(),
                    env,
                    hints: build_hints(entry),
                    prompt: render_prompt(entry.prompt.as_deref(), &qualified_name, ctx),
                    pool: None,
                    suspended: false,
                    fingerprint_extra: entry.fingerprint_extra.clone().into_iter().collect(),
                });
            }
        }
    }

    if pending_pools.is_empty() {
        return Ok(specs);
    }

    let outcomes = run_pool_scale_checks(&pending_pools).await;

    for (pending, outcome) in pending_pools.iter().zip(outcomes) {
        let descriptor = PoolDescriptor {
            min: pending.pool.min,
            max: pending.pool.max,
            check_command: pending.pool.check_command.clone(),
            drain_timeout: pending.pool.drain_timeout(),
        };
        let desired_count = match outcome {
            Ok(ScaleCheckOutcome::Desired(n)) => descriptor.clamp(n),
            Ok(ScaleCheckOutcome::NotNeeded) => descriptor.min,
            Err(err) => {
                warn!(
                    pool = %pending.qualified_base,
                    error = %err,
                    "pool scale-check failed, falling back to configured minimum"
                );
                descriptor.min
            }
        };

        let expected_identities: Vec<String> =
            PoolDescriptor::instance_names(&pending.qualified_base, descriptor.max)
                .iter()
                .map(|name| derive_session_identity(&ctx.city_name, name))
                .collect();
        let running = session
            .list_running(&ctx.city_prefix)
            .await
            .map_err(|e| BuildError::ListRunning(e.to_string()))?;
        let running_set: BTreeSet<&String> = running.iter().collect();
        let running_count = expected_identities
            .iter()
            .filter(|identity| running_set.contains(identity))
            .count();
        if running_count != desired_count as usize {
            tracing::info!(
                pool = %pending.qualified_base,
                check_returned = desired_count,
                running = running_count,
                "pool scale-check: {} running -> desired {}",
                running_count,
                desired_count
            );
        }

        let selected_names = select_pool_instance_names(
            &pending.qualified_base,
            &ctx.city_name,
            desired_count as usize,
            draining,
        );
        for name in selected_names {
            let session_identity = derive_session_identity(&ctx.city_name, &name);
            let env = build_env(pending.entry, &name, &pending.work_dir, pending.rig, ctx);
            specs.push(AgentSpec {
                qualified_name: name.clone(),
                session_identity,
                work_dir: pending.work_dir.clone(),
                command: pending.entry.command.clone(),
                env,
                hints: build_hints(pending.entry),
                prompt: render_prompt(pending.entry.prompt.as_deref(), &name, ctx),
                pool: Some(descriptor.clone()),
                suspended: false,
                fingerprint_extra: pending.entry.fingerprint_extra.clone().into_iter().collect(),
            });
        }
    }

    Ok(specs)
}

/// Parallel fan-out of independent scale-check commands, joined before the
/// tick continues: each check runs on its own task so wall clock is
/// `max(check)`, not `sum(check)`.
async fn run_pool_scale_checks(
    pending: &[PendingPool<'_>],
) -> Vec<Result<ScaleCheckOutcome, gc_adapters::ScaleCheckError>> {
    let handles: Vec<_> = pending
        .iter()
        .map(|p| {
            let command_line = p.pool.check_command.clone();
            tokio::spawn(async move {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.arg("-c").arg(&command_line);
                run_scale_check(cmd, Duration::from_secs(30)).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(gc_adapters::ScaleCheckError::Exec(join_err.to_string())),
        });
    }
    results
}

/// Choose `count` pool instance names, walking instance numbers upward from
/// 1 and skipping any whose derived session identity is currently draining.
/// A draining instance never gets its slot handed back to a fresh desired
/// entry; the replacement takes the next free, higher instance number
/// instead. Terminates because `draining` holds a finite set of identities,
/// so every index past the highest drained collision is accepted.
fn select_pool_instance_names(
    base: &str,
    city_name: &str,
    count: usize,
    draining: &DrainRegistry,
) -> Vec<String> {
    let mut names = Vec::with_capacity(count);
    let mut idx: u32 = 1;
    while names.len() < count {
        let name = format!("{base}-{idx}");
        let identity = derive_session_identity(city_name, &name);
        if !draining.is_draining(&identity) {
            names.push(name);
        }
        idx += 1;
    }
    names
}

/// Everything the reconciler needs about session identities beyond the
/// desired list itself: which identities belong to a currently-suspended
/// agent/rig/workspace (row 1/2 of the decision table), which belong to
/// some pool's allowed instance range (for Phase 2 drain-vs-stop), and each
/// pool member's configured drain timeout.
#[derive(Debug, Default, Clone)]
pub struct SessionSets {
    pub suspended_identities: BTreeSet<String>,
    pub pool_identities: BTreeSet<String>,
    pub pool_drain_timeout: BTreeMap<String, Duration>,
}

fn rig_is_suspended(rig: Option<&str>, rigs_by_name: &BTreeMap<&str, &RigEntry>) -> bool {
    rig.and_then(|name| rigs_by_name.get(name))
        .map(|r| r.suspended)
        .unwrap_or(false)
}

/// Computed independently of live session-provider state, so it can run
/// synchronously alongside (or before) [`build_desired_state`].
pub fn compute_session_sets(config: &Config, ctx: &CityContext) -> SessionSets {
    let rigs_by_name: BTreeMap<&str, &RigEntry> =
        config.rigs.iter().map(|r| (r.name.as_str(), r)).collect();
    let workspace_suspended = config.workspace.suspended;

    let mut sets = SessionSets::default();

    for entry in &config.agents {
        let qualified_base = qualified_agent_name(entry.rig.as_deref(), &entry.name);
        let is_suspended =
            workspace_suspended || entry.suspended || rig_is_suspended(entry.rig.as_deref(), &rigs_by_name);

        match &entry.pool {
            Some(pool) if is_pool_entry(pool) => {
                for name in PoolDescriptor::instance_names(&qualified_base, pool.max) {
                    let identity = derive_session_identity(&ctx.city_name, &name);
                    sets.pool_identities.insert(identity.clone());
                    sets.pool_drain_timeout.insert(identity.clone(), pool.drain_timeout());
                    if is_suspended {
                        sets.suspended_identities.insert(identity);
                    }
                }
            }
            _ => {
                let identity = entry
                    .session_identity
                    .clone()
                    .unwrap_or_else(|| derive_session_identity(&ctx.city_name, &qualified_base));
                if is_suspended {
                    sets.suspended_identities.insert(identity);
                }
            }
        }
    }

    sets
}
