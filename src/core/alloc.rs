use std::cmp::Ordering;
use std::path::Path;

use log::{debug, info};

use crate::core::utils::{expand_home, find_executable};
use crate::types::{AllocationError, BuildSpec, CoreRequest, ResolvedBuild};

/// Rounding slack when checking whether a share is worth a whole core
const SHARE_EPSILON: f64 = 1e-9;

/// Parse one `--builds` descriptor: `[NAME:]<dir/bin path>[:N[%]]`
pub fn parse_build_spec(raw: &str) -> Result<BuildSpec, AllocationError> {
    let invalid = |reason: &str| AllocationError::InvalidSpec {
        spec: raw.to_string(),
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = raw.split(':').collect();
    let (name, path, count) = match fields.as_slice() {
        [path] => (None, *path, None),
        [path, count] if looks_like_count(count) => (None, *path, Some(*count)),
        [name, path] => (Some(*name), *path, None),
        [name, path, count] => (Some(*name), *path, Some(*count)),
        _ => {
            return Err(invalid(
                "format of one build is [NAME:]<dir/bin path>[:N[%]]",
            ));
        }
    };

    if path.trim().is_empty() {
        return Err(invalid("build path is empty"));
    }

    let request = match count {
        Some(count) => Some(parse_core_request(count).ok_or_else(|| {
            invalid("count is not convertible to number of instances (examples: 3, 66.6%)")
        })?),
        None => None,
    };

    Ok(BuildSpec {
        name: name.filter(|n| !n.is_empty()).map(|n| n.to_string()),
        path: expand_home(path),
        request,
    })
}

fn looks_like_count(field: &str) -> bool {
    field.contains('%') || (!field.is_empty() && field.chars().all(|c| c.is_ascii_digit()))
}

/// "5" is an exact core count, "66.6%" a share of the free cores
fn parse_core_request(count: &str) -> Option<CoreRequest> {
    match count.strip_suffix('%') {
        Some(percent) => percent
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p >= 0.0)
            .map(CoreRequest::Percent),
        None => count.trim().parse::<usize>().ok().map(CoreRequest::Exact),
    }
}

/// Check that builds point either all to directories or all to binaries.
/// Directories are replaced by the path of `program`'s binary inside them.
pub fn resolve_build_paths(
    specs: Vec<BuildSpec>,
    program: &str,
) -> Result<Vec<BuildSpec>, AllocationError> {
    if specs.iter().all(|spec| spec.path.is_dir()) {
        let program_path = Path::new(program);
        let binary_name = program_path
            .file_name()
            .unwrap_or(program_path.as_os_str())
            .to_os_string();

        return specs
            .into_iter()
            .map(|mut spec| {
                let candidate = spec.path.join(&binary_name);
                if !candidate.is_file() {
                    return Err(AllocationError::MissingBinary {
                        dir: spec.path.clone(),
                        program: binary_name.to_string_lossy().to_string(),
                        checked: candidate,
                    });
                }
                spec.path = candidate;
                Ok(spec)
            })
            .collect();
    }

    let all_files = specs
        .iter()
        .all(|spec| spec.path.is_file() || find_executable(&spec.path).is_some());
    if !all_files {
        return Err(AllocationError::MixedBuildKinds);
    }

    if let Some(missing) = specs
        .iter()
        .find(|spec| find_executable(&spec.path).is_none())
    {
        return Err(AllocationError::BinaryNotFound(missing.path.clone()));
    }

    Ok(specs)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Share {
    Unset,
    Exact,
    Percent(f64),
}

/// Allocation state of one build while percents are turned into cores
#[derive(Debug, Clone)]
struct Slot {
    order: usize,
    share: Share,
    cores: i64,
    remaining: f64,
}

impl Slot {
    fn percent(&self) -> Option<f64> {
        match self.share {
            Share::Percent(p) => Some(p),
            _ => None,
        }
    }
}

/// Summed in ascending order so the result doesn't depend on input order
fn percent_sum(slots: &[Slot]) -> f64 {
    let mut percents: Vec<f64> = slots.iter().filter_map(Slot::percent).collect();
    percents.sort_by(f64::total_cmp);
    percents.into_iter().sum()
}

fn exact_sum(slots: &[Slot]) -> i64 {
    slots
        .iter()
        .filter(|slot| slot.share == Share::Exact)
        .map(|slot| slot.cores)
        .sum()
}

fn rescale_percents(slots: &mut [Slot], sum: f64) {
    for slot in slots.iter_mut() {
        if let Share::Percent(p) = slot.share {
            slot.share = Share::Percent(p * 100.0 / sum);
        }
    }
}

/// Largest remaining share first, then most cores. Stable for full ties.
fn sort_by_remaining(slots: &mut [Slot]) {
    slots.sort_by(|a, b| {
        b.remaining
            .partial_cmp(&a.remaining)
            .unwrap_or(Ordering::Equal)
            .then(b.cores.cmp(&a.cores))
    });
}

/// Turn percent shares too small for one of the `free` cores into exact
/// one-core requests, until every remaining share is worth a core. Shares
/// are rescaled to 100% before each round.
fn demote_small_shares(slots: &mut [Slot], total: i64) {
    loop {
        let percents = percent_sum(slots);
        if percents != 0.0 && percents != 100.0 {
            rescale_percents(slots, percents);
        }

        let free = total - exact_sum(slots);
        let mut demoted = false;
        for slot in slots.iter_mut() {
            if let Share::Percent(p) = slot.share
                && (p <= 0.0 || (free as f64) * p / 100.0 < 1.0 - SHARE_EPSILON)
            {
                debug!(
                    "Build #{} gets {p:.2}% of {free} free cores, using 1 core instead",
                    slot.order + 1
                );
                slot.share = Share::Exact;
                slot.cores = 1;
                demoted = true;
            }
        }
        if !demoted {
            break;
        }
    }
}

/// Convert build descriptors into integer core counts that add up to
/// `total_instances`. Every build gets at least one core.
pub fn allocate(
    specs: &[BuildSpec],
    total_instances: usize,
    cores_explicit: bool,
) -> Result<Vec<ResolvedBuild>, AllocationError> {
    let total = total_instances as i64;
    let not_enough = |requested: i64| AllocationError::NotEnoughCores {
        requested,
        available: total_instances,
    };

    let mut slots = Vec::with_capacity(specs.len());
    for (order, spec) in specs.iter().enumerate() {
        let (share, cores) = match spec.request {
            Some(CoreRequest::Exact(0)) => return Err(AllocationError::ZeroCores(spec.label())),
            Some(CoreRequest::Exact(n)) => (Share::Exact, n as i64),
            Some(CoreRequest::Percent(p)) => (Share::Percent(p), 0),
            None => (Share::Unset, 0),
        };
        slots.push(Slot {
            order,
            share,
            cores,
            remaining: 0.0,
        });
    }

    let mut percents = percent_sum(&slots);
    if percents > 100.0 {
        info!(
            "Sum of percents in --builds is {percents:.2}% which is not 100%. Will proportionally adjust it"
        );
        rescale_percents(&mut slots, percents);
        percents = 100.0;
    }

    // builds without a count share whatever percentage is left
    let unset = slots.iter().filter(|s| s.share == Share::Unset).count();
    if unset > 0 {
        let share = (100.0 - percents) / unset as f64;
        for slot in slots.iter_mut().filter(|s| s.share == Share::Unset) {
            slot.share = Share::Percent(share);
        }
    }

    let free = total - exact_sum(&slots);
    if free < 0 {
        return Err(not_enough(exact_sum(&slots)));
    }

    // a share too small for one free core still gets one core
    demote_small_shares(&mut slots, total);

    let free = total - exact_sum(&slots);
    let has_percents = slots.iter().any(|s| s.percent().is_some());
    // remaining shares were rescaled to 100
    let mut percents = if has_percents { 100.0 } else { 0.0 };
    if has_percents && free <= 0 {
        return Err(not_enough(exact_sum(&slots)));
    }

    if has_percents {
        for slot in slots.iter_mut() {
            match slot.share {
                Share::Percent(p) => {
                    slot.remaining = p;
                    slot.cores = 0;
                }
                _ => slot.remaining = 0.0,
            }
        }

        let core_percent = 100.0 / free as f64;
        loop {
            sort_by_remaining(&mut slots);
            let mut awarded = false;
            let mut exhausted = false;
            for slot in slots.iter_mut() {
                if slot.remaining > 0.0 {
                    slot.remaining -= core_percent;
                    percents -= core_percent;
                    slot.cores += 1;
                    awarded = true;
                    if percents <= core_percent {
                        exhausted = true;
                        break;
                    }
                }
            }
            if exhausted || !awarded {
                break;
            }
        }
    }

    // the last award of a pass can run out before every share got a core
    if has_percents {
        for slot in slots.iter_mut().filter(|s| s.percent().is_some() && s.cores == 0) {
            slot.cores = 1;
        }
    }

    let used: i64 = slots.iter().map(|s| s.cores).sum();
    if used != total && (has_percents || used > total) {
        let delta = used - total;
        debug!("Fixing core allocation rounding error with delta of {delta} cores");

        sort_by_remaining(&mut slots);
        let absorber = slots
            .iter_mut()
            .find(|slot| slot.cores - delta >= 1)
            .ok_or_else(|| not_enough(used))?;
        absorber.cores -= delta;

        let used: i64 = slots.iter().map(|s| s.cores).sum();
        if used != total {
            return Err(AllocationError::Inconsistent {
                delta: used - total,
            });
        }
    }

    slots.sort_by_key(|slot| slot.order);

    let allocated: usize = slots.iter().map(|s| s.cores as usize).sum();
    if cores_explicit && allocated != total_instances {
        return Err(AllocationError::CoreCountMismatch {
            allocated,
            requested: total_instances,
        });
    }

    info!("Using {allocated} cores for {} build(s)", slots.len());

    Ok(slots
        .into_iter()
        .zip(specs)
        .map(|(slot, spec)| ResolvedBuild {
            name: spec.name.clone(),
            path: spec.path.clone(),
            cores: slot.cores as usize,
        })
        .collect())
}
