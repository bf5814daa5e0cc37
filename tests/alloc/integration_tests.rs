use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use fuzzman::types::{AllocationError, BuildSpec, CoreRequest, ResolvedBuild};
use fuzzman::{allocate, parse_build_spec, resolve_build_paths};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn cores(resolved: &[ResolvedBuild]) -> Vec<usize> {
    resolved.iter().map(|b| b.cores).collect()
}

fn make_executable(path: &Path) {
    fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn equal_thirds_of_a_hundred() {
    let specs = vec![
        BuildSpec::new(None, "a", None),
        BuildSpec::new(None, "b", None),
        BuildSpec::new(None, "c", None),
    ];
    let resolved = allocate(&specs, 100, true).unwrap();
    assert_eq!(cores(&resolved), vec![34, 33, 33]);
    assert_eq!(
        resolved.iter().map(|b| b.path.clone()).collect::<Vec<_>>(),
        vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
    );
}

#[test]
fn unset_build_takes_the_remaining_share() {
    let specs = vec![
        BuildSpec::new(Some("a"), "a/p", None),
        BuildSpec::new(Some("b"), "b/p", Some(CoreRequest::Percent(50.0))),
        BuildSpec::new(Some("c"), "c/p", Some(CoreRequest::Percent(5.0))),
    ];
    let resolved = allocate(&specs, 100, true).unwrap();
    assert_eq!(cores(&resolved), vec![45, 50, 5]);
    assert_eq!(resolved[1].name.as_deref(), Some("b"));
}

#[test]
fn percents_without_free_cores_get_one_core_each() {
    let specs = vec![
        BuildSpec::new(None, "a/p", Some(CoreRequest::Exact(100))),
        BuildSpec::new(None, "b/p", Some(CoreRequest::Percent(15.0))),
        BuildSpec::new(None, "c/p", Some(CoreRequest::Percent(10.0))),
    ];
    let resolved = allocate(&specs, 100, true).unwrap();
    assert_eq!(cores(&resolved), vec![98, 1, 1]);
}

#[test]
fn parsed_descriptors_feed_the_allocator() {
    assert_eq!(
        parse_build_spec("asan:b/p:15%").unwrap(),
        BuildSpec::new(Some("asan"), "b/p", Some(CoreRequest::Percent(15.0)))
    );
    assert_eq!(
        parse_build_spec("a/p").unwrap(),
        BuildSpec::new(None, "a/p", None)
    );

    let specs = ["basic:a/p", "asan:b/p:25%", "ubsan:c/p:2"]
        .iter()
        .map(|raw| parse_build_spec(raw).unwrap())
        .collect::<Vec<_>>();
    let resolved = allocate(&specs, 10, true).unwrap();
    assert_eq!(cores(&resolved), vec![6, 2, 2]);
}

/// Small deterministic generator so mixes are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }

    fn request(&mut self) -> Option<CoreRequest> {
        match self.next(3) {
            0 => None,
            1 => Some(CoreRequest::Exact(1 + self.next(6) as usize)),
            _ => Some(CoreRequest::Percent((1 + self.next(80)) as f64)),
        }
    }
}

fn sorted_cores(result: &Result<Vec<ResolvedBuild>, AllocationError>) -> Option<Vec<usize>> {
    result.as_ref().ok().map(|resolved| {
        let mut cores = cores(resolved);
        cores.sort_unstable();
        cores
    })
}

#[test]
fn every_build_gets_a_core_and_sum_matches() {
    let mut rng = Lcg(0x5eed);
    for _ in 0..3000 {
        let total = 1 + rng.next(40) as usize;
        let n = 1 + rng.next(5) as usize;
        let specs: Vec<BuildSpec> = (0..n)
            .map(|i| BuildSpec::new(None, format!("b{i}"), rng.request()))
            .collect();
        let mix = specs.iter().map(|s| s.request).collect::<Vec<_>>();

        let result = allocate(&specs, total, true);
        match &result {
            Ok(resolved) => {
                assert_eq!(resolved.len(), n, "{mix:?} @ {total}");
                assert_eq!(
                    resolved.iter().map(|b| b.cores).sum::<usize>(),
                    total,
                    "{mix:?} @ {total}"
                );
                assert!(resolved.iter().all(|b| b.cores >= 1), "{mix:?} @ {total}");
            }
            Err(AllocationError::NotEnoughCores { .. })
            | Err(AllocationError::CoreCountMismatch { .. }) => {}
            Err(e) => panic!("{mix:?} @ {total}: unexpected {e}"),
        }

        let exact: usize = specs
            .iter()
            .filter_map(|s| match s.request {
                Some(CoreRequest::Exact(n)) => Some(n),
                _ => None,
            })
            .sum();
        let shared = specs
            .iter()
            .filter(|s| !matches!(s.request, Some(CoreRequest::Exact(_))))
            .count();
        if shared > 0 && exact + shared <= total {
            assert!(result.is_ok(), "{mix:?} @ {total} should fit: {result:?}");
        }
        if shared == 0 {
            assert_eq!(result.is_ok(), exact == total, "{mix:?} @ {total}");
        }

        let expected = sorted_cores(&result);
        let mut reversed = specs.clone();
        reversed.reverse();
        let mut rotated = specs.clone();
        rotated.rotate_left(1);
        for permuted in [reversed, rotated] {
            let other = allocate(&permuted, total, true);
            assert_eq!(sorted_cores(&other), expected, "{mix:?} @ {total}");
        }
    }
}

#[test]
fn overshoot_is_taken_from_the_exact_build_in_any_order() {
    let big = BuildSpec::new(Some("big"), "a/p", Some(CoreRequest::Exact(100)));
    let mid = BuildSpec::new(Some("mid"), "b/p", Some(CoreRequest::Percent(15.0)));
    let low = BuildSpec::new(Some("low"), "c/p", Some(CoreRequest::Percent(10.0)));
    let orders = [
        [&big, &mid, &low],
        [&big, &low, &mid],
        [&mid, &big, &low],
        [&mid, &low, &big],
        [&low, &big, &mid],
        [&low, &mid, &big],
    ];
    for order in orders {
        let specs: Vec<BuildSpec> = order.into_iter().cloned().collect();
        let resolved = allocate(&specs, 100, true).unwrap();
        for build in &resolved {
            let expected = if build.name.as_deref() == Some("big") { 98 } else { 1 };
            assert_eq!(build.cores, expected, "{:?}", build.name);
        }
    }
}

#[test]
fn unset_build_next_to_full_exact_count() {
    let exact = BuildSpec::new(None, "a/p", Some(CoreRequest::Exact(4)));
    let unset = BuildSpec::new(None, "b/p", None);
    let resolved = allocate(&[exact.clone(), unset.clone()], 4, true).unwrap();
    assert_eq!(cores(&resolved), vec![3, 1]);
    let resolved = allocate(&[unset, exact], 4, true).unwrap();
    assert_eq!(cores(&resolved), vec![1, 3]);
}

#[test]
fn percents_summing_to_a_hundred_match_their_rescaled_form() {
    let percents = |values: &[f64]| -> Vec<BuildSpec> {
        let mut specs = vec![BuildSpec::new(None, "e", Some(CoreRequest::Exact(2)))];
        specs.extend(
            values
                .iter()
                .map(|p| BuildSpec::new(None, "p", Some(CoreRequest::Percent(*p)))),
        );
        specs
    };
    let pairs: [(&[f64], &[f64]); 3] = [
        (&[75.0, 25.0], &[150.0, 50.0]),
        (&[60.0, 40.0], &[120.0, 80.0]),
        (&[50.0, 30.0, 20.0], &[100.0, 60.0, 40.0]),
    ];
    for (plain, scaled) in pairs {
        for total in 5..=40 {
            let plain_result = allocate(&percents(plain), total, true);
            let scaled_result = allocate(&percents(scaled), total, true);
            assert_eq!(
                plain_result.map(|r| cores(&r)).ok(),
                scaled_result.map(|r| cores(&r)).ok(),
                "{plain:?} vs {scaled:?} @ {total}"
            );
        }
    }
}

#[test]
fn oversubscribed_percents_are_rescaled() {
    let specs = vec![
        BuildSpec::new(None, "a", Some(CoreRequest::Percent(150.0))),
        BuildSpec::new(None, "b", Some(CoreRequest::Percent(50.0))),
    ];
    assert_eq!(cores(&allocate(&specs, 8, true).unwrap()), vec![6, 2]);
}

#[test]
fn exact_counts_over_budget_fail() {
    let specs = vec![
        BuildSpec::new(None, "a", Some(CoreRequest::Exact(6))),
        BuildSpec::new(None, "b", Some(CoreRequest::Exact(6))),
    ];
    assert!(matches!(
        allocate(&specs, 8, true),
        Err(AllocationError::NotEnoughCores {
            requested: 12,
            available: 8
        })
    ));
}

#[test]
fn zero_exact_cores_are_rejected() {
    let specs = vec![BuildSpec::new(Some("z"), "a", Some(CoreRequest::Exact(0)))];
    assert!(matches!(
        allocate(&specs, 4, true),
        Err(AllocationError::ZeroCores(_))
    ));
}

#[test]
fn too_many_builds_for_the_budget() {
    let specs = vec![
        BuildSpec::new(None, "a", None),
        BuildSpec::new(None, "b", None),
        BuildSpec::new(None, "c", None),
    ];
    assert!(matches!(
        allocate(&specs, 2, true),
        Err(AllocationError::NotEnoughCores { .. })
    ));
}

#[test]
fn directories_resolve_to_program_binary() {
    let tmp = tempdir().unwrap();
    for dir in ["plain", "asan"] {
        fs::create_dir(tmp.path().join(dir)).unwrap();
        make_executable(&tmp.path().join(dir).join("app"));
    }

    let specs = vec![
        BuildSpec::new(None, tmp.path().join("plain"), None),
        BuildSpec::new(Some("asan"), tmp.path().join("asan"), None),
    ];
    let resolved = resolve_build_paths(specs, "./build/app").unwrap();
    assert_eq!(resolved[0].path, tmp.path().join("plain").join("app"));
    assert_eq!(resolved[1].path, tmp.path().join("asan").join("app"));
}

#[test]
fn directory_without_program_is_reported() {
    let tmp = tempdir().unwrap();
    fs::create_dir(tmp.path().join("empty")).unwrap();

    let specs = vec![BuildSpec::new(None, tmp.path().join("empty"), None)];
    assert!(matches!(
        resolve_build_paths(specs, "app"),
        Err(AllocationError::MissingBinary { .. })
    ));
}

#[test]
fn directories_and_binaries_dont_mix() {
    let tmp = tempdir().unwrap();
    fs::create_dir(tmp.path().join("dir")).unwrap();
    make_executable(&tmp.path().join("bin"));

    let specs = vec![
        BuildSpec::new(None, tmp.path().join("dir"), None),
        BuildSpec::new(None, tmp.path().join("bin"), None),
    ];
    assert!(matches!(
        resolve_build_paths(specs, "app"),
        Err(AllocationError::MixedBuildKinds)
    ));
}

#[test]
fn non_executable_binary_is_not_found() {
    let tmp = tempdir().unwrap();
    let plain = tmp.path().join("data");
    fs::write(&plain, "not a program").unwrap();

    let specs = vec![BuildSpec::new(None, &plain, None)];
    assert!(matches!(
        resolve_build_paths(specs, "app"),
        Err(AllocationError::BinaryNotFound(path)) if path == plain
    ));
}
