//! Integration tests on simulated mixtures.
//!
//! Every scenario draws its data from a seeded ChaCha8 generator, so the
//! expected ranges below are checked against fixed datasets.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use subtest_core::mixture::rho::RhoSearchConfig;
use subtest_core::sim::{simulate_classes, SimulatedData};
use subtest_core::{
    fit_both, fit_mixture, joint_log_likelihood, FitConfig, FitStatus, Hypothesis, MixtureFit,
    MixtureParams, Observations,
};

/// 1600 / 300 / 100 rows from classes 1 / 2 / 3.
fn three_class_scenario(seed: u64) -> SimulatedData {
    let truth = MixtureParams::new(0.8, 0.15, 3.0, 2.0, 4.0, 6.0);
    let mut classes = vec![0u8; 1600];
    classes.extend(std::iter::repeat(1u8).take(300));
    classes.extend(std::iter::repeat(2u8).take(100));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    simulate_classes(&classes, &truth, &mut rng).expect("simulation failed")
}

/// 800 / 150 / 50 rows with a moderate class-3 covariance (ρ = 2).
fn thousand_row_scenario(seed: u64) -> SimulatedData {
    let truth = MixtureParams::new(0.8, 0.15, 3.0, 2.0, 4.0, 2.0);
    let mut classes = vec![0u8; 800];
    classes.extend(std::iter::repeat(1u8).take(150));
    classes.extend(std::iter::repeat(2u8).take(50));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    simulate_classes(&classes, &truth, &mut rng).expect("simulation failed")
}

fn within(estimate: f64, truth: f64, rel: f64) -> bool {
    (estimate - truth).abs() <= rel * truth
}

fn null_only_scenario(n: usize, seed: u64) -> SimulatedData {
    let truth = MixtureParams::new(0.8, 0.1, 2.0, 3.0, 3.0, 1.0);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    simulate_classes(&vec![0u8; n], &truth, &mut rng).expect("simulation failed")
}

fn assert_trace_invariants(fit: &MixtureFit) {
    for row in &fit.trace {
        let p = &row.params;
        let sum = p.pi0 + p.pi1 + p.pi2();
        assert!((sum - 1.0).abs() < 1e-12, "weights sum to {}", sum);
        assert!(p.pi0 > 0.0 && p.pi1 > 0.0 && p.pi2() > 0.0);
        assert!(p.rho >= 0.0);
        assert!(
            p.rho < p.tau * p.sigma2,
            "iteration {}: rho={} tau*sigma2={}",
            row.iteration,
            p.rho,
            p.tau * p.sigma2
        );
        assert!(row.log_likelihood.is_finite());
    }
}

mod scenarios {
    use super::*;

    #[test]
    fn test_three_class_recovery() {
        let sim = three_class_scenario(2024);
        let (null_fit, full_fit, lr) = fit_both(
            &sim.observations,
            MixtureParams::default(),
            &FitConfig::default(),
        )
        .unwrap();

        assert!(full_fit.converged(), "status {:?}", full_fit.status);
        let p = full_fit.params;
        assert!(p.pi0 > 0.65 && p.pi0 < 0.92, "pi0={}", p.pi0);
        assert!(p.pi1 > 0.05 && p.pi1 < 0.3, "pi1={}", p.pi1);
        assert!(p.pi2() > 0.02 && p.pi2() < 0.1, "pi2={}", p.pi2());
        assert!(p.tau > 2.0 && p.tau < 4.0, "tau={}", p.tau);
        assert!(p.sigma1 > 1.4 && p.sigma1 < 2.8, "sigma1={}", p.sigma1);
        assert!(p.sigma2 > 2.8 && p.sigma2 < 5.2, "sigma2={}", p.sigma2);

        assert!(full_fit.log_likelihood > null_fit.log_likelihood);
        assert!(lr.statistic > 0.0);
        assert_trace_invariants(&full_fit);
        assert_trace_invariants(&null_fit);
    }

    #[test]
    fn test_thousand_row_recovery() {
        let sim = thousand_row_scenario(0);
        assert_eq!(sim.observations.len(), 1000);
        let (null_fit, full_fit, lr) = fit_both(
            &sim.observations,
            MixtureParams::default(),
            &FitConfig::default(),
        )
        .unwrap();

        let p = full_fit.params;
        assert!((p.pi0 - 0.8).abs() < 0.05, "pi0={}", p.pi0);
        assert!((p.pi1 - 0.15).abs() < 0.05, "pi1={}", p.pi1);
        assert!((p.pi2() - 0.05).abs() < 0.03, "pi2={}", p.pi2());
        assert!(within(p.tau, 3.0, 0.2), "tau={}", p.tau);
        assert!(within(p.sigma1, 2.0, 0.2), "sigma1={}", p.sigma1);
        assert!(within(p.sigma2, 4.0, 0.2), "sigma2={}", p.sigma2);

        assert!(
            full_fit.log_likelihood > null_fit.log_likelihood,
            "full {} vs null {}",
            full_fit.log_likelihood,
            null_fit.log_likelihood
        );
        assert!(lr.statistic > 0.0);
        assert_trace_invariants(&full_fit);
    }

    #[test]
    fn test_pure_null_data_finds_no_structure() {
        let sim = null_only_scenario(2000, 99);
        let fit = fit_mixture(
            sim.observations.clone(),
            MixtureParams::default(),
            &FitConfig::default(),
        )
        .unwrap();
        let p = fit.params;

        let near_one = |sd: f64| (sd - 1.0).abs() < 0.25;
        assert!(p.pi1 < 0.2 || near_one(p.sigma1), "{:?}", p);
        assert!(p.pi2() < 0.2 || (near_one(p.tau) && near_one(p.sigma2)), "{:?}", p);

        // data-only gain over the all-null model stays small
        let obs = &sim.observations;
        let baseline: f64 = obs
            .z()
            .iter()
            .map(|z| {
                -(2.0 * std::f64::consts::PI).ln() - 0.5 * (z[0] * z[0] + z[1] * z[1])
            })
            .sum();
        let fitted = joint_log_likelihood(obs.z(), &p, obs.weights(), 0.0).unwrap();
        assert!(fitted - baseline < 15.0, "gain {}", fitted - baseline);
    }
}

mod em_contract {
    use super::*;

    #[test]
    fn test_recorded_loglik_is_reproducible() {
        let sim = three_class_scenario(5);
        let obs = &sim.observations;
        let fit = fit_mixture(obs.clone(), MixtureParams::default(), &FitConfig::default())
            .unwrap();
        let again = joint_log_likelihood(obs.z(), &fit.params, obs.weights(), 1.0).unwrap();
        assert!(
            (again - fit.log_likelihood).abs() <= 1e-9 * again.abs(),
            "{} vs {}",
            again,
            fit.log_likelihood
        );
    }

    #[test]
    fn test_trace_starts_at_initial_point() {
        let sim = three_class_scenario(6);
        let init = MixtureParams::new(0.7, 0.2, 2.5, 2.5, 2.5, 0.5);
        let fit = fit_mixture(sim.observations, init, &FitConfig::default()).unwrap();
        assert_eq!(fit.trace[0].iteration, 0);
        assert_eq!(fit.trace[0].params, init);
        for (i, row) in fit.trace.iter().enumerate() {
            assert_eq!(row.iteration, i);
        }
        assert_eq!(fit.iterations() + 1, fit.trace.len());
    }

    #[test]
    fn test_null_fit_is_pinned() {
        let sim = three_class_scenario(7);
        let cfg = FitConfig {
            fit_null: true,
            ..Default::default()
        };
        let fit = fit_mixture(sim.observations, MixtureParams::default(), &cfg).unwrap();
        assert_eq!(fit.hypothesis, Hypothesis::Null);
        assert_eq!(fit.hypothesis_flag(), 0);
        for row in &fit.trace {
            assert_eq!(row.params.sigma2, 1.0);
            assert_eq!(row.params.rho, 0.0);
        }
    }

    #[test]
    fn test_min_sd_floor_holds_everywhere() {
        let sim = null_only_scenario(1500, 8);
        let cfg = FitConfig {
            enforce_min_sd_1: true,
            ..Default::default()
        };
        let init = MixtureParams::new(0.6, 0.2, 0.5, 0.7, 0.8, 0.1);
        let fit = fit_mixture(sim.observations, init, &cfg).unwrap();
        for row in &fit.trace {
            let p = &row.params;
            assert!(p.tau >= 1.0 && p.sigma1 >= 1.0 && p.sigma2 >= 1.0, "{:?}", p);
        }
        assert_trace_invariants(&fit);
    }

    #[test]
    fn test_null_ascent_without_acceleration() {
        let sim = three_class_scenario(9);
        let cfg = FitConfig {
            fit_null: true,
            use_acceleration: false,
            max_iterations: 300,
            tolerance: 1e-8,
            ..Default::default()
        };
        let fit = fit_mixture(sim.observations, MixtureParams::default(), &cfg).unwrap();
        for pair in fit.trace.windows(2) {
            let (a, b) = (pair[0].log_likelihood, pair[1].log_likelihood);
            assert!(b >= a - 1e-9 * a.abs(), "loglik fell from {} to {}", a, b);
        }
    }

    #[test]
    fn test_full_ascent_without_acceleration() {
        let sim = thousand_row_scenario(3);
        let cfg = FitConfig {
            use_acceleration: false,
            max_iterations: 500,
            tolerance: 1e-9,
            rho_search: RhoSearchConfig {
                tol: 1e-8,
                ..Default::default()
            },
            ..Default::default()
        };
        let fit = fit_mixture(sim.observations, MixtureParams::default(), &cfg).unwrap();
        assert_eq!(fit.hypothesis, Hypothesis::Full);
        assert!(fit.trace.len() > 2);
        for pair in fit.trace.windows(2) {
            let (a, b) = (pair[0].log_likelihood, pair[1].log_likelihood);
            assert!(
                b >= a - 1e-8 * a.abs(),
                "iteration {}: loglik fell from {} to {}",
                pair[1].iteration,
                a,
                b
            );
        }
        assert_trace_invariants(&fit);
    }

    #[test]
    fn test_max_iterations_reached() {
        let sim = three_class_scenario(10);
        let cfg = FitConfig {
            max_iterations: 2,
            tolerance: 1e-12,
            ..Default::default()
        };
        let fit = fit_mixture(sim.observations, MixtureParams::default(), &cfg).unwrap();
        assert_eq!(fit.status, FitStatus::MaxIterReached);
        assert_eq!(fit.iterations(), 2);
        assert!(!fit.converged());
    }

    #[test]
    fn test_acceleration_keeps_ascent() {
        let sim = three_class_scenario(11);
        let base = FitConfig {
            fit_null: true,
            max_iterations: 40,
            tolerance: 1e-12,
            ..Default::default()
        };
        let plain = fit_mixture(
            sim.observations.clone(),
            MixtureParams::default(),
            &FitConfig {
                use_acceleration: false,
                ..base.clone()
            },
        )
        .unwrap();
        let fast = fit_mixture(sim.observations, MixtureParams::default(), &base).unwrap();
        // identical until extrapolation kicks in
        let warmup = base.accel.min_iterations - 1;
        for i in 0..=warmup {
            assert_eq!(plain.trace[i].params, fast.trace[i].params);
        }
        // extrapolated states are only kept when they improve the objective
        for pair in fast.trace.windows(2) {
            let (a, b) = (pair[0].log_likelihood, pair[1].log_likelihood);
            assert!(b >= a - 1e-9 * a.abs(), "loglik fell from {} to {}", a, b);
        }
    }
}

mod inputs {
    use super::*;
    use subtest_core::FitError;

    #[test]
    fn test_nonfinite_rows_are_dropped_and_counted() {
        let sim = three_class_scenario(12);
        let mut z = sim.observations.z().to_vec();
        z[3][0] = f64::NAN;
        z[10][1] = f64::INFINITY;
        let mut w = vec![1.0; z.len()];
        w[20] = f64::NAN;
        let obs = Observations::new(z, Some(w)).unwrap();
        assert_eq!(obs.n_dropped(), 3);
        assert_eq!(obs.len(), 1997);

        let cfg = FitConfig {
            max_iterations: 5,
            ..Default::default()
        };
        let fit = fit_mixture(obs, MixtureParams::default(), &cfg).unwrap();
        assert_eq!(fit.n_dropped, 3);
        assert_eq!(fit.n_observations, 1997);
    }

    #[test]
    fn test_contract_violations() {
        let good = Observations::new(vec![[1.0, 1.0], [0.5, 2.0]], None).unwrap();
        let bad_init = MixtureParams::new(0.5, 0.5, 1.0, 1.0, 1.0, 0.0);
        assert!(matches!(
            fit_mixture(good.clone(), bad_init, &FitConfig::default()),
            Err(FitError::ParameterRange(_))
        ));

        let singular = MixtureParams::new(0.5, 0.2, 1.0, 1.0, 2.0, 2.0);
        assert!(fit_mixture(good.clone(), singular, &FitConfig::default()).is_err());

        let neg_c = FitConfig {
            concentration_c: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            fit_mixture(good, MixtureParams::default(), &neg_c),
            Err(FitError::InvalidConfig { .. })
        ));

        assert!(matches!(
            Observations::new(vec![[1.0, 1.0]], Some(vec![1.0, 1.0])),
            Err(FitError::InputShape(_))
        ));
        assert!(matches!(
            Observations::new(vec![[1.0, 1.0]], Some(vec![-2.0])),
            Err(FitError::InvalidWeight { row: 0, .. })
        ));

        let all_nan = Observations::new(vec![[f64::NAN, 1.0]], None).unwrap();
        assert!(matches!(
            fit_mixture(all_nan, MixtureParams::default(), &FitConfig::default()),
            Err(FitError::EmptyData(_))
        ));
    }

    #[test]
    fn test_weights_act_as_replication() {
        let sim = three_class_scenario(13);
        let z: Vec<[f64; 2]> = sim.observations.z()[..200].to_vec();
        let doubled: Vec<[f64; 2]> = z.iter().flat_map(|r| [*r, *r]).collect();
        let p = MixtureParams::new(0.7, 0.2, 2.5, 1.5, 3.0, 2.0);

        let weighted = joint_log_likelihood(&z, &p, &vec![2.0; z.len()], 1.0).unwrap();
        let replicated = joint_log_likelihood(&doubled, &p, &vec![1.0; doubled.len()], 1.0).unwrap();
        assert!((weighted - replicated).abs() < 1e-9 * weighted.abs());
    }
}

mod determinism {
    use super::*;

    fn fit_with_threads(obs: &Observations, threads: usize) -> MixtureFit {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        pool.install(|| {
            fit_mixture(obs.clone(), MixtureParams::default(), &FitConfig::default()).unwrap()
        })
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        // enough rows to span several chunks
        let truth = MixtureParams::new(0.8, 0.15, 3.0, 2.0, 4.0, 6.0);
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let sim = subtest_core::sim::simulate_mixture(9000, &truth, &mut rng).unwrap();

        let one = fit_with_threads(&sim.observations, 1);
        let four = fit_with_threads(&sim.observations, 4);
        assert_eq!(one.params, four.params);
        assert_eq!(one.log_likelihood, four.log_likelihood);
        assert_eq!(one.trace.len(), four.trace.len());
    }
}
