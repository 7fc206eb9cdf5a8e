use std::collections::BTreeMap;

use ngbandit::{Belief, SelectionConfig, SelectionReason, Selector, SystemMode};
use proptest::prelude::*;

fn arm_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("arm{i:02}")).collect()
}

fn beliefs_for(arms: &[String], mus: &[f64]) -> BTreeMap<String, Belief> {
    arms.iter()
        .zip(mus)
        .map(|(a, &mu)| (a.clone(), Belief::new(mu, 5.0, 3.0, 2.0)))
        .collect()
}

fn mode() -> impl Strategy<Value = SystemMode> {
    prop_oneof![
        Just(SystemMode::Learning),
        Just(SystemMode::Monitoring),
        Just(SystemMode::ForcedExploration),
    ]
}

proptest! {
    /// Whatever the mode and beliefs, the pick is one of the offered arms.
    #[test]
    fn selection_is_always_an_offered_arm(
        seed in any::<u64>(),
        n in 1usize..12,
        mus in prop::collection::vec(-100.0f64..100.0, 12),
        eps in 0.0f64..=1.0,
        mode in mode(),
    ) {
        let arms = arm_names(n);
        let beliefs = beliefs_for(&arms, &mus);
        let mut sel = Selector::with_seed(SelectionConfig { epsilon: eps }, seed);
        for _ in 0..20 {
            let s = sel.select(&arms, &beliefs, mode).unwrap();
            prop_assert!(arms.contains(&s.arm));
            if mode == SystemMode::ForcedExploration {
                prop_assert_eq!(s.reason, SelectionReason::Forced);
            }
        }
    }

    /// Identical seed, beliefs, order and mode give identical choices.
    #[test]
    fn same_seed_same_choices(
        seed in any::<u64>(),
        mus in prop::collection::vec(-10.0f64..10.0, 6),
        mode in mode(),
    ) {
        let arms = arm_names(6);
        let beliefs = beliefs_for(&arms, &mus);
        let mut a = Selector::with_seed(SelectionConfig::default(), seed);
        let mut b = Selector::with_seed(SelectionConfig::default(), seed);
        for _ in 0..30 {
            prop_assert_eq!(
                a.select(&arms, &beliefs, mode),
                b.select(&arms, &beliefs, mode)
            );
        }
    }

    /// Arms with no belief are never picked by Thompson sampling.
    #[test]
    fn learning_ignores_arms_without_beliefs(seed in any::<u64>(), known in 1usize..5) {
        let arms = arm_names(5);
        let beliefs = beliefs_for(&arms[..known], &[0.0; 5]);
        let mut sel = Selector::with_seed(SelectionConfig::default(), seed);
        for _ in 0..20 {
            let s = sel.select(&arms, &beliefs, SystemMode::Learning).unwrap();
            prop_assert!(beliefs.contains_key(&s.arm));
        }
    }
}

#[test]
fn forced_exploration_is_close_to_uniform() {
    let arms = arm_names(5);
    // Beliefs that would make Thompson pick arm04 every time.
    let mut mus = [0.0; 5];
    mus[4] = 1e6;
    let beliefs = beliefs_for(&arms, &mus);

    let trials = 50_000;
    let mut sel = Selector::with_seed(SelectionConfig::default(), 11);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for _ in 0..trials {
        let s = sel
            .select(&arms, &beliefs, SystemMode::ForcedExploration)
            .unwrap();
        *counts.entry(s.arm).or_default() += 1;
    }
    assert_eq!(counts.len(), 5);
    for (arm, c) in &counts {
        let freq = *c as f64 / trials as f64;
        assert!((freq - 0.2).abs() < 0.02, "{arm}: {freq}");
    }
}

#[test]
fn monitoring_explores_about_epsilon_of_the_time() {
    let arms = arm_names(4);
    let mut mus = [0.0; 4];
    mus[0] = 1e6;
    let beliefs = beliefs_for(&arms, &mus);

    let trials = 40_000;
    let mut sel = Selector::with_seed(SelectionConfig { epsilon: 0.2 }, 3);
    let mut epsilon_picks = 0usize;
    let mut off_leader = 0usize;
    for _ in 0..trials {
        let s = sel.select(&arms, &beliefs, SystemMode::Monitoring).unwrap();
        match s.reason {
            SelectionReason::Epsilon => epsilon_picks += 1,
            SelectionReason::Thompson { .. } => assert_eq!(s.arm, "arm00"),
            other => panic!("unexpected reason {other:?}"),
        }
        if s.arm != "arm00" {
            off_leader += 1;
        }
    }
    let eps_freq = epsilon_picks as f64 / trials as f64;
    assert!((eps_freq - 0.2).abs() < 0.02, "epsilon freq {eps_freq}");
    // Uniform picks land on the leader a quarter of the time.
    let off_freq = off_leader as f64 / trials as f64;
    assert!((off_freq - 0.15).abs() < 0.02, "off-leader freq {off_freq}");
}

#[test]
fn learning_concentrates_on_a_clear_leader() {
    let arms = arm_names(3);
    let beliefs: BTreeMap<String, Belief> = [
        ("arm00".to_string(), Belief::new(1.0, 500.0, 250.0, 25.0)),
        ("arm01".to_string(), Belief::new(3.0, 500.0, 250.0, 25.0)),
        ("arm02".to_string(), Belief::new(2.0, 500.0, 250.0, 25.0)),
    ]
    .into_iter()
    .collect();
    let mut sel = Selector::with_seed(SelectionConfig::default(), 99);
    for _ in 0..1_000 {
        let s = sel.select(&arms, &beliefs, SystemMode::Learning).unwrap();
        assert_eq!(s.arm, "arm01");
    }
}
