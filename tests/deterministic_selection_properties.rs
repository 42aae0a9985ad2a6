//! Property tests for spec.md invariant 6 ("two traders with identical replicated state
//! derive identical selections") and for `H`/`HArr`/`HInt` purity.

use proptest::prelude::*;

use lines_of_rings::cooperation::select_cooperation_ring;
use lines_of_rings::crypto::{h, h_arr, h_int, h_str};
use lines_of_rings::fractal::{select_fractal_ring, select_verification_team};

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{4,12}"
}

proptest! {
    #[test]
    fn h_is_a_pure_function_of_its_input(a in id_strategy(), b in id_strategy()) {
        prop_assert_eq!(h(&a), h(&a));
        if a != b {
            prop_assert_ne!(h_str(&a), h_str(&b));
        }
    }

    #[test]
    fn h_int_is_always_the_xor_of_h_arr(x in id_strategy()) {
        let arr = h_arr(&x);
        let expected = arr.iter().fold(0u32, |acc, w| acc ^ w);
        prop_assert_eq!(h_int(&x), expected);
    }

    /// Invariant 6: two independently-constructed pools holding the same ids, in the same
    /// per-position order, must yield the same cooperation-ring selection given the same
    /// fixed investor, with no hidden dependence on pool identity or allocation order.
    #[test]
    fn cooperation_selection_is_a_pure_function_of_pool_contents(
        type0 in prop::collection::vec(id_strategy(), 2..6),
        type1 in prop::collection::vec(id_strategy(), 2..6),
    ) {
        let pools = vec![type0.clone(), type1.clone()];
        let pools_clone = vec![type0, type1];
        let investor = pools[0][0].clone();

        let a = select_cooperation_ring(&pools, Some(&investor));
        let b = select_cooperation_ring(&pools_clone, Some(&investor));
        prop_assert_eq!(a, b);
    }

    /// Same invariant, at the fractal-ring and committee-selection layer.
    #[test]
    fn fractal_and_committee_selection_are_pure_functions_of_pool_contents(
        seed in 0u32..1000,
    ) {
        let solo_rings: Vec<String> = (0..60).map(|i| format!("ring-{}-{}", seed, i)).collect();
        let traders: Vec<String> = (0..500).map(|i| format!("trader-{}-{}", seed, i)).collect();

        let a = select_fractal_ring(&solo_rings, Some(&solo_rings[3]));
        let b = select_fractal_ring(&solo_rings.clone(), Some(&solo_rings[3]));
        prop_assert_eq!(&a, &b);

        if let Some(selected) = &a {
            let team_a = select_verification_team(&traders, selected, Some(&traders[7]));
            let team_b = select_verification_team(&traders.clone(), selected, Some(&traders[7]));
            prop_assert_eq!(team_a, team_b);
        }
    }
}
