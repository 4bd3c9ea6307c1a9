use bulletin_model::{col_to_name, rewrite_formula_for_copy_delta};
use proptest::prelude::*;

fn arb_ref() -> impl Strategy<Value = String> {
    (0u32..500, 0u32..60, any::<bool>(), any::<bool>()).prop_map(|(row, col, col_abs, row_abs)| {
        format!(
            "{}{}{}{}",
            if col_abs { "$" } else { "" },
            col_to_name(col),
            if row_abs { "$" } else { "" },
            row + 1
        )
    })
}

fn arb_formula() -> impl Strategy<Value = String> {
    (arb_ref(), arb_ref(), arb_ref()).prop_map(|(a, b, c)| format!("=SUM({a}:{b})*{c}+\"{a}\""))
}

proptest! {
    #[test]
    fn copy_delta_is_reversible_when_nothing_underflows(
        formula in arb_formula(),
        dr in 0i64..200,
        dc in 0i64..40,
    ) {
        let (moved, _) = rewrite_formula_for_copy_delta(&formula, dr, dc);
        prop_assume!(!moved.contains("#REF!"));
        let (back, _) = rewrite_formula_for_copy_delta(&moved, -dr, -dc);
        prop_assert_eq!(back, formula);
    }

    #[test]
    fn string_literals_survive_any_delta(
        r in arb_ref(),
        dr in -5i64..5,
        dc in -5i64..5,
    ) {
        let formula = format!("=\"{r}\"");
        let (out, changed) = rewrite_formula_for_copy_delta(&formula, dr, dc);
        prop_assert!(!changed);
        prop_assert_eq!(out, formula);
    }
}
