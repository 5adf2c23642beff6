use proptest::prelude::*;
use u_attribution::sanitize::{safe_float, NumericValue, SafeValue};

proptest! {
    #[test]
    fn finite_scalars_are_identity(v in prop::num::f64::NORMAL | prop::num::f64::ZERO | prop::num::f64::SUBNORMAL) {
        prop_assert_eq!(safe_float(&NumericValue::Float(v)), SafeValue::Number(v));
    }

    #[test]
    fn integers_convert(v in any::<i32>()) {
        prop_assert_eq!(safe_float(&NumericValue::Int(v as i64)), SafeValue::Number(v as f64));
    }

    #[test]
    fn non_finite_is_null(v in prop::num::f64::QUIET_NAN | prop::num::f64::INFINITE) {
        prop_assert_eq!(safe_float(&NumericValue::Float(v)), SafeValue::Null);
    }

    #[test]
    fn arrays_map_element_wise(values in prop::collection::vec(prop::num::f64::ANY, 2..20)) {
        let out = safe_float(&values.clone().into());
        let expected: Vec<SafeValue> = values
            .iter()
            .map(|&v| if v.is_finite() { SafeValue::Number(v) } else { SafeValue::Null })
            .collect();
        prop_assert_eq!(out, SafeValue::Seq(expected));
    }

    #[test]
    fn numeric_strings_parse(v in -1e12..1e12f64) {
        let text = format!("  {v}  ");
        prop_assert_eq!(safe_float(&text.as_str().into()), SafeValue::Number(v));
    }
}
