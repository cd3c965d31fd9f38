use num::Float;

/// Panics with the offending tensors printed when `$a` contains a NaN.
/// The log-space box encoding produces NaNs the moment a degenerate box
/// slips through sanitation, and catching that at the source beats
/// watching the loss dissolve twenty iterations later.
#[macro_export]
macro_rules! check_nan {
    ($a:expr, $b:expr, $c: expr) => {{
        use burn::tensor::cast::ToElement;
        if $a.clone().is_nan().int().sum().into_scalar().to_i32() > 0 {
            println!("A = {}", $a);
            println!("B = {}", $b);
            println!("C = {}", $c);
            panic!("found nan in line {}", line!());
        }
    }};
}

// Helper function for comparing floats
pub fn assert_approx_eq<F>(a: &F, b: &F, epsilon: F)
where
    F: Float + std::fmt::Display + std::fmt::Debug,
{
    assert!(
        (*a - *b).abs() <= epsilon,
        "Values differ: {:?} vs {:?} (tolerance: {:?})",
        *a,
        *b,
        epsilon
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_eq_within_tolerance() {
        assert_approx_eq(&1.0001f32, &1.0002f32, 1e-3);
    }

    #[test]
    #[should_panic]
    fn approx_eq_panics_outside_tolerance() {
        assert_approx_eq(&1.0f32, &1.1f32, 1e-3);
    }
}
