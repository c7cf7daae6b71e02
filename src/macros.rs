/// Asserts that two floats differ by less than `prec`, optionally with a formatted message
/// describing what was compared.
#[macro_export]
macro_rules! assert_almost_eq {
    ($a:expr, $b:expr, $prec:expr $(,)?) => {
        $crate::assert_almost_eq!($a, $b, $prec, "")
    };
    ($a:expr, $b:expr, $prec:expr, $($context:tt)+) => {{
        let (left, right) = ($a, $b);
        if !$crate::numeric::almost_eq(left, right, $prec) {
            panic!(
                "assertion failed: `abs(left - right) < {:e}`, (left: `{}`, right: `{}`) {}",
                $prec,
                left,
                right,
                format_args!($($context)+)
            );
        }
    }};
}
