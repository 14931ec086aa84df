use num_traits::Float;

/// The `RootError` enum represents the ways a bracketed root search can fail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RootError {
    #[error("Function values at the bracket ends have the same sign")]
    NoSignChange,
    #[error("Root search did not converge within {0} iterations")]
    NoConvergence(usize),
}

pub type Result<T> = std::result::Result<T, RootError>;

/// Finds a root of `f` on the bracket `[a, b]` with Brent's method.
///
/// The search combines bisection with secant and inverse quadratic
/// interpolation steps, is derivative free, and keeps the root bracketed at
/// every iteration. The function values at `a` and `b` must have opposite
/// signs.
///
/// # Arguments
///
/// * `f` - The function whose root is sought.
/// * `a` - Lower end of the bracket.
/// * `b` - Upper end of the bracket.
/// * `tol` - Absolute tolerance on the root location.
/// * `max_iter` - Iteration limit.
///
/// # Returns
///
/// The root location, accurate to roughly `tol` plus a few machine epsilons
/// of the returned value.
///
/// # Errors
///
/// Returns [`RootError::NoSignChange`] if `f(a)` and `f(b)` have the same
/// sign, and [`RootError::NoConvergence`] if the iteration limit is reached.
///
/// # Example
///
/// ```
/// use rt_dose_geometry::roots::brent;
///
/// let root = brent(|x: f64| x * x - 2.0, 0.0, 2.0, 1e-12, 100).unwrap();
/// assert!((root - 2.0f64.sqrt()).abs() < 1e-10);
/// ```
pub fn brent<T, F>(f: F, a: T, b: T, tol: T, max_iter: usize) -> Result<T>
where
    T: Float,
    F: Fn(T) -> T,
{
    let two = T::from(2.0).unwrap();
    let three = T::from(3.0).unwrap();

    let mut a = a;
    let mut b = b;
    let mut fa = f(a);
    let mut fb = f(b);
    if fa == T::zero() {
        return Ok(a);
    }
    if fb == T::zero() {
        return Ok(b);
    }
    if fa.signum() == fb.signum() {
        return Err(RootError::NoSignChange);
    }

    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut e = d;

    for _ in 0..max_iter {
        if fb.signum() == fc.signum() {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }
        let tol1 = two * T::epsilon() * b.abs() + tol / two;
        let xm = (c - b) / two;
        if xm.abs() <= tol1 || fb == T::zero() {
            return Ok(b);
        }
        if e.abs() >= tol1 && fa.abs() > fb.abs() {
            // Attempt secant (a == c) or inverse quadratic interpolation.
            let s = fb / fa;
            let mut p;
            let mut q;
            if a == c {
                p = two * xm * s;
                q = T::one() - s;
            } else {
                let r0 = fa / fc;
                let r1 = fb / fc;
                p = s * (two * xm * r0 * (r0 - r1) - (b - a) * (r1 - T::one()));
                q = (r0 - T::one()) * (r1 - T::one()) * (s - T::one());
            }
            if p > T::zero() {
                q = -q;
            }
            p = p.abs();
            let min1 = three * xm * q - (tol1 * q).abs();
            let min2 = (e * q).abs();
            if two * p < min1.min(min2) {
                // Interpolation accepted.
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }
        a = b;
        fa = fb;
        if d.abs() > tol1 {
            b = b + d;
        } else {
            b = b + tol1.copysign(xm);
        }
        fb = f(b);
    }
    Err(RootError::NoConvergence(max_iter))
}
