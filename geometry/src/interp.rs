use num_traits::Float;

/// Linear interpolation between `a` and `b` with parameter `t`.
///
/// `t = 0` yields `a`, `t = 1` yields `b`. Values of `t` outside `[0, 1]`
/// extrapolate along the same line.
///
/// # Example
///
/// ```
/// use rt_dose_geometry::interp::lerp;
///
/// assert_eq!(lerp(0.25f64, 10.0, 20.0), 12.5);
/// assert_eq!(lerp(0.0f64, 10.0, 20.0), 10.0);
/// ```
pub fn lerp<T>(t: T, a: T, b: T) -> T
where
    T: Float,
{
    a + (b - a) * t
}

/// Inverse of [`lerp`]: the parameter at which `x` sits between `x0` and `x1`.
///
/// Returns zero when `x0` equals `x1` to avoid division by zero.
///
/// # Example
///
/// ```
/// use rt_dose_geometry::interp::inv_lerp;
///
/// assert_eq!(inv_lerp(12.5f64, 10.0, 20.0), 0.25);
/// assert_eq!(inv_lerp(5.0f64, 5.0, 5.0), 0.0);
/// ```
pub fn inv_lerp<T>(x: T, x0: T, x1: T) -> T
where
    T: Float,
{
    let dx = x1 - x0;
    if dx == T::zero() {
        return T::zero();
    }
    (x - x0) / dx
}

/// Wraps an angle in degrees onto `[0, 360)`.
///
/// # Example
///
/// ```
/// use rt_dose_geometry::interp::wrap_degrees;
///
/// assert_eq!(wrap_degrees(370.0f64), 10.0);
/// assert_eq!(wrap_degrees(-90.0f64), 270.0);
/// ```
pub fn wrap_degrees<T>(phi: T) -> T
where
    T: Float,
{
    let full = T::from(360.0).unwrap();
    let r = phi % full;
    let r = if r < T::zero() { r + full } else { r };
    // Adding a full turn to a tiny negative remainder rounds to 360 exactly.
    if r >= full { T::zero() } else { r }
}

/// Locates `x` on a sorted sample grid.
///
/// Returns the indices of the two bracketing samples together with the
/// interpolation weight between them. Values outside the grid clamp to the
/// nearest end sample (weight zero), so lookups built on this function
/// extrapolate with constant edge values.
///
/// # Arguments
///
/// * `grid` - Sample coordinates, sorted in ascending order.
/// * `x` - The coordinate to locate.
///
/// # Example
///
/// ```
/// use rt_dose_geometry::interp::bracket;
///
/// let grid = [0.0f64, 1.0, 3.0];
/// assert_eq!(bracket(&grid, 2.0), (1, 2, 0.5));
/// assert_eq!(bracket(&grid, -1.0), (0, 0, 0.0));
/// assert_eq!(bracket(&grid, 7.0), (2, 2, 0.0));
/// ```
pub fn bracket<T>(grid: &[T], x: T) -> (usize, usize, T)
where
    T: Float,
{
    let n = grid.len();
    if n < 2 || x <= grid[0] {
        return (0, 0, T::zero());
    }
    if x >= grid[n - 1] {
        return (n - 1, n - 1, T::zero());
    }
    let i1 = grid.partition_point(|&g| g <= x);
    let i0 = i1 - 1;
    (i0, i1, inv_lerp(x, grid[i0], grid[i1]))
}
