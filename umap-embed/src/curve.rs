//! Fit of the differentiable attraction curve `1 / (1 + a * d^(2b))` to the
//! piecewise target `exp(-(d - min_dist) / spread)` beyond `min_dist` and 1
//! inside it.

const GRID_POINTS: usize = 300;
const MAX_ITER: usize = 200;
const CONVERGENCE_TOL: f64 = 1e-10;

fn curve(x: f64, a: f64, b: f64) -> f64 {
    1.0 / (1.0 + a * x.powf(2.0 * b))
}

/// Least-squares fit of `(a, b)` via Levenberg-Marquardt over a grid of
/// distances in `[0, 3 * spread]`.
pub fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let step = 3.0 * spread / GRID_POINTS as f64;
    let xs: Vec<f64> = (0..=GRID_POINTS).map(|i| i as f64 * step).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let ssr = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let r = y - curve(x, a, b);
                r * r
            })
            .sum()
    };

    let mut a = 2.0;
    let mut b = 1.0;
    let mut lambda = 1e-3;
    let mut best = ssr(a, b);

    for _ in 0..MAX_ITER {
        // normal equations of the Jacobian, damped by lambda
        let mut jtj = [[0.0f64; 2]; 2];
        let mut jtr = [0.0f64; 2];
        for (&x, &y) in xs.iter().zip(&ys) {
            let xp = x.powf(2.0 * b);
            let denom = 1.0 + a * xp;
            let f = 1.0 / denom;
            let r = y - f;
            let dfda = -xp / (denom * denom);
            let dfdb = if x > 0.0 {
                -2.0 * a * xp * x.ln() / (denom * denom)
            } else {
                0.0
            };
            jtj[0][0] += dfda * dfda;
            jtj[0][1] += dfda * dfdb;
            jtj[1][1] += dfdb * dfdb;
            jtr[0] += dfda * r;
            jtr[1] += dfdb * r;
        }
        jtj[1][0] = jtj[0][1];

        let m00 = jtj[0][0] * (1.0 + lambda);
        let m11 = jtj[1][1] * (1.0 + lambda);
        let det = m00 * m11 - jtj[0][1] * jtj[1][0];
        if det.abs() < f64::MIN_POSITIVE {
            break;
        }
        let da = (jtr[0] * m11 - jtr[1] * jtj[0][1]) / det;
        let db = (jtr[1] * m00 - jtr[0] * jtj[1][0]) / det;

        let a_new = a + da;
        let b_new = b + db;
        let candidate = if a_new > 0.0 && b_new > 0.0 {
            ssr(a_new, b_new)
        } else {
            f64::INFINITY
        };

        if candidate < best {
            if best - candidate < CONVERGENCE_TOL {
                a = a_new;
                b = b_new;
                break;
            }
            a = a_new;
            b = b_new;
            best = candidate;
            lambda *= 0.5;
        } else {
            lambda *= 4.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    (a, b)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_default_params() {
        // reference values for spread 1.0, min_dist 0.1
        let (a, b) = find_ab_params(1.0, 0.1);
        assert_abs_diff_eq!(a, 1.577, epsilon = 0.05);
        assert_abs_diff_eq!(b, 0.895, epsilon = 0.05);
    }

    #[test]
    fn test_fit_quality() {
        for &min_dist in &[0.01, 0.1, 0.25, 0.5] {
            let (a, b) = find_ab_params(1.0, min_dist);
            assert!(a > 0.0 && b > 0.0);
            // the fitted curve should track the target closely past min_dist
            let target = (-(1.5 - min_dist) / 1.0f64).exp();
            assert_abs_diff_eq!(curve(1.5, a, b), target, epsilon = 0.05);
        }
    }

    #[test]
    fn test_curve_is_decreasing() {
        let (a, b) = find_ab_params(1.0, 0.1);
        let mut prev = curve(0.0, a, b);
        for i in 1..50 {
            let v = curve(i as f64 * 0.1, a, b);
            assert!(v <= prev);
            prev = v;
        }
    }
}
