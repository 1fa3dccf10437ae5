//! Gaussian-process surrogate used by the Bayesian optimizer.
//!
//! - Inputs live on the unit cube (see `ParameterSpace::to_unit`)
//! - RBF kernel `k(a, b) = exp(-|a - b|² / (2ℓ²))` plus `noise` on the diagonal
//! - Targets are standardized before fitting; predictions are returned in
//!   the original units
//! - Cholesky factorization retries with growing jitter up to `1e-2` before
//!   giving up

use stratguard_core::stats::{mean, normal_cdf, normal_pdf, std_dev};

const MAX_JITTER: f64 = 1e-2;

#[derive(Debug, Clone)]
pub struct GaussianProcess {
    xs: Vec<Vec<f64>>,
    /// `K⁻¹ y` on standardized targets.
    alpha: Vec<f64>,
    /// Lower Cholesky factor of `K`.
    chol: Vec<Vec<f64>>,
    length_scale: f64,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    /// Fit on `xs` (unit-cube points) and `ys`. `None` when there is no data,
    /// the lengths disagree, or the kernel matrix stays singular.
    pub fn fit(xs: &[Vec<f64>], ys: &[f64], length_scale: f64, noise: f64) -> Option<Self> {
        if xs.is_empty() || xs.len() != ys.len() || ys.iter().any(|y| !y.is_finite()) {
            return None;
        }
        let n = xs.len();
        let y_mean = mean(ys);
        let y_std = match std_dev(ys) {
            s if s > 1e-12 => s,
            _ => 1.0,
        };
        let y: Vec<f64> = ys.iter().map(|v| (v - y_mean) / y_std).collect();

        let base: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| rbf(&xs[i], &xs[j], length_scale)).collect())
            .collect();

        let mut jitter = noise.max(0.0);
        let chol = loop {
            let mut k = base.clone();
            for (i, row) in k.iter_mut().enumerate() {
                row[i] += jitter;
            }
            if let Some(l) = cholesky(&k) {
                break l;
            }
            jitter = if jitter <= 0.0 { 1e-10 } else { jitter * 10.0 };
            if jitter > MAX_JITTER {
                return None;
            }
        };

        let alpha = solve_upper_t(&chol, &solve_lower(&chol, &y));
        Some(Self {
            xs: xs.to_vec(),
            alpha,
            chol,
            length_scale,
            y_mean,
            y_std,
        })
    }

    /// Posterior mean and standard deviation at `x`.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star: Vec<f64> = self.xs.iter().map(|xi| rbf(xi, x, self.length_scale)).collect();
        let mu: f64 = k_star.iter().zip(&self.alpha).map(|(k, a)| k * a).sum();
        let v = solve_lower(&self.chol, &k_star);
        let var = (1.0 - v.iter().map(|x| x * x).sum::<f64>()).max(0.0);
        (self.y_mean + mu * self.y_std, var.sqrt() * self.y_std)
    }
}

/// Expected improvement over `best` for a maximization problem.
pub fn expected_improvement(mu: f64, sigma: f64, best: f64, xi: f64) -> f64 {
    let improvement = mu - best - xi;
    if sigma < 1e-12 {
        return improvement.max(0.0);
    }
    let z = improvement / sigma;
    improvement * normal_cdf(z) + sigma * normal_pdf(z)
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-d2 / (2.0 * length_scale * length_scale)).exp()
}

fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let d = a[i][i] - s;
                if d <= 0.0 || !d.is_finite() {
                    return None;
                }
                l[i][j] = d.sqrt();
            } else {
                l[i][j] = (a[i][j] - s) / l[j][j];
            }
        }
    }
    Some(l)
}

/// Solve `L x = b` for lower-triangular `L`.
fn solve_lower(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in 0..n {
        let s: f64 = (0..i).map(|k| l[i][k] * x[k]).sum();
        x[i] = (b[i] - s) / l[i][i];
    }
    x
}

/// Solve `Lᵀ x = b`.
fn solve_upper_t(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let s: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (b[i] - s) / l[i][i];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_training_points() {
        let xs = vec![vec![0.0], vec![0.5], vec![1.0]];
        let ys = [1.0, 3.0, 2.0];
        let gp = GaussianProcess::fit(&xs, &ys, 0.3, 1e-8).unwrap();
        for (x, y) in xs.iter().zip(ys) {
            let (mu, sigma) = gp.predict(x);
            assert!((mu - y).abs() < 1e-3, "mu {mu} vs {y}");
            assert!(sigma < 1e-2);
        }
    }

    #[test]
    fn uncertainty_grows_away_from_data() {
        let xs = vec![vec![0.0, 0.0], vec![0.1, 0.1]];
        let gp = GaussianProcess::fit(&xs, &[0.0, 1.0], 0.2, 1e-6).unwrap();
        let (_, near) = gp.predict(&[0.05, 0.05]);
        let (_, far) = gp.predict(&[0.9, 0.9]);
        assert!(far > near);
    }

    #[test]
    fn duplicate_points_still_fit() {
        let xs = vec![vec![0.3], vec![0.3], vec![0.3]];
        assert!(GaussianProcess::fit(&xs, &[1.0, 1.0, 1.0], 0.2, 0.0).is_some());
    }

    #[test]
    fn rejects_empty_or_mismatched() {
        assert!(GaussianProcess::fit(&[], &[], 0.2, 1e-6).is_none());
        assert!(GaussianProcess::fit(&[vec![0.0]], &[1.0, 2.0], 0.2, 1e-6).is_none());
    }

    #[test]
    fn expected_improvement_shape() {
        assert_eq!(expected_improvement(1.0, 0.0, 0.5, 0.0), 0.5);
        assert_eq!(expected_improvement(0.0, 0.0, 0.5, 0.0), 0.0);
        // Uncertainty alone has value.
        assert!(expected_improvement(0.0, 1.0, 0.5, 0.0) > 0.0);
        assert!(expected_improvement(0.0, 2.0, 0.5, 0.0) > expected_improvement(0.0, 1.0, 0.5, 0.0));
    }
}
