//! FGMRES driver tests: the tridiagonal Poisson system with its closed-form
//! solution, a complex diagonal system, preconditioning, and degenerate
//! inputs.

use hmatrix_kernels::blas::nrm2;
use hmatrix_solvers::{fgmres, LinearOperator};
use num_complex::Complex64;

/// The n-by-n second-difference matrix tridiag(-1, 2, -1).
struct Tridiag {
    n: usize,
}

impl LinearOperator<f64> for Tridiag {
    fn dim(&self) -> usize {
        self.n
    }

    fn amux(&self, alpha: f64, x: &[f64], y: &mut [f64]) {
        for i in 0..self.n {
            let mut s = 2.0 * x[i];
            if i > 0 {
                s -= x[i - 1];
            }
            if i + 1 < self.n {
                s -= x[i + 1];
            }
            y[i] += alpha * s;
        }
    }
}

/// Same matrix with a Jacobi right preconditioner.
struct TridiagJacobi {
    inner: Tridiag,
}

impl LinearOperator<f64> for TridiagJacobi {
    fn dim(&self) -> usize {
        self.inner.n
    }

    fn amux(&self, alpha: f64, x: &[f64], y: &mut [f64]) {
        self.inner.amux(alpha, x, y);
    }

    fn precond_apply(&self, z: &mut [f64]) {
        for e in z.iter_mut() {
            *e *= 0.5;
        }
    }
}

/// Closed-form solution of tridiag(-1, 2, -1) x = 1.
fn poisson_solution(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| ((i + 1) * (n - i)) as f64 / 2.0)
        .collect()
}

#[test]
fn poisson_system_converges() {
    let n = 100;
    let a = Tridiag { n };
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];

    let stats = fgmres(&a, &b, &mut x, 1e-8, 20, 200);
    assert!(stats.converged, "residual {}", stats.residual);
    assert!(stats.residual <= 1e-8);
    assert!(stats.steps <= 200);

    // The reported residual matches the true one.
    let mut r = b.clone();
    a.amux(-1.0, &x, &mut r);
    assert!(nrm2(&r) / nrm2(&b) <= 1e-8);

    // And the iterate matches the closed form to comparable accuracy.
    let want = poisson_solution(n);
    let diff: f64 = x
        .iter()
        .zip(want.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    assert!(diff / nrm2(&want) <= 1e-6, "relative error {diff}");
}

#[test]
fn preconditioned_run_reaches_same_solution() {
    let n = 100;
    let a = TridiagJacobi {
        inner: Tridiag { n },
    };
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];

    let stats = fgmres(&a, &b, &mut x, 1e-8, 20, 200);
    assert!(stats.converged);

    let want = poisson_solution(n);
    let diff: f64 = x
        .iter()
        .zip(want.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    assert!(diff / nrm2(&want) <= 1e-6);
}

struct ComplexDiag {
    d: Vec<Complex64>,
}

impl LinearOperator<Complex64> for ComplexDiag {
    fn dim(&self) -> usize {
        self.d.len()
    }

    fn amux(&self, alpha: Complex64, x: &[Complex64], y: &mut [Complex64]) {
        for i in 0..self.d.len() {
            y[i] += alpha * self.d[i] * x[i];
        }
    }
}

#[test]
fn complex_diagonal_system_is_exact_within_one_cycle() {
    let n = 8;
    let d: Vec<Complex64> = (0..n)
        .map(|k| Complex64::new(1.0 + k as f64, 0.3 * (k as f64 + 1.0)))
        .collect();
    let a = ComplexDiag { d: d.clone() };
    let b: Vec<Complex64> = (0..n)
        .map(|k| Complex64::new(1.0 - 0.1 * k as f64, 0.2 * k as f64))
        .collect();
    let mut x = vec![Complex64::new(0.0, 0.0); n];

    let stats = fgmres(&a, &b, &mut x, 1e-12, n, 3 * n);
    assert!(stats.converged);
    // A diagonal system with n distinct eigenvalues is solved exactly by a
    // Krylov space of dimension n.
    assert!(stats.steps <= n);
    for i in 0..n {
        let want = b[i] / d[i];
        assert!((x[i] - want).norm() < 1e-10);
    }
}

#[test]
fn zero_rhs_returns_zero_solution() {
    let a = Tridiag { n: 10 };
    let b = vec![0.0; 10];
    let mut x = vec![3.0; 10];

    let stats = fgmres(&a, &b, &mut x, 1e-10, 5, 50);
    assert!(stats.converged);
    assert_eq!(stats.steps, 0);
    assert_eq!(stats.residual, 0.0);
    assert!(x.iter().all(|&e| e == 0.0));
}

#[test]
fn converged_initial_guess_returns_immediately() {
    let n = 50;
    let a = Tridiag { n };
    let b = vec![1.0; n];
    let mut x = poisson_solution(n);

    let stats = fgmres(&a, &b, &mut x, 1e-8, 10, 100);
    assert!(stats.converged);
    assert_eq!(stats.steps, 0);
}

/// A 2x2 block matrix whose off-diagonal leaves are low-rank blocks and
/// whose diagonal leaves are dense, the way an H-matrix traversal would
/// compose a full product.
struct TwoByTwoBlocks {
    half: usize,
    a11: hmatrix_block::Block<f64>,
    a12: hmatrix_block::Block<f64>,
    a21: hmatrix_block::Block<f64>,
    a22: hmatrix_block::Block<f64>,
}

impl TwoByTwoBlocks {
    fn new(half: usize) -> Self {
        let mut a11 = hmatrix_block::Block::new(half, half);
        a11.set_gem();
        let mut a22 = hmatrix_block::Block::new(half, half);
        a22.set_gem();
        for k in 0..half {
            // Diagonally dominant dense leaves.
            a11.dense_mut().unwrap()[k + k * half] = 4.0 + k as f64 / half as f64;
            a22.dense_mut().unwrap()[k + k * half] = 5.0 - k as f64 / half as f64;
            if k + 1 < half {
                a11.dense_mut().unwrap()[k + 1 + k * half] = -1.0;
                a11.dense_mut().unwrap()[k + (k + 1) * half] = -1.0;
            }
        }

        // Rank-1 coupling blocks.
        let mut a12 = hmatrix_block::Block::new(half, half);
        a12.set_lrm(1);
        {
            let (u, v) = a12.lr_factors_mut().unwrap();
            for k in 0..half {
                u[k] = 0.3 / (1.0 + k as f64);
                v[k] = 0.2;
            }
        }
        let a21 = a12.clone();

        Self {
            half,
            a11,
            a12,
            a21,
            a22,
        }
    }

    fn leaf_amux(b: &hmatrix_block::Block<f64>, alpha: f64, x: &[f64], y: &mut [f64]) {
        let n1 = b.n1();
        if let Some((rank, u, v)) = b.lr_factors() {
            // y += alpha * U (V^H x)
            for l in 0..rank {
                let w: f64 = (0..b.n2()).map(|j| v[j + l * b.n2()] * x[j]).sum();
                for i in 0..n1 {
                    y[i] += alpha * w * u[i + l * n1];
                }
            }
        } else {
            let d = b.dense().unwrap();
            for j in 0..b.n2() {
                for i in 0..n1 {
                    y[i] += alpha * d[i + j * n1] * x[j];
                }
            }
        }
    }
}

impl LinearOperator<f64> for TwoByTwoBlocks {
    fn dim(&self) -> usize {
        2 * self.half
    }

    fn amux(&self, alpha: f64, x: &[f64], y: &mut [f64]) {
        let h = self.half;
        Self::leaf_amux(&self.a11, alpha, &x[..h], &mut y[..h]);
        Self::leaf_amux(&self.a12, alpha, &x[h..], &mut y[..h]);
        Self::leaf_amux(&self.a21, alpha, &x[..h], &mut y[h..]);
        Self::leaf_amux(&self.a22, alpha, &x[h..], &mut y[h..]);
    }
}

#[test]
fn block_leaf_operator_solves() {
    let half = 16;
    let a = TwoByTwoBlocks::new(half);
    let n = a.dim();
    let b: Vec<f64> = (0..n).map(|k| 1.0 + 0.01 * k as f64).collect();
    let mut x = vec![0.0; n];

    let stats = fgmres(&a, &b, &mut x, 1e-10, 12, 200);
    assert!(stats.converged, "residual {}", stats.residual);

    let mut r = b.clone();
    a.amux(-1.0, &x, &mut r);
    assert!(nrm2(&r) / nrm2(&b) <= 1e-10);
}

#[test]
fn exhausted_budget_reports_failure() {
    let n = 100;
    let a = Tridiag { n };
    let b = vec![1.0; n];
    let mut x = vec![0.0; n];

    let stats = fgmres(&a, &b, &mut x, 1e-12, 5, 8);
    assert!(!stats.converged);
    assert_eq!(stats.steps, 8);
    assert!(stats.residual > 0.0);
}
