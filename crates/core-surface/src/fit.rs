//! Least-squares polynomial fitting by the power-sum normal equations.
//!
//! For degrees `(dx, dy)` there are `K = (dx+1)*(dy+1)` coefficients, indexed
//! flat as `t = i*(dy+1) + j`. The K-by-K system `A c = b` with
//!
//! ```text
//! A[(i1,j1),(i2,j2)] = sum over samples of x^(i1+i2) * y^(j1+j2)
//! b[(i,j)]           = sum over samples of x^i * y^j * z
//! ```
//!
//! is reduced to RREF on the augmented matrix. The elimination uses the first
//! non-zero entry at or below the pivot row with no magnitude tolerance, so
//! ill-conditioned systems can carry large numerical error; a column with no
//! available pivot is skipped and its coefficient stays zero. Degenerate
//! input (too few or collinear samples) therefore still produces a finite
//! matrix, just not a meaningful one.

use crate::model::Coeffs;
use tracing::debug;

/// Sum of `x^xp * y^yp` over all samples.
fn power_sum(points: &[[f64; 3]], xp: usize, yp: usize) -> f64 {
    points
        .iter()
        .map(|p| p[0].powi(xp as i32) * p[1].powi(yp as i32))
        .sum()
}

/// Sum of `x^xp * y^yp * z` over all samples.
fn power_sum_z(points: &[[f64; 3]], xp: usize, yp: usize) -> f64 {
    points
        .iter()
        .map(|p| p[0].powi(xp as i32) * p[1].powi(yp as i32) * p[2])
        .sum()
}

/// In-place reduction of `m` (any row/column count) to reduced row-echelon
/// form. For each pivot column the first row at or below the diagonal with a
/// non-zero entry is scaled to a leading one and used to clear the column in
/// every other row; rows are not reordered, and a column with no candidate
/// is left free.
fn rref(m: &mut [Vec<f64>]) {
    let rows = m.len();
    for rc in 0..rows {
        let Some(pivot) = (rc..rows).find(|&r| m[r][rc] != 0.0) else {
            continue;
        };
        let lead = m[pivot][rc];
        for v in &mut m[pivot] {
            *v /= lead;
        }
        for r in 0..rows {
            if r == pivot {
                continue;
            }
            let factor = m[r][rc];
            if factor == 0.0 {
                continue;
            }
            for c in 0..m[r].len() {
                let sub = m[pivot][c] * factor;
                m[r][c] -= sub;
            }
        }
    }
}

/// Solve `a * c = b` by Gauss-Jordan elimination on the augmented matrix.
///
/// The solution vector starts zeroed; each reduced row with a leading one in
/// column `t` contributes `c[t]`, and stray non-unit entries in a row zero
/// their column instead. Unclaimed (free) columns stay zero.
fn solve(a: Vec<Vec<f64>>, b: &[f64]) -> Vec<f64> {
    let k = b.len();
    let mut aug: Vec<Vec<f64>> = a
        .into_iter()
        .zip(b)
        .map(|(mut row, &rhs)| {
            row.push(rhs);
            row
        })
        .collect();

    rref(&mut aug);

    let mut sol = vec![0.0; k];
    for row in &aug {
        let mut lead = None;
        for c in 0..k {
            let v = row[c];
            if v == 1.0 && lead.is_none() {
                lead = Some(c);
                sol[c] = row[k];
            } else if v != 0.0 {
                sol[c] = 0.0;
            }
        }
    }
    sol
}

/// Fit a bivariate polynomial of degrees `(x_deg, y_deg)` to `points`.
///
/// Infallible: callers should supply at least `(x_deg+1)*(y_deg+1)`
/// well-spread samples, but any input yields a finite coefficient matrix.
pub fn fit(points: &[[f64; 3]], x_deg: usize, y_deg: usize) -> Coeffs {
    let y_combo = y_deg + 1;
    let combo = (x_deg + 1) * y_combo;
    debug!(
        target: "fit",
        samples = points.len(),
        x_deg,
        y_deg,
        unknowns = combo,
        "fit_start"
    );
    if points.len() < combo {
        debug!(
            target: "fit",
            samples = points.len(),
            unknowns = combo,
            "underdetermined_system"
        );
    }

    let mut a = Vec::with_capacity(combo);
    for row in 0..combo {
        let (x_row, y_row) = (row / y_combo, row % y_combo);
        let mut eqn = Vec::with_capacity(combo);
        for col in 0..combo {
            let (x_col, y_col) = (col / y_combo, col % y_combo);
            eqn.push(power_sum(points, x_row + x_col, y_row + y_col));
        }
        a.push(eqn);
    }

    let mut b = Vec::with_capacity(combo);
    for t in 0..combo {
        b.push(power_sum_z(points, t / y_combo, t % y_combo));
    }

    let sol = solve(a, &b);
    debug!(target: "fit", "fit_done");
    Coeffs::from_flat(x_deg + 1, y_combo, sol)
}
