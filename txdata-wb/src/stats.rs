//! Numerical routines behind the analysis catalog
//!
//! Special functions (log-gamma, regularized incomplete beta and gamma)
//! give the tail probabilities of the t, F and chi-square distributions.
//! Everything else is plain descriptive statistics over `f64` slices.

use txdata_common::{Error, Result};

const EPS: f64 = 3.0e-14;
const FPMIN: f64 = 1.0e-300;
const MAX_ITER: usize = 300;

/// Lanczos approximation of ln(Gamma(x))
pub fn ln_gamma(x: f64) -> f64 {
    // Lanczos coefficients (g=7, n=9).
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    const G: f64 = 7.0;

    if x <= 0.0 {
        return f64::INFINITY;
    }

    if x < 0.5 {
        // Reflection formula.
        let sin_val = (std::f64::consts::PI * x).sin();
        if sin_val.abs() < 1e-300 {
            return f64::INFINITY;
        }
        return std::f64::consts::PI.ln() - sin_val.abs().ln() - ln_gamma(1.0 - x);
    }

    let z = x - 1.0;
    let mut sum = COEFFS[0];
    for (i, &c) in COEFFS[1..].iter().enumerate() {
        sum += c / (z + i as f64 + 1.0);
    }

    let t = z + G + 0.5;
    (z + 0.5).mul_add(t.ln(), 0.5 * (2.0 * std::f64::consts::PI).ln()) - t + sum.ln()
}

fn clamp_tiny(v: f64) -> f64 {
    if v.abs() < FPMIN {
        FPMIN
    } else {
        v
    }
}

/// Continued fraction for the incomplete beta function (modified Lentz)
fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / clamp_tiny(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / clamp_tiny(1.0 + aa * d);
        c = clamp_tiny(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / clamp_tiny(1.0 + aa * d);
        c = clamp_tiny(1.0 + aa / c);
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta I_x(a, b)
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_cf(a, b, x) / a
    } else {
        1.0 - front * beta_cf(b, a, 1.0 - x) / b
    }
}

/// Regularized lower incomplete gamma P(a, x)
pub fn incomplete_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    let ln_front = -x + a * x.ln() - ln_gamma(a);

    if x < a + 1.0 {
        // Series representation.
        let mut ap = a;
        let mut sum = 1.0 / a;
        let mut del = sum;
        for _ in 0..MAX_ITER {
            ap += 1.0;
            del *= x / ap;
            sum += del;
            if del.abs() < sum.abs() * EPS {
                break;
            }
        }
        sum * ln_front.exp()
    } else {
        // Continued fraction for Q(a, x).
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / FPMIN;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=MAX_ITER {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = 1.0 / clamp_tiny(an * d + b);
            c = clamp_tiny(b + an / c);
            let del = d * c;
            h *= del;
            if (del - 1.0).abs() < EPS {
                break;
            }
        }
        1.0 - ln_front.exp() * h
    }
}

/// Two-sided p-value of Student's t
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    incomplete_beta(df / 2.0, 0.5, df / (df + t * t)).clamp(0.0, 1.0)
}

/// Upper-tail p-value of the F distribution
pub fn f_upper_p(f: f64, df1: f64, df2: f64) -> f64 {
    if f.is_nan() || df1 <= 0.0 || df2 <= 0.0 {
        return f64::NAN;
    }
    if f <= 0.0 {
        return 1.0;
    }
    if f.is_infinite() {
        return 0.0;
    }
    incomplete_beta(df2 / 2.0, df1 / 2.0, df2 / (df2 + df1 * f)).clamp(0.0, 1.0)
}

/// Upper-tail p-value of the chi-square distribution
pub fn chi2_upper_p(x: f64, df: f64) -> f64 {
    if x.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    (1.0 - incomplete_gamma(df / 2.0, x / 2.0)).clamp(0.0, 1.0)
}

// -----------------------------------------------------------------------------
// Descriptives
// -----------------------------------------------------------------------------

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample variance (ddof = 1)
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Quantile with linear interpolation between order statistics
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Most frequent value; ties go to the smallest
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        let count = j - i;
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((sorted[i], count));
        }
        i = j;
    }
    best.map(|(v, _)| v)
}

/// Pearson correlation with its two-sided p-value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub r: f64,
    pub p: f64,
    pub n: usize,
}

/// Pearson r over paired values; `None` with fewer than 3 pairs or a constant series
pub fn pearson(x: &[f64], y: &[f64]) -> Option<Correlation> {
    let n = x.len().min(y.len());
    if n < 3 {
        return None;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = (n - 2) as f64;
    let p = if (1.0 - r.abs()) < 1e-15 {
        0.0
    } else {
        t_two_sided_p(r * (df / (1.0 - r * r)).sqrt(), df)
    };
    Some(Correlation { r, p, n })
}

/// Pairs where both sides are present
pub fn pairwise_complete(x: &[Option<f64>], y: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip()
}

/// Rows where every column is present, returned row-major
pub fn listwise_complete(columns: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
    let n = columns.iter().map(Vec::len).min().unwrap_or(0);
    (0..n)
        .filter_map(|i| columns.iter().map(|c| c[i]).collect::<Option<Vec<f64>>>())
        .collect()
}

/// `n` evenly spaced points from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Gaussian kernel density estimate at `points` (Scott's rule bandwidth)
///
/// `None` when the data has fewer than 2 values or no spread.
pub fn kde(values: &[f64], points: &[f64]) -> Option<Vec<f64>> {
    let sd = std_dev(values)?;
    if sd == 0.0 {
        return None;
    }
    let n = values.len() as f64;
    let h = sd * n.powf(-0.2);
    let norm = 1.0 / (n * h * (2.0 * std::f64::consts::PI).sqrt());
    Some(
        points
            .iter()
            .map(|x| {
                values
                    .iter()
                    .map(|v| (-0.5 * ((x - v) / h).powi(2)).exp())
                    .sum::<f64>()
                    * norm
            })
            .collect(),
    )
}

// -----------------------------------------------------------------------------
// Tests of differences
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub t: f64,
    pub p: f64,
    pub df: f64,
}

pub fn one_sample_ttest(values: &[f64], popmean: f64) -> Option<TTest> {
    let n = values.len();
    let sd = std_dev(values)?;
    let m = mean(values)?;
    let se = sd / (n as f64).sqrt();
    let df = (n - 1) as f64;
    let t = (m - popmean) / se;
    Some(TTest {
        t,
        p: t_two_sided_p(t, df),
        df,
    })
}

/// Independent two-sample t-test with pooled variance
pub fn independent_ttest(a: &[f64], b: &[f64]) -> Option<TTest> {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let va = variance(a)?;
    let vb = variance(b)?;
    let df = na + nb - 2.0;
    let pooled = ((na - 1.0) * va + (nb - 1.0) * vb) / df;
    let se = (pooled * (1.0 / na + 1.0 / nb)).sqrt();
    let t = (mean(a)? - mean(b)?) / se;
    Some(TTest {
        t,
        p: t_two_sided_p(t, df),
        df,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anova {
    pub f: f64,
    pub p: f64,
    pub df_between: f64,
    pub df_within: f64,
}

/// One-way ANOVA over groups; empty groups are ignored
pub fn one_way_anova(groups: &[Vec<f64>]) -> Option<Anova> {
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    let k = groups.len();
    let n: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n <= k {
        return None;
    }
    let all: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let grand = mean(&all)?;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for g in &groups {
        let m = mean(g)?;
        ss_between += g.len() as f64 * (m - grand).powi(2);
        ss_within += g.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    }

    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let f = (ss_between / df_between) / (ss_within / df_within);
    Some(Anova {
        f,
        p: f_upper_p(f, df_between, df_within),
        df_between,
        df_within,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChiSquare {
    pub chi2: f64,
    pub p: f64,
    pub dof: usize,
    pub expected: Vec<Vec<f64>>,
}

/// Chi-square test of independence on a contingency table
///
/// Yates' continuity correction is applied when there is one degree of
/// freedom.
pub fn chi2_contingency(observed: &[Vec<f64>]) -> Option<ChiSquare> {
    let rows = observed.len();
    let cols = observed.first()?.len();
    if rows < 2 || cols < 2 || observed.iter().any(|r| r.len() != cols) {
        return None;
    }
    let row_totals: Vec<f64> = observed.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<f64> = (0..cols).map(|j| observed.iter().map(|r| r[j]).sum()).collect();
    let total: f64 = row_totals.iter().sum();
    if total == 0.0 || row_totals.contains(&0.0) || col_totals.contains(&0.0) {
        return None;
    }

    let expected: Vec<Vec<f64>> = row_totals
        .iter()
        .map(|rt| col_totals.iter().map(|ct| rt * ct / total).collect())
        .collect();
    let dof = (rows - 1) * (cols - 1);

    let mut chi2 = 0.0;
    for (obs_row, exp_row) in observed.iter().zip(&expected) {
        for (o, e) in obs_row.iter().zip(exp_row) {
            let mut diff = (o - e).abs();
            if dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            chi2 += diff * diff / e;
        }
    }

    Some(ChiSquare {
        chi2,
        p: chi2_upper_p(chi2, dof as f64),
        dof,
        expected,
    })
}

/// Cronbach's alpha over complete rows (row-major, one value per item)
pub fn cronbach_alpha(rows: &[Vec<f64>]) -> Option<f64> {
    let k = rows.first()?.len();
    if k < 2 || rows.len() < 2 {
        return None;
    }
    let item_var_sum: f64 = (0..k)
        .map(|j| {
            let item: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            variance(&item)
        })
        .sum::<Option<f64>>()?;
    let totals: Vec<f64> = rows.iter().map(|r| r.iter().sum()).collect();
    let total_var = variance(&totals)?;
    if total_var == 0.0 {
        return None;
    }
    let k = k as f64;
    Some(k / (k - 1.0) * (1.0 - item_var_sum / total_var))
}

// -----------------------------------------------------------------------------
// Linear regression
// -----------------------------------------------------------------------------

/// Ordinary least squares fit with an intercept
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Intercept first, then one coefficient per predictor
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub n: usize,
}

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting
pub fn invert(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .ok_or_else(|| Error::InvalidInput("Empty matrix".to_string()))?;
        if a[pivot][col].abs() < 1e-12 {
            return Err(Error::InvalidInput(
                "Matrix is singular; predictors may be collinear".to_string(),
            ));
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..n {
            a[col][j] /= p;
            inv[col][j] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }
    Ok(inv)
}

/// Fit `y = b0 + b1*x1 + ... + bk*xk`; `predictors` is row-major
pub fn ols(predictors: &[Vec<f64>], y: &[f64]) -> Result<OlsFit> {
    let n = y.len();
    let k = predictors.first().map(Vec::len).unwrap_or(0);
    if predictors.len() != n {
        return Err(Error::InvalidInput("Predictor and outcome lengths differ".to_string()));
    }
    if k == 0 {
        return Err(Error::InvalidInput("At least one predictor is required".to_string()));
    }
    if n <= k + 1 {
        return Err(Error::InvalidInput(format!(
            "Not enough observations ({}) for {} predictor(s)",
            n, k
        )));
    }

    let p = k + 1;
    let design: Vec<Vec<f64>> = predictors
        .iter()
        .map(|row| std::iter::once(1.0).chain(row.iter().copied()).collect())
        .collect();

    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for (row, yi) in design.iter().zip(y) {
        for i in 0..p {
            xty[i] += row[i] * yi;
            for j in 0..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    let xtx_inv = invert(&xtx)?;
    let coefficients: Vec<f64> = (0..p)
        .map(|i| (0..p).map(|j| xtx_inv[i][j] * xty[j]).sum())
        .collect();

    let y_mean = mean(y).unwrap_or(0.0);
    let mut sse = 0.0;
    let mut sst = 0.0;
    for (row, yi) in design.iter().zip(y) {
        let fitted: f64 = row.iter().zip(&coefficients).map(|(x, b)| x * b).sum();
        sse += (yi - fitted).powi(2);
        sst += (yi - y_mean).powi(2);
    }

    let df_resid = (n - p) as f64;
    let sigma2 = sse / df_resid;
    let std_errors: Vec<f64> = (0..p).map(|i| (sigma2 * xtx_inv[i][i]).max(0.0).sqrt()).collect();
    let t_values: Vec<f64> = coefficients
        .iter()
        .zip(&std_errors)
        .map(|(b, se)| b / se)
        .collect();
    let p_values = t_values.iter().map(|t| t_two_sided_p(*t, df_resid)).collect();

    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid;
    let f_statistic = ((sst - sse) / k as f64) / sigma2;

    Ok(OlsFit {
        coefficients,
        std_errors,
        t_values,
        p_values,
        r_squared,
        adj_r_squared,
        f_statistic,
        f_p_value: f_upper_p(f_statistic, k as f64, df_resid),
        n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_ln_gamma_factorials() {
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-10));
        assert!(close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-10));
    }

    #[test]
    fn test_distribution_tails() {
        assert!(close(t_two_sided_p(2.0, 10.0), 0.073_388, 1e-4));
        assert!(close(chi2_upper_p(3.841_459, 1.0), 0.05, 1e-5));
        assert!(close(chi2_upper_p(10.0, 4.0), 0.040_428, 1e-5));
        assert!(close(f_upper_p(4.0, 2.0, 10.0), 0.052_922, 1e-4));
        assert_eq!(t_two_sided_p(0.0, 5.0), 1.0);
    }

    #[test]
    fn test_descriptives() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&v), Some(2.5));
        assert!(close(variance(&v).unwrap(), 1.666_666_7, 1e-6));
        assert_eq!(quantile(&v, 0.25), Some(1.75));
        assert_eq!(median(&v), Some(2.5));
        assert_eq!(mode(&[3.0, 1.0, 3.0, 1.0, 2.0]), Some(1.0));
        assert_eq!(variance(&[1.0]), None);
    }

    #[test]
    fn test_pearson() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 5.0, 4.0, 5.0];
        let c = pearson(&x, &y).unwrap();
        assert!(close(c.r, 0.774_597, 1e-5));
        assert!(close(c.p, 0.124_027, 1e-4));
        assert!(pearson(&x, &[1.0; 5]).is_none());
    }

    #[test]
    fn test_ttests_and_anova() {
        let a = [5.0, 6.0, 7.0, 8.0];
        let b = [1.0, 2.0, 3.0, 4.0];
        let t = independent_ttest(&a, &b).unwrap();
        assert!(close(t.t, 4.381_780, 1e-5));
        assert_eq!(t.df, 6.0);

        let anova = one_way_anova(&[a.to_vec(), b.to_vec()]).unwrap();
        // With two groups F equals t squared.
        assert!(close(anova.f, t.t * t.t, 1e-9));
        assert!(close(anova.p, t.p, 1e-6));

        let one = one_sample_ttest(&[2.0, 3.0, 4.0], 3.0).unwrap();
        assert_eq!(one.t, 0.0);
    }

    #[test]
    fn test_chi2_with_yates() {
        let table = vec![vec![10.0, 20.0], vec![20.0, 10.0]];
        let res = chi2_contingency(&table).unwrap();
        assert_eq!(res.dof, 1);
        assert!(close(res.chi2, 5.4, 1e-9));
        assert!(close(res.p, 0.020_136, 1e-4));
    }

    #[test]
    fn test_cronbach_alpha() {
        let rows = vec![
            vec![1.0, 2.0, 2.0],
            vec![2.0, 3.0, 3.0],
            vec![3.0, 3.0, 4.0],
            vec![4.0, 5.0, 4.0],
        ];
        let alpha = cronbach_alpha(&rows).unwrap();
        assert!(alpha > 0.9 && alpha < 1.0);
    }

    #[test]
    fn test_ols_recovers_line() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64 + if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        let fit = ols(&x, &y).unwrap();
        assert!(close(fit.coefficients[0], 3.0, 0.1));
        assert!(close(fit.coefficients[1], 2.0, 0.05));
        assert!(fit.r_squared > 0.99);
        assert!(fit.p_values[1] < 1e-6);

        assert!(ols(&x[..2], &y[..2]).is_err());
        let collinear: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        assert!(ols(&collinear, &y[..5]).is_err());
    }

    #[test]
    fn test_kde_integrates_to_one() {
        let values = [1.0, 2.0, 2.5, 3.0, 4.0];
        let grid = linspace(-5.0, 10.0, 1501);
        let density = kde(&values, &grid).unwrap();
        let area: f64 = density.iter().sum::<f64>() * 0.01;
        assert!(close(area, 1.0, 1e-3));
        assert!(kde(&[2.0, 2.0], &grid).is_none());
    }
}
