//! Special functions backing the Gamma fit.

/// Euler-Mascheroni constant.
pub const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Truncation threshold for the digamma series.
const DIGAMMA_EPS: f64 = 1e-14;

/// Truncation threshold for the incomplete-gamma series.
const INCOMPLETE_GAMMA_EPS: f64 = 1e-9;

/// Step for numerical differentiation.
const DERIVATIVE_STEP: f64 = 1e-9;

/// Central-difference derivative of `f` at `x`.
///
/// Returns `f64::MAX` when the difference vanishes, mirroring a pole.
pub fn derivative(x: f64, f: impl Fn(f64) -> f64) -> f64 {
    let delta = f(x + DERIVATIVE_STEP) - f(x - DERIVATIVE_STEP);
    if delta == 0.0 {
        f64::MAX
    } else {
        delta / (2.0 * DERIVATIVE_STEP)
    }
}

/// Gamma function.
pub fn gamma(x: f64) -> f64 {
    libm::tgamma(x)
}

/// Natural logarithm of the gamma function.
pub fn ln_gamma(x: f64) -> f64 {
    libm::lgamma(x)
}

/// Digamma via the Euler product series.
///
/// At the poles (0, -1, -2, ...) the series is undefined and the value
/// falls back to numerical differentiation of `ln_gamma`.
pub fn digamma(x: f64) -> f64 {
    let mut result = -EULER_MASCHERONI;
    let mut i = 0u32;
    loop {
        let n_plus_z = x + f64::from(i);
        if n_plus_z == 0.0 {
            return derivative(x, ln_gamma);
        }
        let delta = (x - 1.0) / (f64::from(i + 1) * n_plus_z);
        result += delta;
        if delta.abs() <= DIGAMMA_EPS {
            break;
        }
        i += 1;
    }
    result
}

/// First derivative of digamma, by central differences.
pub fn trigamma(x: f64) -> f64 {
    derivative(x, digamma)
}

/// Lower incomplete gamma via the series expansion
/// `x^s * Γ(s) * e^{-x} * Σ_{i>=0} x^i / Γ(s+i+1)`,
/// truncated once a term drops to 1e-9.
pub fn lower_incomplete_gamma(s: f64, x: f64) -> f64 {
    let gamma_s = gamma(s);
    if !gamma_s.is_finite() {
        return gamma_s;
    }
    let product = x.powf(s) * gamma_s * (-x).exp();

    // term_i = x^i / Γ(s+i+1), advanced by the recurrence
    // term_{i+1} = term_i * x / (s+i+1).
    let mut term = 1.0 / gamma(s + 1.0);
    let mut sum = 0.0;
    let mut i = 0u32;
    loop {
        if !term.is_finite() {
            break;
        }
        sum += term;
        if term <= INCOMPLETE_GAMMA_EPS {
            break;
        }
        term *= x / (s + f64::from(i) + 1.0);
        i += 1;
    }
    product * sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_digamma_known_values() {
        // psi(1) = -EulerMascheroni
        assert!(close(digamma(1.0), -EULER_MASCHERONI, 1e-6));
        // psi(2) = 1 - EulerMascheroni
        assert!(close(digamma(2.0), 1.0 - EULER_MASCHERONI, 1e-6));
        // psi(0.5) = -EulerMascheroni - 2 ln 2
        assert!(close(
            digamma(0.5),
            -EULER_MASCHERONI - 2.0 * std::f64::consts::LN_2,
            1e-6
        ));
    }

    #[test]
    fn test_trigamma_known_value() {
        // psi'(1) = pi^2 / 6
        let expected = std::f64::consts::PI.powi(2) / 6.0;
        assert!(close(trigamma(1.0), expected, 1e-3));
    }

    #[test]
    fn test_lower_incomplete_gamma_exponential() {
        // s = 1: gamma(1, x) = 1 - e^{-x}
        for &x in &[0.5, 1.0, 2.0, 5.0] {
            let expected = 1.0 - (-x as f64).exp();
            assert!(close(lower_incomplete_gamma(1.0, x), expected, 1e-6));
        }
    }

    #[test]
    fn test_lower_incomplete_gamma_zero() {
        assert!(close(lower_incomplete_gamma(2.5, 0.0), 0.0, 1e-12));
    }

    #[test]
    fn test_lower_incomplete_gamma_monotone() {
        let mut prev = 0.0;
        for k in 1..40 {
            let value = lower_incomplete_gamma(2.0, 0.5 * f64::from(k));
            assert!(value >= prev);
            prev = value;
        }
        // Approaches Γ(2) = 1 from below.
        assert!(prev <= gamma(2.0) + 1e-9);
        assert!(close(prev, gamma(2.0), 1e-3));
    }
}
