//! Derivative-free minimisation.
//!
//! [`NelderMead`] is used to minimise the conditional sum of squares of an
//! ARIMA model. Objective values that are not finite are treated as `+inf`
//! so the simplex moves away from them.

/// Result of a minimisation.
#[derive(Clone, Debug, PartialEq)]
pub struct Minimum {
    /// Best point found.
    pub point: Vec<f64>,
    /// Objective value at `point`.
    pub value: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// True if the simplex collapsed below the tolerance before the iteration cap.
    pub converged: bool,
}

/// Nelder-Mead downhill simplex with standard coefficients.
#[derive(Clone, Copy, Debug)]
pub struct NelderMead {
    max_iterations: usize,
    tolerance: f64,
    initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-10,
            initial_step: 0.1,
        }
    }
}

impl NelderMead {
    /// Creates a minimiser with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the relative tolerance on the spread of objective values.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Minimises `objective` starting from `start`.
    pub fn minimize<F>(&self, mut objective: F, start: &[f64]) -> Minimum
    where
        F: FnMut(&[f64]) -> f64,
    {
        let dim = start.len();
        let mut eval = |x: &[f64]| {
            let v = objective(x);
            if v.is_finite() { v } else { f64::INFINITY }
        };

        if dim == 0 {
            let value = eval(start);
            return Minimum {
                point: Vec::new(),
                value,
                iterations: 0,
                converged: true,
            };
        }

        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
        simplex.push(start.to_vec());
        for i in 0..dim {
            let mut vertex = start.to_vec();
            let step = (0.1 * start[i].abs()).max(self.initial_step);
            vertex[i] += step;
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;

            // Order vertices by objective value
            let mut order: Vec<usize> = (0..=dim).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let best = values[0];
            let worst = values[dim];
            if best.is_finite()
                && worst.is_finite()
                && (worst - best).abs() <= self.tolerance * (1.0 + best.abs())
            {
                converged = true;
                break;
            }

            let centroid: Vec<f64> = (0..dim)
                .map(|j| simplex[..dim].iter().map(|v| v[j]).sum::<f64>() / dim as f64)
                .collect();
            let towards = |coef: f64, from: &[f64]| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(from)
                    .map(|(c, x)| c + coef * (x - c))
                    .collect()
            };

            let reflected = towards(-1.0, &simplex[dim]);
            let reflected_value = eval(&reflected);

            if reflected_value < values[0] {
                let expanded = towards(-2.0, &simplex[dim]);
                let expanded_value = eval(&expanded);
                if expanded_value < reflected_value {
                    simplex[dim] = expanded;
                    values[dim] = expanded_value;
                } else {
                    simplex[dim] = reflected;
                    values[dim] = reflected_value;
                }
                continue;
            }

            if reflected_value < values[dim - 1] {
                simplex[dim] = reflected;
                values[dim] = reflected_value;
                continue;
            }

            let (contracted, contracted_value) = if reflected_value < values[dim] {
                let outside = towards(-0.5, &simplex[dim]);
                let v = eval(&outside);
                (outside, v)
            } else {
                let inside = towards(0.5, &simplex[dim]);
                let v = eval(&inside);
                (inside, v)
            };

            if contracted_value < values[dim].min(reflected_value) {
                simplex[dim] = contracted;
                values[dim] = contracted_value;
                continue;
            }

            // Shrink towards the best vertex
            let best_vertex = simplex[0].clone();
            for i in 1..=dim {
                simplex[i] = best_vertex
                    .iter()
                    .zip(&simplex[i])
                    .map(|(b, x)| b + 0.5 * (x - b))
                    .collect();
                values[i] = eval(&simplex[i]);
            }
        }

        let best = (0..=dim)
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap_or(0);
        Minimum {
            point: simplex[best].clone(),
            value: values[best],
            iterations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimizes_quadratic() {
        let result = NelderMead::new().minimize(
            |x| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
        );
        assert!(result.converged);
        assert!((result.point[0] - 3.0).abs() < 1e-3);
        assert!((result.point[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_minimizes_rosenbrock() {
        let result = NelderMead::new()
            .with_max_iterations(5000)
            .minimize(
                |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
                &[-1.2, 1.0],
            );
        assert!((result.point[0] - 1.0).abs() < 1e-2);
        assert!((result.point[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_non_finite_regions_are_avoided() {
        let result = NelderMead::new().minimize(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 0.5).powi(2) },
            &[0.2],
        );
        assert!(result.value.is_finite());
        assert!((result.point[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_zero_dimensional() {
        let result = NelderMead::new().minimize(|_| 4.0, &[]);
        assert_eq!(result.value, 4.0);
        assert!(result.point.is_empty());
    }
}
