//! Centered moving average
//!
//! Near the edges the window is truncated to the samples that exist; there
//! is no wrapping and no zero padding.

use crate::error::{AccordError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smoother {
    width: usize,
}

impl Default for Smoother {
    fn default() -> Self {
        Self { width: 5 }
    }
}

impl Smoother {
    /// `width` must be odd and at least 1
    pub fn new(width: usize) -> Result<Self> {
        if width == 0 || width % 2 == 0 {
            return Err(AccordError::invalid_config(format!(
                "smoothing width must be an odd integer >= 1, got {}",
                width
            )));
        }
        Ok(Self { width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn smooth(&self, values: &[f64]) -> Vec<f64> {
        let half = self.width / 2;
        if half == 0 {
            return values.to_vec();
        }

        // Each window summed on its own: equal windows give bit-equal means
        (0..values.len())
            .map(|t| {
                let lo = t.saturating_sub(half);
                let hi = (t + half + 1).min(values.len());
                values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_edges() {
        let smoothed = Smoother::new(3).unwrap().smooth(&[3.0, 6.0, 0.0, 3.0]);
        assert_eq!(smoothed, vec![4.5, 3.0, 3.0, 1.5]);
    }

    #[test]
    fn test_width_five() {
        let values = [0.0, 0.0, 10.0, 0.0, 0.0, 0.0];
        let smoothed = Smoother::default().smooth(&values);
        // t=0 averages [0,0,10]; t=3 averages [0,10,0,0,0]; t=5 averages [0,0,0]
        assert!((smoothed[0] - 10.0 / 3.0).abs() < 1e-12);
        assert!((smoothed[3] - 2.0).abs() < 1e-12);
        assert_eq!(smoothed[5], 0.0);
    }

    #[test]
    fn test_width_one_is_identity() {
        let values = vec![0.1, 0.9, 0.3];
        assert_eq!(Smoother::new(1).unwrap().smooth(&values), values);
    }

    #[test]
    fn test_rejects_even_width() {
        assert!(Smoother::new(4).is_err());
        assert!(Smoother::new(0).is_err());
    }

    #[test]
    fn test_plateau_is_bit_identical() {
        let mut values = vec![1.0, 0.9, 0.8];
        values.extend(std::iter::repeat_n(0.1, 197));
        let smoothed = Smoother::default().smooth(&values);

        let plateau = &smoothed[5..values.len() - 2];
        assert!(
            plateau.iter().all(|v| v.to_bits() == plateau[0].to_bits()),
            "Equal windows must give equal means"
        );

        // The trailing edge window is three copies of the plateau value
        let tail = *smoothed.last().unwrap();
        assert_eq!(tail.to_bits(), ((0.1 + 0.1 + 0.1) / 3.0f64).to_bits());
    }

    #[test]
    fn test_width_larger_than_series() {
        let smoothed = Smoother::new(9).unwrap().smooth(&[1.0, 2.0, 3.0]);
        assert_eq!(smoothed, vec![2.0, 2.0, 2.0]);
    }
}
