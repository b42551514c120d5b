use std::time::Duration;

/// Horizontal extent of a progress bar, in the caller's pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBar {
    pub left: f64,
    pub width: f64,
}

impl ProgressBar {
    pub fn new(left: f64, width: f64) -> Self {
        Self { left, width }
    }

    /// Fraction of the bar under pointer position `x`, clamped to `[0, 1]`.
    /// A bar without width has no fraction.
    pub fn fraction_at(&self, x: f64) -> Option<f64> {
        if !(self.width > 0.0) || !x.is_finite() || !self.left.is_finite() {
            return None;
        }
        let offset = (x - self.left).clamp(0.0, self.width);
        Some(offset / self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekInput {
    Click { bar: ProgressBar, x: f64 },
    Press { bar: ProgressBar, x: f64 },
    Move { bar: ProgressBar, x: f64 },
    Release,
}

pub fn seek_target(bar: ProgressBar, x: f64, duration: Option<Duration>) -> Option<Duration> {
    let duration = duration.filter(|d| !d.is_zero())?;
    let fraction = bar.fraction_at(x)?;
    Some(duration.mul_f64(fraction).min(duration))
}
