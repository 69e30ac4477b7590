use num_traits::Num;
use serde::{Deserialize, Serialize};

/// Width and height of an image or a grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size<N = u32> {
    width: N,
    height: N,
}

impl<N: Num + PartialOrd + Copy> Size<N> {
    /// Creates a new size.
    pub fn new(width: N, height: N) -> Self {
        Self { width, height }
    }

    /// Width.
    pub fn width(&self) -> N {
        self.width
    }

    /// Height.
    pub fn height(&self) -> N {
        self.height
    }

    /// Returns true if either of the dimensions is zero.
    pub fn is_zero(&self) -> bool {
        self.width.is_zero() || self.height.is_zero()
    }
}

impl Size<u32> {
    /// Number of cells in a grid of this size.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Scales the size down so that neither side exceeds `max_side`, keeping the aspect ratio. Sizes that already
    /// fit are returned unchanged. Neither side of the result is less than 1.
    pub fn fit_within(&self, max_side: u32) -> Self {
        let longest = self.width.max(self.height);
        if longest <= max_side || longest == 0 {
            return *self;
        }

        let scale = max_side as f64 / longest as f64;
        Self {
            width: ((self.width as f64 * scale).round() as u32).clamp(1, max_side),
            height: ((self.height as f64 * scale).round() as u32).clamp(1, max_side),
        }
    }
}
