use serde::{Deserialize, Serialize};

/// A rectangle representing a window's position and size in screen
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Position used to park windows that refuse to hide.
    ///
    /// Windows itself uses (-32000, -32000) for minimized windows, so
    /// the host application treats it as "not on any monitor".
    pub const OFFSCREEN: (i32, i32) = (-32000, -32000);

    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rectangle from Win32-style edges.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Returns the same size moved to `(x, y)`.
    pub fn moved_to(&self, x: i32, y: i32) -> Self {
        Self::new(x, y, self.width, self.height)
    }

    /// Whether both dimensions are at least one pixel.
    pub fn is_empty(&self) -> bool {
        self.width < 1 || self.height < 1
    }
}
