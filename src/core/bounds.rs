use crate::types::BoundingBox;

/// Intersection test over several raster extents
pub struct BoundsFilter;

impl BoundsFilter {
    /// True iff (x, y) is inside every box, edges included.
    /// An empty list accepts everything.
    pub fn accepts(x: f64, y: f64, bounds: &[BoundingBox]) -> bool {
        bounds.iter().all(|b| b.contains(x, y))
    }
}
