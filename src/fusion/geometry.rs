//! Planar polygon helpers

use crate::types::Point;

/// Areas at or below this are treated as degenerate.
const MIN_AREA: f64 = 1e-9;

/// Absolute polygon area via the shoelace formula. Closed or open input.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice += a.x * b.y - b.x * a.y;
    }
    (twice * 0.5).abs()
}

/// Fewer than three points, non-finite coordinates, or zero area.
pub fn is_degenerate(points: &[Point]) -> bool {
    points.len() < 3
        || points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite())
        || polygon_area(points) <= MIN_AREA
}

/// A polygon pre-processed for repeated containment queries.
///
/// Holds its bounding extents so most misses are rejected without touching
/// the edge list.
#[derive(Debug, Clone)]
pub struct PreparedPolygon {
    edges: Vec<(Point, Point)>,
    min: Point,
    max: Point,
    area: f64,
}

impl PreparedPolygon {
    /// Returns `None` for degenerate outlines.
    pub fn new(points: &[Point]) -> Option<Self> {
        if is_degenerate(points) {
            return None;
        }

        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }

        let edges = points
            .iter()
            .enumerate()
            .map(|(i, &a)| (a, points[(i + 1) % points.len()]))
            .filter(|(a, b)| a != b)
            .collect();

        Some(Self {
            edges,
            min,
            max,
            area: polygon_area(points),
        })
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// Point-in-polygon test that counts the boundary as inside.
    pub fn covers(&self, p: Point) -> bool {
        if p.x < self.min.x || p.x > self.max.x || p.y < self.min.y || p.y > self.max.y {
            return false;
        }

        let mut inside = false;
        for &(a, b) in &self.edges {
            if on_segment(a, b, p) {
                return true;
            }
            // Even-odd ray cast towards +x.
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let scale = (b.x - a.x).abs().max((b.y - a.y).abs()).max(1.0);
    if cross.abs() > 1e-9 * scale {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ]
    }

    #[test]
    fn test_shoelace_area() {
        assert_eq!(polygon_area(&square(0.0, 0.0, 10.0)), 100.0);
        let tri = [Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 3.0)];
        assert_eq!(polygon_area(&tri), 6.0);
    }

    #[test]
    fn test_area_independent_of_winding() {
        let mut sq = square(1.0, 1.0, 2.0);
        sq.reverse();
        assert_eq!(polygon_area(&sq), 4.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(is_degenerate(&[]));
        assert!(is_degenerate(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]));
        let collinear = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        assert!(is_degenerate(&collinear));
        assert!(PreparedPolygon::new(&collinear).is_none());
    }

    #[test]
    fn test_covers_interior_boundary_and_outside() {
        let poly = PreparedPolygon::new(&square(0.0, 0.0, 10.0)).unwrap();
        assert!(poly.covers(Point::new(5.0, 5.0)));
        assert!(poly.covers(Point::new(0.0, 5.0)));
        assert!(poly.covers(Point::new(10.0, 10.0)));
        assert!(!poly.covers(Point::new(10.5, 5.0)));
        assert!(!poly.covers(Point::new(-0.1, -0.1)));
    }

    #[test]
    fn test_covers_concave_notch() {
        // U shape: the notch between the arms is outside.
        let u = [
            Point::new(0.0, 0.0),
            Point::new(9.0, 0.0),
            Point::new(9.0, 9.0),
            Point::new(6.0, 9.0),
            Point::new(6.0, 3.0),
            Point::new(3.0, 3.0),
            Point::new(3.0, 9.0),
            Point::new(0.0, 9.0),
        ];
        let poly = PreparedPolygon::new(&u).unwrap();
        assert!(poly.covers(Point::new(1.5, 6.0)));
        assert!(poly.covers(Point::new(7.5, 6.0)));
        assert!(!poly.covers(Point::new(4.5, 6.0)));
    }
}
