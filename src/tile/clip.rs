//! Geometry clipping against the tile's buffered bounding box.
//!
//! Points are filtered, polylines are cut with Liang-Barsky, and polygon
//! rings are clipped with Sutherland-Hodgman against the four box edges.
//! All clipping happens in tile-local floating-point coordinates before
//! quantization.

use crate::geometry::Point;

/// Axis-aligned clip window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClipBox {
    pub min: f64,
    pub max: f64,
}

impl ClipBox {
    pub fn contains(&self, p: Point) -> bool {
        p[0] >= self.min && p[0] <= self.max && p[1] >= self.min && p[1] <= self.max
    }
}

/// Keeps only points inside the window.
pub(crate) fn clip_points(points: &[Point], window: ClipBox) -> Vec<Point> {
    points.iter().copied().filter(|p| window.contains(*p)).collect()
}

/// Clips a polyline, possibly splitting it into several parts where it
/// leaves and re-enters the window.
pub(crate) fn clip_line(line: &[Point], window: ClipBox) -> Vec<Vec<Point>> {
    let mut parts: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();

    for seg in line.windows(2) {
        let Some((a, b, a_clipped, b_clipped)) = clip_segment(seg[0], seg[1], window) else {
            // Segment fully outside: close any open part.
            if current.len() >= 2 {
                parts.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            continue;
        };

        if a_clipped || current.is_empty() {
            // Entering the window (or first segment): start a new part.
            if current.len() >= 2 {
                parts.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            current.push(a);
        }
        current.push(b);

        if b_clipped {
            // Leaving the window: the part ends here.
            if current.len() >= 2 {
                parts.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }

    if current.len() >= 2 {
        parts.push(current);
    }
    parts
}

/// Liang-Barsky clip of one segment. Returns the clipped endpoints and
/// whether each end was moved, or `None` when fully outside.
fn clip_segment(a: Point, b: Point, window: ClipBox) -> Option<(Point, Point, bool, bool)> {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;

    // (p, q) per window edge: segment parameter constrained by p*t <= q.
    let checks = [
        (-dx, a[0] - window.min),
        (dx, window.max - a[0]),
        (-dy, a[1] - window.min),
        (dy, window.max - a[1]),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return None;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }

    let start = [a[0] + t0 * dx, a[1] + t0 * dy];
    let end = [a[0] + t1 * dx, a[1] + t1 * dy];
    Some((start, end, t0 > 0.0, t1 < 1.0))
}

/// Sutherland-Hodgman clip of a ring. The returned ring may be empty when
/// the input lies entirely outside the window.
pub(crate) fn clip_ring(ring: &[Point], window: ClipBox) -> Vec<Point> {
    #[derive(Clone, Copy)]
    enum Edge {
        MinX,
        MaxX,
        MinY,
        MaxY,
    }

    fn inside(p: Point, edge: Edge, window: ClipBox) -> bool {
        match edge {
            Edge::MinX => p[0] >= window.min,
            Edge::MaxX => p[0] <= window.max,
            Edge::MinY => p[1] >= window.min,
            Edge::MaxY => p[1] <= window.max,
        }
    }

    fn intersect(a: Point, b: Point, edge: Edge, window: ClipBox) -> Point {
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        match edge {
            Edge::MinX => {
                let t = (window.min - a[0]) / dx;
                [window.min, a[1] + t * dy]
            }
            Edge::MaxX => {
                let t = (window.max - a[0]) / dx;
                [window.max, a[1] + t * dy]
            }
            Edge::MinY => {
                let t = (window.min - a[1]) / dy;
                [a[0] + t * dx, window.min]
            }
            Edge::MaxY => {
                let t = (window.max - a[1]) / dy;
                [a[0] + t * dx, window.max]
            }
        }
    }

    let mut output: Vec<Point> = ring.to_vec();
    for edge in [Edge::MinX, Edge::MaxX, Edge::MinY, Edge::MaxY] {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        for i in 0..input.len() {
            let current = input[i];
            let previous = input[(i + input.len() - 1) % input.len()];
            let current_in = inside(current, edge, window);
            let previous_in = inside(previous, edge, window);

            if current_in {
                if !previous_in {
                    output.push(intersect(previous, current, edge, window));
                }
                output.push(current);
            } else if previous_in {
                output.push(intersect(previous, current, edge, window));
            }
        }
    }
    output
}
