use super::constants::MIN_LOOP_POINTS;
use super::types::Point;

pub fn distance(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// A trail closes a loop when it has enough points and ends exactly where it began.
pub fn loop_closed(trail: &[Point]) -> bool {
    if trail.len() < MIN_LOOP_POINTS {
        return false;
    }
    trail.first() == trail.last()
}

/// Integer bounds `(min_x, min_y, max_x, max_y)` covering every trail point.
pub fn bounding_box(trail: &[Point]) -> Option<(i64, i64, i64, i64)> {
    let first = trail.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for point in trail {
        min_x = min_x.min(point.x);
        max_x = max_x.max(point.x);
        min_y = min_y.min(point.y);
        max_y = max_y.max(point.y);
    }
    Some((
        min_x.floor() as i64,
        min_y.floor() as i64,
        max_x.ceil() as i64,
        max_y.ceil() as i64,
    ))
}

/// Ray casting against the polygon formed by `polygon`, closed last-to-first.
pub fn point_in_polygon(x: f64, y: f64, polygon: &[Point]) -> bool {
    let n = polygon.len();
    let mut crossings = 0usize;
    for i in 0..n {
        let p1 = polygon[i];
        let p2 = polygon[(i + 1) % n];
        if (p1.y > y) != (p2.y > y) {
            let intercept = (p2.x - p1.x) * (y - p1.y) / (p2.y - p1.y) + p1.x;
            if x < intercept {
                crossings += 1;
            }
        }
    }
    crossings % 2 == 1
}

/// Every integer point of the trail's bounding box that the ray-casting rule puts inside.
pub fn enclosed_points(trail: &[Point]) -> Vec<(i64, i64)> {
    if trail.len() < 3 {
        return Vec::new();
    }
    let Some((min_x, min_y, max_x, max_y)) = bounding_box(trail) else {
        return Vec::new();
    };
    let mut enclosed = Vec::new();
    for x in min_x..=max_x {
        for y in min_y..=max_y {
            if point_in_polygon(x as f64, y as f64, trail) {
                enclosed.push((x, y));
            }
        }
    }
    enclosed
}
