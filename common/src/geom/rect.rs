use super::coord::TileCoord;

/// Axis-aligned tile rectangle with inclusive bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileRect {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl TileRect {
    pub fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }
    pub fn height(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    pub fn contains(&self, p: TileCoord) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Interior test: points on the border are outside.
    pub fn contains_strict(&self, p: TileCoord) -> bool {
        p.x > self.min_x && p.x < self.max_x && p.y > self.min_y && p.y < self.max_y
    }

    pub fn expand(&mut self, dx: i32, dy: i32) {
        self.min_x -= dx;
        self.max_x += dx;
        self.min_y -= dy;
        self.max_y += dy;
    }

    pub fn clamp_min(&mut self, floor: i32) {
        self.min_x = self.min_x.max(floor);
        self.min_y = self.min_y.max(floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_containment_excludes_border() {
        let r = TileRect::new(-1, 4, 0, 3);
        assert!(r.contains_strict(TileCoord::new(0, 1)));
        assert!(!r.contains_strict(TileCoord::new(4, 1)));
        assert!(r.contains(TileCoord::new(4, 1)));
        assert_eq!(r.width(), 6);
        assert_eq!(r.height(), 4);
    }

    #[test]
    fn expand_then_clamp() {
        let mut r = TileRect::new(1, 2, 1, 2);
        r.expand(3, 1);
        r.clamp_min(-1);
        assert_eq!(r, TileRect::new(-1, 5, 0, 3));
    }
}
