use geo::{CoordsIter, Geometry};

/// A running 2D extent, grown one geometry at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingRect {
    minx: f64,
    miny: f64,
    maxx: f64,
    maxy: f64,
}

impl BoundingRect {
    /// New
    pub fn new() -> Self {
        BoundingRect {
            minx: f64::INFINITY,
            miny: f64::INFINITY,
            maxx: -f64::INFINITY,
            maxy: -f64::INFINITY,
        }
    }

    pub fn from_geometry(geometry: &Geometry<f64>) -> Self {
        let mut rect = Self::new();
        rect.add_geometry(geometry);
        rect
    }

    pub fn minx(&self) -> f64 {
        self.minx
    }

    pub fn miny(&self) -> f64 {
        self.miny
    }

    pub fn maxx(&self) -> f64 {
        self.maxx
    }

    pub fn maxy(&self) -> f64 {
        self.maxy
    }

    /// Whether no coordinate has been added yet.
    pub fn is_empty(&self) -> bool {
        self.minx > self.maxx
    }

    pub fn add_coord(&mut self, x: f64, y: f64) {
        if x < self.minx {
            self.minx = x;
        }
        if y < self.miny {
            self.miny = y;
        }
        if x > self.maxx {
            self.maxx = x;
        }
        if y > self.maxy {
            self.maxy = y;
        }
    }

    pub fn add_geometry(&mut self, geometry: &Geometry<f64>) {
        for coord in geometry.coords_iter() {
            self.add_coord(coord.x, coord.y);
        }
    }

    pub fn update(&mut self, other: &BoundingRect) {
        if other.is_empty() {
            return;
        }
        self.add_coord(other.minx, other.miny);
        self.add_coord(other.maxx, other.maxy);
    }

    /// `[minx, miny, maxx, maxy]`, or all zeros when empty, as binary headers expect.
    pub fn to_array_or_zero(&self) -> [f64; 4] {
        if self.is_empty() {
            [0.0; 4]
        } else {
            [self.minx, self.miny, self.maxx, self.maxy]
        }
    }
}

impl Default for BoundingRect {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::{linestring, polygon};

    #[test]
    fn grows_over_geometries() {
        let mut rect = BoundingRect::new();
        assert!(rect.is_empty());
        assert_eq!(rect.to_array_or_zero(), [0.0; 4]);

        rect.add_geometry(&linestring::ls0().into());
        rect.update(&BoundingRect::from_geometry(&polygon::p0().into()));
        assert_eq!(rect.to_array_or_zero(), [-111.0, 1.0, 1.0, 45.0]);
    }
}
