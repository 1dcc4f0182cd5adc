//! Coordinate reprojection between reference systems.
//!
//! A [`TransformRegistry`] is built once per process and shared read-only. It holds
//! [`TransformFactory`] entries that construct fresh [`CoordinateTransform`] instances; every
//! export owns a [`Reprojector`] that asks the registry for the transforms it needs and caches
//! them for the lifetime of that export only.
//!
//! The built-in projections run on [`geodesy`] operations.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use geo::{Coord, Geometry, MapCoordsInPlace};
use geodesy::prelude::*;
use geodesy::Coor4D;
use geodesy::Direction;
use tracing::warn;

use crate::crs::{utm_zone, Crs, UtmZone};
use crate::error::{ExportError, Result};

/// Transforms single coordinates from one reference system into another.
///
/// Instances belong to a single export, so they only need to be `Send`.
pub trait CoordinateTransform: Send + Debug {
    fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>>;
}

/// Constructs transforms for the pairs of reference systems it knows about.
pub trait TransformFactory: Send + Sync + Debug {
    /// `None` when this factory has no transform from `from` to `to`.
    fn create(&self, from: &Crs, to: &Crs) -> Option<Box<dyn CoordinateTransform>>;
}

/// The set of transform factories available to exports.
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    factories: Vec<Arc<dyn TransformFactory>>,
}

impl TransformRegistry {
    /// A registry without any factory. Only identical reference systems can be "transformed".
    pub fn empty() -> Self {
        Self { factories: vec![] }
    }

    pub fn register(&mut self, factory: Arc<dyn TransformFactory>) {
        self.factories.push(factory);
    }

    /// Find a transform from `from` to `to`.
    ///
    /// Tries every factory for a direct transform first, then a path through WGS 84 geographic
    /// coordinates.
    pub fn create(&self, from: &Crs, to: &Crs) -> Option<Box<dyn CoordinateTransform>> {
        if let Some(transform) = self.create_direct(from, to) {
            return Some(transform);
        }

        let pivot = Crs::wgs84();
        if from.is_wgs84_geographic() || to.is_wgs84_geographic() {
            return None;
        }
        let first = self.create_direct(from, &pivot)?;
        let second = self.create_direct(&pivot, to)?;
        Some(Box::new(Chained(first, second)))
    }

    fn create_direct(&self, from: &Crs, to: &Crs) -> Option<Box<dyn CoordinateTransform>> {
        self.factories
            .iter()
            .find_map(|factory| factory.create(from, to))
    }
}

impl Default for TransformRegistry {
    /// The built-in transforms: CRS84 and EPSG:4326, spherical Web Mercator and WGS 84 / UTM.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(BuiltinTransforms));
        registry
    }
}

#[derive(Debug)]
struct Chained(Box<dyn CoordinateTransform>, Box<dyn CoordinateTransform>);

impl CoordinateTransform for Chained {
    fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        self.1.transform(self.0.transform(coord)?)
    }
}

/// Reprojects the geometries of one export.
#[derive(Debug)]
pub struct Reprojector {
    registry: Arc<TransformRegistry>,
    target: Option<Crs>,
    transforms: HashMap<Crs, Option<Box<dyn CoordinateTransform>>>,
}

impl Reprojector {
    /// With no `target`, geometries pass through in their stored reference system.
    pub fn new(registry: Arc<TransformRegistry>, target: Option<Crs>) -> Self {
        Self {
            registry,
            target,
            transforms: HashMap::new(),
        }
    }

    pub fn target(&self) -> Option<&Crs> {
        self.target.as_ref()
    }

    /// Transform every vertex of `geometry` from `crs` into the target reference system.
    ///
    /// Returns the geometry unchanged, without touching a single coordinate, when no target was
    /// requested or it equals `crs`. Otherwise returns the transformed geometry labelled with the
    /// target.
    pub fn reproject(&mut self, mut geometry: Geometry<f64>, crs: Crs) -> Result<(Geometry<f64>, Crs)> {
        let target = match &self.target {
            Some(target) if *target != crs => target,
            _ => return Ok((geometry, crs)),
        };

        let registry = &self.registry;
        let transform = self
            .transforms
            .entry(crs.clone())
            .or_insert_with(|| registry.create(&crs, target));

        let Some(transform) = transform else {
            return Err(ExportError::ReprojectionUnsupported {
                from: crs,
                to: target.clone(),
            });
        };

        geometry.try_map_coords_in_place(|coord| transform.transform(coord))?;
        Ok((geometry, target.clone()))
    }
}

/// Reproject a single geometry with the built-in transforms.
pub fn reproject(geometry: Geometry<f64>, from: Crs, to: &Crs) -> Result<Geometry<f64>> {
    let mut reprojector = Reprojector::new(Arc::new(TransformRegistry::default()), Some(to.clone()));
    reprojector
        .reproject(geometry, from)
        .map(|(geometry, _)| geometry)
}

/// Latitude beyond which Web Mercator is undefined in practice.
const MERCATOR_MAX_LAT: f64 = 89.999_999;

#[derive(Debug)]
struct BuiltinTransforms;

impl TransformFactory for BuiltinTransforms {
    fn create(&self, from: &Crs, to: &Crs) -> Option<Box<dyn CoordinateTransform>> {
        if from.is_wgs84_geographic() && to.is_wgs84_geographic() {
            return Some(Box::new(Identity));
        }

        let (projected, forward) = match (from, to) {
            (from, Crs::Epsg(code)) if from.is_wgs84_geographic() => (*code, true),
            (Crs::Epsg(code), to) if to.is_wgs84_geographic() => (*code, false),
            _ => return None,
        };
        let domain = Domain::of(projected)?;
        let transform = GeodesyTransform::new(domain, forward)
            .map_err(|err| warn!(epsg = projected, "cannot build transform: {err}"))
            .ok()?;
        Some(Box::new(transform))
    }
}

fn check_finite(coord: Coord<f64>) -> Result<Coord<f64>> {
    if coord.x.is_finite() && coord.y.is_finite() {
        Ok(coord)
    } else {
        Err(ExportError::TransformFailed(format!(
            "non-finite coordinate ({}, {})",
            coord.x, coord.y
        )))
    }
}

/// CRS84 and EPSG:4326 share datum and, in this crate, axis order.
#[derive(Debug)]
struct Identity;

impl CoordinateTransform for Identity {
    fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        Ok(coord)
    }
}

/// The projected reference systems with a built-in definition.
#[derive(Debug, Clone, Copy)]
enum Domain {
    /// Spherical ("pseudo") Mercator, EPSG:3857.
    WebMercator,
    /// WGS 84 / UTM, EPSG:326xx and EPSG:327xx.
    Utm(UtmZone),
}

impl Domain {
    fn of(code: u32) -> Option<Self> {
        match code {
            3857 => Some(Self::WebMercator),
            code => utm_zone(code).map(Self::Utm),
        }
    }

    fn definition(&self) -> String {
        match self {
            Self::WebMercator => "webmerc".to_string(),
            Self::Utm(zone) if zone.north => format!("utm zone={} ellps=WGS84", zone.number),
            Self::Utm(zone) => format!(
                "tmerc lon_0={} k_0=0.9996 x_0=500000 y_0=10000000 ellps=WGS84",
                zone.central_meridian()
            ),
        }
    }

    /// Reject geographic input the projection cannot represent.
    fn check(&self, coord: Coord<f64>) -> Result<()> {
        let inside = match self {
            Self::WebMercator => coord.y.abs() <= MERCATOR_MAX_LAT,
            Self::Utm(zone) => {
                coord.y.abs() < 90.0 && (coord.x - zone.central_meridian()).abs() < 90.0
            }
        };
        if inside {
            Ok(())
        } else {
            Err(ExportError::TransformFailed(format!(
                "({}, {}) is outside the domain of {}",
                coord.x,
                coord.y,
                self.definition()
            )))
        }
    }
}

/// Wrapper for applying a coordinate operation to a single coordinate.
struct SingleCoord(Coor4D);

impl CoordinateSet for SingleCoord {
    fn len(&self) -> usize {
        1
    }

    fn dim(&self) -> usize {
        4
    }

    fn get_coord(&self, _index: usize) -> Coor4D {
        self.0
    }

    fn set_coord(&mut self, _index: usize, value: &Coor4D) {
        self.0 = *value;
    }
}

/// A `geodesy` operation between WGS 84 geographic degrees and a projected system.
///
/// Every transform owns its own context, and transforms are cached per export, so no context
/// is shared between exports.
struct GeodesyTransform {
    domain: Domain,
    context: Minimal,
    operation: OpHandle,
    forward: bool,
}

impl GeodesyTransform {
    fn new(domain: Domain, forward: bool) -> std::result::Result<Self, geodesy::Error> {
        let mut context = Minimal::new();
        let operation = context.op(&domain.definition())?;
        Ok(Self {
            domain,
            context,
            operation,
            forward,
        })
    }
}

impl Debug for GeodesyTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeodesyTransform")
            .field("definition", &self.domain.definition())
            .field("forward", &self.forward)
            .finish()
    }
}

impl CoordinateTransform for GeodesyTransform {
    fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let coord = check_finite(coord)?;

        // geodesy works in radians on the geographic side.
        let (mut operand, direction) = if self.forward {
            self.domain.check(coord)?;
            let input = Coor4D([coord.x.to_radians(), coord.y.to_radians(), 0., 0.]);
            (SingleCoord(input), Direction::Fwd)
        } else {
            (SingleCoord(Coor4D([coord.x, coord.y, 0., 0.])), Direction::Inv)
        };

        self.context
            .apply(self.operation, direction, &mut operand)
            .map_err(|err| ExportError::TransformFailed(err.to_string()))?;

        let out = operand.0;
        let out = if self.forward {
            Coord {
                x: out[0],
                y: out[1],
            }
        } else {
            Coord {
                x: out[0].to_degrees(),
                y: out[1].to_degrees(),
            }
        };
        check_finite(out)
    }
}
