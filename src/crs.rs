//! Coordinate reference system identifiers.
//!
//! Geometries in this crate are always stored with an explicit [`Crs`]. Axis order is always
//! (longitude, latitude) or (easting, northing), regardless of the axis order declared by the
//! authority for that code, matching GeoJSON and the GeoParquet specification.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ExportError;

const OGC_CRS_URI: &str = "http://www.opengis.net/def/crs/";

/// A coordinate reference system identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// `OGC:CRS84`, WGS 84 longitude/latitude. The default CRS of GeoJSON and GeoParquet.
    Crs84,
    /// An EPSG code.
    Epsg(u32),
    /// Any other `AUTHORITY:CODE` identifier. Kept verbatim so it can be labelled, but no
    /// built-in transform knows about it.
    Other(String),
}

impl Crs {
    /// EPSG:4326
    pub const fn wgs84() -> Self {
        Self::Epsg(4326)
    }

    /// EPSG:3857
    pub const fn web_mercator() -> Self {
        Self::Epsg(3857)
    }

    /// Construct from an EPSG code, folding the historical Web Mercator aliases into 3857.
    pub fn epsg(code: u32) -> Self {
        match code {
            900913 | 102100 | 102113 | 3785 => Self::Epsg(3857),
            code => Self::Epsg(code),
        }
    }

    /// The numeric spatial reference id, as used by the Esri JSON `wkid` member.
    pub fn srid(&self) -> Option<u32> {
        match self {
            Self::Crs84 => Some(4326),
            Self::Epsg(code) => Some(*code),
            Self::Other(_) => None,
        }
    }

    /// Whether coordinates are WGS 84 longitude/latitude degrees.
    pub fn is_wgs84_geographic(&self) -> bool {
        matches!(self, Self::Crs84 | Self::Epsg(4326))
    }

    /// The OGC `http://www.opengis.net/def/crs/...` URI of this CRS.
    pub fn uri(&self) -> String {
        match self {
            Self::Crs84 => format!("{OGC_CRS_URI}OGC/1.3/CRS84"),
            Self::Epsg(code) => format!("{OGC_CRS_URI}EPSG/0/{code}"),
            Self::Other(value) => value.clone(),
        }
    }

    /// A PROJJSON identifier object for GeoParquet metadata.
    ///
    /// `None` for CRS84, which is the GeoParquet default when `crs` is omitted.
    pub fn to_projjson(&self) -> Option<Value> {
        match self {
            Self::Crs84 => None,
            Self::Epsg(code) => Some(json!({
                "id": { "authority": "EPSG", "code": code }
            })),
            Self::Other(value) => {
                let (authority, code) = value.split_once(':')?;
                Some(json!({ "id": { "authority": authority, "code": code } }))
            }
        }
    }

    /// An ESRI-flavoured WKT1 definition, as found in `.prj` files.
    ///
    /// Only available for the systems that have built-in transforms.
    pub fn to_wkt(&self) -> Option<String> {
        match self {
            Self::Crs84 | Self::Epsg(4326) => Some(WGS84_GEOGCS.to_string()),
            Self::Epsg(3857) => Some(format!(
                r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",{WGS84_GEOGCS},PROJECTION["Mercator_Auxiliary_Sphere"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",0.0],PARAMETER["Standard_Parallel_1",0.0],PARAMETER["Auxiliary_Sphere_Type",0.0],UNIT["Meter",1.0]]"#
            )),
            Self::Epsg(code) => {
                let zone = utm_zone(*code)?;
                let (hemisphere, false_northing) = if zone.north {
                    ('N', 0.0)
                } else {
                    ('S', 10_000_000.0)
                };
                Some(format!(
                    r#"PROJCS["WGS_1984_UTM_Zone_{}{}",{WGS84_GEOGCS},PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",{:.1}],PARAMETER["Central_Meridian",{:.1}],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#,
                    zone.number,
                    hemisphere,
                    false_northing,
                    zone.central_meridian()
                ))
            }
            Self::Other(_) => None,
        }
    }
}

const WGS84_GEOGCS: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// A WGS 84 / UTM zone, decoded from EPSG:326xx (north) or EPSG:327xx (south).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UtmZone {
    pub number: u32,
    pub north: bool,
}

impl UtmZone {
    pub fn central_meridian(&self) -> f64 {
        -183.0 + 6.0 * self.number as f64
    }
}

pub(crate) fn utm_zone(code: u32) -> Option<UtmZone> {
    match code {
        32601..=32660 => Some(UtmZone {
            number: code - 32600,
            north: true,
        }),
        32701..=32760 => Some(UtmZone {
            number: code - 32700,
            north: false,
        }),
        _ => None,
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::Crs84
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crs84 => write!(f, "OGC:CRS84"),
            Self::Epsg(code) => write!(f, "EPSG:{code}"),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

impl FromStr for Crs {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();

        if matches!(lower.as_str(), "crs84" | "ogc:crs84" | "crs:84")
            || lower.ends_with("/ogc/1.3/crs84")
            || lower.ends_with(":ogc:1.3:crs84")
            || lower.ends_with(":ogc::crs84")
        {
            return Ok(Self::Crs84);
        }

        let code = if let Some(rest) = lower.strip_prefix("epsg:") {
            Some(rest)
        } else if let Some(rest) = lower.strip_prefix("esri:") {
            Some(rest)
        } else if let Some(rest) = lower.strip_prefix("urn:ogc:def:crs:epsg:") {
            // urn:ogc:def:crs:EPSG::4326 or urn:ogc:def:crs:EPSG:6.6:4326
            rest.rsplit(':').next()
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            lower
                .contains("/def/crs/epsg/")
                .then(|| lower.rsplit('/').next())
                .flatten()
        } else if lower.chars().all(|c| c.is_ascii_digit()) && !lower.is_empty() {
            Some(lower.as_str())
        } else {
            None
        };

        if let Some(code) = code {
            return code
                .parse::<u32>()
                .map(Self::epsg)
                .map_err(|_| ExportError::InvalidConfiguration(format!("invalid CRS code in {s}")));
        }

        if let Some((authority, code)) = trimmed.split_once(':') {
            if !authority.is_empty() && !code.is_empty() && !code.contains('/') {
                return Ok(Self::Other(format!("{}:{code}", authority.to_ascii_uppercase())));
            }
        }

        Err(ExportError::InvalidConfiguration(format!(
            "unrecognized CRS identifier: {s}"
        )))
    }
}

impl TryFrom<String> for Crs {
    type Error = ExportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}
