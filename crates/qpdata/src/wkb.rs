//! Well-Known-Binary geometry reader.
//!
//! ROIs backed by a geometry serialize it as WKB inside a `byte[]`. Only the
//! x/y ordinates are kept; Z and M values are skipped.

use qpdata_buffers::{BufferError, Reader};
use thiserror::Error;

use crate::record::Point;

const MAX_NESTING: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WkbError {
    #[error(transparent)]
    Truncated(#[from] BufferError),
    #[error("invalid byte order marker {0}")]
    ByteOrder(u8),
    #[error("unsupported geometry type {0}")]
    UnsupportedType(u32),
    #[error("element count {count} at offset {offset} exceeds the remaining input")]
    Count { offset: usize, count: u32 },
    #[error("geometry collections nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WkbKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl WkbKind {
    fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => WkbKind::Point,
            2 => WkbKind::LineString,
            3 => WkbKind::Polygon,
            4 => WkbKind::MultiPoint,
            5 => WkbKind::MultiLineString,
            6 => WkbKind::MultiPolygon,
            7 => WkbKind::GeometryCollection,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            WkbKind::Point => "Point",
            WkbKind::LineString => "LineString",
            WkbKind::Polygon => "Polygon",
            WkbKind::MultiPoint => "MultiPoint",
            WkbKind::MultiLineString => "MultiLineString",
            WkbKind::MultiPolygon => "MultiPolygon",
            WkbKind::GeometryCollection => "GeometryCollection",
        }
    }
}

/// A decoded geometry as a list of point sequences.
///
/// Polygons contribute one part per ring, exterior ring first.
#[derive(Debug, Clone, PartialEq)]
pub struct WkbGeometry {
    pub kind: WkbKind,
    pub parts: Vec<Vec<Point>>,
}

impl WkbGeometry {
    /// Boundary points in source order: the first (exterior) ring for areas,
    /// every point otherwise.
    pub fn outline(&self) -> Vec<Point> {
        match self.kind {
            WkbKind::Polygon | WkbKind::MultiPolygon => {
                self.parts.first().cloned().unwrap_or_default()
            }
            _ => self.parts.concat(),
        }
    }
}

/// Decodes one WKB (or EWKB) geometry.
pub fn parse_wkb(data: &[u8]) -> Result<WkbGeometry, WkbError> {
    let mut reader = Reader::new(data);
    let mut parts = Vec::new();
    let kind = read_geometry(&mut reader, &mut parts, 0)?;
    Ok(WkbGeometry { kind, parts })
}

#[derive(Clone, Copy)]
struct Header {
    little_endian: bool,
    dims: usize,
}

fn read_u32(reader: &mut Reader<'_>, little_endian: bool) -> Result<u32, WkbError> {
    let v = reader.u32()?;
    Ok(if little_endian { v.swap_bytes() } else { v })
}

fn read_f64(reader: &mut Reader<'_>, little_endian: bool) -> Result<f64, WkbError> {
    let bits = reader.u64()?;
    Ok(f64::from_bits(if little_endian { bits.swap_bytes() } else { bits }))
}

fn read_geometry(
    reader: &mut Reader<'_>,
    parts: &mut Vec<Vec<Point>>,
    depth: usize,
) -> Result<WkbKind, WkbError> {
    if depth > MAX_NESTING {
        return Err(WkbError::TooDeep);
    }
    let little_endian = match reader.u8()? {
        0 => false,
        1 => true,
        other => return Err(WkbError::ByteOrder(other)),
    };
    let raw = read_u32(reader, little_endian)?;
    // EWKB flags in the high bits, ISO dimensions in the thousands.
    let mut has_z = raw & 0x8000_0000 != 0;
    let mut has_m = raw & 0x4000_0000 != 0;
    if raw & 0x2000_0000 != 0 {
        read_u32(reader, little_endian)?; // SRID
    }
    let mut code = raw & 0x0fff_ffff;
    match code / 1000 {
        1 => has_z = true,
        2 => has_m = true,
        3 => {
            has_z = true;
            has_m = true;
        }
        _ => {}
    }
    code %= 1000;
    let kind = WkbKind::from_code(code).ok_or(WkbError::UnsupportedType(code))?;
    let header = Header {
        little_endian,
        dims: 2 + has_z as usize + has_m as usize,
    };

    match kind {
        WkbKind::Point => {
            let p = read_point(reader, header)?;
            parts.push(vec![p]);
        }
        WkbKind::LineString => parts.push(read_points(reader, header)?),
        WkbKind::Polygon => {
            let rings = read_count(reader, header, 4)?;
            for _ in 0..rings {
                parts.push(read_points(reader, header)?);
            }
        }
        WkbKind::MultiPoint
        | WkbKind::MultiLineString
        | WkbKind::MultiPolygon
        | WkbKind::GeometryCollection => {
            let members = read_count(reader, header, 5)?;
            for _ in 0..members {
                read_geometry(reader, parts, depth + 1)?;
            }
        }
    }
    Ok(kind)
}

/// Reads an element count, rejecting counts that cannot fit in the input.
fn read_count(reader: &mut Reader<'_>, header: Header, min_size: usize) -> Result<u32, WkbError> {
    let offset = reader.x;
    let count = read_u32(reader, header.little_endian)?;
    if (count as usize).saturating_mul(min_size) > reader.size() {
        return Err(WkbError::Count { offset, count });
    }
    Ok(count)
}

fn read_point(reader: &mut Reader<'_>, header: Header) -> Result<Point, WkbError> {
    let x = read_f64(reader, header.little_endian)?;
    let y = read_f64(reader, header.little_endian)?;
    for _ in 2..header.dims {
        read_f64(reader, header.little_endian)?;
    }
    Ok(Point::new(x, y))
}

fn read_points(reader: &mut Reader<'_>, header: Header) -> Result<Vec<Point>, WkbError> {
    let count = read_count(reader, header, header.dims * 8)?;
    (0..count).map(|_| read_point(reader, header)).collect()
}
