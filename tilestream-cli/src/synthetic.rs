//! Synthetic quadtree data source.
//!
//! Generates a square terrain pyramid procedurally: each tile at level `L`
//! splits into four children at `L + 1`, geometric error halving per level.
//! Tiles are addressed as `synthetic://tile/<level>/<x>/<y>`, so the demo
//! exercises the scheme-dispatch layer the same way a real tileset loader
//! would.

use std::sync::Arc;

use glam::{DMat4, DVec3};
use tilestream::{
    BoundingSphere, BoxFuture, ChildDescriptor, ContentType, LoadError, LoadOutcome, LoadRequest,
    NodeLoader, Uri,
};

/// What a synthetic tile "renders": its address in the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePayload {
    pub level: u32,
    pub x: u64,
    pub y: u64,
}

/// Procedural tile loader for the `synthetic` URI scheme.
pub struct SyntheticTerrainLoader {
    content_type: ContentType,
    /// Deepest level children are generated for.
    max_level: u32,
    /// Geometric error of the level-0 tile.
    root_error: f64,
    /// World-space edge length of the level-0 tile, in meters.
    extent: f64,
}

impl SyntheticTerrainLoader {
    pub fn new(content_type: ContentType, max_level: u32, root_error: f64, extent: f64) -> Self {
        Self {
            content_type,
            max_level,
            root_error,
            extent,
        }
    }

    /// Returns the root tile's URI.
    pub fn root_uri() -> Uri {
        Uri::new("synthetic://tile/0/0/0")
    }

    fn error_at(&self, level: u32) -> f64 {
        self.root_error / f64::from(1u32 << level.min(31))
    }

    fn tile_transform(&self, level: u32, x: u64, y: u64) -> DMat4 {
        let tile_size = self.extent / f64::from(1u32 << level.min(31));
        let center = DVec3::new(
            (x as f64 + 0.5) * tile_size - self.extent / 2.0,
            0.0,
            (y as f64 + 0.5) * tile_size - self.extent / 2.0,
        );
        DMat4::from_translation(center)
    }

    fn tile_bounds(&self, level: u32) -> BoundingSphere {
        let tile_size = self.extent / f64::from(1u32 << level.min(31));
        // Sphere circumscribing the square tile.
        BoundingSphere::new(DVec3::ZERO, tile_size * std::f64::consts::FRAC_1_SQRT_2)
    }

    fn children_of(&self, level: u32, x: u64, y: u64) -> Vec<ChildDescriptor> {
        if level >= self.max_level {
            return Vec::new();
        }
        let child_level = level + 1;
        (0..4u64)
            .map(|i| {
                let child_x = x * 2 + (i & 1);
                let child_y = y * 2 + (i >> 1);
                ChildDescriptor {
                    uri: Uri::new(format!("synthetic://tile/{child_level}/{child_x}/{child_y}")),
                    transform: self.tile_transform(child_level, child_x, child_y),
                    geometric_error: self.error_at(child_level),
                    content_type: self.content_type,
                    bounds: self.tile_bounds(child_level),
                    refinement_mode: None,
                }
            })
            .collect()
    }
}

impl NodeLoader<TilePayload> for SyntheticTerrainLoader {
    fn load(
        &self,
        request: LoadRequest,
    ) -> BoxFuture<'static, Result<LoadOutcome<TilePayload>, LoadError>> {
        let parsed = parse_tile_uri(&request.uri);
        let outcome = parsed.map(|(level, x, y)| LoadOutcome {
            payload: Some(Arc::new(TilePayload { level, x, y })),
            children: self.children_of(level, x, y),
        });
        Box::pin(async move { outcome })
    }
}

/// Parses `synthetic://tile/<level>/<x>/<y>`.
fn parse_tile_uri(uri: &Uri) -> Result<(u32, u64, u64), LoadError> {
    let rest = uri
        .as_str()
        .strip_prefix("synthetic://tile/")
        .ok_or_else(|| LoadError::failed(format!("malformed tile URI: {uri}")))?;
    let mut parts = rest.split('/');
    let mut next_number = |name: &str| -> Result<u64, LoadError> {
        parts
            .next()
            .and_then(|part| part.parse::<u64>().ok())
            .ok_or_else(|| LoadError::failed(format!("bad {name} in tile URI: {uri}")))
    };
    let level = next_number("level")? as u32;
    let x = next_number("x")?;
    let y = next_number("y")?;
    Ok((level, x, y))
}
