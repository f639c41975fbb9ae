//! View parameters and screen-space error scaling.

use glam::DVec3;

use crate::tree::{BoundingSphere, Node};

/// Minimum camera-to-content distance used in projection, keeping the
/// scaled error finite when the camera sits inside a bounding volume.
const MIN_DISTANCE: f64 = 1e-6;

/// Perspective terms for projecting geometric error to screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Projection {
    /// Viewport height in pixels.
    screen_height_px: f64,
    /// Vertical field of view in radians.
    fov_y: f64,
}

/// Per-tick view description.
///
/// Two flavors exist:
/// - [`perspective`](ViewParameters::perspective) projects each node's
///   geometric error to pixels using camera distance, viewport height and
///   field of view, the standard screen-space-error formulation.
/// - [`fixed`](ViewParameters::fixed) skips projection entirely and compares
///   `geometric_error * detail_multiplier` directly against the threshold —
///   for headless hosts and deterministic tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParameters {
    /// Camera position in world space.
    pub camera_position: DVec3,
    /// Error threshold: refine when a node's scaled error exceeds it. In
    /// perspective mode the unit is pixels, in fixed mode raw error units.
    pub threshold: f64,
    projection: Option<Projection>,
}

impl ViewParameters {
    /// Creates perspective view parameters.
    pub fn perspective(
        camera_position: DVec3,
        screen_height_px: f64,
        fov_y: f64,
        threshold_px: f64,
    ) -> Self {
        Self {
            camera_position,
            threshold: threshold_px,
            projection: Some(Projection {
                screen_height_px,
                fov_y,
            }),
        }
    }

    /// Creates projection-free view parameters: scaled error is simply
    /// `geometric_error * detail_multiplier`.
    pub fn fixed(threshold: f64) -> Self {
        Self {
            camera_position: DVec3::ZERO,
            threshold,
            projection: None,
        }
    }

    /// Scales a node's geometric error into this view's error space.
    pub fn scaled_error<P>(&self, node: &Node<P>) -> f64 {
        let base = node.geometric_error() * node.detail_multiplier();
        match &self.projection {
            None => base,
            Some(projection) => {
                let distance = self.distance_to(node.bounds(), node);
                // sse = ge * h / (2 * tan(fov/2) * d)
                let factor = projection.screen_height_px / (2.0 * (projection.fov_y / 2.0).tan());
                base * factor / distance
            }
        }
    }

    fn distance_to<P>(&self, bounds: &BoundingSphere, node: &Node<P>) -> f64 {
        let center = bounds.world_center(node.transform());
        (self.camera_position.distance(center) - bounds.radius).max(MIN_DISTANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentTypeGenerator;
    use crate::tree::{DataSourceId, NodeTree, RootDescriptor};
    use glam::DMat4;

    fn node_with(error: f64, multiplier: f64, position: DVec3) -> NodeTree<()> {
        let ct = ContentTypeGenerator::new().generate();
        let mut tree = NodeTree::new();
        let mut descriptor = RootDescriptor::new("test://node", ct);
        descriptor.geometric_error = error;
        descriptor.detail_multiplier = multiplier;
        descriptor.transform = DMat4::from_translation(position);
        tree.insert_root(DataSourceId::new(1), descriptor);
        tree
    }

    #[test]
    fn test_fixed_view_multiplies_error() {
        let tree = node_with(10.0, 1.5, DVec3::ZERO);
        let node = tree.get(tree.roots()[0]).unwrap();
        let view = ViewParameters::fixed(5.0);
        assert_eq!(view.scaled_error(node), 15.0);
    }

    #[test]
    fn test_perspective_error_halves_with_distance() {
        let tree = node_with(10.0, 1.0, DVec3::new(0.0, 0.0, -100.0));
        let node = tree.get(tree.roots()[0]).unwrap();

        let near = ViewParameters::perspective(DVec3::ZERO, 1080.0, 1.0, 16.0);
        let far = ViewParameters::perspective(DVec3::new(0.0, 0.0, 100.0), 1080.0, 1.0, 16.0);
        let near_error = near.scaled_error(node);
        let far_error = far.scaled_error(node);

        assert!((near_error / far_error - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_perspective_error_is_finite_inside_bounds() {
        let tree = node_with(10.0, 1.0, DVec3::ZERO);
        let node = tree.get(tree.roots()[0]).unwrap();
        let view = ViewParameters::perspective(DVec3::ZERO, 1080.0, 1.0, 16.0);
        assert!(view.scaled_error(node).is_finite());
    }

    #[test]
    fn test_detail_multiplier_scales_linearly() {
        let coarse = node_with(10.0, 0.5, DVec3::new(0.0, 0.0, -50.0));
        let fine = node_with(10.0, 2.0, DVec3::new(0.0, 0.0, -50.0));
        let view = ViewParameters::perspective(DVec3::ZERO, 1080.0, 1.0, 16.0);

        let coarse_error = view.scaled_error(coarse.get(coarse.roots()[0]).unwrap());
        let fine_error = view.scaled_error(fine.get(fine.roots()[0]).unwrap());
        assert!((fine_error / coarse_error - 4.0).abs() < 1e-9);
    }
}
