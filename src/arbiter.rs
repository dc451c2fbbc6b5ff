use crate::protocol::BoundsRegion;
use crate::surface::SurfaceHandle;
use std::rc::Rc;

/// Horizontal and upward slack around the reported region, in pixels.
pub const POINTER_PADDING: f64 = 50.0;
/// Extra slack below the region so downward-opening dropdowns stay usable.
pub const DROPDOWN_ALLOWANCE: f64 = 300.0;

/// Decides when the otherwise click-through surface should accept pointer
/// input, based on cursor proximity to the most recently reported bounds.
///
/// Scoped to one surface instance. An explicit override from the surface
/// (`pointer-lock`) takes precedence until the next movement sample.
pub struct PointerArbiter {
    surface: Rc<dyn SurfaceHandle>,
    region: Option<BoundsRegion>,
    input_enabled: bool,
}

impl PointerArbiter {
    pub fn new(surface: Rc<dyn SurfaceHandle>) -> Self {
        Self {
            surface,
            region: None,
            input_enabled: false,
        }
    }

    /// Replace the tracked region with the latest report. No interpolation;
    /// the newest region wins outright.
    pub fn set_region(&mut self, bounds: BoundsRegion) {
        self.region = Some(bounds);
    }

    pub fn region(&self) -> Option<&BoundsRegion> {
        self.region.as_ref()
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Explicit enable/disable from the surface itself.
    pub fn set_override(&mut self, enabled: bool) {
        self.toggle(enabled);
    }

    /// Sample a host-wide pointer position and toggle input-transparency on
    /// change. Without a region the surface stays in its current state.
    pub fn on_pointer_move(&mut self, x: f64, y: f64) {
        let Some(region) = self.region else {
            return;
        };
        let near = x >= region.left - POINTER_PADDING
            && x <= region.right + POINTER_PADDING
            && y >= region.top - POINTER_PADDING
            && y <= region.bottom + DROPDOWN_ALLOWANCE;
        self.toggle(near);
    }

    fn toggle(&mut self, enable: bool) {
        if enable != self.input_enabled {
            tracing::debug!(from = self.input_enabled, to = enable, "pointer input toggled");
            self.input_enabled = enable;
            self.surface.set_input_enabled(enable);
        }
    }
}
