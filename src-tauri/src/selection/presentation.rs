// How the toolbar is shown and hidden without stealing focus.
//
// Picked once at startup; the orchestrator's show/hide path never branches on
// the OS itself.

use crate::geometry::Point;
use crate::window::{Screen, SharedWindow, WindowHandle};

use super::timers::TimerKind;

/// When outside-interaction detection may start after a show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arming {
    Immediate,
    After(TimerKind),
}

pub trait PresentationStrategy: Send {
    fn name(&self) -> &'static str;

    /// Show a toolbar whose bounds are already set.
    fn show(&self, toolbar: &dyn WindowHandle) -> Arming;

    /// Hide the toolbar. `others` are the app's other visible windows. Returns
    /// the windows whose focusability must be restored later.
    fn hide(&self, toolbar: &dyn WindowHandle, others: &[SharedWindow]) -> Vec<SharedWindow>;

    /// Convert a hook coordinate to the space window bounds live in.
    fn to_logical(&self, screen: &dyn Screen, point: Point) -> Point;
}

/// Windows-style overlay: shown without activation, then outside clicks are
/// ignored for a short while. Hook coordinates are physical pixels.
#[derive(Debug, Default)]
pub struct DeferredArmingOverlay;

impl PresentationStrategy for DeferredArmingOverlay {
    fn name(&self) -> &'static str {
        "deferred-arming"
    }

    fn show(&self, toolbar: &dyn WindowHandle) -> Arming {
        toolbar.show_inactive();
        Arming::After(TimerKind::SelfTriggerSuppression)
    }

    fn hide(&self, toolbar: &dyn WindowHandle, _others: &[SharedWindow]) -> Vec<SharedWindow> {
        toolbar.hide();
        Vec::new()
    }

    fn to_logical(&self, screen: &dyn Screen, point: Point) -> Point {
        screen.to_logical(point)
    }
}

/// macOS-style overlay: shown without activation on every space, and the other
/// windows are briefly made non-focusable during a hide so the OS does not
/// bring one of them forward.
#[derive(Debug, Default)]
pub struct NonActivatingOverlay;

impl PresentationStrategy for NonActivatingOverlay {
    fn name(&self) -> &'static str {
        "non-activating"
    }

    fn show(&self, toolbar: &dyn WindowHandle) -> Arming {
        toolbar.set_focusable(false);
        toolbar.set_visible_on_all_workspaces(true);
        toolbar.show_inactive();
        toolbar.set_focusable(true);
        Arming::Immediate
    }

    fn hide(&self, toolbar: &dyn WindowHandle, others: &[SharedWindow]) -> Vec<SharedWindow> {
        let snapshot: Vec<SharedWindow> = others
            .iter()
            .filter(|w| w.id() != toolbar.id() && w.is_visible() && w.is_focusable())
            .cloned()
            .collect();

        for window in &snapshot {
            window.set_focusable(false);
        }
        toolbar.hide();
        toolbar.clear_hover();
        snapshot
    }

    fn to_logical(&self, _screen: &dyn Screen, point: Point) -> Point {
        point
    }
}

/// `None` where the toolbar is not supported.
pub fn for_current_platform() -> Option<Box<dyn PresentationStrategy>> {
    if cfg!(target_os = "macos") {
        Some(Box::new(NonActivatingOverlay))
    } else if cfg!(target_os = "windows") {
        Some(Box::new(DeferredArmingOverlay))
    } else {
        None
    }
}
