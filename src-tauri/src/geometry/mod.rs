// Screen geometry for placing the toolbar and action windows.
// All values are logical (DIP) pixels.

use serde::{Deserialize, Serialize};

/// Gap kept between a window and the edge of the work area.
pub const SCREEN_MARGIN: f64 = 10.0;

/// Gap used when an action window is pushed back inside the work area.
pub const ACTION_WINDOW_GAP: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    /// Round both dimensions up to whole pixels.
    pub fn ceil(&self) -> Self {
        Self::new(self.width.ceil(), self.height.ceil())
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Edges are inclusive, so a click on the border counts as inside.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Shrink by `margin` on every side.
    pub fn inset(&self, margin: f64) -> Rect {
        Rect::new(
            self.x + margin,
            self.y + margin,
            (self.width - 2.0 * margin).max(0.0),
            (self.height - 2.0 * margin).max(0.0),
        )
    }

    /// Distance from the closest edge to a point (0 when inside)
    pub fn distance_to_point(&self, point: Point) -> f64 {
        let dx = (self.x - point.x).max(point.x - self.right()).max(0.0);
        let dy = (self.y - point.y).max(point.y - self.bottom()).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Where a window sits relative to its reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Orientation {
    TopLeft,
    TopRight,
    TopMiddle,
    BottomLeft,
    BottomRight,
    BottomMiddle,
    MiddleLeft,
    MiddleRight,
    Center,
}

/// A monitor's usable area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Display {
    pub work_area: Rect,
    pub scale_factor: f64,
}

/// Compute the top-left corner of a window of `size` anchored at `point`,
/// clamped inside `work_area` shrunk by [`SCREEN_MARGIN`].
pub fn resolve_position(point: Point, orientation: Orientation, size: Size, work_area: Rect) -> Point {
    let (mut x, mut y) = match orientation {
        Orientation::BottomMiddle => (point.x - size.width / 2.0, point.y),
        Orientation::TopMiddle => (point.x - size.width / 2.0, point.y - size.height),
        Orientation::TopRight => (point.x, point.y - size.height),
        Orientation::TopLeft => (point.x - size.width, point.y - size.height),
        _ => (point.x, point.y),
    };

    let bounds = work_area.inset(SCREEN_MARGIN);

    if x < bounds.x {
        x = bounds.x;
    }
    if x + size.width > bounds.right() {
        x = bounds.right() - size.width;
    }

    if y < bounds.y {
        y = bounds.y;
    }
    if y + size.height > bounds.bottom() {
        y = bounds.bottom() - size.height;
    }

    Point::new(x, y)
}

/// Center a window of `size` in the work area.
pub fn center_in(work_area: Rect, size: Size) -> Rect {
    let x = (work_area.x + (work_area.width - size.width) / 2.0).round();
    let y = (work_area.y + (work_area.height - size.height) / 2.0).round();
    Rect::from_origin_size(Point::new(x, y), size)
}

/// Place an action window right under the toolbar, horizontally centered on it.
///
/// The preferred size shrinks to fit the work area (minus [`ACTION_WINDOW_GAP`]
/// on both sides), and the window is pushed back inside when it would overflow.
pub fn place_below_toolbar(toolbar: Rect, preferred: Size, work_area: Rect) -> Rect {
    let width = preferred.width.min(work_area.width - 2.0 * ACTION_WINDOW_GAP);
    let height = preferred.height.min(work_area.height - 2.0 * ACTION_WINDOW_GAP);

    let mut x = (toolbar.x + (toolbar.width - width) / 2.0).round();
    let mut y = toolbar.bottom().round();

    if x + width > work_area.right() {
        x = work_area.right() - width - ACTION_WINDOW_GAP;
    } else if x < work_area.x {
        x = work_area.x + ACTION_WINDOW_GAP;
    }

    if y + height > work_area.bottom() {
        y = work_area.bottom() - height - ACTION_WINDOW_GAP;
    } else if y < work_area.y {
        y = work_area.y + ACTION_WINDOW_GAP;
    }

    Rect::new(x, y, width, height)
}
