//! Keeps a floating panel inside the visible viewport.
//!
//! [`BoundingBox::clamp`] is the pure fencing function. [`ViewportFence`] tracks the geometry the
//! box is derived from and re-clamps the last desired position whenever that geometry changes.

use serde::{Deserialize, Serialize};

/// Distance kept between the panel and the viewport edges, in CSS pixels.
pub const DEFAULT_PADDING: f64 = 20.0;

/// Top-left corner of the panel in CSS pixels.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Position {
        Position { x, y }
    }
}

/// Width and height in CSS pixels.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Size {
        Size { width, height }
    }
}

/// Inclusive range of legal panel positions.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// Outcome of fencing a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fenced {
    /// The position already was legal and is returned as is.
    Unchanged(Position),
    /// The position had to be moved into the box.
    Moved(Position),
}

impl Fenced {
    pub fn position(self) -> Position {
        match self {
            Fenced::Unchanged(position) | Fenced::Moved(position) => position,
        }
    }

    pub fn is_moved(self) -> bool {
        matches!(self, Fenced::Moved(_))
    }
}

impl BoundingBox {
    /// Derives the box that keeps a panel of size `panel` wholly inside `viewport`, at least
    /// `padding` away from every edge.
    ///
    /// If the panel does not fit, `max_x < min_x` (or `max_y < min_y`). Clamping against such a
    /// box pins the panel to the padding offset at the top left.
    pub fn visible_area(viewport: Size, panel: Size, padding: f64) -> BoundingBox {
        BoundingBox {
            min_x: padding,
            max_x: viewport.width - panel.width - padding,
            min_y: padding,
            max_y: viewport.height - panel.height - padding,
        }
    }

    /// Clamps `position` into the box.
    pub fn clamp(&self, position: Position) -> Fenced {
        // The outer `max` wins for inverted bounds, which pins to the minimum.
        let x = self.min_x.max(position.x.min(self.max_x));
        let y = self.min_y.max(position.y.min(self.max_y));

        if x == position.x && y == position.y {
            Fenced::Unchanged(position)
        } else {
            Fenced::Moved(Position { x, y })
        }
    }

    /// Returns `true` if the panel is too large for the viewport along either axis.
    pub fn is_degenerate(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }
}

/// Clamps `position` into `fence`, leaving it untouched if no fence is known yet.
pub fn apply_fence(position: Position, fence: Option<&BoundingBox>) -> Fenced {
    match fence {
        Some(fence) => fence.clamp(position),
        None => Fenced::Unchanged(position),
    }
}

/// Reactive fencing state of a single panel.
///
/// The fence remembers where the panel is supposed to be, separately from where it is rendered.
/// Shrinking the viewport pushes the panel inwards; growing it again lets the panel return to
/// the desired spot.
#[derive(Debug, Clone)]
pub struct ViewportFence {
    padding: f64,
    viewport: Option<Size>,
    panel: Option<Size>,
    desired: Position,
    position: Position,
    grab_offset: Option<Position>,
}

impl ViewportFence {
    pub fn new(initial: Position, padding: f64) -> ViewportFence {
        ViewportFence {
            padding,
            viewport: None,
            panel: None,
            desired: initial,
            position: initial,
            grab_offset: None,
        }
    }

    /// The current box, once both the viewport and the panel have been measured.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        Some(BoundingBox::visible_area(
            self.viewport?,
            self.panel?,
            self.padding,
        ))
    }

    /// The fenced position the panel should be rendered at.
    pub fn position(&self) -> Position {
        self.position
    }

    /// The position the panel was last placed at, before fencing.
    pub fn desired(&self) -> Position {
        self.desired
    }

    pub fn is_dragging(&self) -> bool {
        self.grab_offset.is_some()
    }

    /// Places the panel at `candidate`. Returns the new rendered position if it changed.
    pub fn set_position(&mut self, candidate: Position) -> Option<Position> {
        self.desired = candidate;
        self.reclamp()
    }

    /// Records a new viewport size. Returns the new rendered position if it changed.
    pub fn viewport_resized(&mut self, viewport: Size) -> Option<Position> {
        self.viewport = Some(viewport);
        self.reclamp()
    }

    /// Records a new rendered panel size. Returns the new rendered position if it changed.
    pub fn panel_resized(&mut self, panel: Size) -> Option<Position> {
        self.panel = Some(panel);
        self.reclamp()
    }

    /// Starts a drag gesture with the pointer at `pointer`.
    pub fn begin_drag(&mut self, pointer: Position) {
        self.grab_offset = Some(Position {
            x: pointer.x - self.position.x,
            y: pointer.y - self.position.y,
        });
    }

    /// Moves the panel along with the pointer. Does nothing unless a drag is active.
    pub fn drag_to(&mut self, pointer: Position) -> Option<Position> {
        let offset = self.grab_offset?;

        self.set_position(Position {
            x: pointer.x - offset.x,
            y: pointer.y - offset.y,
        })
    }

    /// Ends the drag gesture. Returns the final position if a drag was active.
    pub fn end_drag(&mut self) -> Option<Position> {
        self.grab_offset.take()?;
        // Where the user let go is where the panel is meant to stay.
        self.desired = self.position;
        Some(self.position)
    }

    fn reclamp(&mut self) -> Option<Position> {
        let fence = self.bounding_box();
        let fenced = apply_fence(self.desired, fence.as_ref()).position();

        if fenced == self.position {
            return None;
        }

        log::trace!(
            "fenced panel from ({}, {}) to ({}, {})",
            self.desired.x,
            self.desired.y,
            fenced.x,
            fenced.y
        );

        self.position = fenced;
        Some(fenced)
    }
}
