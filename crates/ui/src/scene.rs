//! Draw-list primitives produced by the compositor
//!
//! A frame is a flat, ordered list of commands in screen pixels. Hosts walk
//! it front to back and map each command onto their own drawing API.

use std::sync::Arc;

use pageview_cache::{Bitmap, PageIndex};

/// Axis-aligned affine transform: scale, then translate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation (x, y)
    pub translation: [f32; 2],
    /// Scale (x, y)
    pub scale: [f32; 2],
}

impl Default for Transform {
    fn default() -> Self {
        Self { translation: [0.0, 0.0], scale: [1.0, 1.0] }
    }
}

impl Transform {
    pub fn translate(x: f32, y: f32) -> Self {
        Self { translation: [x, y], ..Default::default() }
    }

    pub fn scale(x: f32, y: f32) -> Self {
        Self { scale: [x, y], ..Default::default() }
    }

    /// `self` applied after `other`
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            translation: [
                self.translation[0] + other.translation[0] * self.scale[0],
                self.translation[1] + other.translation[1] * self.scale[1],
            ],
            scale: [self.scale[0] * other.scale[0], self.scale[1] * other.scale[1]],
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> [f32; 2] {
        [
            x * self.scale[0] + self.translation[0],
            y * self.scale[1] + self.translation[1],
        ]
    }

    /// Image of a rectangle under the transform
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let [x, y] = self.apply(rect.x, rect.y);
        Rect::new(x, y, rect.width * self.scale[0], rect.height * self.scale[1])
    }
}

/// RGBA color value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Create a new color from RGBA values (0.0 to 1.0)
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create a new opaque color from RGB values
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f32,
    /// Top-left y coordinate
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Draw a cached page bitmap; `transform` maps bitmap pixels to screen
    Bitmap {
        page: PageIndex,
        bitmap: Arc<Bitmap>,
        /// Scale the bitmap was rasterized at
        rendered_scale: f32,
        transform: Transform,
        /// Screen rectangle covered, equal to the transformed bitmap bounds
        dest: Rect,
    },
    /// Fill for a page with nothing cached yet
    Placeholder { page: PageIndex, rect: Rect, color: Color },
}

impl DrawCommand {
    pub fn page(&self) -> PageIndex {
        match self {
            DrawCommand::Bitmap { page, .. } | DrawCommand::Placeholder { page, .. } => *page,
        }
    }

    /// Screen rectangle the command paints
    pub fn rect(&self) -> Rect {
        match self {
            DrawCommand::Bitmap { dest, .. } => *dest,
            DrawCommand::Placeholder { rect, .. } => *rect,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, DrawCommand::Placeholder { .. })
    }
}

/// One frame's worth of drawing, in paint order
#[derive(Debug, Clone, PartialEq)]
pub struct DrawList {
    pub background: Color,
    pub commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new(background: Color) -> Self {
        Self { background, commands: Vec::new() }
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn pages(&self) -> Vec<PageIndex> {
        self.commands.iter().map(DrawCommand::page).collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.commands.iter().filter(|command| command.is_placeholder()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_combine() {
        let t1 = Transform::translate(10.0, 20.0);
        let t2 = Transform::scale(2.0, 2.0);
        let combined = t1.combine(&t2);
        assert_eq!(combined.translation, [10.0, 20.0]);
        assert_eq!(combined.scale, [2.0, 2.0]);
        assert_eq!(combined.apply(1.0, 1.0), [12.0, 22.0]);
    }

    #[test]
    fn test_map_rect() {
        let transform = Transform { translation: [5.0, -10.0], scale: [0.5, 0.25] };
        let mapped = transform.map_rect(&Rect::new(0.0, 0.0, 200.0, 400.0));
        assert_eq!(mapped, Rect::new(5.0, -10.0, 100.0, 100.0));
    }

    #[test]
    fn test_rect_intersection_excludes_touching_edges() {
        let viewport = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(viewport.intersects(&Rect::new(50.0, 90.0, 10.0, 40.0)));
        assert!(!viewport.intersects(&Rect::new(0.0, 100.0, 100.0, 40.0)));
        assert!(!viewport.intersects(&Rect::new(-20.0, 0.0, 20.0, 40.0)));
    }

    #[test]
    fn test_rgb_is_opaque() {
        assert_eq!(Color::rgb(0.1, 0.2, 0.3), Color::rgba(0.1, 0.2, 0.3, 1.0));
    }
}
