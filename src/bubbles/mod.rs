mod cluster;
mod text;

use serde::{Deserialize, Serialize};

use crate::ocr::{Point, RawTextBox};

pub use cluster::{DEFAULT_CLUSTER_THRESHOLD, cluster_centroids, group_boxes};
pub use text::{reconstruct, sanitize_for_source, sanitize_ocr_text};

pub const DEFAULT_MASK_MARGIN: i32 = 7;

/// Axis-aligned envelope of a bubble, inclusive-exclusive in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleBounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BubbleBounds {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for point in iter {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Some(Self {
            x1: min_x.floor() as i32,
            y1: min_y.floor() as i32,
            x2: max_x.ceil() as i32,
            y2: max_y.ceil() as i32,
        })
    }

    pub fn from_polygons(polygons: &[Vec<Point>]) -> Option<Self> {
        Self::from_points(polygons.iter().flatten())
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Envelope grown by `margin` on every side and clamped to the image.
    /// `None` only when the envelope lies entirely off the page.
    pub fn mask_rect(&self, margin: i32, image_w: u32, image_h: u32) -> Option<MaskRect> {
        let clamp_x = |v: i32| v.clamp(0, image_w as i32) as u32;
        let clamp_y = |v: i32| v.clamp(0, image_h as i32) as u32;
        let x0 = clamp_x(self.x1 - margin);
        let y0 = clamp_y(self.y1 - margin);
        let x1 = clamp_x(self.x2 + margin);
        let y1 = clamp_y(self.y2 + margin);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(MaskRect { x0, y0, x1, y1 })
    }
}

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl MaskRect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Binary mask (255 inside any bubble rectangle) sized to the page.
pub fn build_mask(
    bounds: &[BubbleBounds],
    margin: i32,
    image_w: u32,
    image_h: u32,
) -> image::GrayImage {
    let mut mask = image::GrayImage::new(image_w, image_h);
    for rect in bounds
        .iter()
        .filter_map(|bounds| bounds.mask_rect(margin, image_w, image_h))
    {
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
    }
    mask
}

/// Detected boxes that form one speech balloon.
#[derive(Debug, Clone, PartialEq)]
pub struct BubbleGroup {
    pub members: Vec<RawTextBox>,
    pub bounds: BubbleBounds,
}

impl BubbleGroup {
    pub fn from_members(members: Vec<RawTextBox>) -> Option<Self> {
        let bounds = BubbleBounds::from_points(members.iter().flat_map(|m| m.polygon.iter()))?;
        Some(Self { members, bounds })
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|member| member.text.as_str())
    }

    pub fn polygons(&self) -> Vec<Vec<Point>> {
        self.members
            .iter()
            .map(|member| member.polygon.clone())
            .collect()
    }
}
