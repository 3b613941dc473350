use super::LineBox;

pub(super) fn iou(a: &LineBox, b: &LineBox) -> f32 {
    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = a.right().min(b.right());
    let iy2 = a.bottom().min(b.bottom());

    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }
    let inter = (ix2 - ix1) as f32 * (iy2 - iy1) as f32;
    let area_a = (a.w as f32) * (a.h as f32);
    let area_b = (b.w as f32) * (b.h as f32);
    inter / (area_a + area_b - inter).max(1.0)
}

pub(super) fn union_box(a: &LineBox, b: &LineBox) -> LineBox {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = a.right().max(b.right());
    let y2 = a.bottom().max(b.bottom());
    LineBox {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

pub(super) fn scale_box(bbox: &LineBox, scale: u32) -> LineBox {
    let scale = scale.max(1);
    LineBox {
        x: bbox.x / scale,
        y: bbox.y / scale,
        w: bbox.w.div_ceil(scale),
        h: bbox.h.div_ceil(scale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x: u32, y: u32, w: u32, h: u32) -> LineBox {
        LineBox { x, y, w, h }
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&bx(0, 0, 10, 10), &bx(20, 20, 5, 5)), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let value = iou(&bx(3, 4, 10, 10), &bx(3, 4, 10, 10));
        assert!((value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn union_covers_both() {
        let merged = union_box(&bx(0, 0, 10, 10), &bx(5, 20, 10, 5));
        assert_eq!((merged.x, merged.y, merged.w, merged.h), (0, 0, 15, 25));
    }
}
