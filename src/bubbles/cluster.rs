use tracing::debug;

use super::BubbleGroup;
use crate::ocr::{Point, RawTextBox};

pub const DEFAULT_CLUSTER_THRESHOLD: f32 = 65.0;

/// Greedy chain clustering over centroids, returning groups of input indices.
///
/// The first remaining point seeds a group; every later remaining point joins
/// when it lies within `threshold` horizontally of the group's most recently
/// added point and starts less than `threshold` below it. Membership therefore
/// depends on input order. Every index appears in exactly one group.
pub fn cluster_centroids(points: &[Point], threshold: f32) -> Vec<Vec<usize>> {
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut groups = Vec::new();

    while !remaining.is_empty() {
        let seed = remaining.remove(0);
        let mut group = vec![seed];
        let mut unclaimed = Vec::with_capacity(remaining.len());
        for idx in remaining {
            let last = points[group[group.len() - 1]];
            let candidate = points[idx];
            if (last.x - candidate.x).abs() <= threshold && last.y + threshold > candidate.y {
                group.push(idx);
            } else {
                unclaimed.push(idx);
            }
        }
        remaining = unclaimed;
        groups.push(group);
    }

    groups
}

/// Clusters detected boxes into speech-bubble groups, preserving detection
/// order inside each group. Boxes without any polygon point are dropped.
pub fn group_boxes(boxes: Vec<RawTextBox>, threshold: f32) -> Vec<BubbleGroup> {
    let (boxes, centroids): (Vec<RawTextBox>, Vec<Point>) = boxes
        .into_iter()
        .filter_map(|raw| raw.centroid().map(|centroid| (raw, centroid)))
        .unzip();

    let mut slots = boxes.into_iter().map(Some).collect::<Vec<_>>();
    let groups = cluster_centroids(&centroids, threshold)
        .into_iter()
        .filter_map(|indices| {
            let members = indices
                .into_iter()
                .filter_map(|idx| slots[idx].take())
                .collect::<Vec<_>>();
            BubbleGroup::from_members(members)
        })
        .collect::<Vec<_>>();
    debug!(boxes = centroids.len(), groups = groups.len(), "clustered text boxes");
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f32, y: f32) -> Point {
        Point::new(x, y)
    }

    fn assert_partition(groups: &[Vec<usize>], len: usize) {
        let mut seen = groups.iter().flatten().copied().collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..len).collect::<Vec<_>>());
    }

    #[test]
    fn nearby_boxes_join_and_distant_box_stands_alone() {
        let points = [p(100.0, 50.0), p(110.0, 52.0), p(500.0, 50.0)];
        let groups = cluster_centroids(&points, DEFAULT_CLUSTER_THRESHOLD);
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn output_is_a_partition() {
        let points = [
            p(10.0, 10.0),
            p(400.0, 30.0),
            p(30.0, 40.0),
            p(410.0, 60.0),
            p(35.0, 300.0),
            p(900.0, 900.0),
            p(60.0, 70.0),
        ];
        let groups = cluster_centroids(&points, DEFAULT_CLUSTER_THRESHOLD);
        assert_partition(&groups, points.len());
        assert_eq!(groups, vec![vec![0, 2, 6], vec![1, 3], vec![4], vec![5]]);
    }

    #[test]
    fn clustering_is_deterministic() {
        let points = (0..40)
            .map(|i| p((i * 37 % 500) as f32, (i * 53 % 700) as f32))
            .collect::<Vec<_>>();
        let first = cluster_centroids(&points, DEFAULT_CLUSTER_THRESHOLD);
        let second = cluster_centroids(&points, DEFAULT_CLUSTER_THRESHOLD);
        assert_eq!(first, second);
        assert_partition(&first, points.len());
    }

    #[test]
    fn chain_follows_most_recent_member() {
        // 2 is out of reach of the seed but within reach of 1.
        let points = [p(0.0, 0.0), p(60.0, 10.0), p(120.0, 20.0)];
        let groups = cluster_centroids(&points, DEFAULT_CLUSTER_THRESHOLD);
        assert_eq!(groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn membership_depends_on_input_order() {
        let forward = [p(0.0, 0.0), p(60.0, 10.0), p(120.0, 20.0)];
        let shuffled = [p(120.0, 20.0), p(0.0, 0.0), p(60.0, 10.0)];
        assert_eq!(cluster_centroids(&forward, 65.0).len(), 1);
        assert_eq!(
            cluster_centroids(&shuffled, 65.0),
            vec![vec![0, 2], vec![1]]
        );
    }

    #[test]
    fn points_far_below_do_not_join() {
        let points = [p(0.0, 0.0), p(0.0, 65.0), p(0.0, 64.0)];
        let groups = cluster_centroids(&points, DEFAULT_CLUSTER_THRESHOLD);
        assert_eq!(groups, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(cluster_centroids(&[], DEFAULT_CLUSTER_THRESHOLD).is_empty());
    }

    #[test]
    fn group_boxes_keeps_detection_order() {
        let raw = |x: f32, y: f32, text: &str| RawTextBox {
            polygon: vec![p(x, y), p(x + 10.0, y), p(x + 10.0, y + 10.0), p(x, y + 10.0)],
            text: text.to_string(),
            confidence: 0.9,
        };
        let groups = group_boxes(
            vec![raw(100.0, 50.0, "a"), raw(500.0, 50.0, "c"), raw(110.0, 60.0, "b")],
            DEFAULT_CLUSTER_THRESHOLD,
        );
        let texts = groups
            .iter()
            .map(|group| group.texts().collect::<Vec<_>>())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec![vec!["a", "b"], vec!["c"]]);
    }
}
