use burn::{prelude::Backend, tensor::Tensor};

/// A decoded detection in plain scalar form, ready for drawing or
/// suppression arithmetic outside the tensor graph.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    /// `[x1, y1, x2, y2]`, normalized to [0, 1].
    pub coords: [f32; 4],
    /// Model class id (1-based, background never appears here).
    pub cls_id: usize,
    /// Classification confidence after softmax.
    pub score: f32,
}

impl BoundingBox {
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 2>::from_data([self.coords], device)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Self) -> f32 {
        let [ax1, ay1, ax2, ay2] = self.coords;
        let [bx1, by1, bx2, by2] = other.coords;

        let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let intersection = inter_w * inter_h;

        let area_a = (ax2 - ax1) * (ay2 - ay1);
        let area_b = (bx2 - bx1) * (by2 - by1);
        let union = area_a + area_b - intersection;

        if union <= 0.0 {
            return 0.0;
        }

        intersection / union
    }
}

/// Greedy per-class non-maximum suppression.
///
/// The detector emits one box per default anchor, so every object is
/// covered by a pile of near-duplicate predictions. Per class, boxes below
/// `score_threshold` are dropped, the rest are visited in descending score
/// order, and each box survives only if it overlaps every already-kept box
/// of its class by less than `iou_threshold`.
///
/// Suppression runs per class: a scallop box never suppresses an
/// overlapping sea urchin box.
///
/// # Arguments
///
/// * `boxes` - `[batch, num_boxes, 4]` decoded boxes, xyxy.
/// * `scores` - `[batch, num_boxes, num_classes]` softmax scores.
/// * `iou_threshold` - overlap above which the lower-scored box dies.
/// * `score_threshold` - minimum class confidence to enter suppression.
///
/// # Returns
///
/// Kept boxes grouped as `result[batch][class - 1]`, each group sorted by
/// descending score.
pub fn nms<B: Backend>(
    boxes: Tensor<B, 3>,
    scores: Tensor<B, 3>,
    iou_threshold: f32,
    score_threshold: f32,
) -> Vec<Vec<Vec<BoundingBox>>> {
    let [batch_size, num_boxes, _] = boxes.dims();
    let [_, _, num_classes] = scores.dims();

    let boxes_v = boxes.to_data().to_vec::<f32>().unwrap();
    let scores_v = scores.to_data().to_vec::<f32>().unwrap();

    let mut result = vec![];

    for b in 0..batch_size {
        let mut batch_groups = vec![];

        // Class 0 is background and is never reported
        for cls_id in 1..num_classes {
            let mut candidates: Vec<BoundingBox> = (0..num_boxes)
                .filter_map(|i| {
                    let score = scores_v[(b * num_boxes + i) * num_classes + cls_id];

                    if score < score_threshold {
                        return None;
                    }

                    let base = (b * num_boxes + i) * 4;
                    Some(BoundingBox {
                        coords: [
                            boxes_v[base],
                            boxes_v[base + 1],
                            boxes_v[base + 2],
                            boxes_v[base + 3],
                        ],
                        cls_id,
                        score,
                    })
                })
                .collect();

            candidates.sort_by(|a, c| c.score.total_cmp(&a.score));

            let mut kept: Vec<BoundingBox> = vec![];

            for candidate in candidates {
                if kept.iter().all(|k| k.iou(&candidate) < iou_threshold) {
                    kept.push(candidate);
                }
            }

            batch_groups.push(kept);
        }

        result.push(batch_groups);
    }

    result
}
