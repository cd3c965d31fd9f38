use burn::{
    record::{CompactRecorder, Recorder},
    tensor::{Tensor, activation::softmax, backend::Backend, cast::ToElement},
};

use crate::{
    anchors::{decode_box_offsets, generate_all_default_boxes},
    broadcast,
    config::{HEIGHT, VARIANCES, WIDTH},
    labels::ClassMap,
    models::ssd::SSD,
    nms,
    transforms::pipeline::Transform,
};

/// Runs a trained checkpoint over a single image and writes the annotated
/// result to `./ssd512_output.jpg`.
///
/// The image goes through the validation preprocessing (bilinear resize to
/// 512×512, mean subtraction, BGR reorder), one forward pass produces the
/// per-anchor class scores and offsets, the offsets are decoded against
/// the default boxes, and per-class NMS reduces the anchor pile to the
/// final detections, which are scaled back to the source image's pixel
/// space for drawing.
///
/// # Parameters
/// - `image_path`: input image file.
/// - `weights_file`: checkpoint produced by training.
/// - `class_map`: model id to species name mapping for the overlay.
/// - `device`: where inference runs.
/// - `iou_overlap_thresh`: NMS suppression threshold.
/// - `conf_score_thresh`: minimum class confidence to report a detection.
pub fn infer<B: Backend>(
    image_path: &str,
    weights_file: &str,
    class_map: &ClassMap,
    device: &B::Device,
    iou_overlap_thresh: &f32,
    conf_score_thresh: &f32,
) {
    let record = CompactRecorder::new()
        .load(weights_file.into(), device)
        .unwrap_or_else(|_| panic!("Trained model not found at {}", weights_file));

    let image = image::open(image_path)
        .unwrap_or_else(|_| panic!("Couldn't open image {}", image_path))
        .to_rgb8();

    let (image_t, _, _) = Transform::new(image.clone(), None, None, device)
        .resize_bilinear(WIDTH, HEIGHT)
        .normalize()
        .finish()
        .unwrap();

    let model: SSD<B> = SSD::new(device, Some(record), class_map.count());

    // Each default box carries one score per class and a set of offsets
    // that translate the box onto the object it claims to see. Most boxes
    // score highest for class 0 (background) and are dropped immediately.

    let (class_predictors, box_predictors, conv_layers) =
        model.forward(image_t.clone().unsqueeze());

    let default_boxes: Tensor<B, 2> = generate_all_default_boxes(conv_layers).squeeze(0);
    let box_predictions = box_predictors.squeeze::<2>(0);
    let class_predictors_sm = softmax(class_predictors.clone(), 2);

    let class_predictions = class_predictors_sm.clone().argmax(2).flatten::<1>(0, 2);

    let foreground_cnt = class_predictions
        .clone()
        .bool()
        .int()
        .sum()
        .into_scalar()
        .to_i32();

    if foreground_cnt == 0 {
        log::info!("no objects detected above the confidence threshold");
        return;
    }

    // Keep only the boxes whose best class is not background and decode
    // their offsets against the matching default boxes

    let class_pred_index = Tensor::cat(class_predictions.clone().bool().nonzero(), 0);

    let default_boxes = default_boxes.select(0, class_pred_index.clone());
    let box_predictions = box_predictions.select(0, class_pred_index.clone());

    let gen_box_predictions = decode_box_offsets(
        box_predictions.clone(),
        default_boxes.clone(),
        VARIANCES,
    );

    let class_confidence = class_predictors_sm.clone().select(1, class_pred_index);

    let nms_boxes = nms::nms(
        gen_box_predictions.clone().unsqueeze(),
        class_confidence.clone(),
        *iou_overlap_thresh,
        *conf_score_thresh,
    );

    let mut labels_list = vec![];
    let mut bbox_list = vec![];

    for batch_gr in nms_boxes.iter() {
        for class_grp in batch_gr.iter() {
            for bbox in class_grp.iter() {
                bbox_list.push(bbox.to_tensor::<B>(device));
                labels_list.push(Tensor::from_data([bbox.cls_id as i32], device));
            }
        }
    }

    if bbox_list.is_empty() {
        log::info!("all candidate boxes were suppressed");
        return;
    }

    let bboxes = Tensor::cat(bbox_list, 0).reshape([-1, 4]);
    let labels = Tensor::cat(labels_list, 0);

    // Scale normalized boxes back to the source image's pixel space

    let source_dims: Tensor<B, 1> = Tensor::from_floats(
        [image.width(), image.height(), image.width(), image.height()],
        device,
    );

    let (a, b) = broadcast!(bboxes: Tensor<B, 2>, source_dims: Tensor<1>);
    let bboxes = a * b;

    Transform::new(image, Some(bboxes), Some(labels), device)
        .clean_boxes()
        .unwrap()
        .save_as("./ssd512_output.jpg".into(), class_map);
}
