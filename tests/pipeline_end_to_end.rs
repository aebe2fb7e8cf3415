use faceboxes::{
    AnchorCache, FaceBoxesError, ImageMeta, ImageShape, NetworkInfo, PostProcessor,
    PostprocessConfig, RawOutputs, TensorDesc, TensorView,
};
use std::collections::HashMap;

const INPUT: usize = 1024;

fn processor(height: usize, width: usize) -> PostProcessor {
    let count = faceboxes::AnchorGenerator::default()
        .anchor_count(height, width)
        .unwrap();
    PostProcessor::new(
        &NetworkInfo::faceboxes(height, width, count),
        PostprocessConfig::default(),
    )
    .unwrap()
}

fn background_scores(rows: usize) -> Vec<f32> {
    (0..rows).flat_map(|_| [1.0, 0.0]).collect()
}

fn meta(height: usize, width: usize) -> ImageMeta {
    ImageMeta::new(ImageShape::new(height, width), ImageShape::new(INPUT, INPUT))
}

fn pair<'a>(n: usize, boxes: &'a [f32], scores: &'a [f32]) -> RawOutputs<'a> {
    RawOutputs::Pair {
        boxes: TensorView::new(boxes, &[1, n, 4]).unwrap(),
        scores: TensorView::new(scores, &[1, n, 2]).unwrap(),
    }
}

#[test]
fn all_background_yields_no_detections() {
    let post = processor(INPUT, INPUT);
    let n = post.anchors().len();
    assert_eq!(n, 21824);
    let boxes = vec![0.0f32; n * 4];
    let scores = background_scores(n);
    let detections = post.process(pair(n, &boxes, &scores), &meta(720, 1280)).unwrap();
    assert!(detections.is_empty());
}

#[test]
fn single_face_is_rescaled_to_original_image() {
    let post = processor(INPUT, INPUT);
    let n = post.anchors().len();
    let boxes = vec![0.0f32; n * 4];
    let mut scores = background_scores(n);
    // Level 1 (step 64, 256px prior) cell (row 8, col 8).
    let idx = 32 * 32 * 21 + 8 * 16 + 8;
    scores[idx * 2] = 0.05;
    scores[idx * 2 + 1] = 0.95;

    let detections = post.process(pair(n, &boxes, &scores), &meta(480, 640)).unwrap();
    assert_eq!(detections.len(), 1);
    let det = detections[0];
    // Anchor center (8.5 * 64 / 1024) = 0.53125, size 0.25.
    assert!((det.xmin - (0.53125 - 0.125) * 640.0).abs() < 1e-3);
    assert!((det.xmax - (0.53125 + 0.125) * 640.0).abs() < 1e-3);
    assert!((det.ymin - (0.53125 - 0.125) * 480.0).abs() < 1e-3);
    assert!((det.ymax - (0.53125 + 0.125) * 480.0).abs() < 1e-3);
    assert_eq!(det.score, 0.95);
    assert_eq!(det.label(), Some("Face"));
}

#[test]
fn duplicates_on_the_same_cell_are_suppressed() {
    let post = processor(INPUT, INPUT);
    let n = post.anchors().len();
    let boxes = vec![0.0f32; n * 4];
    let mut scores = background_scores(n);
    // Cell (4, 4) of level 0. Anchor 20 is the 128px prior; 16, 17 and 19
    // are the 64px priors at offsets (0, 0), (0, 0.5) and (0.5, 0.5).
    let base = (4 * 32 + 4) * 21;
    for (k, score) in [(20, 0.9f32), (16, 0.8), (19, 0.7)] {
        scores[(base + k) * 2 + 1] = score;
    }
    let detections = post
        .process(pair(n, &boxes, &scores), &meta(INPUT, INPUT))
        .unwrap();
    let kept: Vec<f32> = detections.iter().map(|d| d.score).collect();
    // Each 64px prior covers 1/4 of the 128px one; 16 and 19 overlap by
    // 2304 / 5888.
    assert_eq!(kept, vec![0.9, 0.8]);

    scores[(base + 17) * 2 + 1] = 0.85;
    let detections = post
        .process(pair(n, &boxes, &scores), &meta(INPUT, INPUT))
        .unwrap();
    let kept: Vec<f32> = detections.iter().map(|d| d.score).collect();
    // 17 overlaps both 16 and 19 by 3072 / 5120.
    assert_eq!(kept, vec![0.9, 0.85]);
}

#[test]
fn output_is_capped_at_keep_top_k() {
    let post = processor(INPUT, INPUT);
    let n = post.anchors().len();
    let boxes = vec![0.0f32; n * 4];
    let mut scores = background_scores(n);
    // First anchor (32px prior, offset 0) of 1000 distinct level-0 cells:
    // neighbours only touch, so none suppress each other.
    let mut survivors = Vec::new();
    for cell in 0..1000usize {
        let score = 0.6 + cell as f32 * 1e-4;
        scores[cell * 21 * 2 + 1] = score;
        survivors.push(score);
    }
    let detections = post.process(pair(n, &boxes, &scores), &meta(INPUT, INPUT)).unwrap();
    assert_eq!(detections.len(), 750);

    survivors.sort_by(|a, b| b.total_cmp(a));
    let got: Vec<f32> = detections.iter().map(|d| d.score).collect();
    assert_eq!(got, survivors[..750].to_vec());
}

#[test]
fn named_and_paired_outputs_agree() {
    let post = processor(256, 256);
    let n = post.anchors().len();
    let boxes: Vec<f32> = (0..n * 4).map(|i| ((i % 7) as f32 - 3.0) * 0.1).collect();
    let scores: Vec<f32> = (0..n)
        .flat_map(|i| {
            let fg = if i % 5 == 0 { 0.55 + (i % 40) as f32 * 0.01 } else { 0.1 };
            [1.0 - fg, fg]
        })
        .collect();

    let paired = post.process(pair(n, &boxes, &scores), &meta(300, 400)).unwrap();

    let mut named = HashMap::new();
    named.insert("scores", TensorView::new(&scores, &[1, n, 2]).unwrap());
    named.insert("boxes", TensorView::new(&boxes, &[1, n, 4]).unwrap());
    let by_name = post
        .process(RawOutputs::Named(named), &meta(300, 400))
        .unwrap();

    assert!(!paired.is_empty());
    assert_eq!(paired, by_name);
}

#[test]
fn cached_anchors_match_fresh_generation() {
    let cache = AnchorCache::default();
    let count = faceboxes::AnchorGenerator::default()
        .anchor_count(320, 320)
        .unwrap();
    let network = NetworkInfo::faceboxes(320, 320, count);
    let a = PostProcessor::with_cache(&network, PostprocessConfig::default(), &cache).unwrap();
    let b = PostProcessor::new(&network, PostprocessConfig::default()).unwrap();
    assert_eq!(a.anchors(), b.anchors());
    assert_eq!(cache.len(), 1);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let p =
                    PostProcessor::with_cache(&network, PostprocessConfig::default(), &cache)
                        .unwrap();
                assert_eq!(p.anchors().len(), count);
            });
        }
    });
    assert_eq!(cache.len(), 1);
}

#[test]
fn construction_rejects_malformed_networks() {
    let mut two_inputs = NetworkInfo::faceboxes(64, 64, 86);
    two_inputs
        .inputs
        .push(TensorDesc::new("extra", &[1, 3, 64, 64]));
    assert_eq!(
        PostProcessor::new(&two_inputs, PostprocessConfig::default()).unwrap_err(),
        FaceBoxesError::InputCount { got: 2 }
    );

    let mut gray = NetworkInfo::faceboxes(64, 64, 86);
    gray.inputs[0].shape = vec![1, 1, 64, 64];
    assert_eq!(
        PostProcessor::new(&gray, PostprocessConfig::default()).unwrap_err(),
        FaceBoxesError::InvalidInputShape {
            shape: vec![1, 1, 64, 64],
            reason: "expected 3-channel input",
        }
    );

    let mut batched = NetworkInfo::faceboxes(64, 64, 86);
    batched.inputs[0].shape = vec![2, 3, 64, 64];
    assert!(matches!(
        PostProcessor::new(&batched, PostprocessConfig::default()).unwrap_err(),
        FaceBoxesError::InvalidInputShape { .. }
    ));

    let mut three_outputs = NetworkInfo::faceboxes(64, 64, 86);
    three_outputs
        .outputs
        .push(TensorDesc::new("landmarks", &[1, 86, 10]));
    assert_eq!(
        PostProcessor::new(&three_outputs, PostprocessConfig::default()).unwrap_err(),
        FaceBoxesError::OutputCount { got: 3 }
    );

    let mut uneven = NetworkInfo::faceboxes(64, 64, 86);
    uneven.outputs[1].shape = vec![1, 87, 2];
    assert_eq!(
        PostProcessor::new(&uneven, PostprocessConfig::default()).unwrap_err(),
        FaceBoxesError::RowCountMismatch {
            expected: 86,
            got: 87,
            context: "score output",
        }
    );

    let mut odd = NetworkInfo::faceboxes(64, 64, 86);
    odd.outputs[0].shape = vec![1, 86, 3];
    assert!(matches!(
        PostProcessor::new(&odd, PostprocessConfig::default()).unwrap_err(),
        FaceBoxesError::InvalidOutputShape { .. }
    ));

    assert!(PostProcessor::new(
        &NetworkInfo::faceboxes(64, 64, 86),
        PostprocessConfig::default()
    )
    .is_ok());
}

#[test]
fn per_call_shape_errors_are_reported() {
    let post = processor(64, 64);
    let n = post.anchors().len();
    let boxes = vec![0.0f32; n * 4];
    let scores = background_scores(n);

    let err = post
        .process(pair(n - 1, &boxes, &scores), &meta(64, 64))
        .unwrap_err();
    assert!(matches!(err, FaceBoxesError::InvalidOutputShape { .. }));

    let err = post
        .process(pair(n, &boxes, &scores), &meta(0, 64))
        .unwrap_err();
    assert_eq!(
        err,
        FaceBoxesError::InvalidDimensions {
            height: 0,
            width: 64
        }
    );
}
