#![cfg(feature = "rayon")]

use faceboxes::lowlevel::BoxDecoder;
use faceboxes::{
    AnchorGenerator, ImageMeta, ImageShape, NetworkInfo, PostProcessor, PostprocessConfig,
    RawOutputs, TensorView, Variance,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_outputs(n: usize, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let boxes = (0..n * 4).map(|_| rng.random_range(-2.0f32..2.0)).collect();
    let scores = (0..n)
        .flat_map(|_| {
            let fg = rng.random_range(0.0f32..1.0);
            [1.0 - fg, fg]
        })
        .collect();
    (boxes, scores)
}

#[test]
fn parallel_decode_matches_sequential() {
    let anchors = AnchorGenerator::default().generate(512, 384).unwrap();
    let (boxes, scores) = random_outputs(anchors.len(), 11);
    let decoder = BoxDecoder::new(Variance::default(), 0.5);

    let seq = decoder.decode_slices(&anchors, &boxes, &scores).unwrap();
    let par = decoder.decode_slices_par(&anchors, &boxes, &scores).unwrap();
    assert!(!seq.is_empty());
    assert_eq!(seq, par);
}

#[test]
fn parallel_pipeline_matches_sequential() {
    let (h, w) = (320, 480);
    let n = AnchorGenerator::default().anchor_count(h, w).unwrap();
    let network = NetworkInfo::faceboxes(h, w, n);
    let (boxes, scores) = random_outputs(n, 5);
    let meta = ImageMeta::new(ImageShape::new(600, 900), ImageShape::new(h, w));

    let run = |parallel: bool| {
        let cfg = PostprocessConfig {
            parallel,
            confidence_threshold: 0.9,
            ..PostprocessConfig::default()
        };
        let post = PostProcessor::new(&network, cfg).unwrap();
        let outputs = RawOutputs::Pair {
            boxes: TensorView::new(&boxes, &[1, n, 4]).unwrap(),
            scores: TensorView::new(&scores, &[1, n, 2]).unwrap(),
        };
        post.process(outputs, &meta).unwrap()
    };

    let seq = run(false);
    let par = run(true);
    assert!(!seq.is_empty());
    assert_eq!(seq, par);
}
