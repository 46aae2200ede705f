use chrono::NaiveDate;
use image::ImageFormat;
use std::io::Cursor;
use zeroblur::decode::{decode_burst, load_burst_from_paths};
use zeroblur::focus_stack::progress::{CollectingSink, NullSink};
use zeroblur::focus_stack::{stack_frames, FocusStackConfig};
use zeroblur::storage::{encode_jpeg, save_frame};
use zeroblur::testing::{focus_burst, textured_frame};
use zeroblur::types::Frame;

fn png_bytes(frame: &Frame) -> Vec<u8> {
    let img = image::RgbImage::from_vec(
        frame.width() as u32,
        frame.height() as u32,
        frame.data().to_vec(),
    )
    .expect("rgb frame");
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

#[test]
fn save_frame_respects_quality() {
    let frame = textured_frame(256, 256, 4).unwrap();

    let low = encode_jpeg(&frame, 10).expect("encode low quality");
    let high = encode_jpeg(&frame, 95).expect("encode high quality");

    assert!(!low.is_empty(), "low-quality output should not be empty");
    assert!(
        high.len() > low.len(),
        "expected high quality JPEG to be larger (low={}, high={})",
        low.len(),
        high.len()
    );
}

#[test]
fn decode_stack_and_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let burst = focus_burst(48, 48, 3, 1).unwrap();

    let mut paths = Vec::new();
    for (i, frame) in burst.iter().enumerate() {
        let path = dir.path().join(format!("frame_{}.png", i));
        std::fs::write(&path, png_bytes(frame)).expect("write input");
        paths.push(path);
    }

    let mut sink = CollectingSink::new();
    let frames = load_burst_from_paths(&paths, &mut sink).expect("decode burst");
    assert_eq!(frames, burst, "PNG decoding should be lossless");
    assert!(sink.contains("Loading image 3"));

    let result = stack_frames(frames, &FocusStackConfig::default(), &mut sink).expect("stack");

    let burst_time = NaiveDate::from_ymd_opt(2025, 1, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 1))
        .expect("timestamp");
    let out_dir = dir.path().join("out");
    let path = save_frame(&result.merged_frame, &out_dir, "ZeroBlur", &burst_time, 100)
        .expect("save merged frame");

    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("ZeroBlur_20250131_235901.jpg")
    );
    let reloaded = image::open(&path).expect("reopen output").to_rgb8();
    assert_eq!(reloaded.dimensions(), (48, 48));
}

#[test]
fn undecodable_items_are_skipped() {
    let good = png_bytes(&textured_frame(16, 16, 0).unwrap());
    let items: Vec<Vec<u8>> = vec![b"not an image".to_vec(), good.clone(), good];

    let frames = decode_burst(&items, &mut NullSink).expect("two frames decode");
    assert_eq!(frames.len(), 2);

    let result = stack_frames(frames, &FocusStackConfig::default(), &mut NullSink)
        .expect("stack survivors");
    assert_eq!(result.num_sources, 2);
    assert_eq!(result.reference_index, 1);
}
