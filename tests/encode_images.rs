use color_hints::core_modules::global_histogram::GlobalHistogram;
use color_hints::pipeline::GLOBAL_INPUT_SIZE;
use color_hints::{
    BatchEncoder, ColorDistributionModel, EncoderConfig, GridSelectorConfig, HintEncoder, HintError, Method,
    SparseColorMask,
};
use image::{Rgb, RgbImage};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn stripes(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| match x * 3 / width {
        0 => Rgb([210, 40, 40]),
        1 => Rgb([40, 170, 60]),
        _ => Rgb([40, 60, 210]),
    })
}

fn write_image(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn config(out: &Path, method: Method) -> EncoderConfig {
    EncoderConfig {
        output_dir: out.to_path_buf(),
        method,
        size: 64,
        grid: GridSelectorConfig {
            grid_size: 8,
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn grid_method_writes_gray_and_mask() {
    let tmp = TempDir::new().unwrap();
    let src = write_image(tmp.path(), "photo.png", &stripes(90, 60));
    let out = tmp.path().join("out");

    let report = HintEncoder::new(config(&out, Method::Grid)).encode(&src).unwrap();
    assert_eq!(report.gray_path, out.join("photo.gray.png"));
    assert_eq!(report.sidecars, vec![out.join("photo.mask")]);
    assert_eq!(report.hint_cells, 64);

    let gray = image::open(&report.gray_path).unwrap();
    assert_eq!((gray.width(), gray.height()), (90, 60));
    let mask = SparseColorMask::from_file(&report.sidecars[0]).unwrap();
    assert_eq!(mask.size(), 64);
    assert_eq!(mask.active_count(), 64);
}

#[test]
fn grid_selective_writes_two_tagged_masks() {
    let tmp = TempDir::new().unwrap();
    let src = write_image(tmp.path(), "photo.png", &stripes(90, 60));
    let out = tmp.path().join("out");

    let report = HintEncoder::new(config(&out, Method::GridSelective)).encode(&src).unwrap();
    assert_eq!(report.sidecars, vec![out.join("photo_1.mask"), out.join("photo_2.mask")]);
    let selective = SparseColorMask::from_file(&report.sidecars[1]).unwrap();
    // One hint per stripe at least; smoothing may leave thin seam blobs as well.
    assert!(selective.active_count() >= 3, "{}", selective.active_count());
}

#[test]
fn exclusion_writes_fewer_hints_than_plain_grid() {
    let tmp = TempDir::new().unwrap();
    let src = write_image(tmp.path(), "photo.png", &stripes(90, 60));
    let plain = HintEncoder::new(config(&tmp.path().join("a"), Method::Grid)).encode(&src).unwrap();
    let excluded = HintEncoder::new(config(&tmp.path().join("b"), Method::GridExclude))
        .encode(&src)
        .unwrap();
    assert!(excluded.hint_cells < plain.hint_cells);
}

#[test]
fn stock_method_writes_only_gray() {
    let tmp = TempDir::new().unwrap();
    let src = write_image(tmp.path(), "photo.png", &stripes(30, 30));
    let report = HintEncoder::new(config(tmp.path(), Method::Stock)).encode(&src).unwrap();
    assert!(report.sidecars.is_empty());
    assert!(report.gray_path.exists());
}

struct ConstantModel;

impl ColorDistributionModel for ConstantModel {
    fn distribution(&self, rgb: &RgbImage) -> color_hints::Result<GlobalHistogram> {
        assert_eq!(rgb.dimensions(), (GLOBAL_INPUT_SIZE as u32, GLOBAL_INPUT_SIZE as u32));
        let mut histogram = GlobalHistogram::zeros(313);
        histogram.bins[7] = 0.5;
        Ok(histogram)
    }
}

#[test]
fn global_method_needs_a_model() {
    let tmp = TempDir::new().unwrap();
    let src = write_image(tmp.path(), "photo.png", &stripes(40, 30));
    let out = tmp.path().join("out");

    let err = HintEncoder::new(config(&out, Method::Global)).encode(&src).unwrap_err();
    assert!(matches!(err, HintError::MissingModel { .. }));
    assert!(!out.exists(), "nothing is written before the configuration is accepted");

    let report = HintEncoder::new(config(&out, Method::Global))
        .with_model(Box::new(ConstantModel))
        .encode(&src)
        .unwrap();
    assert_eq!(report.sidecars, vec![out.join("photo.glob_dist")]);
    let histogram = GlobalHistogram::decode(&report.sidecars[0], 313).unwrap();
    assert_eq!(histogram.nonzero().collect::<Vec<_>>(), vec![(7, 0.5)]);
}

#[test]
fn config_loads_from_json() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("encoder.json");
    std::fs::write(&path, r#"{"method": "grid-exclude", "patch_radius": 1, "grid": {"grid_size": 5}}"#).unwrap();
    let config = EncoderConfig::from_json_file(&path).unwrap();
    assert_eq!(config.method, Method::GridExclude);
    assert_eq!(config.patch_radius, 1);
    assert_eq!(config.grid_config(true).grid_size, 5);

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(EncoderConfig::from_json_file(&path), Err(HintError::Config(_))));
}

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let tmp = TempDir::new().unwrap();
    let a = write_image(tmp.path(), "a.png", &stripes(40, 40));
    let missing = tmp.path().join("missing.png");
    let b = write_image(tmp.path(), "b.png", &stripes(50, 20));
    let out = tmp.path().join("out");

    let batch = BatchEncoder::new(HintEncoder::new(config(&out, Method::Grid))).with_max_in_flight(2);
    let results = batch.encode_all(vec![b.clone(), missing.clone(), a.clone()]).await;

    let paths: Vec<PathBuf> = results.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(paths, vec![b, missing, a]);
    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(HintError::Image(_)) | Err(HintError::Io(_))));
    assert_eq!(results[2].1.as_ref().unwrap().sidecars, vec![out.join("a.mask")]);
}

#[tokio::test]
async fn batch_over_directory_skips_non_images() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    std::fs::create_dir_all(&input).unwrap();
    write_image(&input, "b.png", &stripes(30, 30));
    write_image(&input, "a.png", &stripes(30, 30));
    std::fs::write(input.join("notes.txt"), "hello").unwrap();
    let out = tmp.path().join("out");

    let batch = BatchEncoder::new(HintEncoder::new(config(&out, Method::Grid)));
    let results = batch.encode_dir(&input).await.unwrap();
    let names: Vec<String> = results
        .iter()
        .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png"]);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
}
