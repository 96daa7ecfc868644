// THEORY:
// Every artefact the encoder writes is named after its source image, so a decoder
// can find the gray rendition, masks and histogram from the image name alone.
// These are pure string transforms with no filesystem access.
//
// Up to two extensions are removed from the source name, so a derived name such as
// `photo.gray.png` maps back to the same stem as `photo.png`. A leading dot is part
// of the name, not an extension (`.hidden` has no extension).

use std::path::{Path, PathBuf};

pub const GRAY_SUFFIX: &str = ".gray";
pub const MASK_EXTENSION: &str = ".mask";
pub const GLOB_DIST_EXTENSION: &str = ".glob_dist";

/// Splits off the last extension, dot included.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if !name[..i].chars().all(|c| c == '.') => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// `(stem, last extension, second-to-last extension)` of the file name of `path`.
pub fn split_name(path: impl AsRef<Path>) -> (String, String, String) {
    let name = file_name(path.as_ref());
    let (rest, first) = split_extension(name);
    let (stem, second) = split_extension(rest);
    (stem.to_string(), first.to_string(), second.to_string())
}

/// `photo.png` -> `photo.gray.png`
pub fn gray_filename(path: impl AsRef<Path>) -> String {
    let (stem, ext, _) = split_name(path);
    format!("{stem}{GRAY_SUFFIX}{ext}")
}

/// `photo.png` -> `photo.mask`, or `photo_<tag>.mask` with a non-empty tag.
pub fn mask_filename(path: impl AsRef<Path>, tag: &str) -> String {
    let (stem, _, _) = split_name(path);
    if tag.is_empty() {
        format!("{stem}{MASK_EXTENSION}")
    } else {
        format!("{stem}_{tag}{MASK_EXTENSION}")
    }
}

/// Histogram sidecar next to the image: `dir/photo.jpg` -> `dir/photo.glob_dist`.
pub fn glob_dist_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let (stem, _, _) = split_name(path);
    let name = format!("{stem}{GLOB_DIST_EXTENSION}");
    match path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// `photo.png`, `grid` -> `photo_recolored_grid.png`
pub fn recolored_filename(path: impl AsRef<Path>, method: &str) -> String {
    let (stem, ext, _) = split_name(path);
    format!("{stem}_recolored_{method}{ext}")
}
