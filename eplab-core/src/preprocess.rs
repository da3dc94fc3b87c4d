use crate::error::{EplabError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use ndarray::{Array, Array4};
use std::path::Path;
use tracing::{Level, debug, span};

pub const WIDTH: u32 = 224;
pub const HEIGHT: u32 = 224;

// ImageNet statistics, R G B
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized NCHW model input, batch of one.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }

    pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[[0, channel, y, x]]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub filter: FilterType,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig {
            width: WIDTH,
            height: HEIGHT,
            mean: MEAN,
            std: STD,
            filter: FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        ImagePreprocessor { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn preprocess(&self, path: &Path) -> Result<ImageTensor> {
        let span = span!(Level::DEBUG, "preprocess");
        let _guard = span.enter();

        let img = image::open(path).map_err(|source| EplabError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Decoded {} ({}x{})",
            path.display(),
            img.width(),
            img.height()
        );

        Ok(self.preprocess_image(&img))
    }

    /*
    Steps, in order:
    1. RGBA8 with premultiplied alpha
    2. stretch to width x height, aspect ratio is not kept
    3. per channel (v / 255 - mean) / std, alpha dropped
    4. written as [0, c, y, x]
     */
    pub fn preprocess_image(&self, img: &DynamicImage) -> ImageTensor {
        let PreprocessConfig {
            width,
            height,
            mean,
            std,
            filter,
        } = self.config;

        let mut rgba = img.to_rgba8();
        premultiply_alpha(&mut rgba);

        let resized = imageops::resize(&rgba, width, height, filter);
        let pixels = resized.as_raw();
        let width = width as usize;

        let data = Array::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, c, y, x)| {
                let v = pixels[(y * width + x) * 4 + c] as f32 / 255.;
                (v - mean[c]) / std[c]
            },
        );

        ImageTensor { data }
    }
}

fn premultiply_alpha(img: &mut RgbaImage) {
    for px in img.pixels_mut() {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        for c in 0..3 {
            px[c] = ((px[c] as u16 * a + 127) / 255) as u8;
        }
    }
}
