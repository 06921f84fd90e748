mod descriptors;

use std::io::Cursor;

use clap::ValueEnum;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use log::debug;
use serde::Serialize;

pub use self::descriptors::*;
use crate::config::ExtractorOptions;
use crate::error::{Error, Result};

/// 将图片转换为定长向量
///
/// 实现必须是确定性的：相同的输入总是得到相同的输出，且输出长度恒为 [`FeatureExtractor::dim`]
pub trait FeatureExtractor: Send + Sync {
    /// 模型名称
    fn model(&self) -> &str;

    /// 输出向量的维度
    fn dim(&self) -> usize;

    /// 从图片的原始字节中提取特征
    fn extract(&self, data: &[u8]) -> Result<Vec<f32>>;
}

/// 特征提取模型
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// 灰度缩略图
    Thumbnail,
    /// RGB 颜色直方图
    Histogram,
    /// 差异哈希
    Dhash,
    /// 缩略图 + 颜色直方图
    Combined,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Histogram => "histogram",
            Self::Dhash => "dhash",
            Self::Combined => "combined",
        }
    }

    /// 在给定参数下输出向量的维度
    pub fn dim(&self, opts: &ExtractorOptions) -> usize {
        let thumbnail = (opts.thumbnail_side * opts.thumbnail_side) as usize;
        let histogram = opts.histogram_bins.pow(3) as usize;
        match self {
            Self::Thumbnail => thumbnail,
            Self::Histogram => histogram,
            Self::Dhash => 64,
            Self::Combined => thumbnail + histogram,
        }
    }
}

/// 基于 `image` 的手工特征提取器
#[derive(Debug, Clone)]
pub struct ImageExtractor {
    opts: ExtractorOptions,
    dim: usize,
}

impl ImageExtractor {
    pub fn new(opts: ExtractorOptions) -> Result<Self> {
        if opts.input_size == 0 || opts.thumbnail_side == 0 || opts.histogram_bins == 0 {
            return Err(Error::InvalidInput("extractor sizes must be positive".into()));
        }
        if opts.thumbnail_side > opts.input_size {
            return Err(Error::InvalidInput(format!(
                "thumbnail side {} exceeds input size {}",
                opts.thumbnail_side, opts.input_size
            )));
        }
        if opts.histogram_bins > 256 {
            return Err(Error::InvalidInput("histogram bins must not exceed 256".into()));
        }
        let dim = opts.model.dim(&opts);
        Ok(Self { opts, dim })
    }

    /// 创建提取器，并确认其输出维度与索引一致
    pub fn with_expected_dim(opts: ExtractorOptions, expected: usize) -> Result<Self> {
        let extractor = Self::new(opts)?;
        if extractor.dim != expected {
            return Err(Error::DimensionMismatch { expected, actual: extractor.dim });
        }
        Ok(extractor)
    }

    /// 解码图片并缩放到工作尺寸
    pub fn decode(&self, data: &[u8]) -> Result<RgbImage> {
        // 先只读取图片头，拒绝过大的图片
        let (width, height) = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| Error::Decode(e.to_string()))?
            .into_dimensions()?;
        if width as u64 * height as u64 > self.opts.max_pixels {
            return Err(Error::Decode(format!(
                "image too large: {}x{} exceeds {} pixels",
                width, height, self.opts.max_pixels
            )));
        }

        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| Error::Decode(e.to_string()))?
            .decode()?;
        debug!("解码图片：{}x{}", width, height);

        let size = self.opts.input_size;
        Ok(img.resize_exact(size, size, FilterType::Triangle).to_rgb8())
    }
}

impl FeatureExtractor for ImageExtractor {
    fn model(&self) -> &str {
        self.opts.model.name()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn extract(&self, data: &[u8]) -> Result<Vec<f32>> {
        let img = self.decode(data)?;
        let v = match self.opts.model {
            ModelKind::Thumbnail => thumbnail(&img, self.opts.thumbnail_side),
            ModelKind::Histogram => histogram(&img, self.opts.histogram_bins),
            ModelKind::Dhash => dhash(&img),
            ModelKind::Combined => {
                combined(&img, self.opts.thumbnail_side, self.opts.histogram_bins)
            }
        };
        debug_assert_eq!(v.len(), self.dim);
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgb};

    use super::*;
    use crate::distance::Metric;

    fn png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(vec![]);
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn stripes(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| if (x / 8) % 2 == 0 { Rgb(color) } else { Rgb([0, 0, 0]) })
    }

    fn options(model: ModelKind) -> ExtractorOptions {
        ExtractorOptions { model, input_size: 64, ..ExtractorOptions::default() }
    }

    #[test]
    fn test_dimensions() {
        let data = png(&stripes(40, 30, [200, 10, 10]));
        for (model, dim) in [
            (ModelKind::Thumbnail, 256),
            (ModelKind::Histogram, 512),
            (ModelKind::Dhash, 64),
            (ModelKind::Combined, 768),
        ] {
            let extractor = ImageExtractor::new(options(model)).unwrap();
            assert_eq!(extractor.dim(), dim);
            assert_eq!(extractor.model(), model.name());
            assert_eq!(extractor.extract(&data).unwrap().len(), dim);
        }
    }

    #[test]
    fn test_deterministic() {
        let extractor = ImageExtractor::new(options(ModelKind::Combined)).unwrap();
        let data = png(&stripes(50, 50, [10, 200, 10]));
        assert_eq!(extractor.extract(&data).unwrap(), extractor.extract(&data).unwrap());
    }

    #[test]
    fn test_similar_images_are_closer() {
        let extractor = ImageExtractor::new(options(ModelKind::Combined)).unwrap();
        let red = extractor.extract(&png(&stripes(64, 64, [220, 20, 20]))).unwrap();
        let red2 = extractor.extract(&png(&stripes(64, 64, [210, 30, 25]))).unwrap();
        let blue = RgbImage::from_fn(64, 64, |_, y| Rgb([0, 0, (y * 4) as u8]));
        let blue = extractor.extract(&png(&blue)).unwrap();
        let metric = Metric::Cosine;
        assert!(metric.distance(&red, &red2) < metric.distance(&red, &blue));
    }

    #[test]
    fn test_decode_error() {
        let extractor = ImageExtractor::new(options(ModelKind::Dhash)).unwrap();
        let err = extractor.extract(b"definitely not an image").unwrap_err();
        assert_eq!(err.code(), "DECODE_ERROR");
        let err = extractor.extract(&[]).unwrap_err();
        assert_eq!(err.code(), "DECODE_ERROR");
    }

    #[test]
    fn test_max_pixels() {
        let opts = ExtractorOptions { max_pixels: 100, ..options(ModelKind::Dhash) };
        let extractor = ImageExtractor::new(opts).unwrap();
        let err = extractor.extract(&png(&stripes(20, 20, [1, 2, 3]))).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_expected_dim() {
        assert!(ImageExtractor::with_expected_dim(options(ModelKind::Dhash), 64).is_ok());
        let err = ImageExtractor::with_expected_dim(options(ModelKind::Dhash), 128).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 128, actual: 64 }));
    }

    #[test]
    fn test_invalid_options() {
        let opts = ExtractorOptions { thumbnail_side: 0, ..ExtractorOptions::default() };
        assert!(matches!(ImageExtractor::new(opts), Err(Error::InvalidInput(_))));
    }
}
