#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use vsearch::config::{ConfDir, IndexOptions, SearchOptions};
use vsearch::extractor::FeatureExtractor;
use vsearch::{SearchService, SearchServiceBuilder};

pub fn png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(vec![]);
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// 横向条纹，tone 控制颜色的细微差异
pub fn cat_image(tone: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(96, 96, |_, y| {
        if (y / 12) % 2 == 0 { Rgb([230, 140u8.saturating_add(tone), 40]) } else { Rgb([60, 30, 10]) }
    });
    png(&img)
}

/// 棋盘格
pub fn dog_image(tone: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(96, 96, |x, y| {
        if ((x / 16) + (y / 16)) % 2 == 0 {
            Rgb([30, 90u8.saturating_add(tone), 200])
        } else {
            Rgb([240, 240, 240])
        }
    });
    png(&img)
}

pub fn index_options(shards: usize) -> IndexOptions {
    IndexOptions { shards, ..IndexOptions::default() }
}

pub async fn open_service(dir: &Path) -> SearchService {
    SearchServiceBuilder::new(ConfDir::new(dir))
        .index_options(index_options(2))
        .open()
        .await
        .unwrap()
}

/// 使用自定义特征提取器打开服务
pub async fn open_with_extractor(
    dir: &Path,
    extractor: Arc<dyn FeatureExtractor>,
    search: SearchOptions,
) -> SearchService {
    SearchServiceBuilder::new(ConfDir::new(dir))
        .index_options(index_options(2))
        .search_options(search)
        .extractor(extractor)
        .open()
        .await
        .unwrap()
}

pub fn bytes(data: Vec<u8>) -> Arc<[u8]> {
    Arc::from(data)
}
