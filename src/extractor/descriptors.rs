use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

use crate::distance::{l2_normalize, norm};

/// 灰度缩略图特征，像素值归一化到 [0, 1] 后去均值并归一化
///
/// 纯色图片去均值后为零向量，此时返回均匀的单位向量
pub fn thumbnail(img: &RgbImage, side: u32) -> Vec<f32> {
    let gray = imageops::grayscale(img);
    let small = imageops::resize(&gray, side, side, FilterType::Triangle);
    let mut v = small.pixels().map(|p| p.0[0] as f32 / 255.0).collect::<Vec<_>>();

    let mean = v.iter().sum::<f32>() / v.len() as f32;
    v.iter_mut().for_each(|x| *x -= mean);
    normalize_or_uniform(&mut v);
    v
}

/// RGB 联合颜色直方图，每个通道 bins 个分桶
pub fn histogram(img: &RgbImage, bins: u32) -> Vec<f32> {
    let bins = bins as usize;
    let mut hist = vec![0f32; bins * bins * bins];
    for p in img.pixels() {
        let [r, g, b] = p.0.map(|c| c as usize * bins / 256);
        hist[(r * bins + g) * bins + b] += 1.0;
    }
    normalize_or_uniform(&mut hist);
    hist
}

/// 差异哈希，相邻像素亮度递增记为 +1，否则为 -1，共 64 维
pub fn dhash(img: &RgbImage) -> Vec<f32> {
    let gray = imageops::grayscale(img);
    let small: GrayImage = imageops::resize(&gray, 9, 8, FilterType::Triangle);
    let data = small.as_raw();

    let mut v = Vec::with_capacity(64);
    for chunk in data.chunks_exact(9) {
        for j in 0..8 {
            v.push(if chunk[j] < chunk[j + 1] { 1.0 } else { -1.0 });
        }
    }
    // 64 个 ±1 的范数恒为 8
    v.iter_mut().for_each(|x| *x /= 8.0);
    v
}

/// 缩略图和颜色直方图的拼接，两部分权重相同
pub fn combined(img: &RgbImage, side: u32, bins: u32) -> Vec<f32> {
    let w = std::f32::consts::FRAC_1_SQRT_2;
    let mut v = thumbnail(img, side);
    v.extend(histogram(img, bins));
    v.iter_mut().for_each(|x| *x *= w);
    v
}

fn normalize_or_uniform(v: &mut [f32]) {
    // 浮点误差可能让纯色图片去均值后留下极小的残差
    if norm(v) < 1e-6 {
        let u = 1.0 / (v.len() as f32).sqrt();
        v.iter_mut().for_each(|x| *x = u);
    } else {
        l2_normalize(v);
    }
}
