use crate::errors::{CatMoodError, Result};
use crate::traits::{MoodClassifier, ModelSource};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::prelude::*;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum ScoreMode {
    Fixed(Vec<f32>),
    Brightness(usize),
    Panic(usize),
}

/// テスト用のモック気分分類モデル
#[derive(Debug, Clone)]
pub struct MockMoodClassifier {
    mode: ScoreMode,
    dark_delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockMoodClassifier {
    /// 入力に関係なく固定スコアを返す
    pub fn fixed(scores: Vec<f32>) -> Self {
        Self {
            mode: ScoreMode::Fixed(scores),
            dark_delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 平均輝度で勝ちラベルを決める（暗い画像は先頭、明るい画像は末尾）
    pub fn by_brightness(num_classes: usize) -> Self {
        Self {
            mode: ScoreMode::Brightness(num_classes),
            dark_delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 順伝播中にパニックする（ランタイム障害の再現）
    pub fn panicking(num_classes: usize) -> Self {
        Self {
            mode: ScoreMode::Panic(num_classes),
            dark_delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 暗い画像（平均輝度 < 0.5）の推論だけを遅らせる
    pub fn with_dark_delay(mut self, delay: Duration) -> Self {
        self.dark_delay = Some(delay);
        self
    }

    /// 順伝播の実行回数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MoodClassifier for MockMoodClassifier {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mean = tensor.mean().unwrap_or(0.0);

        if let Some(delay) = self.dark_delay {
            if mean < 0.5 {
                std::thread::sleep(delay);
            }
        }

        match &self.mode {
            ScoreMode::Fixed(scores) => Ok(scores.clone()),
            ScoreMode::Brightness(n) => {
                let winner = ((mean * *n as f32) as usize).min(n.saturating_sub(1));
                Ok((0..*n).map(|i| if i == winner { 0.9 } else { 0.02 }).collect())
            }
            ScoreMode::Panic(_) => panic!("simulated runtime fault"),
        }
    }

    fn num_classes(&self) -> Option<usize> {
        match &self.mode {
            ScoreMode::Fixed(scores) => Some(scores.len()),
            ScoreMode::Brightness(n) | ScoreMode::Panic(n) => Some(*n),
        }
    }
}

/// 指定回数だけ失敗してからモデルを返すモック取得元
#[derive(Debug, Clone)]
pub struct ScriptedModelSource<M> {
    model: M,
    failures: u32,
    permanent: bool,
    latency: Option<Duration>,
    attempts: Arc<AtomicU32>,
}

impl<M: Clone + Send + Sync> ScriptedModelSource<M> {
    pub fn new(model: M, failures_before_success: u32) -> Self {
        Self {
            model,
            failures: failures_before_success,
            permanent: false,
            latency: None,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn always_failing(model: M) -> Self {
        Self::new(model, u32::MAX)
    }

    /// 失敗を再試行不可能な設定エラーとして返す
    pub fn with_permanent_error(mut self) -> Self {
        self.permanent = true;
        self
    }

    /// 1回の取得にかかる時間
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// これまでの取得試行回数（クローン間で共有）
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<M: Clone + Send + Sync> ModelSource<M> for ScriptedModelSource<M> {
    async fn load(&self) -> Result<M> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if attempt <= self.failures {
            if self.permanent {
                return Err(CatMoodError::config("simulated output width mismatch"));
            }
            return Err(CatMoodError::Fetch {
                url: "mock://model.onnx".to_string(),
                reason: format!("simulated failure on attempt {attempt}"),
            });
        }
        Ok(self.model.clone())
    }

    fn describe(&self) -> String {
        "mock://model.onnx".to_string()
    }
}

/// 単色の PNG 画像を生成する
pub fn solid_png(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value; 3])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("encoding to an in-memory buffer");
    buf.into_inner()
}

/// テスト用のファクトリー関数
pub fn create_mock_model() -> MockMoodClassifier {
    MockMoodClassifier::by_brightness(crate::labels::DEFAULT_MOODS.len())
}
