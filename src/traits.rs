use crate::errors::Result;
use async_trait::async_trait;
use ndarray::prelude::*;

/// 気分分類モデルの抽象化
///
/// 依存関係逆転原則（DIP）に従い、具象クラスではなく抽象に依存する
pub trait MoodClassifier: Send + Sync {
    /// 1回の順伝播を実行し、ラベルごとのスコアを返す
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>>;

    /// モデルが宣言する出力クラス数（動的形状の場合は None）
    fn num_classes(&self) -> Option<usize>;
}

/// 学習済みモデルの取得元
///
/// 取得は非同期で行い、失敗時の再試行は ModelProvider 側が担当する
#[async_trait]
pub trait ModelSource<M>: Send + Sync {
    /// モデルを1回だけ取得・構築する
    async fn load(&self) -> Result<M>;

    /// ログ出力用の取得元の説明
    fn describe(&self) -> String;
}
