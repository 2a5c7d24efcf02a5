use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tonmart_distributed_lock::FallbackPolicy;

/// Operation はロックとトランザクションで保護される 1 つの業務操作。
///
/// `execute` はロック保持中かつ開いたトランザクション内でのみ呼ばれる。
/// 外部システムへの呼び出しはここに含めず、`OperationOrchestrator::call_outbound` で
/// ロックとトランザクションの外から行うこと。
#[async_trait]
pub trait Operation<S: Send>: Send + Sync {
    /// 冪等キーで保存・再生される結果
    type Output: Serialize + DeserializeOwned + Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// 冪等レコードとログに残る操作名
    fn name(&self) -> &'static str;

    /// 競合するリソースのロックキー（例: `nft:buy:42`）。順序は問わない。
    fn lock_keys(&self) -> Vec<String>;

    /// リクエスト内容のフィンガープリント。同じ冪等キーの別リクエストへの再利用を検出する。
    fn fingerprint(&self) -> Option<String> {
        None
    }

    /// ロックストアに到達できない場合の振る舞い。
    ///
    /// None ならオーケストレーターの既定に従う。残高を動かす操作は
    /// `Some(FallbackPolicy::FailClosed)` を返して既定の設定に左右されないようにすること。
    fn fallback(&self) -> Option<FallbackPolicy> {
        None
    }

    async fn execute(&self, session: &mut S) -> Result<Self::Output, Self::Error>;
}
