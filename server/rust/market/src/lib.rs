//! tonmart-market: マーケットの資金移動を伴う操作。
//!
//! NFT ギフトの購入、チャンネルの売買、オークション入札、TON 出金を、
//! 冪等キー・分散ロック・トランザクションで保護して実行する。

pub mod adapter;
pub mod domain;
pub mod infrastructure;
pub mod usecase;

/// テスト用の外部連携フェイクとヘルパー（統合テストから利用）
pub mod test_support;
