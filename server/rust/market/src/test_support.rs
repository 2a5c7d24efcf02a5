//! テスト用の外部連携フェイクとヘルパー。
//! 統合テスト（tests/market_test.rs）から利用する。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::infrastructure::notifier::{SaleNotice, SellerNotifier};
use crate::infrastructure::ton_gateway::{GatewayError, TonGateway, TransferReceipt, TransferRequest};

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ---------------------------------------------------------------------------
// FakeTonGateway
// ---------------------------------------------------------------------------

/// 取引参照で送金を重複排除するインメモリの TonGateway。
#[derive(Default)]
pub struct FakeTonGateway {
    transfers: Mutex<HashMap<String, (TransferRequest, TransferReceipt)>>,
    submit_calls: AtomicU32,
    failing_submits: AtomicU32,
    failing_resolves: AtomicU32,
}

impl FakeTonGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 次の `n` 回の送金依頼をタイムアウトで失敗させる。
    pub fn fail_next_submits(&self, n: u32) {
        self.failing_submits.store(n, Ordering::SeqCst);
    }

    /// 次の `n` 回のウォレット解決を接続エラーで失敗させる。
    pub fn fail_next_resolves(&self, n: u32) {
        self.failing_resolves.store(n, Ordering::SeqCst);
    }

    /// 失敗したものも含めた送金依頼の回数
    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// 実際に行われた送金
    pub fn executed_transfers(&self) -> Vec<TransferRequest> {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|(request, _)| request.clone())
            .collect()
    }
}

#[async_trait]
impl TonGateway for FakeTonGateway {
    async fn resolve_wallet(&self, address: &str) -> Result<String, GatewayError> {
        if take_failure(&self.failing_resolves) {
            return Err(GatewayError::Unavailable("toncenter returned 503".to_string()));
        }
        let address = address.trim();
        if address.starts_with("EQ") || address.starts_with("UQ") {
            Ok(address.to_string())
        } else {
            Err(GatewayError::Rejected(format!("invalid wallet address: {address}")))
        }
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_submits) {
            return Err(GatewayError::Timeout("sendBoc timed out".to_string()));
        }
        let mut transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, receipt) = transfers
            .entry(request.reference.clone())
            .or_insert_with(|| {
                let receipt = TransferReceipt {
                    reference: request.reference.clone(),
                    tx_hash: format!("tx-{}", request.reference),
                };
                (request.clone(), receipt)
            });
        Ok(receipt.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// 送った通知を記録する SellerNotifier。
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<SaleNotice>>,
    failing: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: u32) {
        self.failing.store(n, Ordering::SeqCst);
    }

    pub fn notices(&self) -> Vec<SaleNotice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SellerNotifier for RecordingNotifier {
    async fn notify_sale(&self, notice: &SaleNotice) -> Result<(), GatewayError> {
        if take_failure(&self.failing) {
            return Err(GatewayError::Unavailable("telegram bot api returned 502".to_string()));
        }
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice.clone());
        Ok(())
    }
}
