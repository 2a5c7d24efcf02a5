use tonmart_orchestrator::OperationOrchestrator;
use tonmart_unit_of_work::UnitOfWorkFactory;

use crate::infrastructure::notifier::{SaleNotice, SellerNotifier};

/// 成約を売り手に通知する。取引はコミット済みのため、失敗はログに残すだけにする。
pub(crate) async fn notify_seller<F: UnitOfWorkFactory>(
    orchestrator: &OperationOrchestrator<F>,
    notifier: &dyn SellerNotifier,
    notice: &SaleNotice,
) {
    let result = orchestrator
        .call_outbound(|| notifier.notify_sale(notice))
        .await;
    if let Err(e) = result {
        tracing::warn!(
            deal_id = %notice.deal_id,
            seller_id = notice.seller_id,
            attempts = e.attempts(),
            error = %e,
            "failed to notify seller"
        );
    }
}
