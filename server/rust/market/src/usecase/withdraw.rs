use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tonmart_distributed_lock::FallbackPolicy;
use tonmart_idempotency::IdempotencyScope;
use tonmart_orchestrator::{Operation, OperationOrchestrator};
use tonmart_unit_of_work::{run_in_unit_of_work, UnitOfWorkFactory};
use uuid::Uuid;

use crate::domain::entity::{Withdrawal, WithdrawalStatus};
use crate::domain::repository::MarketRepository;
use crate::domain::MarketError;
use crate::infrastructure::ton_gateway::{TonGateway, TransferRequest};
use crate::usecase::error::UseCaseError;
use crate::usecase::load_account;

/// Withdraw はマーケット残高から TON ウォレットへの出金。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdraw {
    pub user_id: i64,
    pub amount_nanotons: u64,
    pub destination: String,
}

/// WithdrawalReceipt は引き落としの結果。冪等キーで保存される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub withdrawal_id: Uuid,
    pub user_id: i64,
    pub amount_nanotons: u64,
    pub destination: String,
    /// 送金の取引参照
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalCompleted {
    pub receipt: WithdrawalReceipt,
    pub tx_hash: String,
    /// true なら引き落としは以前のリクエストで行われている
    pub replayed: bool,
}

#[async_trait]
impl<S> Operation<S> for Withdraw
where
    S: MarketRepository + Send,
{
    type Output = WithdrawalReceipt;
    type Error = MarketError;

    fn name(&self) -> &'static str {
        "withdraw"
    }

    fn lock_keys(&self) -> Vec<String> {
        vec![format!("user:balance:{}", self.user_id)]
    }

    fn fallback(&self) -> Option<FallbackPolicy> {
        Some(FallbackPolicy::FailClosed)
    }

    fn fingerprint(&self) -> Option<String> {
        tonmart_idempotency::fingerprint(self).ok()
    }

    async fn execute(&self, repo: &mut S) -> Result<WithdrawalReceipt, MarketError> {
        if self.amount_nanotons == 0 {
            return Err(MarketError::InvalidAmount("withdrawal amount must be positive".to_string()));
        }
        let mut account = load_account(repo, self.user_id).await?;
        account.debit(self.amount_nanotons)?;
        let withdrawal = Withdrawal::new(self.user_id, self.amount_nanotons, self.destination.clone());

        repo.save_account(&account).await?;
        repo.save_withdrawal(&withdrawal).await?;

        tracing::info!(
            user_id = self.user_id,
            amount_nanotons = self.amount_nanotons,
            withdrawal_id = %withdrawal.id,
            reference = %withdrawal.reference,
            "withdrawal debited"
        );
        Ok(WithdrawalReceipt {
            withdrawal_id: withdrawal.id,
            user_id: self.user_id,
            amount_nanotons: self.amount_nanotons,
            destination: withdrawal.destination,
            reference: withdrawal.reference,
        })
    }
}

/// WithdrawUseCase は出金を担う。
///
/// 残高の引き落としと出金記録の作成はロックとトランザクションの中で行い、
/// ウォレットの検証と送金の依頼はその外でリトライ付きで行う。
pub struct WithdrawUseCase<F: UnitOfWorkFactory> {
    orchestrator: Arc<OperationOrchestrator<F>>,
    ton: Arc<dyn TonGateway>,
}

impl<F> WithdrawUseCase<F>
where
    F: UnitOfWorkFactory,
    F::Session: MarketRepository,
{
    pub fn new(orchestrator: Arc<OperationOrchestrator<F>>, ton: Arc<dyn TonGateway>) -> Self {
        Self { orchestrator, ton }
    }

    /// 出金する。
    ///
    /// 同じ冪等キーでの再送では引き落としを繰り返さず、保存済みの取引参照で送金を
    /// 依頼し直す。ゲートウェイは取引参照で重複を排除するため、送金は 1 回だけ行われる。
    pub async fn execute(
        &self,
        input: Withdraw,
        idempotency_key: Option<String>,
    ) -> Result<WithdrawalCompleted, UseCaseError> {
        let scope = IdempotencyScope::from_optional(idempotency_key, input.user_id.to_string())?;

        // 引き落とし済みの再送ではウォレットを解決し直さない
        if let Some(scope) = &scope {
            let cached = self
                .orchestrator
                .idempotency_guard()
                .check::<WithdrawalReceipt>(scope, None)
                .await?;
            if let Some(receipt) = cached.filter(|r| r.amount_nanotons == input.amount_nanotons) {
                return self.submit(receipt, true).await;
            }
        }

        let destination = self
            .orchestrator
            .call_outbound(|| self.ton.resolve_wallet(&input.destination))
            .await
            .map_err(UseCaseError::WalletResolution)?;
        let op = Withdraw {
            destination,
            ..input
        };

        let completed = self.orchestrator.run_detailed(op, scope).await?;
        self.submit(completed.output, completed.replayed).await
    }

    /// 引き落とし済みの出金について送金を依頼し、出金記録を送信済みにする。
    async fn submit(
        &self,
        receipt: WithdrawalReceipt,
        replayed: bool,
    ) -> Result<WithdrawalCompleted, UseCaseError> {
        let request = TransferRequest {
            reference: receipt.reference.clone(),
            destination: receipt.destination.clone(),
            amount_nanotons: receipt.amount_nanotons,
        };
        let transfer = self
            .orchestrator
            .call_outbound(|| self.ton.submit_transfer(&request))
            .await
            .map_err(|source| {
                tracing::error!(
                    withdrawal_id = %receipt.withdrawal_id,
                    reference = %receipt.reference,
                    error = %source,
                    "transfer was not confirmed after debit"
                );
                UseCaseError::TransferUnconfirmed {
                    reference: receipt.reference.clone(),
                    source,
                }
            })?;

        if let Err(e) = self
            .mark_submitted(receipt.withdrawal_id, transfer.tx_hash.clone())
            .await
        {
            // 送金は受け付けられているため、状態の更新漏れは照合処理に任せる
            tracing::warn!(
                withdrawal_id = %receipt.withdrawal_id,
                error = %e,
                "failed to record transfer submission"
            );
        }

        Ok(WithdrawalCompleted {
            receipt,
            tx_hash: transfer.tx_hash,
            replayed,
        })
    }

    async fn mark_submitted(&self, withdrawal_id: Uuid, tx_hash: String) -> anyhow::Result<()> {
        run_in_unit_of_work(self.orchestrator.factory(), move |session: &mut F::Session| {
            Box::pin(async move {
                let mut withdrawal = session
                    .find_withdrawal(withdrawal_id)
                    .await?
                    .ok_or(MarketError::WithdrawalNotFound(withdrawal_id))?;
                if withdrawal.status == WithdrawalStatus::Pending {
                    withdrawal.mark_submitted(tx_hash);
                    session.save_withdrawal(&withdrawal).await?;
                }
                Ok::<_, anyhow::Error>(())
            })
        })
        .await
    }
}
