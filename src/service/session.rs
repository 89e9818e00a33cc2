//! 转账会话
//!
//! 把各阶段服务连成一张显式的数据流图：
//!
//! ```text
//! 收款人输入 → 名称解析 → 元地址查询 ┐
//! 代币输入   → 代币分类 ─────────────┼→ 授权检查 → 隐身转账
//! 金额输入   → 金额规范化 ───────────┘
//! ```
//!
//! 上游输入变化时下游状态被重置后重新计算（不做局部修补）：
//! 收款人变化重置代币、金额、授权；代币变化重置授权并重新求值金额。
//! 某一阶段失败只影响该阶段。

use std::sync::{Arc, Mutex, MutexGuard};

use ethers::types::{Address, U256};
use tracing::{debug, info, instrument};

use super::{
    approval::{ApprovalContext, ApprovalCoordinator},
    meta_address_lookup::{MetaAddressLookupService, MetaAddressStatus},
    name_resolution::{NameResolutionService, ResolvedTarget},
    registration::RegistrationService,
    token_info::TokenInfoService,
    transfer::{TransferOrchestrator, TransferReceipt, TransferRequest},
};
use crate::{
    config::PipelineConfig,
    domain::{
        address_reference::AddressReference,
        amount::AmountValue,
        chain_config::{self, NetworkPrefix},
        stealth::{StealthAddressGenerator, StealthMetaAddress},
        token::{CommonToken, TokenDescriptor},
        transfer_status::{ApprovalStatus, TransactionPhase},
    },
    error::{Result, StealthError},
    infrastructure::{
        chain_client::{ChainReader, NameResolver, TxOutcome, WalletProvider},
        request_gate::{FieldState, GateOutcome, RequestGate},
    },
};

#[derive(Debug, Default)]
struct Inputs {
    recipient: Option<AddressReference>,
    token_input: Option<String>,
    amount: AmountValue,
}

/// 会话状态快照（展示用）
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub recipient: ResolvedTarget,
    pub meta_address: FieldState<MetaAddressStatus>,
    pub token: FieldState<TokenDescriptor>,
    pub amount: AmountValue,
    pub approval: ApprovalStatus,
    pub transaction: TransactionPhase,
    pub wallet: Option<Address>,
}

/// 提交前置条件全部满足时的输入
struct ReadyTransfer {
    wallet: Arc<dyn WalletProvider>,
    context: ApprovalContext,
    meta_address: StealthMetaAddress,
    amount: U256,
}

pub struct TransferSession {
    config: PipelineConfig,
    names: Arc<NameResolutionService>,
    meta: MetaAddressLookupService,
    tokens: TokenInfoService,
    amount_gate: RequestGate<String, AmountValue>,
    approval: ApprovalCoordinator,
    orchestrator: TransferOrchestrator,
    registration: RegistrationService,
    wallet: Mutex<Option<Arc<dyn WalletProvider>>>,
    inputs: Mutex<Inputs>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl TransferSession {
    pub fn new(
        config: PipelineConfig,
        reader: Arc<dyn ChainReader>,
        resolver: Arc<dyn NameResolver>,
        generator: Arc<dyn StealthAddressGenerator>,
    ) -> Self {
        let names = Arc::new(NameResolutionService::new(resolver));
        Self {
            meta: MetaAddressLookupService::new(
                reader.clone(),
                names.clone(),
                config.meta_lookup_debounce(),
            ),
            tokens: TokenInfoService::new(reader.clone(), config.token_lookup_debounce()),
            amount_gate: RequestGate::new("amount"),
            approval: ApprovalCoordinator::new(reader),
            orchestrator: TransferOrchestrator::new(generator),
            registration: RegistrationService::new(),
            wallet: Mutex::new(None),
            inputs: Mutex::new(Inputs::default()),
            names,
            config,
        }
    }

    // ---------- 钱包 ----------

    pub fn connect_wallet(&self, wallet: Arc<dyn WalletProvider>) {
        info!(address = ?wallet.address(), "wallet connected");
        *lock(&self.wallet) = Some(wallet);
    }

    pub fn disconnect_wallet(&self) {
        *lock(&self.wallet) = None;
        self.approval.reset();
    }

    fn wallet(&self) -> Result<Arc<dyn WalletProvider>> {
        lock(&self.wallet)
            .clone()
            .ok_or(StealthError::WalletNotConnected)
    }

    // ---------- 输入 ----------

    /// 收款人输入变化
    #[instrument(skip(self))]
    pub async fn set_recipient(&self, input: &str) -> GateOutcome<MetaAddressStatus> {
        let reference = AddressReference::parse(input.trim());

        let changed = {
            let mut inputs = lock(&self.inputs);
            let changed = inputs
                .recipient
                .as_ref()
                .map(AddressReference::normalized_key)
                != Some(reference.normalized_key());
            if changed {
                inputs.recipient = Some(reference.clone());
                inputs.token_input = None;
                inputs.amount = AmountValue::empty();
            }
            changed
        };

        if changed {
            debug!(recipient = %reference.normalized_key(), "recipient changed, resetting downstream");
            self.tokens.reset();
            self.amount_gate.invalidate();
            self.approval.reset();
            self.orchestrator.reset();
        }

        self.meta.lookup(&reference).await
    }

    /// 当前收款人的网络（收款人有效时）
    pub fn recipient_network(&self) -> Option<NetworkPrefix> {
        lock(&self.inputs)
            .recipient
            .as_ref()
            .filter(|r| r.is_usable())
            .and_then(|r| r.network_prefix)
    }

    /// 代币输入变化；要求收款人已填写（代币继承其网络前缀）
    #[instrument(skip(self))]
    pub async fn set_token(&self, input: &str) -> GateOutcome<TokenDescriptor> {
        let Some(network) = self.recipient_network() else {
            return GateOutcome::Applied(Err(StealthError::not_ready(
                "Enter a valid recipient first",
            )));
        };

        let changed = {
            let mut inputs = lock(&self.inputs);
            let changed = inputs.token_input.as_deref() != Some(input.trim());
            inputs.token_input = Some(input.trim().to_string());
            changed
        };
        if changed {
            self.approval.reset();
        }

        let outcome = self.tokens.identify(input, network).await;
        if let GateOutcome::Applied(Ok(_)) = &outcome {
            self.reevaluate_amount().await;
        }
        outcome
    }

    /// 从常用代币列表选择
    pub async fn select_common_token(&self, common: &CommonToken) -> Result<TokenDescriptor> {
        let network = self
            .recipient_network()
            .ok_or_else(|| StealthError::not_ready("Enter a valid recipient first"))?;

        lock(&self.inputs).token_input = Some(common.input_value().to_string());
        self.approval.reset();

        let token = self.tokens.select_common(network, common)?;
        self.reevaluate_amount().await;
        Ok(token)
    }

    /// 金额输入变化（防抖后规范化）
    ///
    /// 新文本在求值完成前不携带任何整数值，防抖期间不会有旧金额被提交。
    #[instrument(skip(self))]
    pub async fn set_amount(&self, raw: &str) -> AmountValue {
        let raw = raw.trim().to_string();
        lock(&self.inputs).amount = AmountValue {
            raw: raw.clone(),
            ..AmountValue::empty()
        };

        if raw.is_empty() {
            self.amount_gate.invalidate();
            return AmountValue::empty();
        }

        let Some(token) = self.tokens.current() else {
            self.amount_gate.invalidate();
            let value = AmountValue {
                raw,
                value: None,
                error: Some(StealthError::not_ready("Select a token first")),
            };
            lock(&self.inputs).amount = value.clone();
            return value;
        };

        // 同一资产 + 同一输入只规范化一次
        let key = format!(
            "{}:{}:{}:{}",
            token.network,
            token
                .address
                .map(|a| format!("{:?}", a))
                .unwrap_or_else(|| token.symbol.clone()),
            token.decimals,
            raw
        );

        let input = raw.as_str();
        let token = &token;
        let outcome = self
            .amount_gate
            .run(key.clone(), self.config.amount_debounce(), || async move {
                Ok(AmountValue::evaluate(input, token))
            })
            .await;

        let evaluated = match outcome {
            GateOutcome::Applied(result) => result.ok(),
            GateOutcome::Deduplicated => self.amount_gate.settled(&key).await.and_then(|r| r.ok()),
            GateOutcome::Superseded => None,
        };

        let mut inputs = lock(&self.inputs);
        // 求值期间文本又变了：结果属于旧输入，丢弃
        if let Some(value) = evaluated.filter(|v| v.raw == inputs.amount.raw) {
            inputs.amount = value;
        }
        inputs.amount.clone()
    }

    async fn reevaluate_amount(&self) {
        let raw = lock(&self.inputs).amount.raw.clone();
        if !raw.is_empty() {
            self.set_amount(&raw).await;
        }
    }

    // ---------- 授权 / 转账 ----------

    fn ready(&self) -> Result<ReadyTransfer> {
        let wallet = self.wallet()?;

        let status = self
            .meta
            .current()
            .ok_or_else(|| StealthError::not_ready("Recipient is not resolved"))?;
        let meta_address = status.meta_address().cloned().ok_or_else(|| {
            StealthError::not_ready("Recipient has not registered a stealth meta-address")
        })?;

        let token = self
            .tokens
            .current()
            .ok_or_else(|| StealthError::not_ready("Select a token first"))?;

        let amount = {
            let inputs = lock(&self.inputs);
            inputs
                .amount
                .value
                .ok_or_else(|| StealthError::not_ready("Enter a valid amount"))?
        };

        let network = status.network();
        let context = ApprovalContext {
            network,
            recipient: status.owner(),
            owner: wallet.address(),
            spender: chain_config::chain(network).stealth_contract,
            token,
        };

        Ok(ReadyTransfer {
            wallet,
            context,
            meta_address,
            amount,
        })
    }

    /// 检查当前金额的授权状态
    pub async fn check_approval(&self) -> Result<ApprovalStatus> {
        let ready = self.ready()?;
        Ok(self.approval.check(&ready.context, ready.amount).await)
    }

    /// 提交授权交易；成功后授权状态变为 Approved，需要用户再次确认才会转账
    ///
    /// 与转账共用交易阶段，同一时刻只有一笔交易在途。
    pub async fn approve(&self) -> Result<TxOutcome> {
        let ready = self.ready()?;
        let status = self.approval.check(&ready.context, ready.amount).await;
        if status.is_approved() {
            return Err(StealthError::not_ready("Token is already approved"));
        }
        if status.check_in_flight() {
            return Err(StealthError::not_ready("Approval check in progress"));
        }

        let outcome = self
            .orchestrator
            .approve(
                ready.wallet.as_ref(),
                ready.context.network,
                &ready.context.token,
                ready.amount,
            )
            .await?;

        self.approval.mark_approved(&ready.context, ready.amount);
        Ok(outcome)
    }

    /// 提交隐身转账
    pub async fn transfer(&self) -> Result<TransferReceipt> {
        let ready = self.ready()?;

        let approval = if ready.context.token.is_native() {
            self.approval.check(&ready.context, ready.amount).await
        } else {
            self.approval.status()
        };

        let request = TransferRequest {
            network: ready.context.network,
            recipient: ready.context.recipient,
            meta_address: ready.meta_address,
            token: ready.context.token,
            amount: ready.amount,
        };

        self.orchestrator
            .transfer(ready.wallet.as_ref(), &request, &approval)
            .await
    }

    /// 注册当前钱包的隐身元地址（`st:<prefix>:<hex>`）
    pub async fn register(&self, meta_address: &str) -> Result<TxOutcome> {
        let wallet = self.wallet()?;
        self.registration.register(wallet.as_ref(), meta_address).await
    }

    // ---------- 状态 ----------

    /// 完整重置：所有字段回到初始状态，在途结果全部失效
    pub fn reset(&self) {
        *lock(&self.inputs) = Inputs::default();
        self.meta.reset();
        self.tokens.reset();
        self.amount_gate.invalidate();
        self.approval.reset();
        self.orchestrator.reset();
        info!("transfer session reset");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            recipient: self.names.target(),
            meta_address: self.meta.state(),
            token: self.tokens.state(),
            amount: lock(&self.inputs).amount.clone(),
            approval: self.approval.status(),
            transaction: self.orchestrator.phase(),
            wallet: lock(&self.wallet).as_ref().map(|w| w.address()),
        }
    }
}
