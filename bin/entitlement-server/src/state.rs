use crate::backend::{LedgerBackend, PaymentBackend, TaskBackend};
use entitlement_admission::AdmissionGate;
use entitlement_config::Config;
use entitlement_credit_applier::CreditApplier;
use entitlement_ledger::Ledger;
use entitlement_payment_verifier::ethers_client::EthersChainClient;
use entitlement_payment_verifier::PaymentVerifier;
use entitlement_rate_limiter::RateLimiter;
use entitlement_scheduler::Scheduler;
use entitlement_tasks::TaskManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<Ledger<LedgerBackend>>,
    pub admission: Arc<AdmissionGate<LedgerBackend>>,
    pub scheduler: Arc<Scheduler<LedgerBackend>>,
    pub credit_applier: Arc<CreditApplier<PaymentBackend, LedgerBackend, EthersChainClient>>,
    pub tasks: Arc<TaskManager<TaskBackend>>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        ledger_store: Arc<LedgerBackend>,
        payment_store: Arc<PaymentBackend>,
        task_store: Arc<TaskBackend>,
        chain_client: EthersChainClient,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(ledger_store));
        let admission = Arc::new(AdmissionGate::new(ledger.clone()));
        let scheduler = Arc::new(Scheduler::new(ledger.clone()));
        let verifier = Arc::new(PaymentVerifier::new(chain_client, config.clone()));
        let credit_applier = Arc::new(CreditApplier::new(payment_store, ledger.clone(), verifier));
        let tasks = Arc::new(TaskManager::new(task_store));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limits));

        Self { config, ledger, admission, scheduler, credit_applier, tasks, rate_limiter }
    }
}
