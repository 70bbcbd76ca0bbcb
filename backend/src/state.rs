use crate::config::Config;
use crate::db::Db;
use crate::ledger::SqliteLedger;
use crate::registry::RootRegistry;
use access_core::chain::ChainVerifier;
use access_core::orchestrator::Orchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<SqliteLedger>,
    pub registry: Arc<RootRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the ledger, the registry and the orchestrator over one pool.
    ///
    /// The registry doubles as the orchestrator's verifier.
    pub fn new(db: Db, config: Config) -> Self {
        let registry = Arc::new(RootRegistry::new(db.clone()));
        let verifier: Arc<dyn ChainVerifier> = registry.clone();
        let orchestrator = Orchestrator::new(config.orchestrator(), Some(verifier));

        Self {
            config: Arc::new(config),
            ledger: Arc::new(SqliteLedger::new(db)),
            registry,
            orchestrator: Arc::new(orchestrator),
        }
    }
}
