//! safe-clean: guarded deletion core for cache and artifact cleanup
//!
//! This library validates every deletion target against hard-coded system
//! protections and a user whitelist, bounds blocking work with a timeout
//! supervisor, and discovers regenerable project artifacts.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod init;
pub mod protection;
pub mod scanner;
pub mod size;
pub mod supervisor;
pub mod validator;
pub mod whitelist;

use std::sync::Arc;

use config::Settings;
use engine::DeletionEngine;
use protection::ProtectionRule;
use scanner::ArtifactScanner;
use supervisor::TimeoutSupervisor;
use validator::PathValidator;

/// Process-wide components built once from validated settings
pub struct Core {
    pub settings: Arc<Settings>,
    pub validator: PathValidator,
    pub engine: DeletionEngine,
    pub scanner: ArtifactScanner,
}

impl Core {
    /// Load the whitelist, detect the timeout facility and wire components
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let protection = Arc::new(ProtectionRule::system());
        let whitelist = Arc::new(settings.load_whitelist());
        let validator = PathValidator::new(protection, whitelist);
        let engine = DeletionEngine::new(validator.clone(), TimeoutSupervisor::detect(), &settings);
        let scanner = ArtifactScanner::new(validator.clone(), Arc::clone(&settings));
        Self {
            settings,
            validator,
            engine,
            scanner,
        }
    }
}
