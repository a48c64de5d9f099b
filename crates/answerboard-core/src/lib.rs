//! Board logic: header resolution, reactions, access decisions, config
//! merging and the account/board services built on them.

pub mod access;
pub mod accounts;
pub mod board;
pub mod config;
pub mod error;
pub mod header;
pub mod lock;
pub mod pages;
pub mod reactions;
pub mod webapp;

use std::sync::Arc;

use answerboard_db::Database;
use answerboard_sheets::SheetsBackend;

pub use access::{AccessController, SystemAdmins, decide};
pub use accounts::AccountService;
pub use board::BoardService;
pub use error::{BoardError, BoardResult};
pub use lock::ScriptLock;
pub use reactions::{ReactionEngine, ReactionOutcome, ReactionTarget};

/// Every service, wired once per process.
#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<AccountService>,
    pub access: AccessController,
    pub board: Arc<BoardService>,
}

impl Services {
    pub fn new(
        db: Arc<Database>,
        sheets: Arc<dyn SheetsBackend>,
        admins: SystemAdmins,
        lock: ScriptLock,
    ) -> Self {
        let accounts = Arc::new(AccountService::new(db, admins.clone()));
        let access = AccessController::new(Arc::clone(&accounts), admins);
        let board = Arc::new(BoardService::new(
            sheets,
            Arc::clone(&accounts),
            access.clone(),
            lock,
        ));
        Self {
            accounts,
            access,
            board,
        }
    }
}
