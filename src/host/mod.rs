//! SQL Engine Host (spec §4.3) and the transaction-manager operations
//! layered on top of it (spec §4.4). The embedded SQL parser/planner/VM
//! is an external collaborator — see [`engine::SqlEngine`].

mod cipher;
mod config;
mod engine;
mod query_result;
mod sql_engine_host;
mod value;

pub use cipher::{CipherHook, CipherHookFactory, NullCipher, NullCipherFactory};
pub use config::{JournalMode, OpenConfig};
pub use engine::{PageIo, PreparedStatement, SqlEngine, SqlEngineFactory, StreamCursor, VfsPageIo};
pub use query_result::QueryResult;
pub use sql_engine_host::SqlEngineHost;
pub use value::Value;
