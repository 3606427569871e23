pub mod clock;
pub mod csv;
pub mod model;
pub mod processor;
pub mod store;
pub mod validate;

pub use clock::{Clock, FixedClock, SystemClock};
pub use model::{ClientId, Operation, TransactionId, TransactionRequest};
pub use processor::{Processor, ProcessorError};
pub use store::BankDb;
