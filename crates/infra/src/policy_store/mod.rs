//! Policy store backends.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryPolicyStore;
pub use postgres::PostgresPolicyStore;
