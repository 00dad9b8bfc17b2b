pub mod model;
pub mod store;

pub use model::{NewUser, Role, User};
pub use store::{MemoryUserStore, PgUserStore, StoreError, UserStore};
