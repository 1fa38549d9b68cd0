//! Identity collaborators — hosted service client, in-memory directory, and
//! the demo identity strategy.

pub mod demo;
pub mod gotrue;
pub mod memory;
pub mod traits;

pub use demo::{ResolvedIdentity, SharedDemoAccount, TestIdentityProvider};
pub use gotrue::GoTrueAuth;
pub use memory::{IdentityDirectory, InMemoryAuth};
pub use traits::AuthProvider;
