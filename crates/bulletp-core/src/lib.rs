//! BulletP Core - Outline tree engine and login gates
//!
//! This crate provides the storage-backed core of the BulletP backend:
//!
//! - **Tree**: Per-user ordered forest of bullets with a single protected root
//!   and contiguous sibling order (create, move, indent, outdent, soft delete)
//! - **Identity**: Users and the (provider, subject) identities that resolve to them
//! - **Otp**: Hashed, rate-limited, single-use email login codes
//! - **OAuth**: Single-use login states and the provider code-exchange seam
//! - **Login**: Flows that end in a resolved user plus that user's root
//! - **Delivery**: Seam for getting codes to users outside any transaction
//! - **Persistence**: SQLite storage; every operation is one transaction
//! - **Config**: Tunables for the gates and the tree engine
//!
//! # Example
//!
//! ```
//! use bulletp_core::{Repository, UserId};
//!
//! let repo = Repository::in_memory().unwrap();
//! let user = UserId::new("alice");
//! let home = repo.ensure_root(&user).unwrap();
//! let first = repo.create_node(&user, Some(home.id), "first", None).unwrap();
//! let second = repo.create_node(&user, Some(home.id), "second", None).unwrap();
//! let indented = repo.indent_node(&user, second.id).unwrap();
//! assert_eq!(indented.parent_id, Some(first.id));
//! ```

pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod identity;
pub mod login;
pub mod oauth;
pub mod otp;
pub mod persistence;
pub mod tree;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BulletpConfig, ConfigError, DeleteMode, OAuthConfig, OtpConfig, TreeConfig};
pub use delivery::{CodeSender, DeliveryError, LogCodeSender, VerificationEmail};
pub use error::{BulletpError, ErrorKind, PersistenceError, Result};
pub use identity::{Provider, User, UserId};
pub use login::{LoginOutcome, WeChatLogin, WeChatStart};
pub use oauth::{DevSubjectExchanger, ExchangeError, OAuthState, SubjectExchanger};
pub use otp::{normalize_email, IssuedCode};
pub use persistence::{Repository, Schema};
pub use tree::{Bullet, BulletId, BulletSummary, SubtreeNode};
