//! Per-user ordered forest of bullets
//!
//! Invariants maintained by every structural mutation:
//! - exactly one live root per user, never deleted or moved
//! - live siblings under one parent carry order indices `0..k` with no gaps
//!   or duplicates
//! - a bullet only ever points at a live parent owned by the same user
//!
//! ```text
//! Home(root)
//! ├── A (0)
//! │   └── C (0)     indent C: C becomes last child of its previous sibling
//! └── B (1)         outdent C: C lands right after its old parent
//! ```

mod engine;
mod node;
mod store;

pub use node::{Bullet, BulletId, BulletSummary, SubtreeNode};

pub(crate) use engine::TreeOps;
