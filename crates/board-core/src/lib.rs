//! # board-core
//!
//! Shared domain types for the job board marketplace.
//!
//! ## Contents
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │     ids      │  │     role     │  │    model     │  │    viewer    │
//! │ UserId       │  │ Role         │  │ Plan         │  │ Viewer       │
//! │ PlanId       │  │ id <-> role  │  │ PlanCategory │  │ (claims)     │
//! └──────────────┘  └──────────────┘  └──────────────┘  └──────────────┘
//! ```
//!
//! Backend payloads are loosely typed: ids may be numbers or strings, and
//! roles travel as bare integers. Values are validated here once so the
//! rest of the workspace can rely on the types.

pub mod error;
pub mod ids;
pub mod model;
pub mod role;
pub mod viewer;

pub use error::{CoreError, Result};
pub use ids::{PlanId, UserId};
pub use model::{ActiveSubscription, Plan, PlanCategory};
pub use role::Role;
pub use viewer::Viewer;
