//! # board-payments
//!
//! Plan purchases for the job board through a hosted checkout page.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  pay   ┌──────────────────┐  open   ┌─────────────────┐
//! │ PlanCatalog │───────▶│ CheckoutInitiator│────────▶│ Checkout window │
//! └─────────────┘        └──────────────────┘         └─────────────────┘
//!                                 │                            │
//!                                 │ payment id        postMessage / callback
//!                                 ▼                            ▼
//!                        ┌──────────────────┐         ┌─────────────────┐
//!                        │   StatusPoller   │         │  MessageHub     │
//!                        └──────────────────┘         └─────────────────┘
//!                                 │      first to see completion   │
//!                                 └──────────────┬─────────────────┘
//!                                                ▼
//!                                   ┌────────────────────────┐
//!                                   │ SubscriptionRegistrar  │
//!                                   └────────────────────────┘
//! ```
//!
//! The checkout page can report back on its own (completion message) or
//! stay silent, in which case the poller asks the backend. Outcomes that
//! cannot be established are shown as *pending*, never as failures.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use board_payments::{FlowConfig, HttpBillingApi, MessageHub, PaymentFlow};
//!
//! let api = Arc::new(HttpBillingApi::from_env()?);
//! let flow = PaymentFlow::new(api, opener, MessageHub::new(), viewer, FlowConfig::new("board.example"));
//!
//! flow.open(plan);
//! flow.pay().await?;
//! let state = flow.settled().await;
//! ```

mod api;
mod catalog;
mod dialog;
mod error;
mod flow;
mod initiator;
mod listener;
pub mod mock;
pub mod normalize;
mod poller;
mod registrar;
mod status;
mod window;

pub use api::{ApiConfig, BillingApi, HttpBillingApi, Page, PaymentId, PaymentIntent, PaymentIntentRequest};
pub use catalog::PlanCatalog;
pub use dialog::{DialogEvent, DialogSnapshot, PaymentDialog, WorkflowState};
pub use error::{PaymentError, Result};
pub use flow::{FlowConfig, PaymentFlow};
pub use initiator::{CheckoutInitiator, CheckoutSession};
pub use listener::{CheckoutMessage, InboundMessage, MessageHub, MessageSubscription, origin_host};
pub use poller::{PollConfig, PollOutcome, StatusPoller};
pub use registrar::{Registration, SubscriptionRegistrar};
pub use status::PaymentStatus;
pub use window::{CheckoutWindow, WindowOpener, close_if_open, navigate_if_open, show_error_if_open};
