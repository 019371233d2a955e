pub mod expiry_sweeper;
pub mod links;
pub mod payment_flow;
pub mod rails;
pub mod reconciler;
pub mod session;

pub use expiry_sweeper::run_expiry_sweeper;
pub use links::{LinkService, LinkSummary};
pub use payment_flow::{PaymentFlow, PaymentResponse, PublicLink};
pub use reconciler::{ConfirmationReconciler, LinkRef, Reconciliation};
pub use session::{CheckoutSessionManager, CheckoutTarget, PaymentDetails};
