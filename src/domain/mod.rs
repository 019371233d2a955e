pub mod availability;
pub mod checkout;
pub mod link_payment;
pub mod payment_link;

pub use availability::{is_payable, Availability, UnavailableReason};
pub use checkout::{
    CardOutcome, PayerData, PaymentMethod, PaymentRouter, RailSignal, RouterError, RouterState,
};
pub use link_payment::{LinkPayment, PaymentEntry, PaymentOutcome};
pub use payment_link::{LinkStatus, NewPaymentLink, PaymentLink};
