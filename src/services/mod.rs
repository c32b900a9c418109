// Commerce core
pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod orders;

// Payments
pub mod gateway;

// Identity and admin console
pub mod admin;
pub mod newsletter;
pub mod uploads;
pub mod users;
